//! Fast-forward promotion between pipeline branches.
//!
//! History flows one way: integration -> staging -> release. Promotion never
//! creates merge commits and never merges backwards, so the staging and
//! release branches are always ancestors-or-equal of the branch above them.

use crate::config::{BranchConfig, Config};
use crate::error::{Result, StewardError};
use crate::git::{Git, MergeOutcome};
use crate::report::{OpReport, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// integration -> staging
    Staging,
    /// staging -> release
    Release,
}

impl Stage {
    pub fn source<'a>(&self, branches: &'a BranchConfig) -> &'a str {
        match self {
            Stage::Staging => &branches.integration,
            Stage::Release => &branches.staging,
        }
    }

    pub fn target<'a>(&self, branches: &'a BranchConfig) -> &'a str {
        match self {
            Stage::Staging => &branches.staging,
            Stage::Release => &branches.release,
        }
    }
}

/// The merge matrix the pre-merge-commit hook enforces, as a predicate.
/// Anything may merge into integration; staging accepts only integration or
/// hotfixes; release accepts only staging.
pub fn merge_allowed(branches: &BranchConfig, source: &str, target: &str) -> bool {
    if target == branches.staging {
        source == branches.integration || source.starts_with("hotfix/")
    } else if target == branches.release {
        source == branches.staging
    } else {
        true
    }
}

/// Promote one stage. With `execute` false, reports the steps that would run
/// without touching the repository beyond precondition checks.
pub fn promote(git: &Git, cfg: &Config, stage: Stage, execute: bool) -> Result<OpReport> {
    let branches = &cfg.branches;
    let source = stage.source(branches);
    let target = stage.target(branches);
    let mut report = OpReport::new();

    if !git.is_clean()? {
        return Err(StewardError::Precondition(
            "working tree has uncommitted changes".to_string(),
        ));
    }
    let current = git.current_branch()?;
    if current != source {
        return Err(StewardError::Precondition(format!(
            "must be on '{source}' to promote to '{target}' (currently on '{current}')"
        )));
    }

    let has_remote = git.config_get("remote.origin.url").is_some();

    if !execute {
        report.step("fetch origin (prune)".to_string());
        report.step(format!("checkout {target}"));
        if has_remote {
            report.step(format!("pull --ff-only on {target}"));
        }
        report.step(format!("merge --ff-only {source} into {target}"));
        if has_remote {
            report.step(format!("push origin {target}"));
        }
        report.step(format!("checkout {source}"));
        return Ok(report.finish(
            Outcome::DryRun,
            format!("would promote {source} -> {target}"),
        ));
    }

    if has_remote {
        git.fetch_prune()?;
        report.step("fetched origin".to_string());
    }

    git.checkout(target)?;
    report.step(format!("checked out {target}"));

    let result: Result<MergeOutcome> = (|| {
        if has_remote && git.remote_branch_exists(target) {
            git.pull_ff_only()?;
            report.step(format!("fast-forwarded {target} from origin"));
        }
        let outcome = git.merge_ff_only(source)?;
        match outcome {
            MergeOutcome::FastForwarded => {
                report.step(format!("fast-forwarded {target} to {source}"));
                if has_remote {
                    git.push(target)?;
                    report.step(format!("pushed {target}"));
                }
            }
            MergeOutcome::AlreadyUpToDate => {
                report.step(format!("{target} already contains {source}"));
            }
        }
        Ok(outcome)
    })();

    // Always land back on the source branch, even after a failed merge.
    git.checkout(source)?;
    report.step(format!("returned to {source}"));

    match result? {
        MergeOutcome::FastForwarded => Ok(report.finish(
            Outcome::Success,
            format!("promoted {source} -> {target}"),
        )),
        MergeOutcome::AlreadyUpToDate => Ok(report.finish(
            Outcome::NothingToDo,
            format!("{target} is already up to date with {source}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branches() -> BranchConfig {
        BranchConfig::default()
    }

    #[test]
    fn matrix_allows_anything_into_integration() {
        let b = branches();
        assert!(merge_allowed(&b, "dev-alice-auth", "dev"));
        assert!(merge_allowed(&b, "hotfix/urgent", "dev"));
        assert!(merge_allowed(&b, "test", "dev"));
    }

    #[test]
    fn matrix_guards_staging() {
        let b = branches();
        assert!(merge_allowed(&b, "dev", "test"));
        assert!(merge_allowed(&b, "hotfix/urgent", "test"));
        assert!(!merge_allowed(&b, "dev-alice-auth", "test"));
        assert!(!merge_allowed(&b, "main", "test"));
    }

    #[test]
    fn matrix_guards_release() {
        let b = branches();
        assert!(merge_allowed(&b, "test", "main"));
        assert!(!merge_allowed(&b, "dev", "main"));
        assert!(!merge_allowed(&b, "hotfix/urgent", "main"));
    }

    #[test]
    fn matrix_respects_renamed_branches() {
        let b = BranchConfig {
            integration: "develop".into(),
            staging: "qa".into(),
            release: "prod".into(),
        };
        assert!(merge_allowed(&b, "develop", "qa"));
        assert!(!merge_allowed(&b, "develop", "prod"));
        assert!(merge_allowed(&b, "qa", "prod"));
    }

    #[test]
    fn stage_names_follow_config() {
        let b = branches();
        assert_eq!(Stage::Staging.source(&b), "dev");
        assert_eq!(Stage::Staging.target(&b), "test");
        assert_eq!(Stage::Release.source(&b), "test");
        assert_eq!(Stage::Release.target(&b), "main");
    }
}
