//! Cleanup of branches and worktrees left behind by finished specs.
//!
//! Candidates are feature branches (local and remote) whose spec record is
//! terminal, plus linked worktrees whose branch or spec no longer warrants
//! one. Specs that are still active, or branches steward cannot map to a
//! spec at all, are never touched. Individual failures are reported and do
//! not stop the pass.

use crate::config::Config;
use crate::error::Result;
use crate::git::Git;
use crate::github::GitHub;
use crate::report::Outcome;
use crate::spec::Spec;
use crate::worktree;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Default, Serialize)]
pub struct CleanupReport {
    pub outcome: Option<Outcome>,
    pub deleted_local: Vec<String>,
    pub deleted_remote: Vec<String>,
    pub removed_worktrees: Vec<String>,
    pub skipped: Vec<String>,
    pub warnings: Vec<String>,
}

impl CleanupReport {
    fn changed(&self) -> bool {
        !self.deleted_local.is_empty()
            || !self.deleted_remote.is_empty()
            || !self.removed_worktrees.is_empty()
    }
}

/// One cleanup pass. `gh` is optional: without it, remote branches are left
/// alone and noted as skipped.
pub fn run(
    root: &Path,
    git: &Git,
    gh: Option<&GitHub>,
    cfg: &Config,
    dry_run: bool,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let prefix = worktree::feature_branch_prefix(&cfg.branches.integration);

    let mut candidates: BTreeSet<String> = BTreeSet::new();
    candidates.extend(git.local_branches(&prefix)?);
    candidates.extend(git.remote_branches(&prefix)?);

    for branch in &candidates {
        let Some((_user, slug)) = worktree::parse_feature_branch(&cfg.branches.integration, branch)
        else {
            report
                .skipped
                .push(format!("{branch}: not a feature branch"));
            continue;
        };
        let spec = match Spec::load(root, &slug) {
            Ok(spec) => spec,
            Err(_) => {
                report
                    .skipped
                    .push(format!("{branch}: no spec record for '{slug}'"));
                continue;
            }
        };
        if !spec.status().is_terminal() {
            report
                .skipped
                .push(format!("{branch}: spec '{slug}' is {}", spec.status()));
            continue;
        }

        // Worktree first: git refuses to delete a checked-out branch.
        let wt_path = worktree::worktree_path(root, &slug);
        if wt_path.exists() {
            if dry_run {
                report
                    .removed_worktrees
                    .push(format!("{} (dry run)", wt_path.display()));
            } else {
                match worktree::remove(git, root, &slug) {
                    Ok(true) => report.removed_worktrees.push(wt_path.display().to_string()),
                    Ok(false) => {}
                    Err(e) => report.warnings.push(format!("{}: {e}", wt_path.display())),
                }
            }
        }

        if git.branch_exists(branch) {
            if dry_run {
                report.deleted_local.push(format!("{branch} (dry run)"));
            } else {
                match git.delete_local_branch(branch) {
                    Ok(()) => report.deleted_local.push(branch.clone()),
                    Err(e) => report.warnings.push(format!("{branch}: {e}")),
                }
            }
        }

        if git.remote_branch_exists(branch) {
            match gh {
                Some(gh) if !dry_run => match gh.delete_branch_ref(branch) {
                    Ok(_) => report.deleted_remote.push(branch.clone()),
                    Err(e) => report.warnings.push(format!("origin/{branch}: {e}")),
                },
                Some(_) => report.deleted_remote.push(format!("{branch} (dry run)")),
                None => report
                    .skipped
                    .push(format!("origin/{branch}: no GitHub access")),
            }
        }
    }

    // Orphaned worktrees: linked checkouts under our base dir whose branch
    // is gone entirely.
    let base = worktree::base_dir(root);
    for entry in git.worktree_list()? {
        if !entry.path.starts_with(&base) {
            continue;
        }
        let orphaned = match &entry.branch {
            Some(branch) => !candidates.contains(branch) && !git.branch_exists(branch),
            None => true,
        };
        if !orphaned {
            continue;
        }
        if dry_run {
            report
                .removed_worktrees
                .push(format!("{} (dry run)", entry.path.display()));
        } else if let Err(e) = git.worktree_remove(&entry.path, true) {
            report
                .warnings
                .push(format!("{}: {e}", entry.path.display()));
        } else {
            report
                .removed_worktrees
                .push(entry.path.display().to_string());
        }
    }

    if !dry_run && report.changed() {
        git.prune_remote()?;
    }

    report.outcome = Some(if dry_run {
        Outcome::DryRun
    } else if report.changed() {
        Outcome::Success
    } else {
        Outcome::NothingToDo
    });
    Ok(report)
}
