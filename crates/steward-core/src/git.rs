//! Subprocess wrapper around the `git` binary.
//!
//! All repository mutations go through [`Git`], which is bound to one
//! working directory (main checkout or a linked worktree). Failures carry
//! git's stderr; merge, pull, and push rejections map to
//! [`StewardError::Conflict`] so callers can tell "resolve by hand" apart
//! from "git is broken".

use crate::config::BranchConfig;
use crate::error::{Result, StewardError};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    FastForwarded,
    AlreadyUpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
}

impl Git {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        if which::which("git").is_err() {
            return Err(StewardError::GitNotFound);
        }
        Ok(Self { dir: dir.into() })
    }

    /// A handle on the same repository rooted at a different checkout.
    pub fn at(&self, dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        // Git's messages are matched by substring; keep them untranslated.
        let output = Command::new("git")
            .args(args)
            .env("LC_ALL", "C")
            .current_dir(&self.dir)
            .output()
            .map_err(|e| StewardError::Git {
                op: args.first().copied().unwrap_or("git").to_string(),
                detail: e.to_string(),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let op = args.first().copied().unwrap_or("git").to_string();
        let detail = if stderr.is_empty() { stdout.trim().to_string() } else { stderr };
        if matches!(op.as_str(), "merge" | "pull" | "push") {
            Err(StewardError::Conflict { op, detail })
        } else {
            Err(StewardError::Git { op, detail })
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn current_branch(&self) -> Result<String> {
        Ok(self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
    }

    pub fn head_sha(&self, rev: &str) -> Result<String> {
        Ok(self.run(&["rev-parse", rev])?.trim().to_string())
    }

    pub fn is_clean(&self) -> Result<bool> {
        Ok(self.run(&["status", "--porcelain"])?.trim().is_empty())
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{name}")])
            .is_ok()
    }

    pub fn remote_branch_exists(&self, name: &str) -> bool {
        self.run(&[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/remotes/origin/{name}"),
        ])
        .is_ok()
    }

    pub fn local_branches(&self, prefix: &str) -> Result<Vec<String>> {
        let out = self.run(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])?;
        Ok(out
            .lines()
            .map(str::to_string)
            .filter(|b| b.starts_with(prefix))
            .collect())
    }

    pub fn remote_branches(&self, prefix: &str) -> Result<Vec<String>> {
        let out = self.run(&[
            "for-each-ref",
            "--format=%(refname:short)",
            "refs/remotes/origin",
        ])?;
        Ok(out
            .lines()
            .filter_map(|b| b.strip_prefix("origin/"))
            .filter(|b| *b != "HEAD" && b.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    pub fn remote_url(&self) -> Result<String> {
        Ok(self
            .run(&["config", "--get", "remote.origin.url"])?
            .trim()
            .to_string())
    }

    pub fn config_get(&self, key: &str) -> Option<String> {
        self.run(&["config", "--get", key])
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.run(&["config", key, value])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn fetch_prune(&self) -> Result<()> {
        self.run(&["fetch", "origin", "--prune"])?;
        Ok(())
    }

    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", branch])?;
        Ok(())
    }

    pub fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        self.run(&["branch", name, from])?;
        Ok(())
    }

    /// Fast-forward the current branch from its upstream.
    pub fn pull_ff_only(&self) -> Result<()> {
        self.run(&["pull", "--ff-only"])?;
        Ok(())
    }

    /// Fast-forward merge `source` into the current branch. Refuses to create
    /// a merge commit; a diverged target surfaces as a conflict.
    pub fn merge_ff_only(&self, source: &str) -> Result<MergeOutcome> {
        let out = self.run(&["merge", "--ff-only", source])?;
        if out.contains("Already up to date") {
            Ok(MergeOutcome::AlreadyUpToDate)
        } else {
            Ok(MergeOutcome::FastForwarded)
        }
    }

    pub fn push(&self, branch: &str) -> Result<()> {
        self.run(&["push", "origin", branch])?;
        Ok(())
    }

    pub fn push_upstream(&self, branch: &str) -> Result<()> {
        self.run(&["push", "-u", "origin", branch])?;
        Ok(())
    }

    /// Delete a remote branch. Already-gone refs are success, not failure.
    pub fn delete_remote_branch(&self, branch: &str) -> Result<bool> {
        match self.run(&["push", "origin", "--delete", branch]) {
            Ok(_) => Ok(true),
            Err(StewardError::Conflict { detail, .. }) | Err(StewardError::Git { detail, .. })
                if detail.contains("remote ref does not exist") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a local branch; escalates to a forced delete only when git
    /// refuses because the branch looks unmerged. Other failures, a checked
    /// out branch for one, surface as errors.
    pub fn delete_local_branch(&self, branch: &str) -> Result<()> {
        match self.run(&["branch", "-d", branch]) {
            Ok(_) => Ok(()),
            Err(StewardError::Git { detail, .. }) if detail.contains("not fully merged") => {
                self.run(&["branch", "-D", branch])?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn prune_remote(&self) -> Result<()> {
        self.run(&["remote", "prune", "origin"])?;
        Ok(())
    }

    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "-A"])?;
        Ok(())
    }

    /// Stage everything and commit. Returns false when there was nothing to
    /// commit.
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.add_all()?;
        if self.run(&["diff", "--cached", "--quiet"]).is_ok() {
            return Ok(false);
        }
        self.run(&["commit", "-m", message])?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Worktrees
    // -----------------------------------------------------------------------

    pub fn worktree_add(&self, path: &Path, branch: &str) -> Result<()> {
        let path = path.to_string_lossy().into_owned();
        self.run(&["worktree", "add", &path, branch])?;
        Ok(())
    }

    pub fn worktree_add_new_branch(&self, path: &Path, branch: &str, from: &str) -> Result<()> {
        let path = path.to_string_lossy().into_owned();
        self.run(&["worktree", "add", "-b", branch, &path, from])?;
        Ok(())
    }

    pub fn worktree_remove(&self, path: &Path, force: bool) -> Result<()> {
        let path = path.to_string_lossy().into_owned();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path);
        self.run(&args)?;
        Ok(())
    }

    pub fn worktree_list(&self) -> Result<Vec<WorktreeEntry>> {
        let out = self.run(&["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out))
    }

    // -----------------------------------------------------------------------
    // Merge hook
    // -----------------------------------------------------------------------

    /// Install the pre-merge-commit hook enforcing the promotion matrix and
    /// set `merge.ff=false` so feature merges into the integration branch
    /// always get a merge commit.
    pub fn install_merge_guard(&self, branches: &BranchConfig) -> Result<()> {
        self.config_set("merge.ff", "false")?;
        let git_dir = self.run(&["rev-parse", "--git-common-dir"])?.trim().to_string();
        let mut hook_path = PathBuf::from(&git_dir);
        if hook_path.is_relative() {
            hook_path = self.dir.join(hook_path);
        }
        let hooks_dir = hook_path.join("hooks");
        std::fs::create_dir_all(&hooks_dir)?;
        let hook = hooks_dir.join("pre-merge-commit");
        std::fs::write(&hook, pre_merge_hook(branches))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

fn parse_worktree_list(porcelain: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;
    for line in porcelain.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if let Some(p) = path.take() {
                entries.push(WorktreeEntry {
                    path: p,
                    branch: branch.take(),
                });
            }
            continue;
        }
        if let Some(p) = line.strip_prefix("worktree ") {
            path = Some(PathBuf::from(p));
        } else if let Some(b) = line.strip_prefix("branch ") {
            branch = Some(b.strip_prefix("refs/heads/").unwrap_or(b).to_string());
        }
    }
    entries
}

/// Shell hook rejecting merges that skip a pipeline stage. Anything may merge
/// into the integration branch; only the stage below (or a hotfix) may merge
/// upward.
pub fn pre_merge_hook(branches: &BranchConfig) -> String {
    format!(
        r#"#!/usr/bin/env bash
# steward: branch merge rules. Do not edit; reinstalled by 'steward init'.
set -euo pipefail

target=$(git rev-parse --abbrev-ref HEAD)
source=$(git name-rev --name-only --refs='refs/heads/*' MERGE_HEAD 2>/dev/null || echo unknown)

case "$target" in
  "{staging}")
    if [[ "$source" != "{integration}" && "$source" != hotfix/* ]]; then
      echo "steward: only '{integration}' or hotfix/* may merge into '{staging}' (got '$source')" >&2
      exit 1
    fi
    ;;
  "{release}")
    if [[ "$source" != "{staging}" ]]; then
      echo "steward: only '{staging}' may merge into '{release}' (got '$source')" >&2
      exit 1
    fi
    ;;
esac
exit 0
"#,
        integration = branches.integration,
        staging = branches.staging,
        release = branches.release,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_names_configured_branches() {
        let branches = BranchConfig {
            integration: "develop".into(),
            staging: "qa".into(),
            release: "prod".into(),
        };
        let hook = pre_merge_hook(&branches);
        assert!(hook.contains("\"qa\")"));
        assert!(hook.contains("'develop' or hotfix/*"));
        assert!(hook.contains("'qa' may merge into 'prod'"));
    }

    #[test]
    fn parse_worktree_porcelain() {
        let porcelain = "worktree /repo\nHEAD abc\nbranch refs/heads/dev\n\nworktree /repo-worktrees/auth\nHEAD def\nbranch refs/heads/dev-alice-auth\n\nworktree /repo-worktrees/detached\nHEAD 123\ndetached\n";
        let entries = parse_worktree_list(porcelain);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].branch.as_deref(), Some("dev"));
        assert_eq!(entries[1].path, PathBuf::from("/repo-worktrees/auth"));
        assert_eq!(entries[1].branch.as_deref(), Some("dev-alice-auth"));
        assert!(entries[2].branch.is_none());
    }
}
