use anyhow::Context;
use std::path::{Path, PathBuf};
use steward_core::worktree::WorkContext;

/// Resolve where steward is being run from.
///
/// Priority:
/// 1. `--root` flag / `STEWARD_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` to the nearest checkout, resolving linked
///    worktrees back to the main repository
pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<WorkContext> {
    let start = match explicit {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    WorkContext::discover(&start)
        .with_context(|| format!("no git repository found from {}", start.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let ctx = resolve(Some(dir.path())).unwrap();
        assert_eq!(ctx.main_repo, dir.path());
        assert!(ctx.worktree.is_none());
    }

    #[test]
    fn missing_repository_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(resolve(Some(dir.path())).is_err());
    }
}
