//! Worktree isolation: one linked worktree per in-flight spec.
//!
//! Worktrees live outside the main checkout, under a sibling directory named
//! `<repo>-worktrees/`, so per-spec builds never collide with the main tree
//! or with each other.

use crate::config::Config;
use crate::error::{Result, StewardError};
use crate::git::Git;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Branch naming
// ---------------------------------------------------------------------------

/// Feature branch for a spec: `<integration>-<user>-<slug>`.
///
/// User and spec slugs only contain `[a-z0-9_]`, so the two hyphens are
/// unambiguous separators.
pub fn feature_branch(integration: &str, user: &str, slug: &str) -> String {
    format!("{integration}-{user}-{slug}")
}

pub fn feature_branch_prefix(integration: &str) -> String {
    format!("{integration}-")
}

/// Recover `(user, slug)` from a feature branch name, if it is one.
pub fn parse_feature_branch(integration: &str, branch: &str) -> Option<(String, String)> {
    let rest = branch.strip_prefix(&feature_branch_prefix(integration))?;
    let (user, slug) = rest.split_once('-')?;
    if user.is_empty() || slug.is_empty() {
        return None;
    }
    Some((user.to_string(), slug.to_string()))
}

// ---------------------------------------------------------------------------
// Worktree paths
// ---------------------------------------------------------------------------

pub fn base_dir(main_repo: &Path) -> PathBuf {
    let name = main_repo
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    main_repo
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}-worktrees"))
}

pub fn worktree_path(main_repo: &Path, slug: &str) -> PathBuf {
    base_dir(main_repo).join(slug)
}

/// A linked worktree has a `.git` file pointing back at the main repository;
/// the main checkout has a `.git` directory.
pub fn is_linked_worktree(dir: &Path) -> bool {
    dir.join(".git").is_file()
}

/// Resolve the main repository from inside a linked worktree by following
/// the `gitdir:` pointer in its `.git` file.
pub fn main_repo_of(worktree: &Path) -> Result<PathBuf> {
    let pointer = std::fs::read_to_string(worktree.join(".git"))?;
    let gitdir = pointer
        .strip_prefix("gitdir:")
        .map(str::trim)
        .ok_or_else(|| StewardError::Git {
            op: "worktree".to_string(),
            detail: format!("malformed .git file in {}", worktree.display()),
        })?;
    // gitdir looks like <main>/.git/worktrees/<name>
    let mut path = PathBuf::from(gitdir);
    while let Some(name) = path.file_name() {
        if name == ".git" {
            return Ok(path.parent().unwrap_or(Path::new("/")).to_path_buf());
        }
        path = match path.parent() {
            Some(p) => p.to_path_buf(),
            None => break,
        };
    }
    Err(StewardError::Git {
        op: "worktree".to_string(),
        detail: format!("cannot locate main repository from {}", worktree.display()),
    })
}

// ---------------------------------------------------------------------------
// WorkContext
// ---------------------------------------------------------------------------

/// Where a command was invoked: the main repository, and if the invocation
/// came from inside a spec worktree, which one.
#[derive(Debug, Clone)]
pub struct WorkContext {
    pub main_repo: PathBuf,
    pub worktree: Option<PathBuf>,
    pub active_slug: Option<String>,
}

impl WorkContext {
    /// Walk up from `start` to the nearest checkout root, then resolve the
    /// main repository if that root is a linked worktree.
    pub fn discover(start: &Path) -> Result<WorkContext> {
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(".git").exists() {
                break;
            }
            dir = match dir.parent() {
                Some(p) => p.to_path_buf(),
                None => return Err(StewardError::NotInitialized),
            };
        }
        if is_linked_worktree(&dir) {
            let main_repo = main_repo_of(&dir)?;
            let active_slug = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            Ok(WorkContext {
                main_repo,
                worktree: Some(dir),
                active_slug,
            })
        } else {
            Ok(WorkContext {
                main_repo: dir,
                worktree: None,
                active_slug: None,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Create / remove
// ---------------------------------------------------------------------------

/// Create the worktree for a spec, reusing the branch if it already exists.
/// Existing worktrees are returned as-is, so re-running assignment is safe.
pub fn create(git: &Git, cfg: &Config, main_repo: &Path, slug: &str, branch: &str) -> Result<PathBuf> {
    let path = worktree_path(main_repo, slug);
    if path.exists() {
        return Ok(path);
    }
    crate::io::ensure_dir(&base_dir(main_repo))?;
    if git.branch_exists(branch) {
        git.worktree_add(&path, branch)?;
    } else if git.remote_branch_exists(branch) {
        git.worktree_add_new_branch(&path, branch, &format!("origin/{branch}"))?;
    } else {
        git.worktree_add_new_branch(&path, branch, &cfg.branches.integration)?;
    }
    link_configured_paths(cfg, main_repo, &path);
    Ok(path)
}

/// Symlink configured untracked paths (.env files and the like) from the
/// main checkout into the new worktree. Missing sources are skipped.
#[cfg(unix)]
fn link_configured_paths(cfg: &Config, main_repo: &Path, worktree: &Path) {
    for rel in &cfg.worktree.symlink_paths {
        let source = main_repo.join(rel);
        let target = worktree.join(rel);
        if !source.exists() || target.exists() {
            continue;
        }
        if let Some(parent) = target.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::os::unix::fs::symlink(&source, &target) {
            tracing::warn!(path = %rel, error = %e, "failed to link path into worktree");
        }
    }
}

#[cfg(not(unix))]
fn link_configured_paths(_cfg: &Config, _main_repo: &Path, _worktree: &Path) {}

/// Remove a spec's worktree if present. Returns whether one was removed.
pub fn remove(git: &Git, main_repo: &Path, slug: &str) -> Result<bool> {
    let path = worktree_path(main_repo, slug);
    if !path.exists() {
        return Ok(false);
    }
    git.worktree_remove(&path, true)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
