//! End-to-end tests against real git repositories.
//!
//! Every test builds a throwaway repo with the three pipeline branches and
//! drives the public API the way the CLI does. Skipped silently when git is
//! not on the PATH.

use steward_core::cleanup;
use steward_core::config::Config;
use steward_core::git::{Git, MergeOutcome};
use steward_core::promote::{promote, Stage};
use steward_core::report::Outcome;
use steward_core::spec::Spec;
use steward_core::types::SpecStatus;
use steward_core::worktree;
use steward_core::StewardError;

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn git_available() -> bool {
    which::which("git").is_ok()
}

fn sh(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        status.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&status.stderr)
    );
}

/// A repo with one commit and the dev/test/main pipeline branches, checked
/// out on dev.
fn fixture() -> (TempDir, Git) {
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    sh(&repo, &["init"]);
    sh(&repo, &["config", "user.email", "test@example.com"]);
    sh(&repo, &["config", "user.name", "Test"]);
    std::fs::write(repo.join("README.md"), "# demo\n").unwrap();
    sh(&repo, &["add", "."]);
    sh(&repo, &["commit", "-m", "initial"]);
    sh(&repo, &["branch", "-M", "main"]);
    sh(&repo, &["branch", "test"]);
    sh(&repo, &["checkout", "-b", "dev"]);
    let git = Git::new(&repo).unwrap();
    (dir, git)
}

fn commit_file(git: &Git, name: &str) {
    std::fs::write(git.dir().join(name), name).unwrap();
    sh(git.dir(), &["add", "."]);
    sh(git.dir(), &["commit", "-m", name]);
}

#[test]
fn promotion_fast_forwards_and_is_idempotent() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");
    commit_file(&git, "feature.txt");

    let report = promote(&git, &cfg, Stage::Staging, true).unwrap();
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(git.head_sha("dev").unwrap(), git.head_sha("test").unwrap());
    assert_eq!(git.current_branch().unwrap(), "dev");

    let again = promote(&git, &cfg, Stage::Staging, true).unwrap();
    assert_eq!(again.outcome, Outcome::NothingToDo);
}

#[test]
fn release_promotion_only_moves_what_staging_has() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");
    commit_file(&git, "one.txt");
    promote(&git, &cfg, Stage::Staging, true).unwrap();
    let staged = git.head_sha("test").unwrap();
    commit_file(&git, "two.txt");

    git.checkout("test").unwrap();
    let report = promote(&git, &cfg, Stage::Release, true).unwrap();
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(git.head_sha("main").unwrap(), staged);
    assert_ne!(git.head_sha("main").unwrap(), git.head_sha("dev").unwrap());
}

#[test]
fn promotion_preconditions() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");

    std::fs::write(git.dir().join("dirty.txt"), "x").unwrap();
    assert!(matches!(
        promote(&git, &cfg, Stage::Staging, true),
        Err(StewardError::Precondition(_))
    ));
    std::fs::remove_file(git.dir().join("dirty.txt")).unwrap();

    git.checkout("main").unwrap();
    assert!(matches!(
        promote(&git, &cfg, Stage::Staging, true),
        Err(StewardError::Precondition(_))
    ));
}

#[test]
fn promotion_refuses_diverged_target() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");

    // A commit directly on test makes dev -> test no longer a fast-forward.
    git.checkout("test").unwrap();
    commit_file(&git, "rogue.txt");
    git.checkout("dev").unwrap();
    commit_file(&git, "feature.txt");

    let err = promote(&git, &cfg, Stage::Staging, true).unwrap_err();
    assert!(matches!(err, StewardError::Conflict { .. }));
    // Failure still lands back on the source branch.
    assert_eq!(git.current_branch().unwrap(), "dev");
}

#[test]
fn dry_run_plans_without_moving_refs() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");
    commit_file(&git, "feature.txt");
    let before = git.head_sha("test").unwrap();

    let report = promote(&git, &cfg, Stage::Staging, false).unwrap();
    assert_eq!(report.outcome, Outcome::DryRun);
    assert!(!report.steps.is_empty());
    assert_eq!(git.head_sha("test").unwrap(), before);
}

#[test]
fn worktree_create_is_idempotent_and_remove_works() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");
    let main_repo = git.dir().to_path_buf();

    let path = worktree::create(&git, &cfg, &main_repo, "auth", "dev-alice-auth").unwrap();
    assert!(path.join(".git").is_file());
    assert!(git.branch_exists("dev-alice-auth"));

    let again = worktree::create(&git, &cfg, &main_repo, "auth", "dev-alice-auth").unwrap();
    assert_eq!(path, again);

    assert!(worktree::remove(&git, &main_repo, "auth").unwrap());
    assert!(!path.exists());
    assert!(!worktree::remove(&git, &main_repo, "auth").unwrap());
}

#[test]
fn worktree_links_configured_paths() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let mut cfg = Config::new("demo");
    cfg.worktree.symlink_paths.push(".env".to_string());
    let main_repo = git.dir().to_path_buf();
    std::fs::write(main_repo.join(".env"), "SECRET=1").unwrap();

    let path = worktree::create(&git, &cfg, &main_repo, "auth", "dev-alice-auth").unwrap();
    assert_eq!(
        std::fs::read_to_string(path.join(".env")).unwrap(),
        "SECRET=1"
    );
}

#[test]
fn cleanup_deletes_only_terminal_spec_branches() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");
    let root = git.dir().to_path_buf();

    // Terminal spec with a leftover branch.
    let mut done = Spec::create(&root, "done_work", "").unwrap();
    done.assign("alice", "dev-alice-done_work").unwrap();
    done.mark_merge_ready(None).unwrap();
    done.move_to_terminal(&root, SpecStatus::Completed).unwrap();
    git.create_branch("dev-alice-done_work", "dev").unwrap();

    // Active spec with a branch and worktree.
    let mut live = Spec::create(&root, "live_work", "").unwrap();
    live.assign("alice", "dev-alice-live_work").unwrap();
    live.save(&root).unwrap();
    worktree::create(&git, &cfg, &root, "live_work", "dev-alice-live_work").unwrap();

    // Branch with no spec at all.
    git.create_branch("dev-alice-mystery", "dev").unwrap();

    let report = cleanup::run(&root, &git, None, &cfg, false).unwrap();
    assert_eq!(report.deleted_local, vec!["dev-alice-done_work".to_string()]);
    assert!(!git.branch_exists("dev-alice-done_work"));
    assert!(git.branch_exists("dev-alice-live_work"));
    assert!(git.branch_exists("dev-alice-mystery"));
    assert!(report.skipped.iter().any(|s| s.contains("mystery")));
    assert!(worktree::worktree_path(&root, "live_work").exists());
}

#[test]
fn cleanup_dry_run_touches_nothing() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");
    let root = git.dir().to_path_buf();

    let mut done = Spec::create(&root, "done_work", "").unwrap();
    done.assign("alice", "dev-alice-done_work").unwrap();
    done.mark_merge_ready(None).unwrap();
    done.move_to_terminal(&root, SpecStatus::Completed).unwrap();
    git.create_branch("dev-alice-done_work", "dev").unwrap();

    let report = cleanup::run(&root, &git, None, &cfg, true).unwrap();
    assert_eq!(report.outcome, Some(Outcome::DryRun));
    assert!(git.branch_exists("dev-alice-done_work"));
    assert!(report.deleted_local[0].contains("dry run"));
}

#[test]
fn merge_guard_hook_blocks_feature_into_staging() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    let cfg = Config::new("demo");
    git.install_merge_guard(&cfg.branches).unwrap();

    git.checkout("dev").unwrap();
    sh(git.dir(), &["checkout", "-b", "dev-alice-auth"]);
    commit_file(&git, "feature.txt");

    // Feature branch into dev is allowed.
    git.checkout("dev").unwrap();
    let out = Command::new("git")
        .args(["merge", "--no-ff", "-m", "merge feature", "dev-alice-auth"])
        .current_dir(git.dir())
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    // Feature branch straight into test is rejected by the hook.
    git.checkout("test").unwrap();
    let out = Command::new("git")
        .args(["merge", "--no-ff", "-m", "skip a stage", "dev-alice-auth"])
        .current_dir(git.dir())
        .output()
        .unwrap();
    assert!(!out.status.success());
    sh(git.dir(), &["merge", "--abort"]);
    git.checkout("dev").unwrap();
}

#[test]
fn merge_ff_only_reports_up_to_date() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();
    git.checkout("test").unwrap();
    assert_eq!(
        git.merge_ff_only("dev").unwrap(),
        MergeOutcome::AlreadyUpToDate
    );
    git.checkout("dev").unwrap();
}

#[test]
fn merge_outcome_detection_is_locale_independent() {
    if !git_available() {
        return;
    }
    // Git subprocesses run with LC_ALL=C, so a localized parent environment
    // must not change what the output matching sees.
    std::env::set_var("LANG", "es_ES.UTF-8");
    std::env::set_var("LC_MESSAGES", "es_ES.UTF-8");
    let (_dir, git) = fixture();
    git.checkout("test").unwrap();
    assert_eq!(
        git.merge_ff_only("dev").unwrap(),
        MergeOutcome::AlreadyUpToDate
    );
    git.checkout("dev").unwrap();
    std::env::remove_var("LANG");
    std::env::remove_var("LC_MESSAGES");
}

#[test]
fn branch_delete_escalates_only_when_unmerged() {
    if !git_available() {
        return;
    }
    let (_dir, git) = fixture();

    // Fully merged: plain -d is enough.
    git.create_branch("dev-alice-done", "HEAD").unwrap();
    git.delete_local_branch("dev-alice-done").unwrap();
    assert!(!git.branch_exists("dev-alice-done"));

    // Unmerged work: -d refuses, the forced delete takes over.
    sh(git.dir(), &["checkout", "-b", "dev-alice-wip"]);
    commit_file(&git, "wip.txt");
    git.checkout("dev").unwrap();
    git.delete_local_branch("dev-alice-wip").unwrap();
    assert!(!git.branch_exists("dev-alice-wip"));

    // Any other refusal is an error, not a forced delete. Deleting the
    // checked out branch is the easy way to get one.
    assert!(git.delete_local_branch("dev").is_err());
    assert!(git.branch_exists("dev"));
}
