use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn git_available() -> bool {
    which::which("git").is_ok()
}

fn sh(dir: &std::path::Path, args: &[&str]) {
    let out = std::process::Command::new(args[0])
        .args(&args[1..])
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn steward(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("steward").unwrap();
    cmd.current_dir(dir.path())
        .env("STEWARD_ROOT", dir.path())
        .env_remove("STEWARD_GITHUB_TOKEN")
        .env_remove("GITHUB_TOKEN");
    cmd
}

/// A repository with one commit on `main` and steward initialized.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let p = dir.path();
    sh(p, &["git", "init", "-q"]);
    sh(p, &["git", "config", "user.email", "alice@example.com"]);
    sh(p, &["git", "config", "user.name", "Alice Example"]);
    std::fs::write(p.join("README.md"), "# demo\n").unwrap();
    sh(p, &["git", "add", "."]);
    sh(p, &["git", "commit", "-q", "-m", "initial"]);
    sh(p, &["git", "branch", "-M", "main"]);
    steward(&dir).arg("init").assert().success();
    dir
}

// ---------------------------------------------------------------------------
// steward init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_store_and_pipeline_branches() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    assert!(dir.path().join(".steward").is_dir());
    assert!(dir.path().join(".steward/specs").is_dir());
    assert!(dir.path().join(".steward/config.yaml").exists());

    let out = std::process::Command::new("git")
        .args(["branch", "--list"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    let branches = String::from_utf8_lossy(&out.stdout).to_string();
    assert!(branches.contains("dev"));
    assert!(branches.contains("test"));
    assert!(branches.contains("main"));
}

#[test]
fn init_is_idempotent() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir).arg("init").assert().success();
}

#[test]
fn init_outside_a_repository_fails() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    steward(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no git repository"));
}

// ---------------------------------------------------------------------------
// steward spec new / list / show
// ---------------------------------------------------------------------------

#[test]
fn spec_new_and_list() {
    if !git_available() {
        return;
    }
    let dir = fixture();

    steward(&dir)
        .args(["spec", "new", "Add", "rate", "limiting"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add_rate_limiting"));

    steward(&dir)
        .args(["spec", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add_rate_limiting"))
        .stdout(predicate::str::contains("todo"));
}

#[test]
fn spec_new_duplicate_title_fails() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Caching"])
        .assert()
        .success();
    steward(&dir)
        .args(["spec", "new", "Caching"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("caching"));
}

#[test]
fn spec_show_resolves_prefix() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Add rate limiting"])
        .assert()
        .success();

    steward(&dir)
        .args(["spec", "show", "add_rate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Add rate limiting"));
}

#[test]
fn spec_show_ambiguous_prefix_fails_with_candidates() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Auth login"])
        .assert()
        .success();
    steward(&dir)
        .args(["spec", "new", "Auth logout"])
        .assert()
        .success();

    steward(&dir)
        .args(["spec", "show", "auth"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("auth_login"))
        .stderr(predicate::str::contains("auth_logout"));
}

#[test]
fn spec_list_json_output() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Search index"])
        .assert()
        .success();

    let out = steward(&dir)
        .args(["--json", "spec", "list"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v[0]["slug"], "search_index");
    assert_eq!(v[0]["status"], "todo");
}

// ---------------------------------------------------------------------------
// steward spec assign (offline paths)
// ---------------------------------------------------------------------------

#[test]
fn assign_without_issue_points_at_sync() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Metrics"])
        .assert()
        .success();

    steward(&dir)
        .args(["spec", "assign", "metrics"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("steward sync"));
}

// ---------------------------------------------------------------------------
// steward task
// ---------------------------------------------------------------------------

#[test]
fn task_lifecycle_two_phase_completion() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Billing"])
        .assert()
        .success();

    steward(&dir)
        .args(["task", "new", "--spec", "billing", "Wire up invoices"])
        .assert()
        .success()
        .stdout(predicate::str::contains("01"));

    // Propose first: the task stays open with pending notes.
    steward(&dir)
        .args([
            "task", "complete", "--spec", "billing", "wire_up_invoices", "done", "and", "tested",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("--accept"));

    steward(&dir)
        .args(["task", "list", "--spec", "billing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending"));

    steward(&dir)
        .args([
            "task", "complete", "--spec", "billing", "wire_up_invoices", "--accept",
        ])
        .assert()
        .success();

    steward(&dir)
        .args(["task", "list", "--spec", "billing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed"));
}

#[test]
fn task_accept_without_proposal_fails() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Billing"])
        .assert()
        .success();
    steward(&dir)
        .args(["task", "new", "--spec", "billing", "Wire up invoices"])
        .assert()
        .success();

    steward(&dir)
        .args([
            "task", "complete", "--spec", "billing", "wire_up_invoices", "--accept",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("propose"));
}

#[test]
fn task_amend_reopens_completed_task() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Billing"])
        .assert()
        .success();
    steward(&dir)
        .args(["task", "new", "--spec", "billing", "Invoices"])
        .assert()
        .success();
    steward(&dir)
        .args(["task", "complete", "--spec", "billing", "invoices", "done"])
        .assert()
        .success();
    steward(&dir)
        .args(["task", "complete", "--spec", "billing", "invoices", "--accept"])
        .assert()
        .success();

    steward(&dir)
        .args([
            "task", "amend", "--spec", "billing", "invoices", "edge", "case", "missed",
        ])
        .assert()
        .success();

    steward(&dir)
        .args(["task", "list", "--spec", "billing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("todo"));
}

#[test]
fn task_seq_is_not_reused_after_delete() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Billing"])
        .assert()
        .success();
    steward(&dir)
        .args(["task", "new", "--spec", "billing", "First"])
        .assert()
        .success();
    steward(&dir)
        .args(["task", "new", "--spec", "billing", "Second"])
        .assert()
        .success();
    steward(&dir)
        .args(["task", "delete", "--spec", "billing", "first"])
        .assert()
        .success();

    steward(&dir)
        .args(["task", "new", "--spec", "billing", "Third"])
        .assert()
        .success()
        .stdout(predicate::str::contains("03"));
}

#[test]
fn task_outside_worktree_requires_spec_flag() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["task", "new", "Orphan task"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--spec"));
}

// ---------------------------------------------------------------------------
// steward log
// ---------------------------------------------------------------------------

#[test]
fn log_list_shows_sessions() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Billing"])
        .assert()
        .success();

    // No sessions yet; the listing is empty but succeeds.
    steward(&dir)
        .args(["log", "list", "--spec", "billing"])
        .assert()
        .success();
}

#[test]
fn log_new_outside_worktree_fails() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["log", "new", "some", "notes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("worktree"));
}

// ---------------------------------------------------------------------------
// steward status
// ---------------------------------------------------------------------------

#[test]
fn status_groups_specs() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Alpha work"])
        .assert()
        .success();
    steward(&dir)
        .args(["spec", "new", "Beta work"])
        .assert()
        .success();

    steward(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha_work"))
        .stdout(predicate::str::contains("beta_work"))
        .stdout(predicate::str::contains("todo"));
}

#[test]
fn status_json_has_counts() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["spec", "new", "Alpha work"])
        .assert()
        .success();

    let out = steward(&dir)
        .args(["--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["completed"], 0);
    assert_eq!(v["abandoned"], 0);
    assert_eq!(v["by_status"]["todo"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// steward promote
// ---------------------------------------------------------------------------

#[test]
fn promote_test_fast_forwards_staging() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    let p = dir.path();
    sh(p, &["git", "checkout", "-q", "dev"]);
    std::fs::write(p.join("feature.txt"), "work\n").unwrap();
    sh(p, &["git", "add", "."]);
    sh(p, &["git", "commit", "-q", "-m", "work"]);

    steward(&dir).args(["promote", "test"]).assert().success();

    let dev = std::process::Command::new("git")
        .args(["rev-parse", "dev"])
        .current_dir(p)
        .output()
        .unwrap();
    let test = std::process::Command::new("git")
        .args(["rev-parse", "test"])
        .current_dir(p)
        .output()
        .unwrap();
    assert_eq!(dev.stdout, test.stdout);
}

#[test]
fn promote_main_without_force_is_a_dry_run() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    let p = dir.path();
    sh(p, &["git", "checkout", "-q", "test"]);

    steward(&dir)
        .args(["promote", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn promote_unknown_stage_fails() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["promote", "prod"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("prod"));
}

#[test]
fn promote_from_wrong_branch_fails() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    // Still on main; promoting to test requires being on dev.
    steward(&dir)
        .args(["promote", "test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dev"));
}

// ---------------------------------------------------------------------------
// steward cleanup
// ---------------------------------------------------------------------------

#[test]
fn cleanup_with_nothing_to_do() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .args(["cleanup", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to clean up"));
}

// ---------------------------------------------------------------------------
// steward sync (offline)
// ---------------------------------------------------------------------------

#[test]
fn sync_without_remote_fails_cleanly() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    steward(&dir)
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("origin"));
}

// ---------------------------------------------------------------------------
// steward spec complete (gates)
// ---------------------------------------------------------------------------

#[test]
fn complete_is_blocked_by_open_tasks_and_names_them() {
    if !git_available() {
        return;
    }
    // The repo lives in a subdirectory so the sibling worktrees directory
    // stays inside the tempdir.
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    sh(&repo, &["git", "init", "-q"]);
    sh(&repo, &["git", "config", "user.email", "alice@example.com"]);
    sh(&repo, &["git", "config", "user.name", "Alice Example"]);
    std::fs::write(repo.join("README.md"), "# demo\n").unwrap();
    sh(&repo, &["git", "add", "."]);
    sh(&repo, &["git", "commit", "-q", "-m", "initial"]);
    sh(&repo, &["git", "branch", "-M", "main"]);

    let steward_at = |cwd: &std::path::Path| {
        let mut cmd = Command::cargo_bin("steward").unwrap();
        cmd.current_dir(cwd)
            .env("STEWARD_ROOT", &repo)
            .env_remove("STEWARD_GITHUB_TOKEN")
            .env_remove("GITHUB_TOKEN");
        cmd
    };
    steward_at(&repo).arg("init").assert().success();
    steward_at(&repo)
        .args(["spec", "new", "Payments"])
        .assert()
        .success();
    steward_at(&repo)
        .args(["task", "new", "--spec", "payments", "Wire in limits"])
        .assert()
        .success();

    let wt = dir.path().join("repo-worktrees").join("payments");
    sh(
        &repo,
        &[
            "git",
            "worktree",
            "add",
            "-b",
            "dev-alice_example-payments",
            wt.to_str().unwrap(),
            "dev",
        ],
    );

    // Inside the worktree with no explicit root: the open task blocks
    // completion before anything touches GitHub.
    let mut cmd = Command::cargo_bin("steward").unwrap();
    cmd.current_dir(&wt)
        .env_remove("STEWARD_ROOT")
        .env_remove("STEWARD_GITHUB_TOKEN")
        .env_remove("GITHUB_TOKEN")
        .args(["spec", "complete", "--no-log"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("open tasks remain"))
        .stderr(predicate::str::contains("Wire in limits"));
}

// ---------------------------------------------------------------------------
// steward spec abandon (GitHub side)
// ---------------------------------------------------------------------------

#[test]
fn abandon_comments_on_and_closes_the_open_completion_pr() {
    if !git_available() {
        return;
    }
    let dir = fixture();
    let p = dir.path();
    // The fetch URL names the GitHub repo; pushes land in a local bare repo.
    let bare = TempDir::new().unwrap();
    sh(bare.path(), &["git", "init", "-q", "--bare"]);
    sh(p, &["git", "remote", "add", "origin", "https://github.com/acme/widgets.git"]);
    sh(
        p,
        &[
            "git",
            "config",
            "remote.origin.pushurl",
            bare.path().to_str().unwrap(),
        ],
    );

    steward(&dir)
        .args(["spec", "new", "Payments"])
        .assert()
        .success();
    {
        use steward_core::spec::Spec;
        let mut spec = Spec::load(p, "payments").unwrap();
        spec.assign("alice", "dev-alice-payments").unwrap();
        spec.mark_merge_ready(Some("https://github.com/acme/widgets/pull/42".to_string()))
            .unwrap();
        spec.meta.issue_id = Some(7);
        spec.save(p).unwrap();
    }

    let mut server = mockito::Server::new();
    let _not_merged = server
        .mock("GET", "/repos/acme/widgets/pulls/42/merge")
        .with_status(404)
        .with_body(r#"{"message": "Not Found"}"#)
        .create();
    let _pr = server
        .mock("GET", "/repos/acme/widgets/pulls/42")
        .with_status(200)
        .with_body(
            r#"{"number": 42, "title": "[Complete]: Payments", "state": "open",
                "html_url": "https://github.com/acme/widgets/pull/42",
                "head": {"ref": "dev-alice-payments", "sha": "aaa"},
                "base": {"ref": "dev", "sha": "bbb"},
                "merged_at": null, "mergeable": true, "mergeable_state": "clean"}"#,
        )
        .create();
    let pr_comment = server
        .mock("POST", "/repos/acme/widgets/issues/42/comments")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"body": "Abandoned: superseded"}"#.to_string(),
        ))
        .with_status(201)
        .with_body("{}")
        .expect(1)
        .create();
    let pr_close = server
        .mock("PATCH", "/repos/acme/widgets/pulls/42")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"state": "closed"}"#.to_string(),
        ))
        .with_status(200)
        .with_body(
            r#"{"number": 42, "title": "[Complete]: Payments", "state": "closed",
                "html_url": "https://github.com/acme/widgets/pull/42",
                "head": {"ref": "dev-alice-payments", "sha": "aaa"},
                "base": {"ref": "dev", "sha": "bbb"},
                "merged_at": null, "mergeable": null, "mergeable_state": null}"#,
        )
        .expect(1)
        .create();
    let _issue_comment = server
        .mock("POST", "/repos/acme/widgets/issues/7/comments")
        .with_status(201)
        .with_body("{}")
        .create();
    let _issue_close = server
        .mock("PATCH", "/repos/acme/widgets/issues/7")
        .with_status(200)
        .with_body(
            r#"{"number": 7, "title": "Payments", "body": null, "state": "closed",
                "html_url": "https://github.com/acme/widgets/issues/7",
                "labels": [], "assignees": [], "pull_request": null}"#,
        )
        .create();
    let _branch_gone = server
        .mock("DELETE", "/repos/acme/widgets/git/refs/heads/dev-alice-payments")
        .with_status(404)
        .with_body(r#"{"message": "Reference does not exist"}"#)
        .create();

    steward(&dir)
        .env("STEWARD_GITHUB_TOKEN", "token")
        .env("STEWARD_GITHUB_API", server.url())
        .args(["spec", "abandon", "payments", "--reason", "superseded"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Abandoned"));

    pr_comment.assert();
    pr_close.assert();
    assert!(p.join(".steward/specs/abandoned/payments/spec.md").exists());
}
