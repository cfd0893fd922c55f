use crate::output::print_json;
use anyhow::Context;
use steward_core::config::Config;
use steward_core::git::Git;
use steward_core::reconcile::{Reconciler, SyncReport};
use steward_core::worktree::WorkContext;
use steward_core::{cleanup, report::Outcome};

pub fn run(ctx: &WorkContext, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let cfg = Config::load(root).context("failed to load config")?;
    let git = Git::new(root)?;
    let gh = crate::cmd::github(&git)?;

    let report = Reconciler {
        root: root.as_path(),
        git: &git,
        gh: &gh,
        cfg: &cfg,
    }
    .run(dry_run)?;

    // Sync finishes by sweeping branches and worktrees of completed work.
    let swept = cleanup::run(root, &git, Some(&gh), &cfg, dry_run)?;

    if json {
        return print_json(&serde_json::json!({
            "sync": report,
            "cleanup": swept,
        }));
    }
    print_report(&report);
    crate::cmd::cleanup::print_report(&swept);
    Ok(())
}

fn print_report(report: &SyncReport) {
    match report.outcome {
        Outcome::DryRun => {
            if !report.plan.has_changes() && report.plan.conflicts.is_empty() {
                println!("Nothing to sync");
            } else {
                println!("Plan (dry run):");
            }
        }
        Outcome::NothingToDo => println!("Everything in sync"),
        Outcome::Success => println!("Synced"),
    }
    for action in &report.plan.actions {
        println!("  {:?} {}: {}", action.kind, action.slug, action.detail);
    }
    for applied in &report.applied {
        println!("  applied: {applied}");
    }
    for conflict in &report.plan.conflicts {
        println!(
            "  CONFLICT {} (issue #{}): {}",
            conflict.slug, conflict.issue, conflict.detail
        );
    }
    for drift in &report.plan.drift {
        println!("  drift: {drift}");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    if !report.plan.conflicts.is_empty() {
        println!("Conflicts are never auto-resolved; edit the spec or the issue and re-run");
    }
}
