use crate::output::print_json;
use anyhow::Context;
use steward_core::cleanup::{self, CleanupReport};
use steward_core::config::Config;
use steward_core::git::Git;
use steward_core::report::Outcome;
use steward_core::worktree::WorkContext;

pub fn run(ctx: &WorkContext, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let cfg = Config::load(root).context("failed to load config")?;
    let git = Git::new(root)?;
    let gh = match crate::cmd::github(&git) {
        Ok(gh) => Some(gh),
        Err(e) => {
            tracing::warn!(error = %e, "no GitHub access; remote branches are left alone");
            None
        }
    };

    let report = cleanup::run(root, &git, gh.as_ref(), &cfg, dry_run)?;
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

pub fn print_report(report: &CleanupReport) {
    match report.outcome {
        Some(Outcome::DryRun) => println!("Cleanup plan (dry run):"),
        Some(Outcome::NothingToDo) | None => {
            println!("Nothing to clean up");
            if report.skipped.is_empty() && report.warnings.is_empty() {
                return;
            }
        }
        Some(Outcome::Success) => println!("Cleaned up:"),
    }
    for branch in &report.deleted_local {
        println!("  deleted local branch {branch}");
    }
    for branch in &report.deleted_remote {
        println!("  deleted remote branch {branch}");
    }
    for path in &report.removed_worktrees {
        println!("  removed worktree {path}");
    }
    for skipped in &report.skipped {
        println!("  kept: {skipped}");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
}
