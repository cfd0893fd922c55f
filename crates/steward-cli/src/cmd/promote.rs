use crate::output::print_json;
use anyhow::{bail, Context};
use steward_core::config::Config;
use steward_core::git::Git;
use steward_core::promote::{self, Stage};
use steward_core::report::Outcome;
use steward_core::worktree::WorkContext;

pub fn run(
    ctx: &WorkContext,
    stage: &str,
    dry_run: bool,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let cfg = Config::load(root).context("failed to load config")?;
    let git = Git::new(root)?;

    let stage = match stage {
        s if s == cfg.branches.staging => Stage::Staging,
        s if s == cfg.branches.release => Stage::Release,
        other => bail!(
            "unknown promotion target '{other}'; use '{}' or '{}'",
            cfg.branches.staging,
            cfg.branches.release
        ),
    };

    // A release promotion is the production gate and only runs with --force.
    let gated = matches!(stage, Stage::Release) && !force;
    let execute = !dry_run && !gated;

    let report = promote::promote(&git, &cfg, stage, execute)?;
    if json {
        return print_json(&report);
    }
    match report.outcome {
        Outcome::DryRun => {
            println!("Plan (dry run):");
            for step in &report.steps {
                println!("  {step}");
            }
            if gated && !dry_run {
                println!("Pass --force to promote to '{}'", cfg.branches.release);
            }
        }
        Outcome::NothingToDo => println!("{}", report.message),
        Outcome::Success => {
            for step in &report.steps {
                println!("  {step}");
            }
            println!("{}", report.message);
        }
    }
    Ok(())
}
