use crate::output::print_json;
use anyhow::Context;
use steward_core::config::Config;
use steward_core::snapshot::Snapshot;
use steward_core::worktree::WorkContext;

pub fn run(ctx: &WorkContext, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let cfg = Config::load(root).context("failed to load config")?;
    let snapshot = Snapshot::capture(root, &cfg.project, ctx)?;

    if json {
        return print_json(&snapshot);
    }

    println!("Project: {}", snapshot.project);
    if let Some(active) = &snapshot.active {
        println!("Active spec: {} ({})", active.slug, active.status);
    }
    if snapshot.by_status.is_empty() {
        println!("No active specs; start one with 'steward spec new <title>'");
    }
    for (status, specs) in &snapshot.by_status {
        println!("\n{status}:");
        for spec in specs {
            let mut line = format!("  {}  {}", spec.slug, spec.title);
            if let Some(user) = &spec.assigned_to {
                line.push_str(&format!("  [{user}]"));
            }
            println!("{line}");
        }
    }
    println!(
        "\n{} completed, {} abandoned",
        snapshot.completed, snapshot.abandoned
    );
    Ok(())
}
