use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use steward_core::git::Git;
use steward_core::spec::Spec;
use steward_core::worklog::WorkLog;
use steward_core::worktree::WorkContext;

#[derive(Subcommand)]
pub enum LogSubcommand {
    /// Record a work session on the active spec
    New {
        #[arg(required = true)]
        notes: Vec<String>,
        /// Author (default: your git identity)
        #[arg(long)]
        author: Option<String>,
    },
    /// List a spec's work logs, newest first
    List {
        /// Spec (default: the active worktree's spec)
        #[arg(long)]
        spec: Option<String>,
    },
}

pub fn run(ctx: &WorkContext, subcmd: LogSubcommand, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    match subcmd {
        LogSubcommand::New { notes, author } => {
            let spec = parent(ctx, None)?;
            let git = Git::new(root)?;
            let author = crate::cmd::username(&git, author.as_deref())?;
            let log = WorkLog::create(root, &spec, &author, &notes.join(" "))?;
            if json {
                print_json(&serde_json::json!({
                    "spec": spec.slug,
                    "author": log.author,
                    "created_at": log.created_at,
                    "path": log.path,
                }))?;
            } else {
                println!("Logged session for '{}' at {}", spec.slug, log.path.display());
            }
            Ok(())
        }
        LogSubcommand::List { spec } => {
            let spec = parent(ctx, spec.as_deref())?;
            let logs = WorkLog::list(root, &spec)?;
            if json {
                let items: Vec<_> = logs
                    .iter()
                    .map(|l| {
                        serde_json::json!({
                            "author": l.author,
                            "created_at": l.created_at,
                            "path": l.path,
                        })
                    })
                    .collect();
                return print_json(&items);
            }
            let rows: Vec<Vec<String>> = logs
                .iter()
                .map(|l| {
                    vec![
                        l.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        l.author.clone(),
                        l.body.lines().next().unwrap_or("").to_string(),
                    ]
                })
                .collect();
            print_table(&["CREATED", "AUTHOR", "FIRST LINE"], rows);
            Ok(())
        }
    }
}

fn parent(ctx: &WorkContext, explicit: Option<&str>) -> anyhow::Result<Spec> {
    let root = &ctx.main_repo;
    match explicit {
        Some(slug) => Ok(Spec::resolve(root, slug)?),
        None => {
            let slug = ctx
                .active_slug
                .as_deref()
                .context("not inside a spec worktree; pass --spec <slug>")?;
            Spec::load(root, slug)
                .with_context(|| format!("no spec record for worktree '{slug}'"))
        }
    }
}
