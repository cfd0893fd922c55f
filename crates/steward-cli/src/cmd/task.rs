use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use steward_core::spec::Spec;
use steward_core::task::Task;
use steward_core::worktree::WorkContext;

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Add a task to a spec
    New {
        /// Parent spec (default: the active worktree's spec)
        #[arg(long)]
        spec: Option<String>,
        title: String,
        /// Longer description for the task body
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List a spec's tasks
    List {
        #[arg(long)]
        spec: Option<String>,
    },
    /// Propose completion notes, then accept them with --accept
    Complete {
        #[arg(long)]
        spec: Option<String>,
        /// Task slug or title fragment
        task: String,
        /// Completion notes
        notes: Vec<String>,
        /// Accept the pending completion
        #[arg(long)]
        accept: bool,
    },
    /// Reopen a completed task with amendment notes
    Amend {
        #[arg(long)]
        spec: Option<String>,
        task: String,
        #[arg(required = true)]
        notes: Vec<String>,
    },
    /// Retitle a task (its position is kept)
    Rename {
        #[arg(long)]
        spec: Option<String>,
        task: String,
        title: String,
    },
    /// Delete a task record
    Delete {
        #[arg(long)]
        spec: Option<String>,
        task: String,
    },
}

pub fn run(ctx: &WorkContext, subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    match subcmd {
        TaskSubcommand::New {
            spec,
            title,
            description,
        } => {
            let spec = parent(ctx, spec.as_deref())?;
            let task = Task::create(root, &spec, &title, &description)?;
            if json {
                print_json(&serde_json::json!({
                    "spec": spec.slug,
                    "seq": task.seq,
                    "slug": task.slug,
                    "title": task.meta.title,
                }))?;
            } else {
                println!("Added task {:02} '{}' to '{}'", task.seq, task.slug, spec.slug);
            }
            Ok(())
        }
        TaskSubcommand::List { spec } => {
            let spec = parent(ctx, spec.as_deref())?;
            let tasks = Task::list(root, &spec)?;
            if json {
                let items: Vec<_> = tasks
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "seq": t.seq,
                            "slug": t.slug,
                            "title": t.meta.title,
                            "status": t.meta.status,
                            "pending": t.meta.pending_completion.is_some(),
                        })
                    })
                    .collect();
                return print_json(&items);
            }
            let rows: Vec<Vec<String>> = tasks
                .iter()
                .map(|t| {
                    let status = if t.meta.pending_completion.is_some() {
                        "pending".to_string()
                    } else {
                        t.meta.status.to_string()
                    };
                    vec![format!("{:02}", t.seq), t.slug.clone(), status, t.meta.title.clone()]
                })
                .collect();
            print_table(&["SEQ", "SLUG", "STATUS", "TITLE"], rows);
            Ok(())
        }
        TaskSubcommand::Complete {
            spec,
            task,
            notes,
            accept,
        } => {
            let spec = parent(ctx, spec.as_deref())?;
            let mut found = Task::find(root, &spec, &task)?;
            if accept {
                found.accept_completion()?;
                found.save(root, &spec)?;
                if json {
                    print_json(&serde_json::json!({
                        "spec": spec.slug,
                        "slug": found.slug,
                        "status": found.meta.status,
                    }))?;
                } else {
                    println!("Completed task '{}' in '{}'", found.slug, spec.slug);
                }
            } else {
                if notes.is_empty() {
                    bail!("completion notes are required; describe what was done");
                }
                found.propose_completion(&notes.join(" "))?;
                found.save(root, &spec)?;
                if json {
                    print_json(&serde_json::json!({
                        "spec": spec.slug,
                        "slug": found.slug,
                        "status": found.meta.status,
                        "pending": true,
                    }))?;
                } else {
                    println!("Proposed completion for '{}'", found.slug);
                    println!(
                        "Review the notes, then run 'steward task complete {} --accept'",
                        found.slug
                    );
                }
            }
            Ok(())
        }
        TaskSubcommand::Amend { spec, task, notes } => {
            let spec = parent(ctx, spec.as_deref())?;
            let mut found = Task::find(root, &spec, &task)?;
            found.amend(&notes.join(" "))?;
            found.save(root, &spec)?;
            if json {
                print_json(&serde_json::json!({
                    "spec": spec.slug,
                    "slug": found.slug,
                    "status": found.meta.status,
                }))?;
            } else {
                println!("Reopened task '{}' with amendment", found.slug);
            }
            Ok(())
        }
        TaskSubcommand::Rename { spec, task, title } => {
            let spec = parent(ctx, spec.as_deref())?;
            let mut found = Task::find(root, &spec, &task)?;
            found.rename(root, &spec, &title)?;
            if json {
                print_json(&serde_json::json!({
                    "spec": spec.slug,
                    "slug": found.slug,
                    "title": found.meta.title,
                }))?;
            } else {
                println!("Retitled task '{}' to \"{}\"", found.slug, found.meta.title);
            }
            Ok(())
        }
        TaskSubcommand::Delete { spec, task } => {
            let spec = parent(ctx, spec.as_deref())?;
            let found = Task::find(root, &spec, &task)?;
            found.delete(root, &spec)?;
            if json {
                print_json(&serde_json::json!({
                    "spec": spec.slug,
                    "slug": found.slug,
                    "deleted": true,
                }))?;
            } else {
                println!("Deleted task '{}' from '{}'", found.slug, spec.slug);
            }
            Ok(())
        }
    }
}

/// The spec a task command acts on: explicit --spec, else the worktree's spec.
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
