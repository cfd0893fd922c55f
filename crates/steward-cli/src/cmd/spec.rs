use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use steward_core::config::Config;
use steward_core::git::Git;
use steward_core::github::{IssueUpdate, COMPLETE_MARKER};
use steward_core::paths::Partition;
use steward_core::reconcile::{local_portion, Reconciler};
use steward_core::spec::Spec;
use steward_core::task;
use steward_core::types::SpecStatus;
use steward_core::worklog;
use steward_core::worktree::{self, WorkContext};

#[derive(Subcommand)]
pub enum SpecSubcommand {
    /// Create a spec from a title
    New {
        #[arg(required = true)]
        title: Vec<String>,
    },
    /// List specs (active by default)
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<SpecStatus>,
        /// List completed specs
        #[arg(long)]
        completed: bool,
        /// List abandoned specs
        #[arg(long)]
        abandoned: bool,
    },
    /// Show one spec
    Show { slug: String },
    /// Take ownership: branch, worktree, in_progress
    Assign {
        slug: String,
        /// Assignee (default: your git identity)
        #[arg(long)]
        user: Option<String>,
    },
    /// Finish the active spec: push, open the completion PR, merge_ready
    Complete {
        /// Skip the work log recency check
        #[arg(long)]
        no_log: bool,
        /// Waive a named open task (repeatable)
        #[arg(long = "waive")]
        waived: Vec<String>,
    },
    /// Abandon a spec: close issue and PR, drop branch and worktree
    Abandon {
        slug: String,
        /// Reason recorded on the closed issue
        #[arg(long)]
        reason: Option<String>,
    },
}

pub fn run(ctx: &WorkContext, subcmd: SpecSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SpecSubcommand::New { title } => new(ctx, &title.join(" "), json),
        SpecSubcommand::List {
            status,
            completed,
            abandoned,
        } => list(ctx, status, completed, abandoned, json),
        SpecSubcommand::Show { slug } => show(ctx, &slug, json),
        SpecSubcommand::Assign { slug, user } => assign(ctx, &slug, user.as_deref(), json),
        SpecSubcommand::Complete { no_log, waived } => complete(ctx, no_log, &waived, json),
        SpecSubcommand::Abandon { slug, reason } => abandon(ctx, &slug, reason.as_deref(), json),
    }
}

const SPEC_TEMPLATE: &str = "## Overview\n\n_Describe the change._\n\n## Acceptance\n\n_How we know it is done._\n";

fn new(ctx: &WorkContext, title: &str, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    Config::load(root).context("failed to load config")?;
    let spec = Spec::create(root, title, SPEC_TEMPLATE)
        .with_context(|| format!("cannot create spec '{title}'"))?;
    if json {
        print_json(&serde_json::json!({
            "slug": spec.slug,
            "title": spec.meta.title,
            "status": spec.status(),
            "path": spec.file(root),
        }))?;
    } else {
        println!("Created spec '{}' at {}", spec.slug, spec.file(root).display());
        println!("Run 'steward sync' to open its GitHub issue");
    }
    Ok(())
}

fn list(
    ctx: &WorkContext,
    status: Option<SpecStatus>,
    completed: bool,
    abandoned: bool,
    json: bool,
) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let partition = if completed {
        Partition::Completed
    } else if abandoned {
        Partition::Abandoned
    } else {
        Partition::Active
    };
    let mut specs = Spec::list(root, partition)?;
    if let Some(status) = status {
        specs.retain(|s| s.status() == status);
    }
    specs.sort_by(|a, b| b.meta.updated_at.cmp(&a.meta.updated_at));

    if json {
        let items: Vec<_> = specs
            .iter()
            .map(|s| steward_core::snapshot::SpecSummary::from(s))
            .collect();
        return print_json(&items);
    }
    let rows: Vec<Vec<String>> = specs
        .iter()
        .map(|s| {
            vec![
                s.slug.clone(),
                s.status().to_string(),
                s.meta.assigned_to.clone().unwrap_or_default(),
                s.meta.branch.clone().unwrap_or_default(),
                s.meta
                    .issue_id
                    .map(|n| format!("#{n}"))
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["SLUG", "STATUS", "ASSIGNED", "BRANCH", "ISSUE"], rows);
    Ok(())
}

fn show(ctx: &WorkContext, slug: &str, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let spec = Spec::resolve(root, slug)?;
    if json {
        return print_json(&serde_json::json!({
            "slug": spec.slug,
            "meta": spec.meta,
            "body": spec.body,
            "path": spec.file(root),
        }));
    }
    println!("{} [{}] {}", spec.slug, spec.status(), spec.meta.title);
    if let Some(user) = &spec.meta.assigned_to {
        println!("  assigned: {user}");
    }
    if let Some(branch) = &spec.meta.branch {
        println!("  branch:   {branch}");
    }
    if let Some(url) = &spec.meta.issue_url {
        println!("  issue:    {url}");
    }
    if let Some(url) = &spec.meta.pr_url {
        println!("  pr:       {url}");
    }
    let open = task::incomplete_titles(root, &spec)?;
    if !open.is_empty() {
        println!("  open tasks: {}", open.join(", "));
    }
    println!("\n{}", local_portion(&spec.body));
    Ok(())
}

// ---------------------------------------------------------------------------
// assign
// ---------------------------------------------------------------------------

fn assign(ctx: &WorkContext, slug: &str, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let cfg = Config::load(root).context("failed to load config")?;
    let git = Git::new(root)?;
    let mut spec = Spec::resolve(root, slug)?;

    let user = match user {
        Some(u) => steward_core::paths::slugify(u),
        None => {
            let login = crate::cmd::github(&git)
                .ok()
                .and_then(|gh| gh.authenticated_user().ok());
            match login {
                Some(login) => steward_core::paths::slugify(&login),
                None => crate::cmd::username(&git, None)?,
            }
        }
    };

    // Re-running your own assignment is a no-op that prints the worktree.
    if spec.status() == SpecStatus::InProgress {
        match (&spec.meta.assigned_to, spec.meta.branch.clone()) {
            (Some(owner), Some(branch)) if owner == &user => {
                let path = worktree::create(&git, &cfg, root, &spec.slug, &branch)?;
                return done_assign(&spec, &path, json);
            }
            (Some(owner), _) => bail!(
                "spec '{}' is already assigned to '{}'",
                spec.slug,
                owner
            ),
            _ => {}
        }
    }

    if spec.meta.issue_id.is_none() {
        bail!(
            "spec '{}' has no GitHub issue yet; run 'steward sync' first",
            spec.slug
        );
    }

    let branch = worktree::feature_branch(&cfg.branches.integration, &user, &spec.slug);
    spec.assign(&user, &branch)?;
    spec.save(root)?;

    // Record the claim on the integration branch before branching off it,
    // so the worktree sees its own assignment.
    if git.commit_all(&format!("steward: assign {} to {user}", spec.slug))? {
        if let Err(e) = git.push(&cfg.branches.integration) {
            tracing::warn!(error = %e, "could not push assignment record");
        }
    }

    let path = worktree::create(&git, &cfg, root, &spec.slug, &branch)?;
    if git.config_get("remote.origin.url").is_some() {
        let wt_git = git.at(&path);
        if let Err(e) = wt_git.push_upstream(&branch) {
            tracing::warn!(error = %e, "could not push feature branch");
        }
    }

    // Mirror assignment onto the issue; the next sync repairs any miss.
    if let (Ok(gh), Some(number)) = (crate::cmd::github(&git), spec.meta.issue_id) {
        let result = gh.get_issue(number).and_then(|issue| {
            gh.set_status_label(&issue, spec.status())?;
            gh.update_issue(
                number,
                &IssueUpdate {
                    assignees: Some(vec![user.clone()]),
                    ..Default::default()
                },
            )?;
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not update issue assignment");
        }
    }

    done_assign(&spec, &path, json)
}

fn done_assign(spec: &Spec, path: &std::path::Path, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&serde_json::json!({
            "slug": spec.slug,
            "status": spec.status(),
            "branch": spec.meta.branch,
            "worktree": path,
        }))?;
    } else {
        println!("Spec '{}' is in progress on {}", spec.slug, path.display());
        println!("  cd {}", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// complete
// ---------------------------------------------------------------------------

fn complete(ctx: &WorkContext, no_log: bool, waived: &[String], json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let cfg = Config::load(root).context("failed to load config")?;
    let Some(slug) = ctx.active_slug.clone() else {
        bail!("'spec complete' runs inside the spec's worktree");
    };
    let wt_path = ctx
        .worktree
        .clone()
        .context("'spec complete' runs inside the spec's worktree")?;

    let git = Git::new(root)?;
    let wt_git = git.at(&wt_path);
    let mut spec = Spec::load(root, &slug)
        .with_context(|| format!("no spec record for worktree '{slug}'"))?;

    // Gate 1: a fresh work log proves the session was written down.
    if !no_log && !worklog::has_recent_log(root, &spec, cfg.log_recency_minutes)? {
        bail!(
            "no work log in the last {} minutes; run 'steward log new <notes>' (or pass --no-log)",
            cfg.log_recency_minutes
        );
    }

    // Gate 2: every task is completed or explicitly waived.
    let waived_slugs: Vec<String> = waived
        .iter()
        .map(|w| steward_core::paths::slugify(w))
        .collect();
    let open: Vec<String> = task::Task::list(root, &spec)?
        .into_iter()
        .filter(|t| t.meta.status != steward_core::types::TaskStatus::Completed)
        .filter(|t| !waived_slugs.contains(&t.slug))
        .map(|t| t.meta.title)
        .collect();
    if !open.is_empty() {
        bail!(
            "open tasks remain: {}; complete them or pass --waive <task>",
            open.join(", ")
        );
    }

    // Gate 3: reconciliation must be conflict-free for this spec.
    let gh = crate::cmd::github(&git)?;
    let plan = Reconciler {
        root: root.as_path(),
        git: &git,
        gh: &gh,
        cfg: &cfg,
    }
    .plan()
    .context("reconciliation failed; resolve and re-run")?;
    if let Some(conflict) = plan.conflicts.iter().find(|c| c.slug == slug) {
        bail!(
            "unresolved sync conflict on '{}' ({}); run 'steward sync' and resolve first",
            slug,
            conflict.detail
        );
    }

    let branch = spec
        .meta
        .branch
        .clone()
        .context("spec has no feature branch recorded")?;

    // Push the work.
    wt_git.commit_all(&format!("{}: final changes", slug))?;
    wt_git.push_upstream(&branch)?;

    // Open the completion PR against the integration branch.
    let title = format!("{COMPLETE_MARKER} {}", spec.meta.title);
    let mut body = String::new();
    if let Some(number) = spec.meta.issue_id {
        body.push_str(&format!("Closes #{number}\n\n"));
    }
    body.push_str(local_portion(&spec.body));
    let pr = gh.create_pull(&title, &body, &branch, &cfg.branches.integration)?;

    spec.mark_merge_ready(Some(pr.html_url.clone()))?;
    spec.save(root)?;

    if let Some(number) = spec.meta.issue_id {
        if let Err(e) = gh
            .get_issue(number)
            .and_then(|issue| gh.set_status_label(&issue, spec.status()))
        {
            tracing::warn!(error = %e, "could not update issue status label");
        }
    }

    if git.commit_all(&format!("steward: {} merge_ready", slug))? {
        if let Err(e) = git.push(&cfg.branches.integration) {
            tracing::warn!(error = %e, "could not push record update");
        }
    }

    // The worktree is done; the branch stays for the PR.
    if let Err(e) = worktree::remove(&git, root, &slug) {
        tracing::warn!(error = %e, "could not remove worktree; remove it with 'steward cleanup'");
    }

    if json {
        print_json(&serde_json::json!({
            "slug": slug,
            "status": spec.status(),
            "pr_url": pr.html_url,
        }))?;
    } else {
        println!("Spec '{}' is merge_ready: {}", slug, pr.html_url);
        println!("Merge it with 'steward merge {}' once review passes", slug);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// abandon
// ---------------------------------------------------------------------------

fn abandon(ctx: &WorkContext, slug: &str, reason: Option<&str>, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let cfg = Config::load(root).context("failed to load config")?;
    let git = Git::new(root)?;
    let mut spec = Spec::resolve(root, slug)?;

    if ctx.active_slug.as_deref() == Some(spec.slug.as_str()) {
        bail!(
            "cannot abandon '{}' from inside its own worktree; run from the main checkout",
            spec.slug
        );
    }
    if spec.status().is_terminal() {
        bail!("spec '{}' is already {}", spec.slug, spec.status());
    }

    let reason = reason.unwrap_or("abandoned");
    let branch = spec.meta.branch.clone();
    let gh = crate::cmd::github(&git).ok();

    if let Some(gh) = &gh {
        // A merged completion PR means this spec is actually done, not
        // abandoned; the record is behind reality.
        if let Some(number) = spec
            .meta
            .pr_url
            .as_deref()
            .and_then(steward_core::reconcile::pr_number_from_url)
        {
            if gh.is_pull_merged(number)? {
                bail!(
                    "completion PR for '{}' already merged; run 'steward sync' instead of abandoning",
                    spec.slug
                );
            }
            // An open completion PR gets the reason and an explicit close;
            // deleting the branch alone would close it without a word.
            match gh.get_pull(number) {
                Ok(pr) if pr.state == "open" => {
                    if let Err(e) = gh
                        .comment(number, &format!("Abandoned: {reason}"))
                        .and_then(|()| gh.close_pull(number))
                    {
                        tracing::warn!(pr = number, error = %e, "could not close completion PR");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(pr = number, error = %e, "could not read completion PR");
                }
            }
        }
        if let Some(number) = spec.meta.issue_id {
            if let Err(e) = gh.close_issue_with_comment(
                number,
                &format!("Abandoned: {reason}"),
            ) {
                tracing::warn!(error = %e, "could not close issue");
            }
        }
    }

    if let Err(e) = worktree::remove(&git, root, &spec.slug) {
        tracing::warn!(error = %e, "could not remove worktree");
    }
    if let Some(branch) = &branch {
        if git.branch_exists(branch) {
            if let Err(e) = git.delete_local_branch(branch) {
                tracing::warn!(branch = %branch, error = %e, "could not delete local branch");
            }
        }
        if let Some(gh) = &gh {
            if let Err(e) = gh.delete_branch_ref(branch) {
                tracing::warn!(branch = %branch, error = %e, "could not delete remote branch");
            }
        }
    }

    spec.move_to_terminal(root, SpecStatus::Abandoned)?;
    if git.commit_all(&format!("steward: abandon {}", spec.slug))? {
        if let Err(e) = git.push(&cfg.branches.integration) {
            tracing::warn!(error = %e, "could not push record update");
        }
    }

    if json {
        print_json(&serde_json::json!({
            "slug": spec.slug,
            "status": spec.status(),
        }))?;
    } else {
        println!("Abandoned spec '{}'", spec.slug);
    }
    Ok(())
}
