use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use steward_core::config::Config;
use steward_core::git::Git;
use steward_core::github::{CheckState, GitHub, PullRequest};
use steward_core::spec::Spec;
use steward_core::types::SpecStatus;
use steward_core::worktree::{self, WorkContext};

pub fn run(
    ctx: &WorkContext,
    slug: Option<&str>,
    all: bool,
    keep_branch: bool,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let cfg = Config::load(root).context("failed to load config")?;
    let git = Git::new(root)?;
    let gh = crate::cmd::github(&git)?;

    let integration = &cfg.branches.integration;
    let current = git.current_branch()?;
    if current != *integration {
        bail!("run 'steward merge' from the '{integration}' branch (currently on '{current}')");
    }

    git.fetch_prune()?;
    let open: Vec<PullRequest> = gh
        .list_open_pulls(integration)?
        .into_iter()
        .filter(|pr| pr.is_completion())
        .collect();

    // Map completion PRs to spec slugs through their feature branch names.
    let candidates: Vec<(String, PullRequest)> = open
        .into_iter()
        .filter_map(|pr| {
            worktree::parse_feature_branch(integration, &pr.head.name)
                .map(|(_, slug)| (slug, pr))
        })
        .collect();

    let targets: Vec<&(String, PullRequest)> = match (slug, all) {
        (Some(slug), _) => {
            let spec = Spec::resolve(root, slug)?;
            let found: Vec<_> = candidates.iter().filter(|(s, _)| *s == spec.slug).collect();
            if found.is_empty() {
                bail!("no open completion PR for spec '{}'", spec.slug);
            }
            found
        }
        (None, true) => candidates.iter().collect(),
        (None, false) => {
            // No target: list what is mergeable and stop.
            if json {
                let items: Vec<_> = candidates
                    .iter()
                    .map(|(slug, pr)| {
                        serde_json::json!({
                            "slug": slug,
                            "pr": pr.number,
                            "title": pr.title,
                            "url": pr.html_url,
                            "checks": checks_for(&gh, pr).to_string(),
                        })
                    })
                    .collect();
                return print_json(&items);
            }
            if candidates.is_empty() {
                println!("No completion PRs are open");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = candidates
                .iter()
                .map(|(slug, pr)| {
                    vec![
                        slug.clone(),
                        format!("#{}", pr.number),
                        checks_for(&gh, pr).to_string(),
                        pr.html_url.clone(),
                    ]
                })
                .collect();
            print_table(&["SLUG", "PR", "CHECKS", "URL"], rows);
            println!("Run 'steward merge <slug>' or 'steward merge --all'");
            return Ok(());
        }
    };

    if dry_run {
        if json {
            let items: Vec<_> = targets
                .iter()
                .map(|(slug, pr)| {
                    serde_json::json!({
                        "slug": slug,
                        "pr": pr.number,
                        "url": pr.html_url,
                    })
                })
                .collect();
            return print_json(&serde_json::json!({ "would_merge": items }));
        }
        for (slug, pr) in &targets {
            println!(
                "Would merge '{}' via PR #{} (checks: {})",
                slug,
                pr.number,
                checks_for(&gh, pr)
            );
        }
        return Ok(());
    }

    // Merge remotely first; records are finalized after the local
    // integration branch has caught up with the merge commits.
    let mut merged: Vec<String> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();
    for (slug, pr) in targets {
        // Re-read the PR; the list endpoint's mergeable field is stale.
        let fresh = gh.get_pull(pr.number)?;
        if fresh.mergeable == Some(false) {
            tracing::warn!(slug = %slug, pr = pr.number, "PR has conflicts; skipping");
            skipped.push(slug.clone());
            continue;
        }
        if checks_for(&gh, &fresh) == CheckState::Failing {
            tracing::warn!(slug = %slug, pr = pr.number, "checks are failing; skipping");
            skipped.push(slug.clone());
            continue;
        }
        gh.merge_pull(fresh.number)?;
        if let Some(number) = Spec::load(root, slug).ok().and_then(|s| s.meta.issue_id) {
            if let Err(e) = gh.close_issue_with_comment(
                number,
                &format!("Completed via {}", fresh.html_url),
            ) {
                tracing::warn!(error = %e, "could not close issue");
            }
        }
        merged.push(slug.clone());
    }

    if !merged.is_empty() {
        git.pull_ff_only()?;
        for slug in &merged {
            let mut spec = Spec::load(root, slug)
                .with_context(|| format!("merged PR but no spec record '{slug}'"))?;
            let branch = spec.meta.branch.clone();
            spec.move_to_terminal(root, SpecStatus::Completed)?;

            if let Err(e) = worktree::remove(&git, root, slug) {
                tracing::warn!(error = %e, "could not remove worktree");
            }
            if !keep_branch {
                if let Some(branch) = &branch {
                    if git.branch_exists(branch) {
                        if let Err(e) = git.delete_local_branch(branch) {
                            tracing::warn!(branch = %branch, error = %e, "could not delete local branch");
                        }
                    }
                    if let Err(e) = gh.delete_branch_ref(branch) {
                        tracing::warn!(branch = %branch, error = %e, "could not delete remote branch");
                    }
                }
            }
        }
        if git.commit_all("steward: record merged specs")? {
            if let Err(e) = git.push(&cfg.branches.integration) {
                tracing::warn!(error = %e, "could not push record update");
            }
        }
    }

    if json {
        print_json(&serde_json::json!({
            "merged": merged,
            "skipped": skipped,
        }))?;
    } else {
        for slug in &merged {
            println!("Merged and completed '{slug}'");
        }
        for slug in &skipped {
            println!("Skipped '{slug}' (conflicts or failing checks; fix the branch and retry)");
        }
        if !merged.is_empty() {
            println!(
                "Promote when ready: 'steward promote test', then 'steward promote main --force'"
            );
        }
    }
    Ok(())
}

fn checks_for(gh: &GitHub, pr: &PullRequest) -> CheckState {
    gh.check_state(&pr.head.sha).unwrap_or_else(|e| {
        tracing::warn!(pr = pr.number, error = %e, "could not read check runs");
        CheckState::None
    })
}
