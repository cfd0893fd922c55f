use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use steward_core::config::Config;
use steward_core::git::Git;
use steward_core::io::ensure_dir;
use steward_core::paths::Partition;
use steward_core::worktree::WorkContext;

pub fn run(ctx: &WorkContext, project: Option<&str>, json: bool) -> anyhow::Result<()> {
    let root = &ctx.main_repo;
    let git = Git::new(root)?;

    let project = match project {
        Some(p) => p.to_string(),
        None => dir_name(root),
    };

    for partition in Partition::all() {
        ensure_dir(&partition.dir(root)).context("failed to create spec store")?;
    }

    let created_config = match Config::load(root) {
        Ok(_) => false,
        Err(_) => {
            Config::new(&project)
                .save(root)
                .context("failed to write config")?;
            true
        }
    };
    let cfg = Config::load(root)?;

    // Commit the store before branching so every pipeline branch carries it.
    git.commit_all("steward: initialize spec store")
        .context("failed to commit spec store")?;

    // Pipeline branches must exist before anything can promote through them.
    let mut created_branches = Vec::new();
    for branch in [
        &cfg.branches.integration,
        &cfg.branches.staging,
        &cfg.branches.release,
    ] {
        if !git.branch_exists(branch) {
            git.create_branch(branch, "HEAD")
                .with_context(|| format!("failed to create branch '{branch}'"))?;
            created_branches.push(branch.clone());
        }
    }

    // Publish the pipeline branches; offline init still succeeds.
    if git.config_get("remote.origin.url").is_some() {
        for branch in [
            &cfg.branches.integration,
            &cfg.branches.staging,
            &cfg.branches.release,
        ] {
            if let Err(e) = git.push_upstream(branch) {
                tracing::warn!(branch = %branch, error = %e, "could not push pipeline branch");
            }
        }
    }

    git.install_merge_guard(&cfg.branches)
        .context("failed to install merge guard hook")?;

    // Label and branch-protection setup are best-effort; init must work
    // offline. The merge guard hook is the local enforcement, protection
    // is the server-side one.
    let mut protected = Vec::new();
    let labels = match crate::cmd::github(&git) {
        Ok(gh) => {
            for branch in [
                &cfg.branches.integration,
                &cfg.branches.staging,
                &cfg.branches.release,
            ] {
                match gh.protect_branch(branch) {
                    Ok(true) => protected.push(branch.clone()),
                    Ok(false) => {
                        tracing::warn!(branch = %branch, "branch protection not applied");
                    }
                    Err(e) => {
                        tracing::warn!(branch = %branch, error = %e, "failed to protect branch");
                    }
                }
            }
            match gh.ensure_labels() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to set up GitHub labels");
                    false
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping GitHub label setup");
            false
        }
    };

    if json {
        print_json(&serde_json::json!({
            "project": project,
            "config_created": created_config,
            "branches_created": created_branches,
            "merge_guard_installed": true,
            "labels_ensured": labels,
            "branches_protected": protected,
        }))?;
    } else {
        println!("Initialized steward for '{project}'");
        if !created_branches.is_empty() {
            println!("  created branches: {}", created_branches.join(", "));
        }
        println!("  merge guard installed (pre-merge-commit hook, merge.ff=false)");
        if !protected.is_empty() {
            println!("  protected branches: {}", protected.join(", "));
        }
        if !labels {
            println!("  GitHub labels not set up (no token or no remote); run 'steward sync' later");
        }
    }
    Ok(())
}

fn dir_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}
