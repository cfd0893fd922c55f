pub mod cleanup;
pub mod init;
pub mod log;
pub mod merge;
pub mod promote;
pub mod spec;
pub mod status;
pub mod sync;
pub mod task;

use anyhow::Context;
use steward_core::git::Git;
use steward_core::github::{parse_repo_slug, GitHub};

/// GitHub client for the repository behind `origin`.
pub(crate) fn github(git: &Git) -> anyhow::Result<GitHub> {
    let url = git
        .remote_url()
        .context("no 'origin' remote configured")?;
    let repo = parse_repo_slug(&url)
        .with_context(|| format!("cannot parse owner/repo from remote url '{url}'"))?;
    Ok(GitHub::from_env(repo)?)
}

/// Username for assignments and log files: explicit flag, then git identity.
pub(crate) fn username(git: &Git, explicit: Option<&str>) -> anyhow::Result<String> {
    if let Some(user) = explicit {
        return Ok(steward_core::paths::slugify(user));
    }
    let name = git
        .config_get("user.name")
        .or_else(|| std::env::var("USER").ok())
        .context("cannot determine username: pass --user or set git user.name")?;
    Ok(steward_core::paths::slugify(&name))
}
