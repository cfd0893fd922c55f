pub mod cleanup;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod io;
pub mod paths;
pub mod promote;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod snapshot;
pub mod spec;
pub mod task;
pub mod types;
pub mod worklog;
pub mod worktree;

pub use error::{Result, StewardError};
