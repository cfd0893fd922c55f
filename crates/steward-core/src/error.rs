use thiserror::Error;

#[derive(Debug, Error)]
pub enum StewardError {
    #[error("not initialized: run 'steward init'")]
    NotInitialized,

    #[error("spec not found: {0}")]
    SpecNotFound(String),

    #[error("spec already exists: {0}")]
    SpecExists(String),

    #[error("ambiguous spec '{prefix}': matches {}", .candidates.join(", "))]
    AmbiguousSpec {
        prefix: String,
        candidates: Vec<String>,
    },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with underscores")]
    InvalidSlug(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("merge conflict during {op}: {detail}")]
    Conflict { op: String, detail: String },

    #[error("git {op} failed: {detail}")]
    Git { op: String, detail: String },

    #[error("git not found on PATH")]
    GitNotFound,

    #[error("GitHub API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("GitHub unreachable: {0}")]
    RemoteUnavailable(String),

    #[error("no GitHub token: set GITHUB_TOKEN")]
    NoToken,

    #[error("malformed record {path}: {detail}")]
    MalformedRecord { path: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StewardError>;
