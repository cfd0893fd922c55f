use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// SpecStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    Todo,
    InProgress,
    MergeReady,
    Completed,
    Abandoned,
}

impl SpecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecStatus::Todo => "todo",
            SpecStatus::InProgress => "in_progress",
            SpecStatus::MergeReady => "merge_ready",
            SpecStatus::Completed => "completed",
            SpecStatus::Abandoned => "abandoned",
        }
    }

    pub fn all() -> [SpecStatus; 5] {
        [
            SpecStatus::Todo,
            SpecStatus::InProgress,
            SpecStatus::MergeReady,
            SpecStatus::Completed,
            SpecStatus::Abandoned,
        ]
    }

    /// Terminal statuses never transition again and live in their own
    /// store partition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SpecStatus::Completed | SpecStatus::Abandoned)
    }

    /// Statuses under which the spec owns a feature branch and worktree.
    pub fn has_branch(&self) -> bool {
        matches!(self, SpecStatus::InProgress | SpecStatus::MergeReady)
    }
}

impl fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(SpecStatus::Todo),
            "in_progress" => Ok(SpecStatus::InProgress),
            "merge_ready" => Ok(SpecStatus::MergeReady),
            "completed" => Ok(SpecStatus::Completed),
            "abandoned" => Ok(SpecStatus::Abandoned),
            _ => Err(format!("unknown spec status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "completed" => Ok(TaskStatus::Completed),
            _ => Err(format!("unknown task status: {s}")),
        }
    }
}
