use crate::error::{Result, StewardError};
use crate::paths;
use crate::record;
use crate::spec::Spec;
use crate::types::TaskStatus;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static TASK_FILE_RE: OnceLock<Regex> = OnceLock::new();

fn task_file_re() -> &'static Regex {
    TASK_FILE_RE.get_or_init(|| Regex::new(r"^(\d{2})_([a-z0-9_]+)\.md$").unwrap())
}

// ---------------------------------------------------------------------------
// TaskMeta
// ---------------------------------------------------------------------------

/// A dated note attached to a task's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteEntry {
    pub notes: String,
    pub at: DateTime<Utc>,
}

/// Completion proposed but not yet accepted. Recorded in frontmatter so the
/// accepting invocation can pick it up; status stays untouched until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCompletion {
    pub notes: String,
    pub proposed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMeta {
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_completion: Option<PendingCompletion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completions: Vec<NoteEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amendments: Vec<NoteEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Task {
    pub seq: u32,
    pub slug: String,
    pub meta: TaskMeta,
    pub body: String,
}

impl Task {
    pub fn filename(&self) -> String {
        format!("{:02}_{}.md", self.seq, self.slug)
    }

    pub fn path(&self, root: &Path, spec: &Spec) -> PathBuf {
        paths::tasks_dir(root, spec.partition, &spec.slug).join(self.filename())
    }

    fn touch(&mut self) {
        self.meta.updated_at = Utc::now();
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Add a task to a spec. The sequence number continues from the highest
    /// existing one, so deleted tasks never cause reuse of their position.
    pub fn create(root: &Path, spec: &Spec, title: &str, description: &str) -> Result<Self> {
        let slug = paths::slugify(title);
        paths::validate_slug(&slug)?;

        let existing = Self::list(root, spec)?;
        if existing.iter().any(|t| t.slug == slug) {
            return Err(StewardError::Precondition(format!(
                "task already exists: {slug}"
            )));
        }
        let seq = existing.iter().map(|t| t.seq).max().unwrap_or(0) + 1;

        let now = Utc::now();
        let task = Self {
            seq,
            slug,
            meta: TaskMeta {
                title: title.to_string(),
                status: TaskStatus::Todo,
                created_at: now,
                updated_at: now,
                completed_at: None,
                pending_completion: None,
                completions: Vec::new(),
                amendments: Vec::new(),
                extra: BTreeMap::new(),
            },
            body: description.to_string(),
        };
        task.save(root, spec)?;
        Ok(task)
    }

    pub fn list(root: &Path, spec: &Spec) -> Result<Vec<Self>> {
        let dir = paths::tasks_dir(root, spec.partition, &spec.slug);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut tasks = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = task_file_re().captures(&name) else {
                continue;
            };
            let seq: u32 = caps[1].parse().unwrap_or(0);
            let slug = caps[2].to_string();
            let (meta, body) = record::read(&entry.path())?;
            tasks.push(Self {
                seq,
                slug,
                meta,
                body,
            });
        }
        tasks.sort_by_key(|t| t.seq);
        Ok(tasks)
    }

    /// Find a task by slug, or by a needle that matches exactly one title.
    pub fn find(root: &Path, spec: &Spec, needle: &str) -> Result<Self> {
        let tasks = Self::list(root, spec)?;
        let as_slug = paths::slugify(needle);
        if let Some(task) = tasks.iter().find(|t| t.slug == as_slug) {
            return Ok(task.clone());
        }
        let lowered = needle.to_lowercase();
        let matches: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.meta.title.to_lowercase().contains(&lowered))
            .collect();
        match matches.len() {
            0 => Err(StewardError::TaskNotFound(needle.to_string())),
            1 => Ok(matches[0].clone()),
            _ => Err(StewardError::Precondition(format!(
                "ambiguous task '{}': matches {}",
                needle,
                matches
                    .iter()
                    .map(|t| t.slug.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    pub fn save(&self, root: &Path, spec: &Spec) -> Result<()> {
        record::write(&self.path(root, spec), &self.meta, &self.body)
    }

    pub fn delete(&self, root: &Path, spec: &Spec) -> Result<()> {
        let path = self.path(root, spec);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Rename changes the display title only. The slug and filename are the
    /// durable join key and never change after creation.
    pub fn rename(&mut self, root: &Path, spec: &Spec, new_title: &str) -> Result<()> {
        self.meta.title = new_title.to_string();
        self.touch();
        self.save(root, spec)
    }

    // -----------------------------------------------------------------------
    // Completion protocol
    // -----------------------------------------------------------------------

    /// First phase: record the notes as a pending completion. Status does not
    /// change; the caller is expected to review and re-invoke with acceptance.
    pub fn propose_completion(&mut self, notes: &str) -> Result<()> {
        if self.meta.status == TaskStatus::Completed {
            return Err(StewardError::Precondition(format!(
                "task already completed: {}",
                self.slug
            )));
        }
        self.meta.pending_completion = Some(PendingCompletion {
            notes: notes.to_string(),
            proposed_at: Utc::now(),
        });
        self.touch();
        Ok(())
    }

    /// Second phase: accept the pending proposal. Fails if nothing was
    /// proposed first.
    pub fn accept_completion(&mut self) -> Result<()> {
        let pending = self.meta.pending_completion.take().ok_or_else(|| {
            StewardError::Precondition(format!(
                "no pending completion for task '{}': propose first",
                self.slug
            ))
        })?;
        let now = Utc::now();
        self.meta.status = TaskStatus::Completed;
        self.meta.completed_at = Some(now);
        self.body.push_str(&format!(
            "\n## Completion Notes ({})\n\n{}\n",
            now.format("%Y-%m-%d %H:%M"),
            pending.notes
        ));
        self.meta.completions.push(NoteEntry {
            notes: pending.notes,
            at: now,
        });
        self.touch();
        Ok(())
    }

    /// Reopen a completed task with an amendment note. Completion history is
    /// preserved so a later re-completion adds a second entry.
    pub fn amend(&mut self, notes: &str) -> Result<()> {
        if self.meta.status != TaskStatus::Completed {
            return Err(StewardError::Precondition(format!(
                "cannot amend task '{}': not completed",
                self.slug
            )));
        }
        let now = Utc::now();
        self.meta.status = TaskStatus::Todo;
        self.meta.completed_at = None;
        self.meta.amendments.push(NoteEntry {
            notes: notes.to_string(),
            at: now,
        });
        self.body.push_str(&format!(
            "\n## Amendment ({})\n\n{}\n",
            now.format("%Y-%m-%d %H:%M"),
            notes
        ));
        self.touch();
        Ok(())
    }
}

/// Titles of tasks still open, used as a completion gate for the spec.
pub fn incomplete_titles(root: &Path, spec: &Spec) -> Result<Vec<String>> {
    Ok(Task::list(root, spec)?
        .into_iter()
        .filter(|t| t.meta.status != TaskStatus::Completed)
        .map(|t| t.meta.title)
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
