use crate::error::{Result, StewardError};
use crate::io;
use crate::paths::{self, Partition};
use crate::record;
use crate::types::SpecStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// SpecMeta
// ---------------------------------------------------------------------------

/// Frontmatter of a spec record. Unknown keys land in `extra` and are
/// written back verbatim on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecMeta {
    pub title: String,
    pub status: SpecStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_content_hash: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

// ---------------------------------------------------------------------------
// Spec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Spec {
    pub slug: String,
    pub partition: Partition,
    pub meta: SpecMeta,
    pub body: String,
}

impl Spec {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.into(),
            partition: Partition::Active,
            meta: SpecMeta {
                title: title.into(),
                status: SpecStatus::Todo,
                created_at: now,
                updated_at: now,
                assigned_to: None,
                branch: None,
                issue_id: None,
                issue_url: None,
                pr_url: None,
                completed_at: None,
                last_synced_at: None,
                local_content_hash: None,
                remote_content_hash: None,
                extra: BTreeMap::new(),
            },
            body: String::new(),
        }
    }

    pub fn status(&self) -> SpecStatus {
        self.meta.status
    }

    pub fn dir(&self, root: &Path) -> PathBuf {
        paths::spec_dir(root, self.partition, &self.slug)
    }

    pub fn file(&self, root: &Path) -> PathBuf {
        paths::spec_file(root, self.partition, &self.slug)
    }

    fn touch(&mut self) {
        self.meta.updated_at = Utc::now();
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Create a new spec record from a free-form title. The slug is derived
    /// and must be unique across every partition.
    pub fn create(root: &Path, title: &str, body: &str) -> Result<Self> {
        let slug = paths::slugify(title);
        paths::validate_slug(&slug)?;

        for partition in Partition::all() {
            if paths::spec_dir(root, partition, &slug).exists() {
                return Err(StewardError::SpecExists(slug));
            }
        }

        let mut spec = Self::new(slug, title);
        spec.body = body.to_string();
        spec.save(root)?;
        Ok(spec)
    }

    pub fn load_from(root: &Path, partition: Partition, slug: &str) -> Result<Self> {
        let path = paths::spec_file(root, partition, slug);
        if !path.exists() {
            return Err(StewardError::SpecNotFound(slug.to_string()));
        }
        let (meta, body) = record::read(&path)?;
        Ok(Self {
            slug: slug.to_string(),
            partition,
            meta,
            body,
        })
    }

    /// Load by exact slug, searching active then terminal partitions.
    pub fn load(root: &Path, slug: &str) -> Result<Self> {
        for partition in Partition::all() {
            if paths::spec_file(root, partition, slug).exists() {
                return Self::load_from(root, partition, slug);
            }
        }
        Err(StewardError::SpecNotFound(slug.to_string()))
    }

    /// Resolve a slug or unique slug prefix. Exact matches always win, even
    /// when other slugs share the prefix.
    pub fn resolve(root: &Path, prefix: &str) -> Result<Self> {
        let mut all = Vec::new();
        for partition in Partition::all() {
            all.extend(slugs_in(root, partition)?);
        }
        if all.iter().any(|s| s == prefix) {
            return Self::load(root, prefix);
        }
        let mut matches: Vec<String> = all.into_iter().filter(|s| s.starts_with(prefix)).collect();
        matches.sort();
        matches.dedup();
        match matches.len() {
            0 => Err(StewardError::SpecNotFound(prefix.to_string())),
            1 => Self::load(root, &matches[0]),
            _ => Err(StewardError::AmbiguousSpec {
                prefix: prefix.to_string(),
                candidates: matches,
            }),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        record::write(&self.file(root), &self.meta, &self.body)
    }

    pub fn list(root: &Path, partition: Partition) -> Result<Vec<Self>> {
        let mut specs = Vec::new();
        for slug in slugs_in(root, partition)? {
            specs.push(Self::load_from(root, partition, &slug)?);
        }
        specs.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(specs)
    }

    pub fn list_all(root: &Path) -> Result<Vec<Self>> {
        let mut specs = Vec::new();
        for partition in Partition::all() {
            specs.extend(Self::list(root, partition)?);
        }
        Ok(specs)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    pub fn can_transition_to(&self, to: SpecStatus) -> Result<()> {
        use SpecStatus::*;
        let from = self.meta.status;
        let ok = match from {
            Todo => matches!(to, InProgress | Abandoned),
            InProgress => matches!(to, MergeReady | Abandoned),
            MergeReady => matches!(to, Completed | InProgress | Abandoned),
            Completed | Abandoned => false,
        };
        if ok {
            Ok(())
        } else {
            Err(StewardError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
                reason: if from.is_terminal() {
                    "terminal statuses never change".to_string()
                } else {
                    "not a legal lifecycle step".to_string()
                },
            })
        }
    }

    /// Take ownership: todo -> in_progress with an assignee and feature branch.
    pub fn assign(&mut self, user: &str, branch: &str) -> Result<()> {
        self.can_transition_to(SpecStatus::InProgress)?;
        self.meta.status = SpecStatus::InProgress;
        self.meta.assigned_to = Some(user.to_string());
        self.meta.branch = Some(branch.to_string());
        self.touch();
        Ok(())
    }

    /// Declare the work pushed and under review: in_progress -> merge_ready.
    pub fn mark_merge_ready(&mut self, pr_url: Option<String>) -> Result<()> {
        self.can_transition_to(SpecStatus::MergeReady)?;
        self.meta.status = SpecStatus::MergeReady;
        if pr_url.is_some() {
            self.meta.pr_url = pr_url;
        }
        self.touch();
        Ok(())
    }

    /// Reopen a merge_ready spec whose review bounced.
    pub fn reopen(&mut self) -> Result<()> {
        self.can_transition_to(SpecStatus::InProgress)?;
        self.meta.status = SpecStatus::InProgress;
        self.touch();
        Ok(())
    }

    /// Move the record directory into a terminal partition.
    ///
    /// The copy in the target partition is written in full before the source
    /// directory is removed. The branch field is cleared: terminal specs no
    /// longer own a branch.
    pub fn move_to_terminal(&mut self, root: &Path, target: SpecStatus) -> Result<()> {
        if !target.is_terminal() {
            return Err(StewardError::InvalidTransition {
                from: self.meta.status.to_string(),
                to: target.to_string(),
                reason: "not a terminal status".to_string(),
            });
        }
        self.can_transition_to(target)?;

        let src = self.dir(root);
        let dst_partition = match target {
            SpecStatus::Completed => Partition::Completed,
            _ => Partition::Abandoned,
        };

        self.meta.status = target;
        self.meta.branch = None;
        if target == SpecStatus::Completed {
            self.meta.completed_at = Some(Utc::now());
        }
        self.touch();

        io::copy_dir(&src, &paths::spec_dir(root, dst_partition, &self.slug))?;
        self.partition = dst_partition;
        self.save(root)?;
        std::fs::remove_dir_all(&src)?;
        Ok(())
    }
}

/// Directory names under a partition, skipping the terminal subdirectories
/// that nest inside the active one.
fn slugs_in(root: &Path, partition: Partition) -> Result<Vec<String>> {
    let dir = partition.dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut slugs = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if partition == Partition::Active
            && (name == paths::COMPLETED_SUBDIR || name == paths::ABANDONED_SUBDIR)
        {
            continue;
        }
        if entry.path().join(paths::SPEC_FILE).exists() {
            slugs.push(name);
        }
    }
    slugs.sort();
    Ok(slugs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
