use crate::error::Result;
use crate::paths;
use crate::record;
use crate::spec::Spec;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;

static LOG_FILE_RE: OnceLock<Regex> = OnceLock::new();

fn log_file_re() -> &'static Regex {
    LOG_FILE_RE.get_or_init(|| Regex::new(r"^(.+)_(\d{8})_(\d{6})_session\.md$").unwrap())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMeta {
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// A session work log under a spec's `logs/` directory. The timestamp is
/// encoded in the filename so logs sort chronologically in a plain listing.
#[derive(Debug, Clone)]
pub struct WorkLog {
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
    pub body: String,
}

impl WorkLog {
    pub fn create(
        root: &std::path::Path,
        spec: &Spec,
        author: &str,
        notes: &str,
    ) -> Result<WorkLog> {
        let now = Utc::now();
        let filename = format!(
            "{}_{}_session.md",
            author,
            now.format("%Y%m%d_%H%M%S")
        );
        let path = paths::logs_dir(root, spec.partition, &spec.slug).join(filename);
        let meta = LogMeta {
            author: author.to_string(),
            created_at: now,
        };
        record::write(&path, &meta, notes)?;
        Ok(WorkLog {
            author: author.to_string(),
            created_at: now,
            path,
            body: notes.to_string(),
        })
    }

    /// Logs for a spec, newest first. Timestamps come from the filename;
    /// files that don't match the naming scheme are skipped.
    pub fn list(root: &std::path::Path, spec: &Spec) -> Result<Vec<WorkLog>> {
        let dir = paths::logs_dir(root, spec.partition, &spec.slug);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut logs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = log_file_re().captures(&name) else {
                continue;
            };
            let stamp = format!("{} {}", &caps[2], &caps[3]);
            let Ok(naive) = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d %H%M%S") else {
                continue;
            };
            let (_meta, body) = record::read::<LogMeta>(&entry.path())?;
            logs.push(WorkLog {
                author: caps[1].to_string(),
                created_at: Utc.from_utc_datetime(&naive),
                path: entry.path(),
                body,
            });
        }
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(logs)
    }

    pub fn latest(root: &std::path::Path, spec: &Spec) -> Result<Option<WorkLog>> {
        Ok(Self::list(root, spec)?.into_iter().next())
    }
}

/// Whether the newest log for the spec is younger than the recency window.
pub fn has_recent_log(root: &std::path::Path, spec: &Spec, window_minutes: u64) -> Result<bool> {
    let Some(latest) = WorkLog::latest(root, spec)? else {
        return Ok(false);
    };
    let age = Utc::now() - latest.created_at;
    Ok(age <= Duration::minutes(window_minutes as i64))
}
