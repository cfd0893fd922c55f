use crate::error::Result;
use crate::paths::Partition;
use crate::spec::Spec;
use crate::types::SpecStatus;
use crate::worktree::WorkContext;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct SpecSummary {
    pub slug: String,
    pub title: String,
    pub status: SpecStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<u64>,
}

impl From<&Spec> for SpecSummary {
    fn from(spec: &Spec) -> Self {
        Self {
            slug: spec.slug.clone(),
            title: spec.meta.title.clone(),
            status: spec.status(),
            assigned_to: spec.meta.assigned_to.clone(),
            branch: spec.meta.branch.clone(),
            issue_id: spec.meta.issue_id,
        }
    }
}

/// Point-in-time view of the store, grouped by status, plus which spec the
/// caller is standing inside (if invoked from a worktree).
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<SpecSummary>,
    pub by_status: BTreeMap<String, Vec<SpecSummary>>,
    pub completed: usize,
    pub abandoned: usize,
}

impl Snapshot {
    pub fn capture(root: &Path, project: &str, ctx: &WorkContext) -> Result<Snapshot> {
        let mut by_status: BTreeMap<String, Vec<SpecSummary>> = BTreeMap::new();
        for spec in Spec::list(root, Partition::Active)? {
            by_status
                .entry(spec.status().to_string())
                .or_default()
                .push(SpecSummary::from(&spec));
        }
        let active = match &ctx.active_slug {
            Some(slug) => Spec::load(root, slug).ok().map(|s| SpecSummary::from(&s)),
            None => None,
        };
        Ok(Snapshot {
            project: project.to_string(),
            active,
            by_status,
            completed: Spec::list(root, Partition::Completed)?.len(),
            abandoned: Spec::list(root, Partition::Abandoned)?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn groups_by_status_and_counts_terminal() {
        let dir = TempDir::new().unwrap();
        Spec::create(dir.path(), "alpha", "").unwrap();
        let mut beta = Spec::create(dir.path(), "beta", "").unwrap();
        beta.assign("alice", "dev-alice-beta").unwrap();
        beta.save(dir.path()).unwrap();
        let mut gone = Spec::create(dir.path(), "gone", "").unwrap();
        gone.move_to_terminal(dir.path(), SpecStatus::Abandoned).unwrap();

        let ctx = WorkContext {
            main_repo: dir.path().to_path_buf(),
            worktree: None,
            active_slug: None,
        };
        let snap = Snapshot::capture(dir.path(), "demo", &ctx).unwrap();
        assert_eq!(snap.by_status["todo"].len(), 1);
        assert_eq!(snap.by_status["in_progress"].len(), 1);
        assert_eq!(snap.abandoned, 1);
        assert_eq!(snap.completed, 0);
        assert!(snap.active.is_none());
    }
}
