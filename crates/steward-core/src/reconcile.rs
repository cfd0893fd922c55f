//! Bidirectional reconciliation between local spec records and GitHub issues.
//!
//! Planning is pure: [`build_sync_plan`] looks at local records and remote
//! issues and produces a [`SyncPlan`] without touching anything. Execution
//! applies the plan one action at a time; a failure partway leaves every
//! already-applied action in place, and the next run plans from the new
//! state.
//!
//! Change detection is hash-based. Each record stores the content hash it
//! last pushed and the remote hash it last saw; a side counts as changed
//! when its current hash differs from the stored one. Both sides changed
//! means conflict, and conflicts are never auto-resolved.

use crate::config::Config;
use crate::error::{Result, StewardError};
use crate::git::Git;
use crate::github::{Comment, GitHub, Issue, IssueUpdate, COMPLETE_MARKER};
use crate::report::Outcome;
use crate::spec::Spec;
use crate::types::SpecStatus;
use crate::worktree;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Divides the locally-authored portion of a spec body from the mirrored
/// remote discussion below it.
pub const COMMENT_SEPARATOR: &str = "\n\n===\n***\n===\n\n";

// ---------------------------------------------------------------------------
// Content hashing
// ---------------------------------------------------------------------------

pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A missing stored hash counts as changed: first sync always pushes.
pub fn content_differs(stored: Option<&str>, current: &str) -> bool {
    match stored {
        Some(stored) => stored != current,
        None => true,
    }
}

/// The locally-authored portion of a spec body, everything above the
/// comment separator.
pub fn local_portion(body: &str) -> &str {
    match body.find(COMMENT_SEPARATOR) {
        Some(idx) => &body[..idx],
        None => body,
    }
}

/// Compose a record body from the authored portion and the remote
/// discussion mirror.
pub fn compose_body(local: &str, comments: &[Comment]) -> String {
    if comments.is_empty() {
        return local.to_string();
    }
    let mut out = local.trim_end().to_string();
    out.push_str(COMMENT_SEPARATOR);
    let rendered: Vec<String> = comments
        .iter()
        .map(|c| format!("**@{}** ({}):\n\n{}", c.user.login, c.created_at, c.body))
        .collect();
    out.push_str(&rendered.join("\n\n---\n\n"));
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncActionKind {
    /// Local spec with no issue: create the issue.
    CreateIssue,
    /// Local body changed since last push: update the issue.
    UpdateIssue,
    /// Remote issue with no local record: create the record.
    CreateSpec,
    /// Remote body changed since last pull: update the record.
    UpdateSpec,
    /// Status or assignee label drifted: stamp local truth onto the issue.
    SyncStatus,
    /// Spec is terminal locally but the issue is still open: close it.
    CloseIssue,
    /// The completion PR merged: finish the spec locally.
    CompleteSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncAction {
    pub kind: SyncActionKind,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncConflict {
    pub slug: String,
    pub issue: u64,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncPlan {
    pub actions: Vec<SyncAction>,
    pub conflicts: Vec<SyncConflict>,
    pub drift: Vec<String>,
}

impl SyncPlan {
    pub fn has_changes(&self) -> bool {
        !self.actions.is_empty()
    }

    fn action(&mut self, kind: SyncActionKind, slug: &str, issue: Option<u64>, detail: String) {
        self.actions.push(SyncAction {
            kind,
            slug: slug.to_string(),
            issue,
            detail,
        });
    }

    pub fn of_kind(&self, kind: SyncActionKind) -> impl Iterator<Item = &SyncAction> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Build the reconciliation plan. Pure: `merged_slugs` carries the remote
/// "has this spec's completion PR merged" answers, and `vanished_branches`
/// the slugs whose feature branch is gone from the remote with no open
/// completion PR, so no network is needed here.
pub fn build_sync_plan(
    local: &[Spec],
    issues: &[Issue],
    merged_slugs: &HashSet<String>,
    vanished_branches: &HashSet<String>,
) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let mut claimed_issues: HashSet<u64> = HashSet::new();

    for spec in local {
        if !spec.status().is_terminal() && vanished_branches.contains(&spec.slug) {
            if let Some(branch) = &spec.meta.branch {
                plan.drift.push(format!(
                    "{}: branch '{}' is gone from the remote and no open completion PR references it",
                    spec.slug, branch
                ));
            }
        }

        let issue = spec
            .meta
            .issue_id
            .and_then(|id| issues.iter().find(|i| i.number == id));
        if let Some(issue) = issue {
            claimed_issues.insert(issue.number);
        }

        match (spec.status().is_terminal(), issue) {
            (true, Some(issue)) => {
                if issue.state == "open" {
                    plan.action(
                        SyncActionKind::CloseIssue,
                        &spec.slug,
                        Some(issue.number),
                        format!("spec is {}, issue #{} still open", spec.status(), issue.number),
                    );
                }
            }
            (true, None) => {}
            (false, None) => {
                if spec.meta.issue_id.is_some() {
                    // Issue number recorded but the issue is gone or unlabeled.
                    plan.drift.push(format!(
                        "{}: issue #{} not found among open spec issues",
                        spec.slug,
                        spec.meta.issue_id.unwrap_or_default()
                    ));
                } else {
                    plan.action(
                        SyncActionKind::CreateIssue,
                        &spec.slug,
                        None,
                        format!("no issue for '{}'", spec.meta.title),
                    );
                }
            }
            (false, Some(issue)) => {
                plan_matched_pair(&mut plan, spec, issue, merged_slugs);
            }
        }
    }

    // Remote issues nobody claimed become local records.
    let known_slugs: HashSet<&str> = local.iter().map(|s| s.slug.as_str()).collect();
    for issue in issues {
        if claimed_issues.contains(&issue.number) {
            continue;
        }
        let slug = crate::paths::slugify(&issue.title);
        if known_slugs.contains(slug.as_str()) {
            plan.drift.push(format!(
                "issue #{} ('{}') collides with existing spec '{}' but is not linked to it",
                issue.number, issue.title, slug
            ));
            continue;
        }
        plan.action(
            SyncActionKind::CreateSpec,
            &slug,
            Some(issue.number),
            format!("no local record for issue #{}", issue.number),
        );
    }

    plan
}

fn plan_matched_pair(
    plan: &mut SyncPlan,
    spec: &Spec,
    issue: &Issue,
    merged_slugs: &HashSet<String>,
) {
    // A merged completion PR settles everything else about the pair.
    if spec.status() == SpecStatus::MergeReady && merged_slugs.contains(&spec.slug) {
        plan.action(
            SyncActionKind::CompleteSpec,
            &spec.slug,
            Some(issue.number),
            "completion PR merged".to_string(),
        );
        return;
    }

    if issue.state != "open" {
        plan.drift.push(format!(
            "{}: issue #{} closed remotely while spec is {}",
            spec.slug,
            issue.number,
            spec.status()
        ));
    }

    let local_now = compute_content_hash(local_portion(&spec.body));
    let remote_now = compute_content_hash(issue.body.as_deref().unwrap_or(""));
    let local_changed = content_differs(spec.meta.local_content_hash.as_deref(), &local_now);
    let remote_changed = content_differs(spec.meta.remote_content_hash.as_deref(), &remote_now);

    match (local_changed, remote_changed) {
        (true, true) => {
            // First contact is not a conflict when one side is empty.
            if spec.meta.local_content_hash.is_none() && issue.body.as_deref().unwrap_or("").trim().is_empty() {
                plan.action(
                    SyncActionKind::UpdateIssue,
                    &spec.slug,
                    Some(issue.number),
                    "push initial body".to_string(),
                );
            } else {
                plan.conflicts.push(SyncConflict {
                    slug: spec.slug.clone(),
                    issue: issue.number,
                    detail: "both local record and issue changed since last sync".to_string(),
                });
            }
        }
        (true, false) => {
            plan.action(
                SyncActionKind::UpdateIssue,
                &spec.slug,
                Some(issue.number),
                "local record changed".to_string(),
            );
        }
        (false, true) => {
            plan.action(
                SyncActionKind::UpdateSpec,
                &spec.slug,
                Some(issue.number),
                "issue changed".to_string(),
            );
        }
        (false, false) => {}
    }

    let label_status = issue.status_from_labels();
    let assignee_drift = match (&spec.meta.assigned_to, issue.assignees.first()) {
        (Some(local), Some(remote)) => local != &remote.login,
        (Some(_), None) | (None, Some(_)) => true,
        (None, None) => false,
    };
    if label_status != Some(spec.status()) || assignee_drift {
        plan.action(
            SyncActionKind::SyncStatus,
            &spec.slug,
            Some(issue.number),
            format!(
                "issue labels say {}, record says {}",
                label_status.map(|s| s.to_string()).unwrap_or_else(|| "nothing".to_string()),
                spec.status()
            ),
        );
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub outcome: Outcome,
    pub plan: SyncPlan,
    pub applied: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct Reconciler<'a> {
    pub root: &'a Path,
    pub git: &'a Git,
    pub gh: &'a GitHub,
    pub cfg: &'a Config,
}

impl<'a> Reconciler<'a> {
    /// Refresh the integration branch and compute the plan.
    pub fn plan(&self) -> Result<SyncPlan> {
        self.refresh_integration()?;
        let (specs, issues, merged, vanished) = self.gather()?;
        Ok(build_sync_plan(&specs, &issues, &merged, &vanished))
    }

    /// Full reconciliation pass. With `dry_run`, stops after planning.
    pub fn run(&self, dry_run: bool) -> Result<SyncReport> {
        self.refresh_integration()?;
        let (specs, issues, merged, vanished) = self.gather()?;
        let plan = build_sync_plan(&specs, &issues, &merged, &vanished);

        if dry_run {
            return Ok(SyncReport {
                outcome: Outcome::DryRun,
                plan,
                applied: Vec::new(),
                warnings: Vec::new(),
            });
        }

        let mut applied = Vec::new();
        let mut warnings = Vec::new();

        for action in &plan.actions {
            self.apply(action, &issues)?;
            applied.push(format!("{:?} {}", action.kind, action.slug));
        }

        // Record mutations ride home on the integration branch.
        if self.git.commit_all("steward: sync spec records")? {
            match self.git.push(&self.cfg.branches.integration) {
                Ok(()) => applied.push("pushed record updates".to_string()),
                Err(StewardError::Conflict { detail, .. }) => {
                    warnings.push(format!(
                        "push rejected ({detail}); records committed locally, pull and re-run sync"
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        let outcome = if applied.is_empty() {
            Outcome::NothingToDo
        } else {
            Outcome::Success
        };
        Ok(SyncReport {
            outcome,
            plan,
            applied,
            warnings,
        })
    }

    fn refresh_integration(&self) -> Result<()> {
        let integration = &self.cfg.branches.integration;
        let current = self.git.current_branch()?;
        if &current != integration {
            return Err(StewardError::Precondition(format!(
                "sync runs on '{integration}' (currently on '{current}')"
            )));
        }
        self.git.fetch_prune()?;
        if self.git.remote_branch_exists(integration) {
            self.git.pull_ff_only().map_err(|e| match e {
                StewardError::Conflict { detail, .. } => StewardError::Conflict {
                    op: "sync".to_string(),
                    detail: format!("cannot fast-forward '{integration}': {detail}; resolve manually and re-run"),
                },
                other => other,
            })?;
        }
        Ok(())
    }

    fn gather(&self) -> Result<(Vec<Spec>, Vec<Issue>, HashSet<String>, HashSet<String>)> {
        let specs = Spec::list_all(self.root)?;
        let issues = self.gh.list_spec_issues()?;
        let mut merged = HashSet::new();
        for spec in &specs {
            if spec.status() != SpecStatus::MergeReady {
                continue;
            }
            if let Some(number) = spec.meta.pr_url.as_deref().and_then(pr_number_from_url) {
                if self.gh.is_pull_merged(number)? {
                    merged.insert(spec.slug.clone());
                }
            }
        }

        // A recorded feature branch that fetch --prune no longer sees, with
        // neither a merged nor an open completion PR to account for it, is
        // drift worth reporting.
        let open_pulls = self.gh.list_open_pulls(&self.cfg.branches.integration)?;
        let mut vanished = HashSet::new();
        for spec in &specs {
            if spec.status().is_terminal() || merged.contains(&spec.slug) {
                continue;
            }
            let Some(branch) = spec.meta.branch.as_deref() else {
                continue;
            };
            if self.git.remote_branch_exists(branch) {
                continue;
            }
            if open_pulls.iter().any(|p| p.head.name == branch) {
                continue;
            }
            vanished.insert(spec.slug.clone());
        }
        Ok((specs, issues, merged, vanished))
    }

    fn apply(&self, action: &SyncAction, issues: &[Issue]) -> Result<()> {
        let issue = action
            .issue
            .and_then(|n| issues.iter().find(|i| i.number == n));
        match action.kind {
            SyncActionKind::CreateIssue => {
                let mut spec = Spec::load(self.root, &action.slug)?;
                self.gh.ensure_labels()?;
                let body = local_portion(&spec.body).to_string();
                let assignees: Vec<String> =
                    spec.meta.assigned_to.iter().cloned().collect();
                let issue =
                    self.gh
                        .create_issue(&spec.meta.title, &body, spec.status(), &assignees)?;
                spec.meta.issue_id = Some(issue.number);
                spec.meta.issue_url = Some(issue.html_url);
                self.stamp_hashes(&mut spec, &body, &body);
                spec.save(self.root)?;
            }
            SyncActionKind::UpdateIssue => {
                let mut spec = Spec::load(self.root, &action.slug)?;
                let Some(issue) = issue else { return Ok(()) };
                let body = local_portion(&spec.body).to_string();
                self.gh.update_issue(
                    issue.number,
                    &IssueUpdate {
                        title: Some(spec.meta.title.clone()),
                        body: Some(body.clone()),
                        ..Default::default()
                    },
                )?;
                self.stamp_hashes(&mut spec, &body, &body);
                spec.save(self.root)?;
            }
            SyncActionKind::CreateSpec => {
                let Some(issue) = issue else { return Ok(()) };
                let remote_body = issue.body.clone().unwrap_or_default();
                let comments = self.gh.list_comments(issue.number)?;
                let mut spec = Spec::create(self.root, &issue.title, &compose_body(&remote_body, &comments))?;
                spec.meta.issue_id = Some(issue.number);
                spec.meta.issue_url = Some(issue.html_url.clone());
                self.stamp_hashes(&mut spec, &remote_body, &remote_body);
                spec.save(self.root)?;
            }
            SyncActionKind::UpdateSpec => {
                let mut spec = Spec::load(self.root, &action.slug)?;
                let Some(issue) = issue else { return Ok(()) };
                let remote_body = issue.body.clone().unwrap_or_default();
                let comments = self.gh.list_comments(issue.number)?;
                spec.body = compose_body(&remote_body, &comments);
                spec.meta.title = issue.title.clone();
                self.stamp_hashes(&mut spec, &remote_body, &remote_body);
                spec.save(self.root)?;
            }
            SyncActionKind::SyncStatus => {
                let spec = Spec::load(self.root, &action.slug)?;
                let Some(issue) = issue else { return Ok(()) };
                self.gh.set_status_label(issue, spec.status())?;
                let assignees: Vec<String> =
                    spec.meta.assigned_to.iter().cloned().collect();
                self.gh.update_issue(
                    issue.number,
                    &IssueUpdate {
                        assignees: Some(assignees),
                        ..Default::default()
                    },
                )?;
                let mut spec = spec;
                spec.meta.last_synced_at = Some(Utc::now());
                spec.save(self.root)?;
            }
            SyncActionKind::CloseIssue => {
                let spec = Spec::load(self.root, &action.slug)?;
                let Some(issue) = issue else { return Ok(()) };
                self.gh.close_issue_with_comment(
                    issue.number,
                    &format!("Spec '{}' is {} locally.", spec.slug, spec.status()),
                )?;
            }
            SyncActionKind::CompleteSpec => {
                self.complete_merged(&action.slug, issue)?;
            }
        }
        Ok(())
    }

    fn complete_merged(&self, slug: &str, issue: Option<&Issue>) -> Result<()> {
        let mut spec = Spec::load(self.root, slug)?;
        let branch = spec.meta.branch.clone();
        if let Some(issue) = issue {
            self.gh.close_issue_with_comment(
                issue.number,
                &format!("{COMPLETE_MARKER} PR merged; spec completed."),
            )?;
        }
        spec.move_to_terminal(self.root, SpecStatus::Completed)?;

        // The feature branch and worktree are done with.
        if let Some(branch) = branch {
            if let Err(e) = self.gh.delete_branch_ref(&branch) {
                tracing::warn!(branch = %branch, error = %e, "failed to delete remote branch");
            }
            if self.git.branch_exists(&branch) {
                if let Err(e) = self.git.delete_local_branch(&branch) {
                    tracing::warn!(branch = %branch, error = %e, "failed to delete local branch");
                }
            }
        }
        if let Err(e) = worktree::remove(self.git, self.root, slug) {
            tracing::warn!(slug = %slug, error = %e, "failed to remove worktree");
        }
        Ok(())
    }

    fn stamp_hashes(&self, spec: &mut Spec, local: &str, remote: &str) {
        spec.meta.local_content_hash = Some(compute_content_hash(local));
        spec.meta.remote_content_hash = Some(compute_content_hash(remote));
        spec.meta.last_synced_at = Some(Utc::now());
    }
}

pub fn pr_number_from_url(url: &str) -> Option<u64> {
    url.rsplit('/').next()?.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
