//! Blocking GitHub REST client covering the reconciler's needs.
//!
//! Responses deserialize into subset-of-fields structs; anything steward does
//! not read is dropped at the wire. The API base URL is injectable so tests
//! can run against a local mock server.

use crate::error::{Result, StewardError};
use crate::types::SpecStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("steward/", env!("CARGO_PKG_VERSION"));

/// Label put on every issue steward manages.
pub const SPEC_LABEL: &str = "steward-spec";
pub const STATUS_LABEL_PREFIX: &str = "steward-status:";

/// Title prefix marking a PR as a spec completion.
pub const COMPLETE_MARKER: &str = "[Complete]:";

pub fn status_label(status: SpecStatus) -> String {
    format!("{STATUS_LABEL_PREFIX}{}", status.as_str())
}

fn label_color(status: SpecStatus) -> &'static str {
    match status {
        SpecStatus::Todo => "6B7280",
        SpecStatus::InProgress => "3B82F6",
        SpecStatus::MergeReady => "8B5CF6",
        SpecStatus::Completed => "22C55E",
        SpecStatus::Abandoned => "6B7280",
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

/// An issue, as steward reads it. PRs also arrive through the issues
/// endpoint; `pull_request` being present is how they are told apart.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub html_url: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<User>,
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn status_from_labels(&self) -> Option<SpecStatus> {
        self.labels
            .iter()
            .find_map(|l| l.name.strip_prefix(STATUS_LABEL_PREFIX))
            .and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub body: String,
    pub user: User,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub html_url: String,
    pub head: GitRef,
    pub base: GitRef,
    pub merged_at: Option<String>,
    pub mergeable: Option<bool>,
    pub mergeable_state: Option<String>,
}

impl PullRequest {
    pub fn is_completion(&self) -> bool {
        self.title.starts_with(COMPLETE_MARKER)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRun {
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckRunList {
    check_runs: Vec<CheckRun>,
}

/// Rolled-up state of every check run on a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    /// No check runs reported on the commit.
    None,
    Pending,
    Failing,
    Passing,
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckState::None => "no checks",
            CheckState::Pending => "pending",
            CheckState::Failing => "failing",
            CheckState::Passing => "passing",
        };
        f.write_str(s)
    }
}

pub fn summarize_checks(runs: &[CheckRun]) -> CheckState {
    if runs.is_empty() {
        return CheckState::None;
    }
    if runs.iter().any(|r| r.status != "completed") {
        return CheckState::Pending;
    }
    let passed = |c: Option<&str>| matches!(c, Some("success" | "neutral" | "skipped"));
    if runs.iter().all(|r| passed(r.conclusion.as_deref())) {
        CheckState::Passing
    } else {
        CheckState::Failing
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GitHub {
    http: reqwest::blocking::Client,
    base: String,
    token: String,
    repo: String,
}

impl GitHub {
    /// Build a client for `owner/repo` with a token from the environment.
    /// `STEWARD_GITHUB_API` overrides the API base, for GHES and tests.
    pub fn from_env(repo: impl Into<String>) -> Result<Self> {
        let token = std::env::var("STEWARD_GITHUB_TOKEN")
            .or_else(|_| std::env::var("GITHUB_TOKEN"))
            .map_err(|_| StewardError::NoToken)?;
        let base = std::env::var("STEWARD_GITHUB_API")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(repo, token, base)
    }

    pub fn new(
        repo: impl Into<String>,
        token: impl Into<String>,
        base: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StewardError::RemoteUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            repo: repo.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}{}", self.base, self.repo, path)
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response> {
        let resp = req
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .map_err(|e| StewardError::RemoteUnavailable(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .text()
            .ok()
            .and_then(|body| {
                serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| v["message"].as_str().map(str::to_string))
                    .or(Some(body))
            })
            .unwrap_or_default();
        Err(StewardError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    // -----------------------------------------------------------------------
    // Issues
    // -----------------------------------------------------------------------

    /// Open spec issues, PRs filtered out.
    pub fn list_spec_issues(&self) -> Result<Vec<Issue>> {
        let url = self.url(&format!("/issues?state=open&labels={SPEC_LABEL}&per_page=100"));
        let issues: Vec<Issue> = self.send(self.http.get(url))?.json().map_err(wire_err)?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .collect())
    }

    pub fn get_issue(&self, number: u64) -> Result<Issue> {
        let url = self.url(&format!("/issues/{number}"));
        self.send(self.http.get(url))?.json().map_err(wire_err)
    }

    pub fn create_issue(
        &self,
        title: &str,
        body: &str,
        status: SpecStatus,
        assignees: &[String],
    ) -> Result<Issue> {
        let url = self.url("/issues");
        let payload = json!({
            "title": title,
            "body": body,
            "labels": [SPEC_LABEL, status_label(status)],
            "assignees": assignees,
        });
        self.send(self.http.post(url).json(&payload))?
            .json()
            .map_err(wire_err)
    }

    pub fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<Issue> {
        let url = self.url(&format!("/issues/{number}"));
        self.send(self.http.patch(url).json(update))?
            .json()
            .map_err(wire_err)
    }

    pub fn list_comments(&self, number: u64) -> Result<Vec<Comment>> {
        let url = self.url(&format!("/issues/{number}/comments?per_page=100"));
        self.send(self.http.get(url))?.json().map_err(wire_err)
    }

    pub fn comment(&self, number: u64, body: &str) -> Result<()> {
        let url = self.url(&format!("/issues/{number}/comments"));
        self.send(self.http.post(url).json(&json!({ "body": body })))?;
        Ok(())
    }

    pub fn close_issue_with_comment(&self, number: u64, comment: &str) -> Result<()> {
        self.comment(number, comment)?;
        self.update_issue(
            number,
            &IssueUpdate {
                state: Some("closed".to_string()),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Replace the status label on an issue, leaving other labels alone.
    pub fn set_status_label(&self, issue: &Issue, status: SpecStatus) -> Result<()> {
        let mut labels: Vec<String> = issue
            .labels
            .iter()
            .map(|l| l.name.clone())
            .filter(|n| !n.starts_with(STATUS_LABEL_PREFIX))
            .collect();
        if !labels.iter().any(|n| n == SPEC_LABEL) {
            labels.push(SPEC_LABEL.to_string());
        }
        labels.push(status_label(status));
        self.update_issue(
            issue.number,
            &IssueUpdate {
                labels: Some(labels),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Create the steward label set, ignoring ones that already exist.
    pub fn ensure_labels(&self) -> Result<()> {
        let mut defs = vec![(SPEC_LABEL.to_string(), "1F2937".to_string())];
        for status in SpecStatus::all() {
            defs.push((status_label(status), label_color(status).to_string()));
        }
        for (name, color) in defs {
            let url = self.url("/labels");
            match self.send(
                self.http
                    .post(url)
                    .json(&json!({ "name": name, "color": color })),
            ) {
                Ok(_) => {}
                Err(StewardError::Remote { status: 422, .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pull requests
    // -----------------------------------------------------------------------

    pub fn list_open_pulls(&self, base: &str) -> Result<Vec<PullRequest>> {
        let url = self.url(&format!("/pulls?state=open&base={base}&per_page=100"));
        self.send(self.http.get(url))?.json().map_err(wire_err)
    }

    pub fn get_pull(&self, number: u64) -> Result<PullRequest> {
        let url = self.url(&format!("/pulls/{number}"));
        self.send(self.http.get(url))?.json().map_err(wire_err)
    }

    pub fn create_pull(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest> {
        let url = self.url("/pulls");
        let payload = json!({ "title": title, "body": body, "head": head, "base": base });
        self.send(self.http.post(url).json(&payload))?
            .json()
            .map_err(wire_err)
    }

    /// 204 means merged, 404 means not merged.
    pub fn is_pull_merged(&self, number: u64) -> Result<bool> {
        let url = self.url(&format!("/pulls/{number}/merge"));
        match self.send(self.http.get(url)) {
            Ok(_) => Ok(true),
            Err(StewardError::Remote { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn merge_pull(&self, number: u64) -> Result<()> {
        let url = self.url(&format!("/pulls/{number}/merge"));
        self.send(self.http.put(url).json(&json!({ "merge_method": "rebase" })))?;
        Ok(())
    }

    pub fn close_pull(&self, number: u64) -> Result<()> {
        let url = self.url(&format!("/pulls/{number}"));
        self.send(self.http.patch(url).json(&json!({ "state": "closed" })))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Checks and branch protection
    // -----------------------------------------------------------------------

    pub fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        let url = self.url(&format!("/commits/{sha}/check-runs?per_page=100"));
        let list: CheckRunList = self.send(self.http.get(url))?.json().map_err(wire_err)?;
        Ok(list.check_runs)
    }

    /// Rolled-up check-run state for a commit.
    pub fn check_state(&self, sha: &str) -> Result<CheckState> {
        Ok(summarize_checks(&self.check_runs(sha)?))
    }

    /// Forbid force pushes and deletion on a pipeline branch. Protection is
    /// unavailable on some plans (404) and needs admin rights (403); both
    /// report as not-applied rather than failing the caller.
    pub fn protect_branch(&self, branch: &str) -> Result<bool> {
        let url = self.url(&format!("/branches/{branch}/protection"));
        let payload = json!({
            "required_status_checks": null,
            "enforce_admins": true,
            "required_pull_request_reviews": null,
            "restrictions": null,
            "allow_force_pushes": false,
            "allow_deletions": false,
        });
        match self.send(self.http.put(url).json(&payload)) {
            Ok(_) => Ok(true),
            Err(StewardError::Remote { status: 403, .. })
            | Err(StewardError::Remote { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Refs and identity
    // -----------------------------------------------------------------------

    /// Delete a remote branch ref. A branch already gone (404) or protected
    /// against the call shape (422) counts as success of intent.
    pub fn delete_branch_ref(&self, branch: &str) -> Result<bool> {
        let url = self.url(&format!("/git/refs/heads/{branch}"));
        match self.send(self.http.delete(url)) {
            Ok(_) => Ok(true),
            Err(StewardError::Remote { status: 404, .. })
            | Err(StewardError::Remote { status: 422, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn authenticated_user(&self) -> Result<String> {
        let url = format!("{}/user", self.base);
        let user: User = self.send(self.http.get(url))?.json().map_err(wire_err)?;
        Ok(user.login)
    }
}

fn wire_err(e: reqwest::Error) -> StewardError {
    StewardError::RemoteUnavailable(e.to_string())
}

/// Parse `owner/repo` out of a git remote URL, https or ssh form.
pub fn parse_repo_slug(url: &str) -> Option<String> {
    let path = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':').map(|(_, p)| p)
    } else if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://git@"))
    {
        rest.split_once('/').map(|(_, p)| p)
    } else {
        None
    }?;
    let path = path.strip_suffix(".git").unwrap_or(path);
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
        Some(format!("{}/{}", parts[0], parts[1]))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> GitHub {
        GitHub::new("acme/widgets", "token", server.url()).unwrap()
    }

    #[test]
    fn parse_repo_slug_forms() {
        for url in [
            "https://github.com/acme/widgets",
            "https://github.com/acme/widgets.git",
            "git@github.com:acme/widgets.git",
            "ssh://git@github.com/acme/widgets.git",
        ] {
            assert_eq!(parse_repo_slug(url).as_deref(), Some("acme/widgets"), "{url}");
        }
        assert!(parse_repo_slug("https://github.com/acme").is_none());
        assert!(parse_repo_slug("/local/path").is_none());
    }

    #[test]
    fn list_spec_issues_filters_pulls() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock(
                "GET",
                "/repos/acme/widgets/issues?state=open&labels=steward-spec&per_page=100",
            )
            .with_status(200)
            .with_body(
                r#"[
                  {"number": 1, "title": "Auth", "body": "b", "state": "open",
                   "html_url": "u", "labels": [{"name": "steward-spec"},
                   {"name": "steward-status:in_progress"}], "assignees": [],
                   "pull_request": null},
                  {"number": 2, "title": "[Complete]: Auth", "body": null,
                   "state": "open", "html_url": "u2", "labels": [],
                   "assignees": [], "pull_request": {"url": "x"}}
                ]"#,
            )
            .create();

        let issues = client(&server).list_spec_issues().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].number, 1);
        assert_eq!(
            issues[0].status_from_labels(),
            Some(SpecStatus::InProgress)
        );
    }

    #[test]
    fn is_pull_merged_maps_status_codes() {
        let mut server = mockito::Server::new();
        let _merged = server
            .mock("GET", "/repos/acme/widgets/pulls/7/merge")
            .with_status(204)
            .create();
        let _not = server
            .mock("GET", "/repos/acme/widgets/pulls/8/merge")
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create();

        let gh = client(&server);
        assert!(gh.is_pull_merged(7).unwrap());
        assert!(!gh.is_pull_merged(8).unwrap());
    }

    #[test]
    fn delete_branch_ref_tolerates_gone_and_protected() {
        let mut server = mockito::Server::new();
        let _gone = server
            .mock("DELETE", "/repos/acme/widgets/git/refs/heads/dev-a-x")
            .with_status(404)
            .with_body(r#"{"message": "Reference does not exist"}"#)
            .create();
        let _protected = server
            .mock("DELETE", "/repos/acme/widgets/git/refs/heads/dev-a-y")
            .with_status(422)
            .with_body(r#"{"message": "Reference update failed"}"#)
            .create();
        let _err = server
            .mock("DELETE", "/repos/acme/widgets/git/refs/heads/dev-a-z")
            .with_status(500)
            .with_body(r#"{"message": "boom"}"#)
            .create();

        let gh = client(&server);
        assert!(!gh.delete_branch_ref("dev-a-x").unwrap());
        assert!(!gh.delete_branch_ref("dev-a-y").unwrap());
        assert!(matches!(
            gh.delete_branch_ref("dev-a-z"),
            Err(StewardError::Remote { status: 500, .. })
        ));
    }

    #[test]
    fn check_runs_roll_up_to_a_single_state() {
        let run = |status: &str, conclusion: Option<&str>| CheckRun {
            name: "ci".to_string(),
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
        };
        assert_eq!(summarize_checks(&[]), CheckState::None);
        assert_eq!(
            summarize_checks(&[run("completed", Some("success")), run("in_progress", None)]),
            CheckState::Pending
        );
        assert_eq!(
            summarize_checks(&[run("completed", Some("success")), run("completed", Some("failure"))]),
            CheckState::Failing
        );
        assert_eq!(
            summarize_checks(&[run("completed", Some("success")), run("completed", Some("skipped"))]),
            CheckState::Passing
        );
    }

    #[test]
    fn check_state_reads_the_check_runs_endpoint() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/repos/acme/widgets/commits/abc123/check-runs?per_page=100")
            .with_status(200)
            .with_body(
                r#"{"total_count": 2, "check_runs": [
                  {"name": "build", "status": "completed", "conclusion": "success"},
                  {"name": "test", "status": "completed", "conclusion": "failure"}
                ]}"#,
            )
            .create();

        assert_eq!(
            client(&server).check_state("abc123").unwrap(),
            CheckState::Failing
        );
    }

    #[test]
    fn protect_branch_tolerates_missing_permissions_and_plan() {
        let mut server = mockito::Server::new();
        let _ok = server
            .mock("PUT", "/repos/acme/widgets/branches/main/protection")
            .with_status(200)
            .with_body("{}")
            .create();
        let _plan = server
            .mock("PUT", "/repos/acme/widgets/branches/test/protection")
            .with_status(404)
            .with_body(r#"{"message": "Branch protection not available"}"#)
            .create();
        let _perm = server
            .mock("PUT", "/repos/acme/widgets/branches/dev/protection")
            .with_status(403)
            .with_body(r#"{"message": "Resource not accessible"}"#)
            .create();

        let gh = client(&server);
        assert!(gh.protect_branch("main").unwrap());
        assert!(!gh.protect_branch("test").unwrap());
        assert!(!gh.protect_branch("dev").unwrap());
    }

    #[test]
    fn set_status_label_replaces_only_status() {
        let mut server = mockito::Server::new();
        let body_check = mockito::Matcher::JsonString(
            r#"{"labels": ["bug", "steward-spec", "steward-status:merge_ready"]}"#.to_string(),
        );
        let _m = server
            .mock("PATCH", "/repos/acme/widgets/issues/3")
            .match_body(body_check)
            .with_status(200)
            .with_body(
                r#"{"number": 3, "title": "t", "body": null, "state": "open",
                    "html_url": "u", "labels": [], "assignees": [], "pull_request": null}"#,
            )
            .create();

        let issue = Issue {
            number: 3,
            title: "t".into(),
            body: None,
            state: "open".into(),
            html_url: "u".into(),
            labels: vec![
                Label { name: "bug".into() },
                Label {
                    name: "steward-spec".into(),
                },
                Label {
                    name: "steward-status:todo".into(),
                },
            ],
            assignees: vec![],
            pull_request: None,
        };
        client(&server)
            .set_status_label(&issue, SpecStatus::MergeReady)
            .unwrap();
    }
}
