//! Issue-tracker port.
//!
//! The engine only talks to the tracker through [`IssueTracker`]. Two
//! implementations ship with the crate: [`GitHubClient`] for the real API and
//! [`MemoryTracker`] for tests and offline runs.

pub mod github;
pub mod memory;

pub use github::GitHubClient;
pub use memory::MemoryTracker;

use crate::error::Result;
use crate::types::{Issue, IssueComment, PullRequest, RepoRef, TimelineEvent};
use async_trait::async_trait;
use regex::Regex;

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Issue>;

    /// Open issues of `repo` that have at least one assignee.
    async fn list_assigned_issues(&self, repo: &RepoRef) -> Result<Vec<Issue>>;

    /// Full timeline of an issue or pull request, all pages.
    async fn list_timeline(&self, repo: &RepoRef, number: u64) -> Result<Vec<TimelineEvent>>;

    /// All comments of an issue or pull request, oldest first.
    async fn list_comments(&self, repo: &RepoRef, number: u64) -> Result<Vec<IssueComment>>;

    async fn get_comment(&self, repo: &RepoRef, comment_id: u64) -> Result<IssueComment>;

    async fn create_comment(&self, repo: &RepoRef, number: u64, body: &str)
        -> Result<IssueComment>;

    async fn update_comment(&self, repo: &RepoRef, comment_id: u64, body: &str) -> Result<()>;

    async fn remove_assignees(&self, repo: &RepoRef, number: u64, logins: &[String])
        -> Result<()>;

    /// Pull requests that mention `#issue_number`. Candidates only: callers
    /// filter them with [`closes_issue`].
    async fn search_pull_requests(
        &self,
        repo: &RepoRef,
        issue_number: u64,
    ) -> Result<Vec<PullRequest>>;

    /// Whether the most recent review decision on the pull request is an approval.
    async fn pull_request_approved(&self, repo: &RepoRef, number: u64) -> Result<bool>;

    async fn resolve_user_id(&self, login: &str) -> Result<Option<u64>>;
}

// ---------------------------------------------------------------------------
// Linked pull requests
// ---------------------------------------------------------------------------

/// True when `body` contains a closing keyword (`closes`, `fixes`,
/// `resolves` and their variants) pointing at `issue`.
pub fn closes_issue(body: &str, issue: &Issue) -> bool {
    let repo = regex::escape(&issue.repo.key());
    let pattern = format!(
        r"(?i)\b(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\b\s*:?\s+(?:(?:{repo})?#|https://github\.com/{repo}/issues/){}\b",
        issue.number
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(body),
        Err(_) => false,
    }
}

/// Pull requests whose description closes `issue`.
pub async fn linked_pull_requests(
    tracker: &dyn IssueTracker,
    issue: &Issue,
) -> Result<Vec<PullRequest>> {
    let candidates = tracker.search_pull_requests(&issue.repo, issue.number).await?;
    Ok(candidates
        .into_iter()
        .filter(|pr| pr.body.as_deref().is_some_and(|b| closes_issue(b, issue)))
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
