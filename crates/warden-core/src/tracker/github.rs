//! GitHub REST client implementing [`IssueTracker`].

use super::IssueTracker;
use crate::error::{Result, WardenError};
use crate::types::{
    CommitIdentity, Issue, IssueComment, IssueState, PullRequest, PullRequestState, RepoRef,
    TimelineEvent, User, UserKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const GITHUB_API_URL: &str = "https://api.github.com";

const PER_PAGE: u32 = 100;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
    id: u64,
    #[serde(rename = "type", default)]
    account_type: Option<String>,
}

impl From<RawUser> for User {
    fn from(raw: RawUser) -> Self {
        let kind = raw
            .account_type
            .as_deref()
            .map(UserKind::from_account_type)
            .unwrap_or(UserKind::Human);
        User {
            login: raw.login,
            id: raw.id,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    html_url: String,
    #[serde(default)]
    assignees: Vec<RawUser>,
    #[serde(default)]
    assignee: Option<RawUser>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    created_at: DateTime<Utc>,
    state: String,
    #[serde(default)]
    pull_request: Option<RawPullRequestLink>,
}

impl RawIssue {
    fn into_issue(self, repo: &RepoRef) -> Issue {
        Issue {
            repo: repo.clone(),
            number: self.number,
            url: self.html_url,
            assignees: self.assignees.into_iter().map(User::from).collect(),
            assignee: self.assignee.map(User::from),
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            created_at: self.created_at,
            state: if self.state == "closed" {
                IssueState::Closed
            } else {
                IssueState::Open
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPullRequestLink {
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawTimelineEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    actor: Option<RawUser>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    author: Option<CommitIdentity>,
    #[serde(default)]
    assignee: Option<RawUser>,
}

impl From<RawTimelineEvent> for TimelineEvent {
    fn from(raw: RawTimelineEvent) -> Self {
        TimelineEvent {
            event: raw.event,
            actor: raw.actor.map(User::from),
            created_at: raw.created_at,
            author: raw.author,
            assignee: raw.assignee.map(User::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    user: Option<RawUser>,
}

impl From<RawComment> for IssueComment {
    fn from(raw: RawComment) -> Self {
        IssueComment {
            id: raw.id,
            body: raw.body.unwrap_or_default(),
            created_at: raw.created_at,
            author: raw.user.map(User::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    items: Vec<RawSearchItem>,
}

#[derive(Debug, Deserialize)]
struct RawSearchItem {
    number: u64,
    html_url: String,
    state: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    pull_request: Option<RawPullRequestLink>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    state: String,
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, GITHUB_API_URL)
    }

    /// Client against a different API root (GitHub Enterprise, tests).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("warden/0.1"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authed(req).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(WardenError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(self.http.get(url)).await?;
        Ok(response.json().await?)
    }

    /// Follow `Link: rel="next"` until exhausted. Items that fail to decode
    /// are dropped so one odd entry never loses the whole page.
    async fn get_paginated<T: DeserializeOwned>(&self, first: String) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let response = self.send(self.http.get(&url)).await?;
            next = next_link(response.headers());
            let page: Vec<serde_json::Value> = response.json().await?;
            for value in page {
                match serde_json::from_value::<T>(value) {
                    Ok(item) => items.push(item),
                    Err(e) => debug!(url = %url, error = %e, "skipping undecodable item"),
                }
            }
        }
        Ok(items)
    }
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains("rel=\"next\"") {
            return None;
        }
        let target = target.trim();
        Some(target.strip_prefix('<')?.strip_suffix('>')?.to_string())
    })
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Issue> {
        let raw: RawIssue = self
            .get_json(&self.url(&format!("/repos/{repo}/issues/{number}")))
            .await?;
        Ok(raw.into_issue(repo))
    }

    async fn list_assigned_issues(&self, repo: &RepoRef) -> Result<Vec<Issue>> {
        let raw: Vec<RawIssue> = self
            .get_paginated(self.url(&format!(
                "/repos/{repo}/issues?state=open&assignee=*&per_page={PER_PAGE}"
            )))
            .await?;
        Ok(raw
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(|i| i.into_issue(repo))
            .collect())
    }

    async fn list_timeline(&self, repo: &RepoRef, number: u64) -> Result<Vec<TimelineEvent>> {
        let raw: Vec<RawTimelineEvent> = self
            .get_paginated(self.url(&format!(
                "/repos/{repo}/issues/{number}/timeline?per_page={PER_PAGE}"
            )))
            .await?;
        Ok(raw.into_iter().map(TimelineEvent::from).collect())
    }

    async fn list_comments(&self, repo: &RepoRef, number: u64) -> Result<Vec<IssueComment>> {
        let raw: Vec<RawComment> = self
            .get_paginated(self.url(&format!(
                "/repos/{repo}/issues/{number}/comments?per_page={PER_PAGE}"
            )))
            .await?;
        Ok(raw.into_iter().map(IssueComment::from).collect())
    }

    async fn get_comment(&self, repo: &RepoRef, comment_id: u64) -> Result<IssueComment> {
        let raw: RawComment = self
            .get_json(&self.url(&format!("/repos/{repo}/issues/comments/{comment_id}")))
            .await?;
        Ok(raw.into())
    }

    async fn create_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let req = self
            .http
            .post(self.url(&format!("/repos/{repo}/issues/{number}/comments")))
            .json(&serde_json::json!({ "body": body }));
        let raw: RawComment = self.send(req).await?.json().await?;
        Ok(raw.into())
    }

    async fn update_comment(&self, repo: &RepoRef, comment_id: u64, body: &str) -> Result<()> {
        let req = self
            .http
            .patch(self.url(&format!("/repos/{repo}/issues/comments/{comment_id}")))
            .json(&serde_json::json!({ "body": body }));
        self.send(req).await?;
        Ok(())
    }

    async fn remove_assignees(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> Result<()> {
        let req = self
            .http
            .delete(self.url(&format!("/repos/{repo}/issues/{number}/assignees")))
            .json(&serde_json::json!({ "assignees": logins }));
        self.send(req).await?;
        Ok(())
    }

    async fn search_pull_requests(
        &self,
        repo: &RepoRef,
        issue_number: u64,
    ) -> Result<Vec<PullRequest>> {
        let query = format!("repo:{repo} is:pr {issue_number} in:body");
        let req = self
            .http
            .get(self.url("/search/issues"))
            .query(&[("q", query.as_str()), ("per_page", "100")]);
        let results: SearchResults = self.send(req).await?.json().await?;
        Ok(results
            .items
            .into_iter()
            .filter_map(|item| {
                let link = item.pull_request?;
                let state = if link.merged_at.is_some() {
                    PullRequestState::Merged
                } else if item.state == "open" {
                    PullRequestState::Open
                } else {
                    PullRequestState::Closed
                };
                Some(PullRequest {
                    repo: repo.clone(),
                    number: item.number,
                    url: item.html_url,
                    state,
                    body: item.body,
                    author: item.user.map(|u| u.login),
                })
            })
            .collect())
    }

    async fn pull_request_approved(&self, repo: &RepoRef, number: u64) -> Result<bool> {
        let reviews: Vec<RawReview> = self
            .get_paginated(self.url(&format!(
                "/repos/{repo}/pulls/{number}/reviews?per_page={PER_PAGE}"
            )))
            .await?;
        let decision = reviews
            .iter()
            .rev()
            .find(|r| r.state == "APPROVED" || r.state == "CHANGES_REQUESTED");
        Ok(decision.is_some_and(|r| r.state == "APPROVED"))
    }

    async fn resolve_user_id(&self, login: &str) -> Result<Option<u64>> {
        match self
            .get_json::<RawUser>(&self.url(&format!("/users/{login}")))
            .await
        {
            Ok(user) => Ok(Some(user.id)),
            Err(WardenError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                warn!(login, "user not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
