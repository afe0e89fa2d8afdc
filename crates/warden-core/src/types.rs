use crate::error::WardenError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RepoRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Key used by the tracking store.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepoRef {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(RepoRef::new(owner, name))
            }
            _ => Err(WardenError::InvalidRepo(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    Human,
    Bot,
}

impl UserKind {
    /// Maps the tracker's account `type` field ("User", "Bot", "Organization").
    pub fn from_account_type(account_type: &str) -> Self {
        if account_type.eq_ignore_ascii_case("bot") {
            UserKind::Bot
        } else {
            UserKind::Human
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserKind::Human => "human",
            UserKind::Bot => "bot",
        }
    }
}

impl fmt::Display for UserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
    pub kind: UserKind,
}

impl User {
    pub fn human(login: impl Into<String>, id: u64) -> Self {
        Self {
            login: login.into(),
            id,
            kind: UserKind::Human,
        }
    }

    pub fn bot(login: impl Into<String>, id: u64) -> Self {
        Self {
            login: login.into(),
            id,
            kind: UserKind::Bot,
        }
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub repo: RepoRef,
    pub number: u64,
    pub url: String,
    #[serde(default)]
    pub assignees: Vec<User>,
    /// Single-assignee field kept by older tracker payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub state: IssueState,
}

impl Issue {
    /// Current assignees, falling back to the legacy single-assignee field.
    pub fn current_assignees(&self) -> Vec<User> {
        if !self.assignees.is_empty() {
            return self.assignees.clone();
        }
        self.assignee.iter().cloned().collect()
    }

    pub fn is_open(&self) -> bool {
        self.state == IssueState::Open
    }

    /// Short identifier for logs, e.g. `owner/repo#12`.
    pub fn reference(&self) -> String {
        format!("{}#{}", self.repo, self.number)
    }
}

// ---------------------------------------------------------------------------
// ActivityKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Commented,
    Committed,
    ReviewRequested,
    ReadyForReview,
}

impl ActivityKind {
    pub fn all() -> &'static [ActivityKind] {
        &[
            ActivityKind::Commented,
            ActivityKind::Committed,
            ActivityKind::ReviewRequested,
            ActivityKind::ReadyForReview,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Commented => "commented",
            ActivityKind::Committed => "committed",
            ActivityKind::ReviewRequested => "review_requested",
            ActivityKind::ReadyForReview => "ready_for_review",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commented" => Ok(ActivityKind::Commented),
            "committed" => Ok(ActivityKind::Committed),
            "review_requested" => Ok(ActivityKind::ReviewRequested),
            "ready_for_review" => Ok(ActivityKind::ReadyForReview),
            _ => Err(WardenError::Validation(format!("unknown activity kind '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Timeline (raw tracker data)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// One timeline entry as reported by the tracker. Every field is optional
/// because the tracker omits them freely depending on the event type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub actor: Option<User>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Present on `committed` entries.
    #[serde(default)]
    pub author: Option<CommitIdentity>,
    /// Present on `assigned` entries.
    #[serde(default)]
    pub assignee: Option<User>,
}

/// A normalized activity signal. Ephemeral, rebuilt on every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub created_at: DateTime<Utc>,
    pub author: String,
}

// ---------------------------------------------------------------------------
// Comments and pull requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub repo: RepoRef,
    pub number: u64,
    pub url: String,
    pub state: PullRequestState,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.state == PullRequestState::Open
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
