//! Tracker events that change what is tracked.

use crate::error::{Result, WardenError};
use crate::tracking::{TrackedIssue, TrackingDb};
use crate::types::RepoRef;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Raw fields accompanying an event name.
#[derive(Debug, Clone, Default)]
pub struct EventFields {
    pub comment_id: Option<u64>,
    /// Issues closed by a merged pull request.
    pub closes: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    IssueAssigned { comment_id: u64 },
    IssueUnassigned,
    IssueClosed,
    PullRequestMerged { closes: Vec<u64> },
    Unsupported(String),
}

impl TrackerEvent {
    /// Parse an event name such as `issues.assigned`. Unknown names become
    /// [`TrackerEvent::Unsupported`]; known names with missing fields fail.
    pub fn parse(name: &str, fields: &EventFields) -> Result<Self> {
        let event = match name {
            "issues.assigned" => {
                let comment_id = fields.comment_id.ok_or_else(|| {
                    WardenError::Validation(format!("{name} requires a comment id"))
                })?;
                TrackerEvent::IssueAssigned { comment_id }
            }
            "issues.unassigned" => TrackerEvent::IssueUnassigned,
            "issues.closed" => TrackerEvent::IssueClosed,
            "pull_request.merged" => TrackerEvent::PullRequestMerged {
                closes: fields.closes.clone(),
            },
            other => TrackerEvent::Unsupported(other.to_string()),
        };
        Ok(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Tracked,
    Untracked,
    Unsupported,
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventOutcome::Tracked => "tracked",
            EventOutcome::Untracked => "untracked",
            EventOutcome::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

pub fn handle_event(
    store: &TrackingDb,
    repo: &RepoRef,
    issue_number: u64,
    event: &TrackerEvent,
) -> Result<EventOutcome> {
    match event {
        TrackerEvent::IssueAssigned { comment_id } => {
            store.add(repo, TrackedIssue::new(issue_number, *comment_id))?;
            info!(repo = %repo, issue = issue_number, comment_id, "tracking issue");
            Ok(EventOutcome::Tracked)
        }
        TrackerEvent::IssueUnassigned | TrackerEvent::IssueClosed => {
            store.remove(repo, issue_number)?;
            info!(repo = %repo, issue = issue_number, "stopped tracking");
            Ok(EventOutcome::Untracked)
        }
        TrackerEvent::PullRequestMerged { closes } => {
            for number in closes {
                store.remove(repo, *number)?;
            }
            info!(repo = %repo, pull_request = issue_number, closes = ?closes, "stopped tracking closed issues");
            Ok(EventOutcome::Untracked)
        }
        TrackerEvent::Unsupported(name) => {
            debug!(event = %name, "unsupported event");
            Ok(EventOutcome::Unsupported)
        }
    }
}
