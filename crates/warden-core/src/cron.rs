//! Batch refresh of tracked issues.
//!
//! Trackers hide or prune comments that have not changed in a long time. The
//! cron job touches every tracked comment by appending (or replacing) an
//! invisible timestamp, and drops entries whose issue is closed or
//! unassigned. All tracker calls go through a [`RateLimiter`].

use crate::error::Result;
use crate::ratelimit::RateLimiter;
use crate::tracker::IssueTracker;
use crate::tracking::{TrackedIssue, TrackingDb};
use crate::types::RepoRef;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

static REFRESH_RE: OnceLock<Regex> = OnceLock::new();

fn refresh_re() -> &'static Regex {
    REFRESH_RE.get_or_init(|| Regex::new(r"\n*<!-- Ubiquity - Refresh - \S+ -->").unwrap())
}

/// `body` with exactly one refresh stamp, at the end.
pub fn stamp_refresh(body: &str, now: DateTime<Utc>) -> String {
    let stripped = refresh_re().replace_all(body, "");
    format!(
        "{}\n\n<!-- Ubiquity - Refresh - {} -->",
        stripped.trim_end(),
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

// ---------------------------------------------------------------------------
// CronMode / CronReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CronMode {
    /// Stop after the first entry of a repository refreshed successfully.
    FirstPerRepo,
    /// Refresh every entry.
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CronReport {
    pub refreshed: usize,
    /// Entries removed because the issue is closed, unassigned or has no comment.
    pub pruned: usize,
    pub failed: usize,
}

enum Outcome {
    Refreshed,
    Pruned,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub async fn run_cron(
    tracker: &dyn IssueTracker,
    store: &TrackingDb,
    limiter: &mut RateLimiter,
    mode: CronMode,
    now: DateTime<Utc>,
) -> Result<CronReport> {
    let mut report = CronReport::default();

    for (repo, entries) in store.get_all()? {
        debug!(repo = %repo, entries = entries.len(), "refreshing repository");
        for entry in entries {
            let Some(comment_id) = entry.comment_id else {
                prune(store, &repo, entry);
                report.pruned += 1;
                continue;
            };

            limiter.acquire().await;
            let result = refresh(tracker, store, &repo, entry, comment_id, now).await;
            limiter.record();

            match result {
                Ok(Outcome::Refreshed) => {
                    report.refreshed += 1;
                    if mode == CronMode::FirstPerRepo {
                        break;
                    }
                }
                Ok(Outcome::Pruned) => report.pruned += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(repo = %repo, issue = entry.issue_number, error = %e, "refresh failed");
                }
            }
        }
    }

    info!(
        refreshed = report.refreshed,
        pruned = report.pruned,
        failed = report.failed,
        "cron run complete"
    );
    Ok(report)
}

async fn refresh(
    tracker: &dyn IssueTracker,
    store: &TrackingDb,
    repo: &RepoRef,
    entry: TrackedIssue,
    comment_id: u64,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let issue = tracker.get_issue(repo, entry.issue_number).await?;
    if !issue.is_open() || issue.current_assignees().is_empty() {
        prune(store, repo, entry);
        return Ok(Outcome::Pruned);
    }

    let comment = tracker.get_comment(repo, comment_id).await?;
    tracker
        .update_comment(repo, comment_id, &stamp_refresh(&comment.body, now))
        .await?;
    debug!(issue = %issue.reference(), comment_id, "comment refreshed");
    Ok(Outcome::Refreshed)
}

fn prune(store: &TrackingDb, repo: &RepoRef, entry: TrackedIssue) {
    match store.remove(repo, entry.issue_number) {
        Ok(_) => info!(repo = %repo, issue = entry.issue_number, "stopped tracking"),
        Err(e) => warn!(repo = %repo, issue = entry.issue_number, error = %e, "failed to remove tracking entry"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
