//! Activity aggregation.
//!
//! Gathers timeline entries of an issue and of every pull request that
//! closes it, and reduces them to [`ActivityEvent`]s attributable to the
//! current assignees. Incomplete entries are dropped, never reported.

use crate::error::Result;
use crate::tracker::IssueTracker;
use crate::types::{ActivityEvent, ActivityKind, Issue, PullRequest, TimelineEvent};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// UserIdCache
// ---------------------------------------------------------------------------

/// Login → account id lookups memoized for the duration of one run.
/// Keys are lowercased so `Alice` and `alice` share one lookup.
#[derive(Debug, Default)]
pub struct UserIdCache {
    ids: HashMap<String, Option<u64>>,
}

impl UserIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&mut self, tracker: &dyn IssueTracker, login: &str) -> Result<Option<u64>> {
        let key = login.to_lowercase();
        if let Some(id) = self.ids.get(&key) {
            return Ok(*id);
        }
        let id = tracker.resolve_user_id(login).await?;
        self.ids.insert(key, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn activity_kind(event: &str) -> Option<ActivityKind> {
    match event {
        "commented" => Some(ActivityKind::Commented),
        "committed" => Some(ActivityKind::Committed),
        "review_requested" => Some(ActivityKind::ReviewRequested),
        "ready_for_review" => Some(ActivityKind::ReadyForReview),
        _ => None,
    }
}

/// Commits are attributed by their author identity as recorded in git. That
/// identity need not map to a tracker account, so it is not matched against
/// the assignees.
fn commit_activity(event: &TimelineEvent) -> Option<ActivityEvent> {
    let author = event.author.as_ref()?;
    let created_at = author.date?;
    let who = author.name.clone().or_else(|| author.email.clone())?;
    Some(ActivityEvent {
        kind: ActivityKind::Committed,
        created_at,
        author: who,
    })
}

async fn normalize(
    tracker: &dyn IssueTracker,
    events: &[TimelineEvent],
    assignee_ids: &HashSet<u64>,
    cache: &mut UserIdCache,
    out: &mut Vec<ActivityEvent>,
) -> Result<()> {
    for event in events {
        let Some(kind) = event.event.as_deref().and_then(activity_kind) else {
            continue;
        };

        if kind == ActivityKind::Committed {
            out.extend(commit_activity(event));
            continue;
        }

        let (Some(actor), Some(created_at)) = (&event.actor, event.created_at) else {
            continue;
        };
        let Some(id) = cache.resolve(tracker, &actor.login).await? else {
            debug!(login = %actor.login, "actor could not be resolved");
            continue;
        };
        if assignee_ids.contains(&id) {
            out.push(ActivityEvent {
                kind,
                created_at,
                author: actor.login.clone(),
            });
        }
    }
    Ok(())
}

/// Activity of the assignees on `issue` and its linked pull requests, newest
/// first.
///
/// `issue_timeline` is passed in because callers already need it for the
/// assignment history. Timelines of linked pull requests are fetched here; a
/// failure on one of them is logged and that pull request is skipped.
pub async fn collect_activity(
    tracker: &dyn IssueTracker,
    issue: &Issue,
    issue_timeline: &[TimelineEvent],
    linked: &[PullRequest],
    assignee_ids: &HashSet<u64>,
    cache: &mut UserIdCache,
) -> Result<Vec<ActivityEvent>> {
    let mut activity = Vec::new();
    normalize(tracker, issue_timeline, assignee_ids, cache, &mut activity).await?;

    for pr in linked {
        match tracker.list_timeline(&pr.repo, pr.number).await {
            Ok(events) => normalize(tracker, &events, assignee_ids, cache, &mut activity).await?,
            Err(e) => warn!(
                issue = %issue.reference(),
                pull_request = pr.number,
                error = %e,
                "failed to read pull request timeline"
            ),
        }
    }

    activity.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(activity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::MemoryTracker;
    use crate::types::{CommitIdentity, IssueState, PullRequestState, RepoRef, User};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn repo() -> RepoRef {
        RepoRef::new("ubiquity", "pay")
    }

    fn issue() -> Issue {
        Issue {
            repo: repo(),
            number: 5,
            url: String::new(),
            assignees: vec![User::human("alice", 11)],
            assignee: None,
            labels: vec![],
            created_at: t0(),
            state: IssueState::Open,
        }
    }

    fn by(kind: &str, actor: User, minutes: i64) -> TimelineEvent {
        TimelineEvent {
            event: Some(kind.to_string()),
            actor: Some(actor),
            created_at: Some(t0() + Duration::minutes(minutes)),
            ..Default::default()
        }
    }

    fn ids() -> HashSet<u64> {
        [11].into_iter().collect()
    }

    #[tokio::test]
    async fn keeps_assignee_events_newest_first() {
        let tracker = MemoryTracker::new();
        tracker.insert_user(&User::human("alice", 11));
        tracker.insert_user(&User::human("mallory", 99));
        let timeline = vec![
            by("commented", User::human("alice", 11), 10),
            by("commented", User::human("mallory", 99), 20),
            by("labeled", User::human("alice", 11), 30),
            by("ready_for_review", User::human("Alice", 11), 40),
        ];
        let mut cache = UserIdCache::new();
        let activity = collect_activity(&tracker, &issue(), &timeline, &[], &ids(), &mut cache)
            .await
            .unwrap();

        let kinds: Vec<_> = activity.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::ReadyForReview, ActivityKind::Commented]
        );
        assert!(activity[0].created_at > activity[1].created_at);
    }

    #[tokio::test]
    async fn lookups_are_memoized_case_insensitively() {
        let tracker = MemoryTracker::new();
        tracker.insert_user(&User::human("alice", 11));
        let timeline = vec![
            by("commented", User::human("alice", 11), 1),
            by("commented", User::human("ALICE", 11), 2),
            by("commented", User::human("Alice", 11), 3),
        ];
        let mut cache = UserIdCache::new();
        let activity = collect_activity(&tracker, &issue(), &timeline, &[], &ids(), &mut cache)
            .await
            .unwrap();
        assert_eq!(activity.len(), 3);
        assert_eq!(tracker.user_lookups(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn commits_are_attributed_by_author_identity() {
        let tracker = MemoryTracker::new();
        let commit = TimelineEvent {
            event: Some("committed".into()),
            author: Some(CommitIdentity {
                name: Some("Alice Liddell".into()),
                email: Some("alice@example.com".into()),
                date: Some(t0() + Duration::hours(2)),
            }),
            ..Default::default()
        };
        let dateless = TimelineEvent {
            event: Some("committed".into()),
            author: Some(CommitIdentity {
                name: Some("Alice Liddell".into()),
                email: None,
                date: None,
            }),
            ..Default::default()
        };
        let mut cache = UserIdCache::new();
        let activity = collect_activity(
            &tracker,
            &issue(),
            &[commit, dateless],
            &[],
            &ids(),
            &mut cache,
        )
        .await
        .unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].author, "Alice Liddell");
        assert_eq!(tracker.user_lookups(), 0);
    }

    #[tokio::test]
    async fn linked_pull_request_timelines_are_merged() {
        let tracker = MemoryTracker::new();
        let pr = PullRequest {
            repo: repo(),
            number: 8,
            url: String::new(),
            state: PullRequestState::Open,
            body: Some("Resolves #5".into()),
            author: Some("alice".into()),
        };
        tracker.push_timeline(&repo(), 8, by("review_requested", User::human("alice", 11), 90));
        let timeline = vec![
            by("commented", User::human("alice", 11), 5),
            TimelineEvent {
                event: Some("commented".into()),
                created_at: None,
                actor: Some(User::human("alice", 11)),
                ..Default::default()
            },
        ];
        let mut cache = UserIdCache::new();
        let activity = collect_activity(&tracker, &issue(), &timeline, &[pr], &ids(), &mut cache)
            .await
            .unwrap();
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].kind, ActivityKind::ReviewRequested);
    }
}
