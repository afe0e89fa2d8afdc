//! Deadline and threshold computation.

use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::labels::try_parse_time_label;
use crate::types::{ActivityEvent, Issue, TimelineEvent, User, UserKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Assignment details
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentDetails {
    pub assignees: Vec<User>,
    /// Duration declared by the time label; zero for untimed tasks.
    pub task_duration: Duration,
}

impl AssignmentDetails {
    pub fn assignee_ids(&self) -> Vec<u64> {
        self.assignees.iter().map(|u| u.id).collect()
    }

    pub fn logins(&self) -> Vec<String> {
        self.assignees.iter().map(|u| u.login.clone()).collect()
    }
}

/// Assignees of `issue` and the duration declared by its time label.
///
/// Fails with `NoAssignees` when nobody is assigned and with `InvalidLabel`
/// when the time label carries an unparseable duration. A missing time label
/// is valid and yields a zero duration.
pub fn task_assignment_details(issue: &Issue) -> Result<AssignmentDetails> {
    let assignees = issue.current_assignees();
    if assignees.is_empty() {
        return Err(WardenError::NoAssignees(issue.reference()));
    }
    let task_duration = try_parse_time_label(&issue.labels)?.unwrap_or(Duration::ZERO);
    Ok(AssignmentDetails {
        assignees,
        task_duration,
    })
}

// ---------------------------------------------------------------------------
// Assignment events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentEvent {
    pub actor: User,
    pub created_at: DateTime<Utc>,
}

/// The assignment event that starts the deadline clock.
///
/// Human and bot assignments are tracked separately. A human assignment
/// made strictly after the latest bot assignment wins; otherwise the latest
/// bot assignment wins. Bots re-assigning on behalf of users may emit
/// timestamps that would move the clock ahead of the real human action.
pub fn most_recent_assignment_event(timeline: &[TimelineEvent]) -> Option<AssignmentEvent> {
    let mut latest_human: Option<AssignmentEvent> = None;
    let mut latest_bot: Option<AssignmentEvent> = None;

    for event in timeline {
        if event.event.as_deref() != Some("assigned") {
            continue;
        }
        let (Some(actor), Some(created_at)) = (&event.actor, event.created_at) else {
            continue;
        };
        let slot = match actor.kind {
            UserKind::Human => &mut latest_human,
            UserKind::Bot => &mut latest_bot,
        };
        if slot.as_ref().map_or(true, |prev| created_at > prev.created_at) {
            *slot = Some(AssignmentEvent {
                actor: actor.clone(),
                created_at,
            });
        }
    }

    match (latest_human, latest_bot) {
        (Some(human), Some(bot)) if human.created_at > bot.created_at => Some(human),
        (_, Some(bot)) => Some(bot),
        (human, None) => human,
    }
}

/// Assignment time plus the declared task duration.
pub fn task_deadline(assignment: &AssignmentEvent, task_duration: Duration) -> Result<DateTime<Utc>> {
    offset(assignment.created_at, task_duration)
}

/// `at + by`, failing when the result is out of range.
pub(crate) fn offset(at: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .ok_or_else(|| WardenError::InvalidTimestamp(format!("{at} + {}ms", by.as_millis())))
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    /// Reference point both thresholds are measured from.
    pub baseline: DateTime<Utc>,
    pub warning_at: DateTime<Utc>,
    pub disqualification_at: DateTime<Utc>,
    /// Whether `baseline` comes from activity rather than the assignment.
    pub from_activity: bool,
}

/// Warning and disqualification thresholds for `issue`.
///
/// The baseline is `task_deadline` when known, otherwise the issue creation
/// time. When qualifying activity exists at or after the baseline, the most
/// recent one becomes the baseline instead. `activity` must be newest first.
pub fn deadline_with_threshold(
    task_deadline: Option<DateTime<Utc>>,
    issue: &Issue,
    activity: &[ActivityEvent],
    config: &Config,
) -> Result<Thresholds> {
    let mut baseline = task_deadline.unwrap_or(issue.created_at);
    let mut from_activity = false;

    if let Some(latest) = activity
        .iter()
        .filter(|a| config.is_whitelisted(a.kind))
        .map(|a| a.created_at)
        .max()
    {
        if latest >= baseline {
            baseline = latest;
            from_activity = true;
        }
    }

    Ok(Thresholds {
        baseline,
        warning_at: offset(baseline, config.warning)?,
        disqualification_at: offset(baseline, config.disqualification)?,
        from_activity,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityKind, IssueState, RepoRef};
    use chrono::{Duration as CDur, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn issue(labels: &[&str], assignees: Vec<User>) -> Issue {
        Issue {
            repo: RepoRef::new("ubiquity", "pay"),
            number: 1,
            url: String::new(),
            assignees,
            assignee: None,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            created_at: t0() - CDur::days(1),
            state: IssueState::Open,
        }
    }

    fn assigned(actor: User, minutes: i64) -> TimelineEvent {
        TimelineEvent {
            event: Some("assigned".into()),
            actor: Some(actor),
            created_at: Some(t0() + CDur::minutes(minutes)),
            ..Default::default()
        }
    }

    fn activity(kind: ActivityKind, minutes: i64) -> ActivityEvent {
        ActivityEvent {
            kind,
            created_at: t0() + CDur::minutes(minutes),
            author: "alice".into(),
        }
    }

    fn config() -> Config {
        Config {
            warning: Duration::from_secs(3600),
            disqualification: Duration::from_secs(7200),
            ..Config::default()
        }
    }

    #[test]
    fn details_require_assignees() {
        let err = task_assignment_details(&issue(&[], vec![])).unwrap_err();
        assert!(matches!(err, WardenError::NoAssignees(_)));
    }

    #[test]
    fn details_accept_untimed_task() {
        let details =
            task_assignment_details(&issue(&["Price: 100 USD"], vec![User::human("alice", 1)]))
                .unwrap();
        assert_eq!(details.task_duration, Duration::ZERO);
        assert_eq!(details.logins(), vec!["alice"]);
    }

    #[test]
    fn details_reject_malformed_time_label() {
        let err = task_assignment_details(&issue(&["Time: <eventually"], vec![User::human("a", 1)]))
            .unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn later_human_assignment_beats_earlier_bot() {
        let timeline = vec![
            assigned(User::bot("ubiquity-os[bot]", 2), 0),
            assigned(User::human("maintainer", 3), 30),
        ];
        let event = most_recent_assignment_event(&timeline).unwrap();
        assert_eq!(event.actor.login, "maintainer");
    }

    #[test]
    fn bot_assignment_wins_over_older_human() {
        let timeline = vec![
            assigned(User::human("maintainer", 3), 0),
            assigned(User::bot("ubiquity-os[bot]", 2), 30),
            assigned(User::human("maintainer", 3), 10),
        ];
        let event = most_recent_assignment_event(&timeline).unwrap();
        assert_eq!(event.actor.kind, UserKind::Bot);
        assert_eq!(event.created_at, t0() + CDur::minutes(30));
    }

    #[test]
    fn assignment_falls_back_to_whichever_exists() {
        let humans_only = vec![assigned(User::human("a", 1), 5), assigned(User::human("b", 2), 15)];
        assert_eq!(
            most_recent_assignment_event(&humans_only).unwrap().actor.login,
            "b"
        );
        let unrelated = vec![TimelineEvent {
            event: Some("labeled".into()),
            ..Default::default()
        }];
        assert!(most_recent_assignment_event(&unrelated).is_none());
    }

    #[test]
    fn baseline_is_task_deadline_without_activity() {
        let i = issue(&["Time: <1 Day"], vec![User::human("alice", 1)]);
        let assignment = AssignmentEvent {
            actor: User::human("maintainer", 3),
            created_at: t0(),
        };
        let deadline = task_deadline(&assignment, Duration::from_secs(86_400)).unwrap();
        let th = deadline_with_threshold(Some(deadline), &i, &[], &config()).unwrap();
        assert_eq!(th.baseline, t0() + CDur::days(1));
        assert_eq!(th.warning_at, th.baseline + CDur::hours(1));
        assert_eq!(th.disqualification_at, th.baseline + CDur::hours(2));
        assert!(!th.from_activity);
    }

    #[test]
    fn baseline_falls_back_to_issue_creation() {
        let i = issue(&[], vec![User::human("alice", 1)]);
        let th = deadline_with_threshold(None, &i, &[], &config()).unwrap();
        assert_eq!(th.baseline, i.created_at);
    }

    #[test]
    fn disqualification_tracks_latest_qualifying_activity() {
        let i = issue(&[], vec![User::human("alice", 1)]);
        let cfg = config();
        let cases: Vec<Vec<ActivityEvent>> = vec![
            vec![],
            vec![activity(ActivityKind::Commented, -30)],
            vec![activity(ActivityKind::Commented, 0)],
            vec![
                activity(ActivityKind::Committed, 200),
                activity(ActivityKind::Commented, 90),
            ],
        ];
        for events in cases {
            let th = deadline_with_threshold(Some(t0()), &i, &events, &cfg).unwrap();
            let latest = events.iter().map(|a| a.created_at).max();
            let expected = latest.map_or(t0(), |l| l.max(t0())) + CDur::hours(2);
            assert_eq!(th.disqualification_at, expected);
        }
    }

    #[test]
    fn non_whitelisted_activity_is_ignored() {
        let i = issue(&[], vec![User::human("alice", 1)]);
        let mut cfg = config();
        cfg.event_whitelist = [ActivityKind::Commented].into_iter().collect();
        let events = vec![activity(ActivityKind::Committed, 60)];
        let th = deadline_with_threshold(Some(t0()), &i, &events, &cfg).unwrap();
        assert_eq!(th.baseline, t0());
    }

    #[test]
    fn activity_rebases_after_reminder() {
        let i = issue(&[], vec![User::human("alice", 1)]);
        let events = vec![activity(ActivityKind::Commented, 90)];
        let th = deadline_with_threshold(Some(t0()), &i, &events, &config()).unwrap();
        assert_eq!(th.disqualification_at, t0() + CDur::minutes(90) + CDur::hours(2));
        assert_ne!(th.disqualification_at, t0() + CDur::hours(2));
    }
}
