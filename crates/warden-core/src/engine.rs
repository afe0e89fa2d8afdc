//! Reminder and disqualification decisions.
//!
//! [`Engine::evaluate`] gathers everything needed about an issue and hands it
//! to [`decide`], a pure function evaluating an ordered list of rules. The
//! resulting [`Decision`] is carried out by [`Engine::apply`]. Comments the
//! engine posts carry a [`StructuredMarker`], so a reminder posted in an
//! earlier run is recognised and not repeated.

use crate::activity::{collect_activity, UserIdCache};
use crate::allowance::{extension_allowance, top_up_allowance, Allowance, AllowanceInput};
use crate::config::Config;
use crate::deadline::{
    deadline_with_threshold, most_recent_assignment_event, offset, task_assignment_details,
    task_deadline, Thresholds,
};
use crate::error::{Result, WardenError};
use crate::marker::{LogLevel, StructuredMarker, REMINDER_CLASS, UNASSIGN_CLASS};
use crate::tracker::{linked_pull_requests, IssueTracker};
use crate::tracking::TrackingDb;
use crate::types::{Issue, PullRequest, User};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

pub const REMINDER_CALLER: &str = "remind_assignees";
pub const UNASSIGN_CALLER: &str = "unassign_assignees";

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignReason {
    /// Disqualification threshold passed without qualifying activity.
    Inactivity,
    /// Warning threshold passed and no open pull request closes the issue.
    NoLinkedPullRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    NoAction {
        reason: String,
    },
    Reminder {
        assignees: Vec<User>,
        /// Issue or pull request numbers the reminder is posted to.
        targets: Vec<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_extensions: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_top_ups: Option<u32>,
    },
    Unassign {
        assignees: Vec<User>,
        reason: UnassignReason,
    },
}

impl Decision {
    pub fn no_action(reason: impl Into<String>) -> Self {
        Decision::NoAction {
            reason: reason.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::NoAction { .. } => "no_action",
            Decision::Reminder { .. } => "reminder",
            Decision::Unassign { .. } => "unassign",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NoAction { reason } => write!(f, "no action ({reason})"),
            Decision::Reminder { targets, .. } => write!(f, "reminder on {targets:?}"),
            Decision::Unassign { reason, .. } => write!(f, "unassign ({reason:?})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pure decision
// ---------------------------------------------------------------------------

/// Everything [`decide`] looks at.
#[derive(Debug, Clone)]
pub struct EvalContext<'a> {
    pub now: DateTime<Utc>,
    pub config: &'a Config,
    pub issue_number: u64,
    pub assignees: &'a [User],
    pub assigned_at: Option<DateTime<Utc>>,
    pub thresholds: Thresholds,
    pub open_pull_requests: &'a [PullRequest],
    pub approved: bool,
    /// Newest reminder marker found on the issue or its pull requests.
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub extensions: Allowance,
    pub top_ups: Allowance,
}

/// Rules, in order:
///
/// 1. assignment younger than `negligenceThreshold` → no action
/// 2. an open linked pull request is approved → no action
/// 3. disqualification threshold passed → unassign
/// 4. warning threshold passed:
///    - pull request required but none open → unassign
///    - reminder already sent since the baseline → no action
///    - otherwise → reminder
/// 5. no action
///
/// A reminder newer than the baseline moves disqualification to
/// `reminder + (disqualification - warning)`.
pub fn decide(ctx: &EvalContext<'_>) -> Decision {
    let cfg = ctx.config;

    if !cfg.negligence_threshold.is_zero() {
        if let Some(assigned_at) = ctx.assigned_at {
            let young = (ctx.now - assigned_at)
                .to_std()
                .map_or(true, |age| age < cfg.negligence_threshold);
            if young {
                return Decision::no_action("assignment is within the negligence threshold");
            }
        }
    }

    if ctx.approved {
        return Decision::no_action("linked pull request approved, awaiting merge");
    }

    let reminded_at = ctx
        .last_reminder_at
        .filter(|at| *at > ctx.thresholds.baseline);
    let disqualification_at = match reminded_at {
        Some(at) => offset(at, cfg.disqualification.saturating_sub(cfg.warning))
            .unwrap_or(ctx.thresholds.disqualification_at),
        None => ctx.thresholds.disqualification_at,
    };

    if cfg.disqualification_enabled() && ctx.now >= disqualification_at {
        return Decision::Unassign {
            assignees: ctx.assignees.to_vec(),
            reason: UnassignReason::Inactivity,
        };
    }

    if cfg.reminders_enabled() && ctx.now >= ctx.thresholds.warning_at {
        if cfg.pull_request_required && ctx.open_pull_requests.is_empty() {
            return Decision::Unassign {
                assignees: ctx.assignees.to_vec(),
                reason: UnassignReason::NoLinkedPullRequest,
            };
        }
        if reminded_at.is_some() {
            return Decision::no_action("reminder already sent");
        }
        let targets = if ctx.open_pull_requests.is_empty() {
            vec![ctx.issue_number]
        } else {
            ctx.open_pull_requests.iter().map(|pr| pr.number).collect()
        };
        return Decision::Reminder {
            assignees: ctx.assignees.to_vec(),
            targets,
            remaining_extensions: ctx.extensions.remaining(),
            remaining_top_ups: match ctx.top_ups {
                Allowance::Bounded { limit, remaining, .. } if limit > 0 => Some(remaining),
                _ => None,
            },
        };
    }

    Decision::no_action("still within due-time")
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Outcome of one evaluation; `thresholds` is absent when there was not
/// enough data to compute them.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
}

impl Evaluation {
    fn insufficient(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::no_action(reason),
            thresholds: None,
        }
    }
}

/// Comments posted by [`Engine::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Applied {
    pub posted: usize,
    pub failed: usize,
}

pub struct Engine<'a> {
    tracker: &'a dyn IssueTracker,
    config: &'a Config,
    store: Option<&'a TrackingDb>,
    users: UserIdCache,
}

impl<'a> Engine<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, config: &'a Config) -> Self {
        Self {
            tracker,
            config,
            store: None,
            users: UserIdCache::new(),
        }
    }

    /// Clear tracking entries of issues that get unassigned.
    pub fn with_store(mut self, store: &'a TrackingDb) -> Self {
        self.store = Some(store);
        self
    }

    /// Evaluate and apply in one step.
    pub async fn process(&mut self, issue: &Issue, now: DateTime<Utc>) -> Result<Evaluation> {
        let evaluation = self.evaluate(issue, now).await?;
        self.apply(issue, &evaluation.decision, now).await;
        Ok(evaluation)
    }

    /// Compute the decision for `issue` without side effects.
    ///
    /// Missing or malformed data yields `NoAction`; only tracker failures
    /// are returned as errors.
    pub async fn evaluate(&mut self, issue: &Issue, now: DateTime<Utc>) -> Result<Evaluation> {
        let reference = issue.reference();

        let details = match task_assignment_details(issue) {
            Ok(d) => d,
            Err(e) if e.is_insufficient_data() => {
                info!(issue = %reference, error = %e, "skipping issue");
                return Ok(Evaluation::insufficient(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let timeline = self.tracker.list_timeline(&issue.repo, issue.number).await?;
        let assignment = match most_recent_assignment_event(&timeline)
            .ok_or_else(|| WardenError::NoAssignmentEvent(reference.clone()))
        {
            Ok(a) => a,
            Err(e) => {
                info!(issue = %reference, error = %e, "skipping issue");
                return Ok(Evaluation::insufficient(e.to_string()));
            }
        };

        let linked = linked_pull_requests(self.tracker, issue).await?;
        let open: Vec<PullRequest> = linked.iter().filter(|pr| pr.is_open()).cloned().collect();

        let assignee_ids: HashSet<u64> = details.assignee_ids().into_iter().collect();
        let activity = collect_activity(
            self.tracker,
            issue,
            &timeline,
            &linked,
            &assignee_ids,
            &mut self.users,
        )
        .await?;

        let thresholds = match task_deadline(&assignment, details.task_duration)
            .and_then(|deadline| deadline_with_threshold(Some(deadline), issue, &activity, self.config))
        {
            Ok(t) => t,
            Err(e) => {
                warn!(issue = %reference, error = %e, "cannot compute thresholds");
                return Ok(Evaluation::insufficient(e.to_string()));
            }
        };

        let last_reminder_at = self.last_reminder(issue, &linked).await?;
        let approved = self.any_approved(&open).await?;

        let allowance_input = AllowanceInput {
            labels: &issue.labels,
            task_duration: details.task_duration,
            assigned_at: Some(assignment.created_at),
            now,
        };
        let extensions = extension_allowance(self.config, allowance_input);
        let top_ups = top_up_allowance(self.config, allowance_input);

        let ctx = EvalContext {
            now,
            config: self.config,
            issue_number: issue.number,
            assignees: &details.assignees,
            assigned_at: Some(assignment.created_at),
            thresholds,
            open_pull_requests: &open,
            approved,
            last_reminder_at,
            extensions,
            top_ups,
        };
        let decision = decide(&ctx);

        match &decision {
            Decision::NoAction { reason } => info!(issue = %reference, reason = %reason, "no action"),
            other => info!(issue = %reference, action = other.as_str(), "decision"),
        }
        debug!(
            issue = %reference,
            baseline = %thresholds.baseline,
            warning_at = %thresholds.warning_at,
            disqualification_at = %thresholds.disqualification_at,
            "thresholds"
        );

        Ok(Evaluation {
            decision,
            thresholds: Some(thresholds),
        })
    }

    /// Carry out `decision`. Failures are logged and counted, never returned:
    /// one unreachable thread must not stop the others.
    pub async fn apply(&self, issue: &Issue, decision: &Decision, now: DateTime<Utc>) -> Applied {
        match decision {
            Decision::NoAction { .. } => Applied::default(),
            Decision::Reminder {
                assignees,
                targets,
                remaining_extensions,
                remaining_top_ups,
            } => {
                let body = reminder_body(assignees, *remaining_extensions, *remaining_top_ups, now);
                let mut applied = Applied::default();
                for target in targets {
                    match self.tracker.create_comment(&issue.repo, *target, &body).await {
                        Ok(_) => applied.posted += 1,
                        Err(e) => {
                            applied.failed += 1;
                            warn!(issue = %issue.reference(), thread = *target, error = %e, "failed to post reminder");
                        }
                    }
                }
                applied
            }
            Decision::Unassign { assignees, reason } => {
                self.unassign(issue, assignees, *reason, now).await
            }
        }
    }

    async fn unassign(
        &self,
        issue: &Issue,
        assignees: &[User],
        reason: UnassignReason,
        now: DateTime<Utc>,
    ) -> Applied {
        let reference = issue.reference();
        let mut applied = Applied::default();

        let body = unassign_body(assignees, reason, now);
        match self.tracker.create_comment(&issue.repo, issue.number, &body).await {
            Ok(_) => applied.posted += 1,
            Err(e) => {
                applied.failed += 1;
                warn!(issue = %reference, error = %e, "failed to post unassign notice");
            }
        }

        let logins: Vec<String> = assignees.iter().map(|u| u.login.clone()).collect();
        if let Err(e) = self
            .tracker
            .remove_assignees(&issue.repo, issue.number, &logins)
            .await
        {
            warn!(issue = %reference, error = %e, "failed to remove assignees");
        }

        if let Some(store) = self.store {
            if let Err(e) = store.remove(&issue.repo, issue.number) {
                warn!(issue = %reference, error = %e, "failed to clear tracking entry");
            }
        }

        info!(issue = %reference, assignees = ?logins, "unassigned");
        applied
    }

    async fn last_reminder(
        &self,
        issue: &Issue,
        linked: &[PullRequest],
    ) -> Result<Option<DateTime<Utc>>> {
        let mut threads = vec![issue.number];
        threads.extend(linked.iter().map(|pr| pr.number));

        let mut latest: Option<DateTime<Utc>> = None;
        for number in threads {
            for comment in self.tracker.list_comments(&issue.repo, number).await? {
                let newest = StructuredMarker::parse_all(&comment.body)
                    .into_iter()
                    .filter(|m| m.class == REMINDER_CLASS)
                    .filter_map(|m| m.timestamp())
                    .max();
                latest = latest.max(newest);
            }
        }
        Ok(latest)
    }

    async fn any_approved(&self, open: &[PullRequest]) -> Result<bool> {
        for pr in open {
            if self.tracker.pull_request_approved(&pr.repo, pr.number).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Comment bodies
// ---------------------------------------------------------------------------

fn mentions(assignees: &[User]) -> String {
    assignees
        .iter()
        .map(|u| format!("@{}", u.login))
        .collect::<Vec<_>>()
        .join(", ")
}

fn marker_payload(assignees: &[User], now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "taskAssignees": assignees.iter().map(|u| u.id).collect::<Vec<_>>(),
        "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn reminder_body(
    assignees: &[User],
    remaining_extensions: Option<u32>,
    remaining_top_ups: Option<u32>,
    now: DateTime<Utc>,
) -> String {
    let mut body = format!(
        "{}, this task has been idle for a while. Please provide an update on your progress.",
        mentions(assignees)
    );
    if let Some(remaining) = remaining_extensions {
        let plural = if remaining == 1 { "" } else { "s" };
        body.push_str(&format!(
            "\n\nYou have {remaining} deadline extension{plural} remaining."
        ));
    }
    if let Some(remaining) = remaining_top_ups {
        let plural = if remaining == 1 { "" } else { "s" };
        body.push_str(&format!("\nYou have {remaining} top-up{plural} remaining."));
    }
    let marker = StructuredMarker::new(REMINDER_CLASS, REMINDER_CALLER, marker_payload(assignees, now));
    format!("{body}\n\n{}", marker.render(LogLevel::Info))
}

fn unassign_body(assignees: &[User], reason: UnassignReason, now: DateTime<Utc>) -> String {
    let why = match reason {
        UnassignReason::Inactivity => "due to inactivity",
        UnassignReason::NoLinkedPullRequest => "because no open pull request closes this issue",
    };
    let mut payload = marker_payload(assignees, now);
    payload["reason"] = serde_json::to_value(reason).unwrap_or_default();
    let marker = StructuredMarker::new(UNASSIGN_CLASS, UNASSIGN_CALLER, payload);
    format!(
        "{}, you have been unassigned from this task {why}.\n\n{}",
        mentions(assignees),
        marker.render(LogLevel::Info)
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::MemoryTracker;
    use crate::tracking::TrackedIssue;
    use crate::types::{IssueState, PullRequestState, RepoRef, TimelineEvent};
    use chrono::{Duration as CDur, TimeZone};
    use std::time::Duration;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        t0() + CDur::minutes(minutes)
    }

    fn repo() -> RepoRef {
        RepoRef::new("ubiquity", "pay")
    }

    fn alice() -> User {
        User::human("alice", 11)
    }

    fn config() -> Config {
        Config {
            warning: Duration::from_secs(3600),
            disqualification: Duration::from_secs(7200),
            ..Config::default()
        }
    }

    fn issue(labels: &[&str]) -> Issue {
        Issue {
            repo: repo(),
            number: 1,
            url: "https://github.com/ubiquity/pay/issues/1".into(),
            assignees: vec![alice()],
            assignee: None,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            created_at: t0() - CDur::days(2),
            state: IssueState::Open,
        }
    }

    /// Tracker holding `issue` assigned at T0 by a maintainer, plus an open
    /// pull request closing it.
    fn seeded(labels: &[&str]) -> (MemoryTracker, Issue) {
        let tracker = MemoryTracker::new();
        let issue = issue(labels);
        tracker.insert_issue(issue.clone());
        tracker.push_timeline(
            &repo(),
            1,
            TimelineEvent {
                event: Some("assigned".into()),
                actor: Some(User::human("maintainer", 3)),
                created_at: Some(t0()),
                assignee: Some(alice()),
                ..Default::default()
            },
        );
        tracker.insert_pull_request(PullRequest {
            repo: repo(),
            number: 2,
            url: String::new(),
            state: PullRequestState::Open,
            body: Some("Resolves #1".into()),
            author: Some("alice".into()),
        });
        (tracker, issue)
    }

    fn comment_by_alice(tracker: &MemoryTracker, minutes: i64) {
        tracker.push_timeline(
            &repo(),
            1,
            TimelineEvent {
                event: Some("commented".into()),
                actor: Some(alice()),
                created_at: Some(at(minutes)),
                ..Default::default()
            },
        );
    }

    fn ctx<'a>(cfg: &'a Config, assignees: &'a [User], prs: &'a [PullRequest], now: DateTime<Utc>) -> EvalContext<'a> {
        EvalContext {
            now,
            config: cfg,
            issue_number: 1,
            assignees,
            assigned_at: Some(t0()),
            thresholds: Thresholds {
                baseline: t0(),
                warning_at: at(60),
                disqualification_at: at(120),
                from_activity: false,
            },
            open_pull_requests: prs,
            approved: false,
            last_reminder_at: None,
            extensions: Allowance::Unlimited,
            top_ups: Allowance::NONE,
        }
    }

    #[test]
    fn decide_follows_rule_order() {
        let cfg = config();
        let users = [alice()];
        assert_eq!(
            decide(&ctx(&cfg, &users, &[], at(30))),
            Decision::no_action("still within due-time")
        );
        assert!(matches!(
            decide(&ctx(&cfg, &users, &[], at(60))),
            Decision::Unassign {
                reason: UnassignReason::NoLinkedPullRequest,
                ..
            }
        ));
        assert!(matches!(
            decide(&ctx(&cfg, &users, &[], at(120))),
            Decision::Unassign {
                reason: UnassignReason::Inactivity,
                ..
            }
        ));
    }

    #[test]
    fn reminder_targets_issue_without_pull_request_requirement() {
        let mut cfg = config();
        cfg.pull_request_required = false;
        let users = [alice()];
        match decide(&ctx(&cfg, &users, &[], at(61))) {
            Decision::Reminder { targets, .. } => assert_eq!(targets, vec![1]),
            other => panic!("expected reminder, got {other:?}"),
        }
    }

    #[test]
    fn prior_reminder_moves_disqualification() {
        let mut cfg = config();
        cfg.pull_request_required = false;
        let users = [alice()];
        let mut c = ctx(&cfg, &users, &[], at(100));
        c.last_reminder_at = Some(at(70));
        assert_eq!(decide(&c), Decision::no_action("reminder already sent"));
        c.now = at(130);
        assert!(matches!(decide(&c), Decision::Unassign { .. }));
    }

    #[test]
    fn reminder_reports_configured_top_ups_only() {
        let mut cfg = config();
        cfg.pull_request_required = false;
        let users = [alice()];
        match decide(&ctx(&cfg, &users, &[], at(61))) {
            Decision::Reminder {
                remaining_top_ups, ..
            } => assert_eq!(remaining_top_ups, None),
            other => panic!("expected reminder, got {other:?}"),
        }

        let mut c = ctx(&cfg, &users, &[], at(61));
        c.top_ups = Allowance::Bounded {
            limit: 3,
            remaining: 1,
            interval_ms: 3_600_000,
        };
        match decide(&c) {
            Decision::Reminder {
                remaining_top_ups, ..
            } => assert_eq!(remaining_top_ups, Some(1)),
            other => panic!("expected reminder, got {other:?}"),
        }
    }

    #[test]
    fn closed_pull_request_after_reminder_unassigns_at_warning() {
        let cfg = config();
        let users = [alice()];
        let mut c = ctx(&cfg, &users, &[], at(100));
        c.last_reminder_at = Some(at(70));
        assert_eq!(
            decide(&c),
            Decision::Unassign {
                assignees: vec![alice()],
                reason: UnassignReason::NoLinkedPullRequest,
            }
        );
    }

    #[test]
    fn grace_period_and_approval_suppress_action() {
        let mut cfg = config();
        cfg.negligence_threshold = Duration::from_secs(3 * 3600);
        let users = [alice()];
        let c = ctx(&cfg, &users, &[], at(150));
        assert!(matches!(decide(&c), Decision::NoAction { .. }));

        let cfg = config();
        let mut c = ctx(&cfg, &users, &[], at(150));
        c.approved = true;
        assert_eq!(
            decide(&c),
            Decision::no_action("linked pull request approved, awaiting merge")
        );
    }

    #[test]
    fn disabled_thresholds_never_act() {
        let cfg = Config {
            warning: Duration::ZERO,
            disqualification: Duration::ZERO,
            ..Config::default()
        };
        let users = [alice()];
        assert!(matches!(
            decide(&ctx(&cfg, &users, &[], at(10_000))),
            Decision::NoAction { .. }
        ));
    }

    #[tokio::test]
    async fn untimed_task_reminds_then_unassigns() {
        let (tracker, issue) = seeded(&[]);
        let cfg = config();
        let mut engine = Engine::new(&tracker, &cfg);

        let early = engine.evaluate(&issue, at(59)).await.unwrap();
        assert_eq!(early.decision, Decision::no_action("still within due-time"));

        let reminder = engine.process(&issue, at(60)).await.unwrap();
        match &reminder.decision {
            Decision::Reminder { targets, .. } => assert_eq!(targets, &vec![2]),
            other => panic!("expected reminder, got {other:?}"),
        }
        let posted = tracker.comments(&repo(), 2);
        assert_eq!(posted.len(), 1);
        assert!(posted[0].body.starts_with("@alice, this task has been idle"));

        let unassign = engine.process(&issue, at(120)).await.unwrap();
        assert!(matches!(unassign.decision, Decision::Unassign { .. }));
        assert!(tracker.issue(&repo(), 1).unwrap().assignees.is_empty());
    }

    #[tokio::test]
    async fn time_label_pushes_thresholds_past_task_deadline() {
        let (tracker, issue) = seeded(&["Time: <1 Day"]);
        let cfg = config();
        let mut engine = Engine::new(&tracker, &cfg);
        let deadline = t0() + CDur::days(1);

        let within = engine.evaluate(&issue, at(90)).await.unwrap();
        assert!(matches!(within.decision, Decision::NoAction { .. }));

        let reminder = engine
            .evaluate(&issue, deadline + CDur::hours(1))
            .await
            .unwrap();
        assert!(matches!(reminder.decision, Decision::Reminder { .. }));

        let unassign = engine
            .evaluate(&issue, deadline + CDur::hours(2))
            .await
            .unwrap();
        assert!(matches!(unassign.decision, Decision::Unassign { .. }));
    }

    #[tokio::test]
    async fn repeated_evaluation_after_reminder_is_idempotent() {
        let (tracker, issue) = seeded(&[]);
        let cfg = config();
        let mut engine = Engine::new(&tracker, &cfg);

        engine.process(&issue, at(60)).await.unwrap();
        let first = engine.process(&issue, at(70)).await.unwrap();
        let second = engine.process(&issue, at(80)).await.unwrap();
        assert_eq!(first.decision, Decision::no_action("reminder already sent"));
        assert_eq!(second.decision, first.decision);
        assert_eq!(tracker.comments(&repo(), 2).len(), 1);
    }

    #[tokio::test]
    async fn activity_after_reminder_rebases_disqualification() {
        let (tracker, issue) = seeded(&[]);
        let cfg = config();
        let mut engine = Engine::new(&tracker, &cfg);

        engine.process(&issue, at(60)).await.unwrap();
        comment_by_alice(&tracker, 90);

        let later = engine.evaluate(&issue, at(120)).await.unwrap();
        assert_eq!(later.decision, Decision::no_action("still within due-time"));
        assert_eq!(
            later.thresholds.unwrap().disqualification_at,
            at(90) + CDur::hours(2)
        );
    }

    #[tokio::test]
    async fn reminder_mentions_remaining_top_ups() {
        let (tracker, issue) = seeded(&["Priority: 2 (Medium)"]);
        let mut cfg = config();
        cfg.top_ups.amounts.insert("Priority: 2 (Medium)".into(), 3);
        let mut engine = Engine::new(&tracker, &cfg);

        // interval = 2h / priority 2 = 1h, one interval elapsed
        let eval = engine.process(&issue, at(60)).await.unwrap();
        match &eval.decision {
            Decision::Reminder {
                remaining_top_ups, ..
            } => assert_eq!(*remaining_top_ups, Some(2)),
            other => panic!("expected reminder, got {other:?}"),
        }
        let posted = tracker.comments(&repo(), 2);
        assert!(posted[0].body.contains("You have 2 top-ups remaining."));
    }

    #[tokio::test]
    async fn reminder_failure_on_one_thread_does_not_stop_others() {
        let (tracker, issue) = seeded(&[]);
        tracker.insert_pull_request(PullRequest {
            repo: repo(),
            number: 3,
            url: String::new(),
            state: PullRequestState::Open,
            body: Some("Fixes #1".into()),
            author: Some("alice".into()),
        });
        tracker.fail_comments_on(&repo(), 2);
        let cfg = config();
        let engine = Engine::new(&tracker, &cfg);

        let decision = Decision::Reminder {
            assignees: vec![alice()],
            targets: vec![2, 3],
            remaining_extensions: Some(2),
            remaining_top_ups: None,
        };
        let applied = engine.apply(&issue, &decision, at(60)).await;
        assert_eq!(applied, Applied { posted: 1, failed: 1 });
        let posted = tracker.comments(&repo(), 3);
        assert!(posted[0].body.contains("You have 2 deadline extensions remaining."));
    }

    #[tokio::test]
    async fn unassign_swallows_bot_removal_failure_and_clears_tracking() {
        let dir = TempDir::new().unwrap();
        let store = TrackingDb::open(&dir.path().join("tracking.db")).unwrap();
        store.add(&repo(), TrackedIssue::new(1, 500)).unwrap();

        let tracker = MemoryTracker::new();
        let mut i = issue(&[]);
        i.assignees.push(User::bot("helper[bot]", 12));
        tracker.insert_issue(i.clone());

        let cfg = config();
        let engine = Engine::new(&tracker, &cfg).with_store(&store);
        let decision = Decision::Unassign {
            assignees: i.assignees.clone(),
            reason: UnassignReason::Inactivity,
        };
        let applied = engine.apply(&i, &decision, at(120)).await;
        assert_eq!(applied.posted, 1);

        let after = tracker.issue(&repo(), 1).unwrap();
        assert_eq!(after.assignees, vec![User::bot("helper[bot]", 12)]);
        assert!(store.get_repo(&repo()).unwrap().is_empty());

        let notice = &tracker.comments(&repo(), 1)[0].body;
        let marker = StructuredMarker::find(notice, UNASSIGN_CLASS).unwrap();
        assert_eq!(marker.payload["reason"], "inactivity");
    }

    #[tokio::test]
    async fn missing_assignment_event_is_no_action() {
        let tracker = MemoryTracker::new();
        let i = issue(&[]);
        tracker.insert_issue(i.clone());
        let cfg = config();
        let mut engine = Engine::new(&tracker, &cfg);
        let eval = engine.process(&i, at(500)).await.unwrap();
        assert_eq!(
            eval.decision,
            Decision::no_action("no assignment event found for ubiquity/pay#1")
        );
        assert!(eval.thresholds.is_none());
        assert!(tracker.comments(&repo(), 1).is_empty());
    }
}
