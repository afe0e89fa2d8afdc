//! One scheduled pass over every watched issue.

use crate::config::Config;
use crate::engine::{Decision, Engine};
use crate::error::Result;
use crate::tracker::IssueTracker;
use crate::tracking::TrackingDb;
use crate::types::{Issue, RepoRef};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    pub repositories: usize,
    pub evaluated: usize,
    pub no_action: usize,
    pub reminders: usize,
    pub unassigned: usize,
    /// Issues or repositories whose processing failed.
    pub failures: usize,
}

impl WatchReport {
    fn record(&mut self, decision: &Decision) {
        self.evaluated += 1;
        match decision {
            Decision::NoAction { .. } => self.no_action += 1,
            Decision::Reminder { .. } => self.reminders += 1,
            Decision::Unassign { .. } => self.unassigned += 1,
        }
    }
}

/// Configured repositories plus every tracked repository, minus opt-outs,
/// each mapped to the tracked issue numbers it holds.
fn targets(config: &Config, store: Option<&TrackingDb>) -> Result<BTreeMap<RepoRef, BTreeSet<u64>>> {
    let mut targets: BTreeMap<RepoRef, BTreeSet<u64>> = BTreeMap::new();
    for repo in config.repositories() {
        targets.entry(repo).or_default();
    }
    if let Some(store) = store {
        for (repo, entries) in store.get_all()? {
            targets
                .entry(repo)
                .or_default()
                .extend(entries.iter().map(|e| e.issue_number));
        }
    }
    targets.retain(|repo, _| {
        let keep = !config.is_opted_out(repo);
        if !keep {
            info!(repo = %repo, "repository opted out");
        }
        keep
    });
    Ok(targets)
}

/// Evaluate and act on every watched issue, one at a time.
///
/// A failure on one issue or repository is logged and counted; the pass
/// continues. Only a failure to read the tracking store is returned.
pub async fn run_watch(
    tracker: &dyn IssueTracker,
    store: Option<&TrackingDb>,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<WatchReport> {
    let configured: BTreeSet<RepoRef> = config.repositories().into_iter().collect();
    let targets = targets(config, store)?;

    let mut engine = Engine::new(tracker, config);
    if let Some(store) = store {
        engine = engine.with_store(store);
    }

    let mut report = WatchReport {
        repositories: targets.len(),
        ..Default::default()
    };

    for (repo, tracked) in targets {
        let mut issues: BTreeMap<u64, Issue> = BTreeMap::new();

        if configured.contains(&repo) {
            match tracker.list_assigned_issues(&repo).await {
                Ok(list) => issues.extend(list.into_iter().map(|i| (i.number, i))),
                Err(e) => {
                    report.failures += 1;
                    error!(repo = %repo, error = %e, "failed to list issues");
                    continue;
                }
            }
        }

        for number in tracked {
            if issues.contains_key(&number) {
                continue;
            }
            match tracker.get_issue(&repo, number).await {
                Ok(issue) if issue.is_open() => {
                    issues.insert(number, issue);
                }
                Ok(_) => info!(repo = %repo, issue = number, "tracked issue is closed"),
                Err(e) => {
                    report.failures += 1;
                    warn!(repo = %repo, issue = number, error = %e, "failed to load tracked issue");
                }
            }
        }

        for issue in issues.values() {
            match engine.process(issue, now).await {
                Ok(evaluation) => report.record(&evaluation.decision),
                Err(e) => {
                    report.failures += 1;
                    error!(issue = %issue.reference(), error = %e, "evaluation failed");
                }
            }
        }
    }

    info!(
        repositories = report.repositories,
        evaluated = report.evaluated,
        reminders = report.reminders,
        unassigned = report.unassigned,
        failures = report.failures,
        "watch run complete"
    );
    Ok(report)
}
