//! Deadline-extension and top-up allowances.
//!
//! Both allowances are granted per priority label and accrue one unit per
//! interval of the assignment's lifetime: a task with 3 extensions loses one
//! every `interval` after assignment.

use crate::config::Config;
use crate::labels::{parse_priority_label, priority_label};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Allowance {
    /// The feature is disabled; nothing is counted.
    Unlimited,
    Bounded {
        limit: u32,
        remaining: u32,
        #[serde(rename = "intervalMs")]
        interval_ms: u64,
    },
}

impl Allowance {
    pub const NONE: Allowance = Allowance::Bounded {
        limit: 0,
        remaining: 0,
        interval_ms: 0,
    };

    pub fn remaining(&self) -> Option<u32> {
        match self {
            Allowance::Unlimited => None,
            Allowance::Bounded { remaining, .. } => Some(*remaining),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Allowance::Unlimited)
    }
}

/// Inputs shared by both allowance kinds.
#[derive(Debug, Clone, Copy)]
pub struct AllowanceInput<'a> {
    pub labels: &'a [String],
    pub task_duration: Duration,
    /// Start of the assignment; `None` when no assignment event was found.
    pub assigned_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// Remaining deadline extensions.
pub fn extension_allowance(config: &Config, input: AllowanceInput<'_>) -> Allowance {
    if !config.available_deadline_extensions.enabled {
        return Allowance::Unlimited;
    }
    compute(
        &config.available_deadline_extensions.amounts,
        config.disqualification,
        input,
    )
}

/// Remaining top-ups.
pub fn top_up_allowance(config: &Config, input: AllowanceInput<'_>) -> Allowance {
    compute(&config.top_ups.amounts, config.disqualification, input)
}

fn compute(
    amounts: &BTreeMap<String, u32>,
    disqualification: Duration,
    input: AllowanceInput<'_>,
) -> Allowance {
    if disqualification.is_zero() {
        return Allowance::Unlimited;
    }
    let Some(count) = priority_label(input.labels).and_then(|l| amounts.get(l).copied()) else {
        return Allowance::NONE;
    };
    let Some(assigned_at) = input.assigned_at else {
        return Allowance::NONE;
    };
    if count == 0 {
        return Allowance::NONE;
    }

    let priority = parse_priority_label(input.labels) as f64;
    let count_f = f64::from(count);
    let task_ms = input.task_duration.as_millis() as f64;

    let mut interval = (disqualification.as_millis() as f64 / priority).max(1.0);
    if interval * count_f < task_ms {
        interval = task_ms / count_f;
    }

    let elapsed = (input.now - assigned_at).num_milliseconds().max(0) as f64;
    let remaining = (count_f - count_f * (elapsed / (count_f * interval))).ceil();

    Allowance::Bounded {
        limit: count,
        // Over-limit values clamp at zero.
        remaining: remaining.clamp(0.0, count_f) as u32,
        interval_ms: interval.round() as u64,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as CDur, TimeZone};

    const DAY: Duration = Duration::from_secs(86_400);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn config() -> Config {
        let mut cfg = Config {
            disqualification: DAY * 4,
            ..Config::default()
        };
        cfg.available_deadline_extensions
            .amounts
            .insert("Priority: 2 (Medium)".into(), 4);
        cfg.top_ups.amounts.insert("Priority: 2 (Medium)".into(), 2);
        cfg
    }

    fn labels() -> Vec<String> {
        vec!["Priority: 2 (Medium)".into(), "Time: <1 Day".into()]
    }

    fn input(labels: &[String], elapsed: CDur) -> AllowanceInput<'_> {
        AllowanceInput {
            labels,
            task_duration: DAY,
            assigned_at: Some(t0()),
            now: t0() + elapsed,
        }
    }

    #[test]
    fn disabled_feature_is_unlimited() {
        let mut cfg = config();
        cfg.disqualification = Duration::ZERO;
        let l = labels();
        assert!(extension_allowance(&cfg, input(&l, CDur::zero())).is_unlimited());
        assert!(top_up_allowance(&cfg, input(&l, CDur::zero())).is_unlimited());

        let mut cfg = config();
        cfg.available_deadline_extensions.enabled = false;
        assert_eq!(
            extension_allowance(&cfg, input(&l, CDur::days(30))).remaining(),
            None
        );
    }

    #[test]
    fn unmatched_priority_or_missing_assignment_gives_nothing() {
        let cfg = config();
        let other = vec!["Priority: 5 (Emergency)".to_string()];
        assert_eq!(extension_allowance(&cfg, input(&other, CDur::zero())), Allowance::NONE);

        let l = labels();
        let mut unassigned = input(&l, CDur::zero());
        unassigned.assigned_at = None;
        assert_eq!(extension_allowance(&cfg, unassigned), Allowance::NONE);
    }

    #[test]
    fn remaining_decreases_per_interval() {
        // interval = 4 days / priority 2 = 2 days
        let cfg = config();
        let l = labels();
        let at = |days| extension_allowance(&cfg, input(&l, CDur::days(days)));
        assert_eq!(
            at(0),
            Allowance::Bounded {
                limit: 4,
                remaining: 4,
                interval_ms: 2 * 86_400_000
            }
        );
        assert_eq!(at(1).remaining(), Some(4));
        assert_eq!(at(2).remaining(), Some(3));
        assert_eq!(at(7).remaining(), Some(1));
        assert_eq!(at(8).remaining(), Some(0));
    }

    #[test]
    fn over_limit_clamps_at_zero() {
        let cfg = config();
        let l = labels();
        assert_eq!(
            top_up_allowance(&cfg, input(&l, CDur::days(365))).remaining(),
            Some(0)
        );
    }

    #[test]
    fn interval_stretches_to_cover_task_duration() {
        let cfg = config();
        let l = labels();
        let mut long = input(&l, CDur::zero());
        long.task_duration = DAY * 20;
        // 4 extensions * 2 days < 20 days, so each interval covers 5 days.
        match extension_allowance(&cfg, long) {
            Allowance::Bounded { interval_ms, .. } => assert_eq!(interval_ms, 5 * 86_400_000),
            other => panic!("expected bounded allowance, got {other:?}"),
        }
    }
}
