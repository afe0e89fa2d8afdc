//! Values encoded in issue labels: `Time: <1 Day`, `Priority: 2 (Medium)`,
//! `Price: 100 USD`. Labels that don't parse are ignored.

use crate::error::{Result, WardenError};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

const SECOND_MS: f64 = 1_000.0;
const MINUTE_MS: f64 = SECOND_MS * 60.0;
const HOUR_MS: f64 = MINUTE_MS * 60.0;
const DAY_MS: f64 = HOUR_MS * 24.0;
const WEEK_MS: f64 = DAY_MS * 7.0;
const YEAR_MS: f64 = DAY_MS * 365.25;
const MONTH_MS: f64 = YEAR_MS / 12.0;

pub const DEFAULT_PRIORITY: u64 = 1;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static DURATION_RE: OnceLock<Regex> = OnceLock::new();
static TIME_RE: OnceLock<Regex> = OnceLock::new();
static PRIORITY_RE: OnceLock<Regex> = OnceLock::new();
static PRICE_RE: OnceLock<Regex> = OnceLock::new();

fn duration_re() -> &'static Regex {
    DURATION_RE.get_or_init(|| Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?|\.\d+)\s*([a-z]+)?\s*$").unwrap())
}

fn time_re() -> &'static Regex {
    TIME_RE.get_or_init(|| Regex::new(r"(?i)^\s*Time:\s*<\s*(.+?)\s*$").unwrap())
}

fn priority_re() -> &'static Regex {
    PRIORITY_RE.get_or_init(|| Regex::new(r"^\s*Priority:\s*(\d+)").unwrap())
}

fn price_re() -> &'static Regex {
    PRICE_RE.get_or_init(|| Regex::new(r"(?i)^\s*price:\s*(\d+)").unwrap())
}

// ---------------------------------------------------------------------------
// Duration grammar
// ---------------------------------------------------------------------------

fn unit_ms(unit: &str) -> Option<f64> {
    let ms = match unit.to_ascii_lowercase().as_str() {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => SECOND_MS,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE_MS,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR_MS,
        "d" | "day" | "days" => DAY_MS,
        "w" | "week" | "weeks" => WEEK_MS,
        "mo" | "month" | "months" => MONTH_MS,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR_MS,
        _ => return None,
    };
    Some(ms)
}

/// Parse a human duration such as `1 Day`, `4 hours`, `3.5 days` or `90000`
/// (a bare number is milliseconds). Returns `None` for anything else.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let caps = duration_re().captures(text)?;
    let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
    let per_unit = match caps.get(2) {
        Some(unit) => unit_ms(unit.as_str())?,
        None => 1.0,
    };
    let ms = amount * per_unit;
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    Some(Duration::from_millis(ms.round() as u64))
}

// ---------------------------------------------------------------------------
// Label accessors
// ---------------------------------------------------------------------------

/// Duration declared by the first `Time: <N unit` label.
///
/// `Ok(None)` when no time label exists; `Err` when the first matching label
/// carries text that isn't a duration.
pub fn try_parse_time_label<S: AsRef<str>>(labels: &[S]) -> Result<Option<Duration>> {
    let Some(caps) = labels.iter().find_map(|l| time_re().captures(l.as_ref())) else {
        return Ok(None);
    };
    let text = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    match parse_duration(text) {
        Some(d) => Ok(Some(d)),
        None => Err(WardenError::InvalidLabel(format!("Time: <{text}"))),
    }
}

/// Duration of the first time label, or zero if none exists or it is malformed.
pub fn parse_time_label<S: AsRef<str>>(labels: &[S]) -> Duration {
    try_parse_time_label(labels)
        .ok()
        .flatten()
        .unwrap_or(Duration::ZERO)
}

/// Value of the first `Priority: N` label; [`DEFAULT_PRIORITY`] when absent
/// or malformed. Zero is treated as malformed.
pub fn parse_priority_label<S: AsRef<str>>(labels: &[S]) -> u64 {
    labels
        .iter()
        .find_map(|l| priority_re().captures(l.as_ref()))
        .and_then(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(DEFAULT_PRIORITY)
}

/// Full text of the first priority label, used to look up allowance tables.
pub fn priority_label<S: AsRef<str>>(labels: &[S]) -> Option<&str> {
    labels
        .iter()
        .map(|l| l.as_ref())
        .find(|l| priority_re().is_match(l))
}

/// Value of the first `price: N` label (case-insensitive).
pub fn parse_price_label<S: AsRef<str>>(labels: &[S]) -> Option<u64> {
    labels
        .iter()
        .find_map(|l| price_re().captures(l.as_ref()))
        .and_then(|caps| caps.get(1)?.as_str().parse().ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
