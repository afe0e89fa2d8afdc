//! Structured comment markers.
//!
//! A marker is an HTML comment carrying a JSON payload. It is invisible when
//! the comment is rendered, and lets later evaluations recognise comments the
//! engine posted itself:
//!
//! ```text
//! <!-- Ubiquity - Reminder - remind_assignees - 0.1.0
//! {
//!   "taskAssignees": [42],
//!   "timestamp": "2024-05-01T12:00:00Z"
//! }
//! -->
//! ```

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub const MARKER_PREFIX: &str = "Ubiquity";

/// Class of reminder comments.
pub const REMINDER_CLASS: &str = "Reminder";
/// Class of disqualification comments.
pub const UNASSIGN_CLASS: &str = "Unassign";

static MARKER_RE: OnceLock<Regex> = OnceLock::new();

fn marker_re() -> &'static Regex {
    MARKER_RE.get_or_init(|| {
        Regex::new(r"(?s)<!--\s*Ubiquity - (\S+) - (\S+) - (\S+)[ \t]*\r?\n(.*?)\r?\n-->").unwrap()
    })
}

// ---------------------------------------------------------------------------
// LogLevel
// ---------------------------------------------------------------------------

/// Severity attached to the comment that carries a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Fatal,
    Error,
    Info,
    Verbose,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// StructuredMarker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredMarker {
    pub class: String,
    /// Label of the operation that produced the comment, supplied by the caller.
    pub caller: String,
    pub revision: String,
    pub payload: serde_json::Value,
}

impl StructuredMarker {
    pub fn new(
        class: impl Into<String>,
        caller: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            class: class.into(),
            caller: caller.into(),
            revision: crate::REVISION.to_string(),
            payload,
        }
    }

    /// Render the marker. `Fatal` additionally echoes the payload in a
    /// visible fenced block above the hidden comment.
    pub fn render(&self, level: LogLevel) -> String {
        let json = serde_json::to_string_pretty(&self.payload)
            .unwrap_or_else(|_| "{}".to_string())
            .replace("-->", "--\\u003e");
        let hidden = format!(
            "<!-- {MARKER_PREFIX} - {} - {} - {}\n{json}\n-->",
            self.class, self.caller, self.revision
        );
        match level {
            LogLevel::Fatal => format!("```json\n{json}\n```\n{hidden}"),
            _ => hidden,
        }
    }

    /// Every well-formed marker in `body`, in order of appearance.
    pub fn parse_all(body: &str) -> Vec<StructuredMarker> {
        marker_re()
            .captures_iter(body)
            .filter_map(|caps| {
                let payload = serde_json::from_str(caps.get(4)?.as_str()).ok()?;
                Some(StructuredMarker {
                    class: caps.get(1)?.as_str().to_string(),
                    caller: caps.get(2)?.as_str().to_string(),
                    revision: caps.get(3)?.as_str().to_string(),
                    payload,
                })
            })
            .collect()
    }

    /// First marker of the given class in `body`.
    pub fn find(body: &str, class: &str) -> Option<StructuredMarker> {
        Self::parse_all(body).into_iter().find(|m| m.class == class)
    }

    /// `timestamp` embedded in the payload, if present and valid.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.payload
            .get("timestamp")?
            .as_str()?
            .parse::<DateTime<Utc>>()
            .ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reminder() -> StructuredMarker {
        StructuredMarker::new(
            REMINDER_CLASS,
            "remind_assignees",
            json!({ "taskAssignees": [42], "timestamp": "2024-05-01T12:00:00Z" }),
        )
    }

    #[test]
    fn render_layout_is_exact() {
        let mut marker = reminder();
        marker.revision = "abc123".to_string();
        let rendered = marker.render(LogLevel::Info);
        assert_eq!(
            rendered,
            "<!-- Ubiquity - Reminder - remind_assignees - abc123\n{\n  \"taskAssignees\": [\n    42\n  ],\n  \"timestamp\": \"2024-05-01T12:00:00Z\"\n}\n-->"
        );
    }

    #[test]
    fn fatal_echoes_payload_visibly() {
        let rendered = reminder().render(LogLevel::Fatal);
        assert!(rendered.starts_with("```json\n{"));
        assert!(rendered.contains("```\n<!-- Ubiquity - Reminder"));
    }

    #[test]
    fn parse_recovers_rendered_marker() {
        let body = format!("@alice, this task looks idle.\n\n{}", reminder().render(LogLevel::Info));
        let found = StructuredMarker::find(&body, REMINDER_CLASS).unwrap();
        assert_eq!(found.caller, "remind_assignees");
        assert_eq!(found.revision, crate::REVISION);
        assert_eq!(
            found.timestamp().unwrap(),
            "2024-05-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(StructuredMarker::find(&body, UNASSIGN_CLASS).is_none());
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let body = "<!-- Ubiquity - Reminder - x - y\nnot json\n-->";
        assert!(StructuredMarker::parse_all(body).is_empty());
    }

    #[test]
    fn payload_cannot_close_the_comment_early() {
        let marker = StructuredMarker::new(UNASSIGN_CLASS, "unassign", json!({ "note": "a --> b" }));
        let rendered = marker.render(LogLevel::Info);
        assert_eq!(rendered.matches("-->").count(), 1);
        let parsed = StructuredMarker::find(&rendered, UNASSIGN_CLASS).unwrap();
        assert_eq!(parsed.payload["note"], "a --> b");
    }
}
