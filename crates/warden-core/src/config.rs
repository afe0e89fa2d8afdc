use crate::error::{Result, WardenError};
use crate::labels::parse_duration;
use crate::types::{ActivityKind, RepoRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WatchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// Repository names (or `owner/name`) never evaluated.
    #[serde(default)]
    pub opt_out: BTreeSet<String>,
    /// Repositories whose open assigned issues are evaluated on every run.
    #[serde(default)]
    pub repositories: Vec<String>,
}

// ---------------------------------------------------------------------------
// Allowance tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Priority label text → number of extensions granted.
    #[serde(default)]
    pub amounts: BTreeMap<String, u32>,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            amounts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpsConfig {
    #[serde(default)]
    pub amounts: BTreeMap<String, u32>,
}

// ---------------------------------------------------------------------------
// RateLimitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default = "default_max_operations")]
    pub max_operations: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_max_operations() -> u32 {
    500
}

fn default_window_ms() -> u64 {
    60_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            window_ms: default_window_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_warning", with = "duration_ms")]
    pub warning: Duration,
    #[serde(default = "default_disqualification", with = "duration_ms")]
    pub disqualification: Duration,
    #[serde(default = "default_true")]
    pub pull_request_required: bool,
    #[serde(default = "default_whitelist")]
    pub event_whitelist: BTreeSet<ActivityKind>,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default, with = "duration_ms")]
    pub negligence_threshold: Duration,
    #[serde(default)]
    pub available_deadline_extensions: ExtensionsConfig,
    #[serde(default)]
    pub top_ups: TopUpsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_warning() -> Duration {
    Duration::from_millis(84 * 60 * 60 * 1000)
}

fn default_disqualification() -> Duration {
    Duration::from_millis(7 * 24 * 60 * 60 * 1000)
}

fn default_true() -> bool {
    true
}

fn default_whitelist() -> BTreeSet<ActivityKind> {
    ActivityKind::all().iter().copied().collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warning: default_warning(),
            disqualification: default_disqualification(),
            pull_request_required: true,
            event_whitelist: default_whitelist(),
            watch: WatchConfig::default(),
            negligence_threshold: Duration::ZERO,
            available_deadline_extensions: ExtensionsConfig::default(),
            top_ups: TopUpsConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(WardenError::NotFound(format!(
                "config file {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn reminders_enabled(&self) -> bool {
        !self.warning.is_zero()
    }

    pub fn disqualification_enabled(&self) -> bool {
        !self.disqualification.is_zero()
    }

    pub fn is_whitelisted(&self, kind: ActivityKind) -> bool {
        self.event_whitelist.contains(&kind)
    }

    pub fn is_opted_out(&self, repo: &RepoRef) -> bool {
        self.watch.opt_out.contains(&repo.name) || self.watch.opt_out.contains(&repo.key())
    }

    /// Parsed `watch.repositories`; malformed entries are skipped (see [`Config::validate`]).
    pub fn repositories(&self) -> Vec<RepoRef> {
        self.watch
            .repositories
            .iter()
            .filter_map(|r| r.parse().ok())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.reminders_enabled()
            && self.disqualification_enabled()
            && self.warning >= self.disqualification
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "warning ({}ms) is not shorter than disqualification ({}ms); reminders will never be sent",
                    self.warning.as_millis(),
                    self.disqualification.as_millis()
                ),
            });
        }

        if self.event_whitelist.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "eventWhitelist is empty: no activity will ever reset the deadline"
                    .to_string(),
            });
        }

        if self.rate_limit.max_operations == 0 || self.rate_limit.window_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "rateLimit.maxOperations and rateLimit.windowMs must be positive"
                    .to_string(),
            });
        }

        for repo in &self.watch.repositories {
            if repo.parse::<RepoRef>().is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("watch.repositories entry '{repo}' is not owner/repo"),
                });
            }
        }

        for (label, count) in &self.available_deadline_extensions.amounts {
            if *count == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("availableDeadlineExtensions.amounts['{label}'] is 0"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Serde helpers for Duration (milliseconds or human text)
// ---------------------------------------------------------------------------

mod duration_ms {
    use super::*;
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(d: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawDuration::deserialize(d)? {
            // Zero and negative values disable the feature.
            RawDuration::Millis(ms) if ms <= 0 => Ok(Duration::ZERO),
            RawDuration::Millis(ms) => Ok(Duration::from_millis(ms as u64)),
            RawDuration::Text(text) => parse_duration(&text)
                .ok_or_else(|| D::Error::custom(format!("invalid duration '{text}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
