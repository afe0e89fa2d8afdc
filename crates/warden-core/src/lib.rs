pub mod activity;
pub mod allowance;
pub mod config;
pub mod cron;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod events;
pub mod labels;
pub mod marker;
pub mod ratelimit;
pub mod tracker;
pub mod tracking;
pub mod types;
pub mod watch;

pub use error::{Result, WardenError};

/// Revision stamped into comment markers. Set `GIT_REVISION` at build time
/// to embed the commit hash; otherwise the crate version is used.
pub const REVISION: &str = match option_env!("GIT_REVISION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
