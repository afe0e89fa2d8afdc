pub mod config;
pub mod cron;
pub mod event;
pub mod labels;
pub mod run;

use anyhow::Context;
use std::path::Path;
use warden_core::config::Config;
use warden_core::tracker::GitHubClient;
use warden_core::tracking::TrackingDb;

pub const DEFAULT_CONFIG: &str = "warden.yaml";

/// Config from `path`, else `warden.yaml` when present, else defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::load(p).with_context(|| format!("failed to load {}", p.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Config::load(Path::new(DEFAULT_CONFIG)).context("failed to load warden.yaml")
        }
        None => Ok(Config::default()),
    }
}

pub fn open_store(path: &Path) -> anyhow::Result<TrackingDb> {
    TrackingDb::open(path)
        .with_context(|| format!("failed to open tracking store {}", path.display()))
}

/// Client authenticated with `GITHUB_TOKEN`.
pub fn github_client() -> anyhow::Result<GitHubClient> {
    let token = std::env::var("GITHUB_TOKEN").context("GITHUB_TOKEN is not set")?;
    GitHubClient::new(token).context("failed to build GitHub client")
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start tokio runtime")
}
