use super::{github_client, load_config, open_store, runtime};
use crate::output::{print_json, print_pairs};
use std::path::Path;
use warden_core::cron::{run_cron, CronMode};
use warden_core::ratelimit::RateLimiter;

pub fn run(config: Option<&Path>, store: &Path, all: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let client = github_client()?;
    let store = open_store(store)?;
    let mode = if all { CronMode::All } else { CronMode::FirstPerRepo };

    let report = runtime()?.block_on(async {
        let mut limiter = RateLimiter::from_config(&config.rate_limit);
        run_cron(&client, &store, &mut limiter, mode, chrono::Utc::now()).await
    })?;

    if json {
        print_json(&report)?;
    } else {
        print_pairs(&[
            ("refreshed", report.refreshed.to_string()),
            ("pruned", report.pruned.to_string()),
            ("failed", report.failed.to_string()),
        ]);
    }
    Ok(())
}
