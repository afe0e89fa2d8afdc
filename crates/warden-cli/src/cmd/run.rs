use super::{github_client, load_config, open_store, runtime};
use crate::output::{print_json, print_pairs};
use std::path::Path;
use warden_core::watch::run_watch;

pub fn run(config: Option<&Path>, store: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let client = github_client()?;
    let store = open_store(store)?;

    let report = runtime()?.block_on(run_watch(&client, Some(&store), &config, chrono::Utc::now()))?;

    if json {
        print_json(&report)?;
    } else {
        print_pairs(&[
            ("repositories", report.repositories.to_string()),
            ("evaluated", report.evaluated.to_string()),
            ("no action", report.no_action.to_string()),
            ("reminders", report.reminders.to_string()),
            ("unassigned", report.unassigned.to_string()),
            ("failures", report.failures.to_string()),
        ]);
    }
    Ok(())
}
