use super::open_store;
use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use warden_core::events::{handle_event, EventFields, TrackerEvent};
use warden_core::types::RepoRef;

pub fn run(
    store: &Path,
    name: &str,
    repo: &str,
    issue: u64,
    comment_id: Option<u64>,
    closes: Vec<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let repo: RepoRef = repo.parse()?;
    let event = TrackerEvent::parse(name, &EventFields { comment_id, closes })
        .with_context(|| format!("invalid {name} event"))?;
    let store = open_store(store)?;
    let outcome = handle_event(&store, &repo, issue, &event)?;

    if json {
        print_json(&serde_json::json!({
            "event": name,
            "repo": repo.key(),
            "issue": issue,
            "outcome": outcome,
        }))?;
    } else {
        println!("{repo}#{issue}: {outcome}");
    }
    Ok(())
}
