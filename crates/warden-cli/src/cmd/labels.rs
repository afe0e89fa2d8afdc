use crate::output::{print_json, print_pairs};
use serde::Serialize;
use warden_core::labels::{parse_price_label, parse_priority_label, parse_time_label, priority_label};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParsedLabels<'a> {
    time_ms: u64,
    priority: u64,
    priority_label: Option<&'a str>,
    price: Option<u64>,
}

pub fn run(labels: &[String], json: bool) -> anyhow::Result<()> {
    let parsed = ParsedLabels {
        time_ms: parse_time_label(labels).as_millis() as u64,
        priority: parse_priority_label(labels),
        priority_label: priority_label(labels),
        price: parse_price_label(labels),
    };

    if json {
        print_json(&parsed)?;
    } else {
        print_pairs(&[
            ("time", format!("{}ms", parsed.time_ms)),
            ("priority", parsed.priority.to_string()),
            (
                "price",
                parsed
                    .price
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    Ok(())
}
