//! Schedule Simulator - dry-runs the occurrence calculator over a
//! synthetic fleet.
//!
//! Usage:
//!   schedule_sim                          # now = current UTC wall clock
//!   schedule_sim 2021-06-06T10:00:00     # explicit reference instant
//!
//! Prints one JSON report per synthetic machine: its tag, the computed
//! window start, and how far away that is. Handy for eyeballing weekday
//! wraparound before changing fleet tags.

use chrono::{NaiveDateTime, Utc};
use fleetpatch_common::occurrence;
use fleetpatch_common::policy::PatchPolicy;
use serde::Serialize;

const TAG_PREFIX: &str = "LINUX";

#[derive(Debug, Serialize)]
struct ForecastEntry {
    machine: String,
    tag: String,
    window_start: String,
    hours_until: i64,
    same_day: bool,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    reference_now: String,
    entries: Vec<ForecastEntry>,
}

fn synthetic_tags() -> Vec<String> {
    let mut tags = Vec::new();
    for variant in ["R", "Q", "P"] {
        for day in ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"] {
            for hour in ["03", "12", "22"] {
                tags.push(format!("{}-{}-{}-{}:00", TAG_PREFIX, variant, day, hour));
            }
        }
    }
    tags
}

fn main() {
    let now = std::env::args()
        .nth(1)
        .and_then(|raw| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S").ok())
        .unwrap_or_else(|| Utc::now().naive_utc());

    let mut entries = Vec::new();
    for (index, tag) in synthetic_tags().iter().enumerate() {
        let Some(policy) = PatchPolicy::parse(TAG_PREFIX, tag) else {
            continue;
        };

        let start = occurrence::next_occurrence(&policy, now);
        entries.push(ForecastEntry {
            machine: format!("sim-host-{:02}", index),
            tag: tag.clone(),
            window_start: start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            hours_until: (start - now).num_hours(),
            same_day: start.date() == now.date(),
        });
    }

    let report = SimulationReport {
        reference_now: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        entries,
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to render report: {}", e),
    }
}
