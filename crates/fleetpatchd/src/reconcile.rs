//! Reconciliation pass: keep existing schedule configurations in step
//! with the live roster.
//!
//! Membership is reset and rebuilt from the roster every run - never
//! diffed against the stored list, so machines that left the roster drop
//! out. The one-time window is nudged one day forward per run; the
//! configuration was created on the correct weekday and only needs to
//! stay pending until it fires.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use fleetpatch_common::config::Config;
use fleetpatch_common::error::FleetError;
use fleetpatch_common::machine::{connected_machines, OsKind};
use fleetpatch_common::report::RunReport;
use fleetpatch_common::schedule::SavedSearchTarget;
use fleetpatch_common::telemetry::QueryStatus;

use crate::clients::{Inventory, ScheduleStore, Telemetry};
use crate::queries;

/// Run the reconciliation pass dated `run_date` (target timezone).
///
/// `workspace_id` keys telemetry queries; `workspace_resource_id` is the
/// full resource id attached to dynamic query targets.
pub async fn run(
    config: &Config,
    inventory: &impl Inventory,
    telemetry: &impl Telemetry,
    store: &impl ScheduleStore,
    workspace_id: &str,
    workspace_resource_id: &str,
    run_date: NaiveDate,
) -> Result<RunReport, FleetError> {
    let mut report = RunReport::new("reconcile");

    let outcome = telemetry
        .query(
            workspace_id,
            queries::HEARTBEAT_ROSTER_QUERY,
            config.telemetry.heartbeat_lookback_hours,
        )
        .await?;

    if outcome.status == QueryStatus::Partial {
        let message = outcome
            .error
            .clone()
            .unwrap_or_else(|| "unknown backend error".to_string());
        warn!("heartbeat roster query returned partial results: {}", message);
        report.telemetry_partial = true;
        report.notice(format!("telemetry partial, roster may be incomplete: {}", message));
    }

    let roster = connected_machines(&outcome.table);
    report.machines_seen = roster.len();
    debug!("{} machines in live roster", roster.len());

    for schedule_ref in store.list().await? {
        let mut schedule = match store.get_by_name(&schedule_ref.name).await {
            Ok(s) => s,
            Err(e) => {
                warn!("cannot load configuration {}: {}", schedule_ref.name, e);
                report.notice(format!("configuration {} skipped: {}", schedule_ref.name, e));
                continue;
            }
        };

        schedule.reset_membership();

        for connected in &roster {
            let machine = match inventory.get(&connected.resource_group, &connected.resource).await
            {
                Ok(m) => m,
                Err(FleetError::MachineLookup(name)) => {
                    debug!("machine {} not found", name);
                    report.lookup_failures += 1;
                    continue;
                }
                Err(e) => {
                    warn!("inventory lookup failed for {}: {}", connected.resource, e);
                    report.lookup_failures += 1;
                    continue;
                }
            };

            let Some(policy) = machine.policy else {
                continue;
            };

            let tag = policy.tag(&config.policy.tag_prefix);
            let os = OsKind::from_descriptor(&connected.os_type);
            if schedule.accepts(os, &tag) {
                schedule.add_member(&connected.computer);
            }
        }

        schedule.roll_window_forward(run_date);
        schedule.attach_dynamic_query(SavedSearchTarget {
            function_alias: config.account.saved_search_alias.clone(),
            workspace_id: workspace_resource_id.to_string(),
        });

        match store.upsert(&schedule_ref.name, &schedule).await {
            Ok(()) => {
                info!(
                    "configuration {} reconciled, {} members",
                    schedule_ref.name,
                    schedule.machine_names.len()
                );
                report.configurations_reconciled += 1;
            }
            Err(e) => {
                warn!("schedule upsert rejected for {}: {}", schedule_ref.name, e);
                report.upsert_failures += 1;
                report.notice(format!("upsert rejected for {}: {}", schedule_ref.name, e));
            }
        }
    }

    Ok(report)
}
