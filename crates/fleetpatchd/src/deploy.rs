//! Deployment pass: one schedule per machine that needs patching.
//!
//! roster + telemetry -> update-need resolution -> (per machine) next
//! occurrence -> assembled schedule -> store upsert. Per-machine failures
//! are isolated; one bad machine or one rejected upsert never halts the
//! batch.

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use fleetpatch_common::config::Config;
use fleetpatch_common::error::FleetError;
use fleetpatch_common::machine::OsKind;
use fleetpatch_common::occurrence;
use fleetpatch_common::report::RunReport;
use fleetpatch_common::schedule::{self, MaintenanceWindow, ScheduleConfiguration};
use fleetpatch_common::telemetry::{PendingUpdateSet, QueryStatus};

use crate::clients::{Inventory, ScheduleStore, Telemetry};
use crate::queries;

/// Run the deployment pass at wall-clock `now` (target timezone).
pub async fn run(
    config: &Config,
    inventory: &impl Inventory,
    telemetry: &impl Telemetry,
    store: &impl ScheduleStore,
    workspace_id: &str,
    now: NaiveDateTime,
) -> Result<RunReport, FleetError> {
    let mut report = RunReport::new("deploy");

    let query = queries::pending_updates_query(config.telemetry.update_lookback_hours);
    let outcome = telemetry
        .query(workspace_id, &query, config.telemetry.update_lookback_hours)
        .await?;

    if outcome.status == QueryStatus::Partial {
        let message = outcome
            .error
            .clone()
            .unwrap_or_else(|| "unknown backend error".to_string());
        warn!("pending-updates query returned partial results: {}", message);
        report.telemetry_partial = true;
        report.notice(format!("telemetry partial, data may be incomplete: {}", message));
    }

    let pending = PendingUpdateSet::from_table(&outcome.table);
    debug!("{} pending-update rows in snapshot", pending.row_count());

    for machine in inventory.list_all().await? {
        report.machines_seen += 1;

        let Some(policy) = machine.policy else {
            debug!("machine {} has no patch policy, skipping", machine.identity);
            report.skipped_no_policy += 1;
            continue;
        };

        if machine.os != OsKind::Linux {
            debug!("machine {} is not Linux, skipping", machine.identity);
            report.skipped_wrong_os += 1;
            continue;
        }

        let updates = pending.updates_for(&machine.identity);
        if updates.is_empty() {
            info!("machine {} does not need to be patched", machine.identity);
            report.skipped_no_updates += 1;
            continue;
        }

        let start = occurrence::next_occurrence(&policy, now);
        let tag = policy.tag(&config.policy.tag_prefix);
        let name = schedule::schedule_name(&config.policy.schedule_name_prefix, &tag, &machine.name);

        let schedule = ScheduleConfiguration {
            name: name.clone(),
            operating_system: OsKind::Linux.descriptor().to_string(),
            azure_machine_ids: vec![machine.identity.clone()],
            machine_names: vec![],
            update_list: updates,
            window: MaintenanceWindow::one_time(start, config.window.time_zone.clone()),
            dynamic_query: None,
        };

        match store.upsert(&name, &schedule).await {
            Ok(()) => {
                info!("new deployment schedule created for {}", machine.identity);
                report.schedules_created += 1;
            }
            Err(e) => {
                warn!("schedule upsert rejected for {}: {}", name, e);
                report.upsert_failures += 1;
                report.notice(format!("upsert rejected for {}: {}", name, e));
            }
        }
    }

    Ok(report)
}
