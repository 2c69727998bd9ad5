//! Fleetpatch batch runner.
//!
//! Runs once per invocation (an external timer triggers it): creates
//! deployment schedules for machines that need patching, then reconciles
//! the membership and recurrence of every existing configuration.

use anyhow::Result;
use fleetpatch_common::config::{access_token_from_env, Config};
use fleetpatch_common::occurrence;
use fleetpatchd::clients::rest::{ArmClient, LogsClient};
use fleetpatchd::{deploy, reconcile};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("fleetpatchd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let token = access_token_from_env()?;

    let arm = ArmClient::new(&config, token.clone())?;
    let logs = LogsClient::new(&config, token)?;

    // Run-fatal when unresolvable: every query downstream is keyed by the
    // linked workspace.
    let workspace_resource_id = arm.linked_workspace().await?;
    let workspace_name = workspace_resource_id
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let workspace_id = arm.workspace_customer_id(&workspace_name).await?;
    info!("linked workspace {} resolved", workspace_name);

    let now = occurrence::wall_clock_now(config.window.utc_offset_minutes);

    let deploy_report = deploy::run(&config, &arm, &logs, &arm, &workspace_id, now).await?;
    deploy_report.emit();

    let reconcile_report = reconcile::run(
        &config,
        &arm,
        &logs,
        &arm,
        &workspace_id,
        &workspace_resource_id,
        now.date(),
    )
    .await?;
    reconcile_report.emit();

    info!("fleetpatchd run complete");
    Ok(())
}
