//! External collaborator seams.
//!
//! The passes only ever see these traits; production wires them to the
//! REST clients in [`rest`], tests to in-memory fakes. Permission to fail
//! is part of each contract: `Inventory::get` answers `MachineLookup` for
//! unknown machines, `Telemetry::query` may answer `Partial`, and the
//! store may reject an individual upsert - none of which aborts a pass.

pub mod rest;

use async_trait::async_trait;
use fleetpatch_common::error::FleetError;
use fleetpatch_common::machine::TargetMachine;
use fleetpatch_common::schedule::ScheduleConfiguration;
use fleetpatch_common::telemetry::QueryOutcome;

/// Name reference to a stored schedule configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRef {
    pub name: String,
}

/// Machine inventory across the account's scopes: cloud-native machines
/// via `list_all`, hybrid-connected hosts via `get`.
#[async_trait]
pub trait Inventory {
    async fn list_all(&self) -> Result<Vec<TargetMachine>, FleetError>;

    /// Resolve one machine by resource group and name. Answers
    /// `FleetError::MachineLookup` when the machine is unknown.
    async fn get(&self, resource_group: &str, name: &str) -> Result<TargetMachine, FleetError>;
}

/// Log/metrics backend accepting a fixed query over a lookback window.
#[async_trait]
pub trait Telemetry {
    async fn query(
        &self,
        workspace_id: &str,
        query: &str,
        lookback_hours: i64,
    ) -> Result<QueryOutcome, FleetError>;
}

/// External scheduler store. `upsert` is an idempotent create-or-update
/// keyed by the configuration name.
#[async_trait]
pub trait ScheduleStore {
    async fn list(&self) -> Result<Vec<ScheduleRef>, FleetError>;

    async fn get_by_name(&self, name: &str) -> Result<ScheduleConfiguration, FleetError>;

    async fn upsert(&self, name: &str, config: &ScheduleConfiguration) -> Result<(), FleetError>;
}
