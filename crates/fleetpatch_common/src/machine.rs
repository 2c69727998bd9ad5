//! Fleet machine models.
//!
//! A `TargetMachine` is one patchable unit, rebuilt from the inventory
//! snapshot every run and never persisted. A `ConnectedMachine` is one
//! row of the heartbeat roster the reconciliation pass consumes.

use crate::policy::PatchPolicy;
use crate::telemetry::LogsTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse OS split; only Linux machines are patched by this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsKind {
    Linux,
    Other,
}

impl OsKind {
    /// Classify an OS descriptor string as reported by inventory or
    /// telemetry ("Linux", "Windows", ...).
    pub fn from_descriptor(descriptor: &str) -> Self {
        if descriptor.eq_ignore_ascii_case("linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for OsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

/// Where a machine is registered with the management plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineSource {
    /// Cloud-native virtual machine.
    CloudVm,
    /// On-premises host connected through the hybrid agent.
    HybridHost,
}

/// One patchable unit, as observed this run.
#[derive(Debug, Clone)]
pub struct TargetMachine {
    /// Opaque full resource id.
    pub identity: String,
    pub name: String,
    pub resource_group: String,
    pub os: OsKind,
    pub source: MachineSource,
    /// Parsed patch policy; `None` when the tag is absent or malformed,
    /// in which case the machine is skipped.
    pub policy: Option<PatchPolicy>,
}

/// One row of the heartbeat roster query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedMachine {
    pub computer: String,
    pub resource_group: String,
    pub os_type: String,
    /// Resource name used to resolve the machine against inventory.
    pub resource: String,
}

/// Decode the heartbeat roster table into typed rows.
pub fn connected_machines(table: &LogsTable) -> Vec<ConnectedMachine> {
    let computer = table.column_index("Computer");
    let resource_group = table.column_index("ResourceGroup");
    let os_type = table.column_index("OSType");
    let resource = table.column_index("Resource");

    let cell = |row: &[Value], idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    table
        .rows
        .iter()
        .map(|row| ConnectedMachine {
            computer: cell(row, computer),
            resource_group: cell(row, resource_group),
            os_type: cell(row, os_type),
            resource: cell(row, resource),
        })
        .collect()
}
