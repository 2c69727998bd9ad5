//! In-memory fake collaborators for pass-level tests.
#![allow(dead_code)] // each test binary uses a subset of these helpers

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use fleetpatch_common::error::FleetError;
use fleetpatch_common::machine::{MachineSource, OsKind, TargetMachine};
use fleetpatch_common::policy::PatchPolicy;
use fleetpatch_common::schedule::ScheduleConfiguration;
use fleetpatch_common::telemetry::{LogsTable, QueryOutcome};

use fleetpatchd::clients::{Inventory, ScheduleRef, ScheduleStore, Telemetry};

pub fn machine(name: &str, os: OsKind, tag: Option<&str>) -> TargetMachine {
    TargetMachine {
        identity: format!("/subscriptions/x/resourceGroups/rg-fleet/providers/Microsoft.Compute/virtualMachines/{}", name),
        name: name.to_string(),
        resource_group: "rg-fleet".to_string(),
        os,
        source: MachineSource::CloudVm,
        policy: tag.and_then(|t| PatchPolicy::parse("LINUX", t)),
    }
}

/// Pending-updates table with one row per (resource id, product) pair.
pub fn update_table(rows: &[(&str, &str)]) -> LogsTable {
    LogsTable {
        columns: vec![
            "ResourceId".to_string(),
            "Computer".to_string(),
            "id".to_string(),
            "displayName".to_string(),
            "productArch".to_string(),
            "classification".to_string(),
        ],
        rows: rows
            .iter()
            .map(|(resource_id, product)| {
                vec![
                    json!(resource_id),
                    json!("host"),
                    json!(format!("{}_x86_64", product)),
                    json!(product),
                    json!("x86_64"),
                    json!("Security Updates"),
                ]
            })
            .collect(),
    }
}

/// Heartbeat roster table with one row per (computer, os type) pair.
pub fn roster_table(rows: &[(&str, &str)]) -> LogsTable {
    LogsTable {
        columns: vec![
            "Computer".to_string(),
            "ResourceGroup".to_string(),
            "OSType".to_string(),
            "Resource".to_string(),
        ],
        rows: rows
            .iter()
            .map(|(computer, os_type)| {
                vec![
                    json!(computer),
                    json!("rg-fleet"),
                    json!(os_type),
                    json!(computer),
                ]
            })
            .collect(),
    }
}

#[derive(Default)]
pub struct FakeInventory {
    pub machines: Vec<TargetMachine>,
    pub by_name: HashMap<String, TargetMachine>,
    pub missing: HashSet<String>,
}

impl FakeInventory {
    pub fn with_roster(machines: Vec<TargetMachine>) -> Self {
        let by_name = machines
            .iter()
            .map(|m| (m.name.clone(), m.clone()))
            .collect();
        Self {
            machines,
            by_name,
            missing: HashSet::new(),
        }
    }
}

#[async_trait]
impl Inventory for FakeInventory {
    async fn list_all(&self) -> Result<Vec<TargetMachine>, FleetError> {
        Ok(self.machines.clone())
    }

    async fn get(&self, _resource_group: &str, name: &str) -> Result<TargetMachine, FleetError> {
        if self.missing.contains(name) {
            return Err(FleetError::MachineLookup(name.to_string()));
        }
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::MachineLookup(name.to_string()))
    }
}

pub struct FakeTelemetry {
    pub updates: QueryOutcome,
    pub roster: QueryOutcome,
}

impl FakeTelemetry {
    pub fn with_updates(updates: QueryOutcome) -> Self {
        Self {
            updates,
            roster: QueryOutcome::success(LogsTable::default()),
        }
    }

    pub fn with_roster(roster: QueryOutcome) -> Self {
        Self {
            updates: QueryOutcome::success(LogsTable::default()),
            roster,
        }
    }
}

#[async_trait]
impl Telemetry for FakeTelemetry {
    async fn query(
        &self,
        _workspace_id: &str,
        query: &str,
        _lookback_hours: i64,
    ) -> Result<QueryOutcome, FleetError> {
        if query.starts_with("Heartbeat") {
            Ok(self.roster.clone())
        } else {
            Ok(self.updates.clone())
        }
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub stored: Mutex<HashMap<String, ScheduleConfiguration>>,
    pub reject: HashSet<String>,
}

impl FakeStore {
    pub fn with_configs(configs: Vec<ScheduleConfiguration>) -> Self {
        let stored = configs.into_iter().map(|c| (c.name.clone(), c)).collect();
        Self {
            stored: Mutex::new(stored),
            reject: HashSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<ScheduleConfiguration> {
        self.stored.lock().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.stored.lock().unwrap().len()
    }
}

#[async_trait]
impl ScheduleStore for FakeStore {
    async fn list(&self) -> Result<Vec<ScheduleRef>, FleetError> {
        let mut names: Vec<String> = self.stored.lock().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names.into_iter().map(|name| ScheduleRef { name }).collect())
    }

    async fn get_by_name(&self, name: &str) -> Result<ScheduleConfiguration, FleetError> {
        self.stored
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::Api(format!("configuration {} not found", name)))
    }

    async fn upsert(&self, name: &str, config: &ScheduleConfiguration) -> Result<(), FleetError> {
        if self.reject.contains(name) {
            return Err(FleetError::ScheduleUpsert {
                name: name.to_string(),
                message: "store rejected the configuration".to_string(),
            });
        }
        self.stored
            .lock()
            .unwrap()
            .insert(name.to_string(), config.clone());
        Ok(())
    }
}
