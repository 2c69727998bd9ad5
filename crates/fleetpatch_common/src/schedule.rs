//! Maintenance windows and schedule configurations.
//!
//! A schedule configuration bundles target machines, an update list and a
//! one-time maintenance window. The external scheduler store owns the
//! persisted objects; this module only computes desired field values and
//! the deterministic name that makes re-submission an idempotent upsert.

use crate::machine::OsKind;
use crate::occurrence;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Every window is exactly two hours long.
pub const WINDOW_DURATION_HOURS: i64 = 2;

/// Machines are always rebooted after patching.
pub const REBOOT_SETTING: &str = "Always";

/// A one-time maintenance window in the target timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    /// Wall-clock start in `time_zone`.
    pub start: NaiveDateTime,
    /// Timezone label handed through to the scheduler, e.g. "Europe/Paris".
    pub time_zone: String,
    pub is_enabled: bool,
}

impl MaintenanceWindow {
    pub fn one_time(start: NaiveDateTime, time_zone: impl Into<String>) -> Self {
        Self {
            start,
            time_zone: time_zone.into(),
            is_enabled: true,
        }
    }
}

/// Dynamic query target: a saved-search alias plus the workspace it lives
/// in. Machines matching the saved search are included even when not
/// explicitly listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSearchTarget {
    pub function_alias: String,
    pub workspace_id: String,
}

/// Desired state of one software-update deployment schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfiguration {
    /// Deterministic name; unchanged across reconciliation runs.
    pub name: String,
    /// OS descriptor set the configuration declares, e.g. "Linux".
    pub operating_system: String,
    /// Cloud-native machines targeted by resource id.
    pub azure_machine_ids: Vec<String>,
    /// Explicit hybrid-host membership, rebuilt from scratch each run.
    pub machine_names: Vec<String>,
    /// Pending product names to include in the deployment.
    pub update_list: Vec<String>,
    pub window: MaintenanceWindow,
    pub dynamic_query: Option<SavedSearchTarget>,
}

impl ScheduleConfiguration {
    /// Membership predicate for reconciliation: the machine's OS kind must
    /// appear in the configuration's declared OS set, and its policy tag,
    /// with `:` replaced by `-`, must appear in the configuration name.
    pub fn accepts(&self, os: OsKind, policy_tag: &str) -> bool {
        self.operating_system.contains(os.descriptor())
            && self.name.contains(&policy_tag.replace(':', "-"))
    }

    /// Clear the explicit membership list. Membership is recomputed from
    /// scratch every run, never diffed against history, so machines that
    /// left the roster disappear from the configuration.
    pub fn reset_membership(&mut self) {
        self.machine_names.clear();
    }

    /// Append a machine unless already present. Returns whether the list
    /// changed.
    pub fn add_member(&mut self, machine_name: &str) -> bool {
        if self.machine_names.iter().any(|m| m == machine_name) {
            return false;
        }
        self.machine_names.push(machine_name.to_string());
        true
    }

    /// Advance the one-time window to tomorrow relative to `run_date`,
    /// keeping the stored hour and minute.
    pub fn roll_window_forward(&mut self, run_date: NaiveDate) {
        self.window.start = occurrence::roll_forward(self.window.start, run_date);
    }

    pub fn attach_dynamic_query(&mut self, target: SavedSearchTarget) {
        self.dynamic_query = Some(target);
    }
}

/// Derive the deterministic schedule name for a machine's deployment:
/// `<name_prefix><policy tag> => <machine name>`.
///
/// The name encodes (variant, weekday, hour, machine), so re-running the
/// pass recomputes the same name and the store upsert stays idempotent.
pub fn schedule_name(name_prefix: &str, policy_tag: &str, machine_name: &str) -> String {
    format!("{}{} => {}", name_prefix, policy_tag, machine_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config(name: &str) -> ScheduleConfiguration {
        ScheduleConfiguration {
            name: name.to_string(),
            operating_system: "Linux".to_string(),
            azure_machine_ids: vec![],
            machine_names: vec!["stale-host".to_string()],
            update_list: vec![],
            window: MaintenanceWindow::one_time(
                NaiveDate::from_ymd_opt(2021, 6, 9)
                    .unwrap()
                    .and_hms_opt(3, 0, 0)
                    .unwrap(),
                "Europe/Paris",
            ),
            dynamic_query: None,
        }
    }

    #[test]
    fn test_schedule_name_is_deterministic() {
        let name = schedule_name("fleet-securitylinux-", "LINUX-R-WED-03:00", "vm-centos-01");
        assert_eq!(name, "fleet-securitylinux-LINUX-R-WED-03:00 => vm-centos-01");
        assert_eq!(
            name,
            schedule_name("fleet-securitylinux-", "LINUX-R-WED-03:00", "vm-centos-01")
        );
    }

    #[test]
    fn test_accepts_requires_os_and_tag_match() {
        let cfg = config("fleet-LINUX-R-WED-03-00 => group");
        assert!(cfg.accepts(OsKind::Linux, "LINUX-R-WED-03:00"));
        assert!(!cfg.accepts(OsKind::Other, "LINUX-R-WED-03:00"));
        assert!(!cfg.accepts(OsKind::Linux, "LINUX-Q-THU-12:00"));
    }

    #[test]
    fn test_accepts_folds_colon_to_dash() {
        // Stored names carry `-` where the tag carries `:`.
        let cfg = config("fleet-LINUX-P-SUN-22-00 => canary");
        assert!(cfg.accepts(OsKind::Linux, "LINUX-P-SUN-22:00"));
    }

    #[test]
    fn test_reset_then_rebuild_membership() {
        let mut cfg = config("fleet-LINUX-R-WED-03-00 => group");
        cfg.reset_membership();
        assert!(cfg.machine_names.is_empty());

        assert!(cfg.add_member("host-a"));
        assert!(cfg.add_member("host-b"));
        assert!(!cfg.add_member("host-a"));
        assert_eq!(cfg.machine_names, vec!["host-a", "host-b"]);
    }

    #[test]
    fn test_rebuild_twice_is_idempotent() {
        let mut cfg = config("fleet-LINUX-R-WED-03-00 => group");
        let roster = ["host-a", "host-b", "host-c"];

        for _ in 0..2 {
            cfg.reset_membership();
            for host in roster {
                cfg.add_member(host);
            }
        }

        assert_eq!(cfg.machine_names, vec!["host-a", "host-b", "host-c"]);
        assert_eq!(cfg.name, "fleet-LINUX-R-WED-03-00 => group");
    }

    #[test]
    fn test_roll_window_forward_keeps_time_of_day() {
        let mut cfg = config("fleet-LINUX-R-WED-03-00 => group");
        let run_date = NaiveDate::from_ymd_opt(2021, 6, 20).unwrap();
        cfg.roll_window_forward(run_date);
        assert_eq!(
            cfg.window.start,
            NaiveDate::from_ymd_opt(2021, 6, 21)
                .unwrap()
                .and_hms_opt(3, 0, 0)
                .unwrap()
        );
    }
}
