//! Configuration management for fleetpatchd.
//!
//! Loads settings from /etc/fleetpatch/config.toml or uses defaults, then
//! applies environment overrides for the account identifiers. There are
//! no command-line flags; the binary is driven entirely by this file and
//! the environment.

use crate::error::FleetError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path.
pub const CONFIG_PATH: &str = "/etc/fleetpatch/config.toml";

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "FLEETPATCH_CONFIG";

/// Environment variable supplying the management-plane bearer token.
/// Credential acquisition itself is out of scope; an external identity
/// provider populates this before each run.
pub const ACCESS_TOKEN_ENV: &str = "FLEETPATCH_ACCESS_TOKEN";

/// Account scope the run operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub subscription_id: String,

    #[serde(default)]
    pub resource_group: String,

    #[serde(default)]
    pub automation_account: String,

    /// Saved-search alias used as the dynamic query target.
    #[serde(default = "default_saved_search_alias")]
    pub saved_search_alias: String,
}

fn default_saved_search_alias() -> String {
    "FleetpatchGroup".to_string()
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            subscription_id: String::default(),
            resource_group: String::default(),
            automation_account: String::default(),
            saved_search_alias: default_saved_search_alias(),
        }
    }
}

/// Policy tag grammar knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Tag key machines carry their policy under.
    #[serde(default = "default_tag_key")]
    pub tag_key: String,

    /// Site prefix of the tag grammar.
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    /// Prefix of every schedule name this system creates.
    #[serde(default = "default_schedule_name_prefix")]
    pub schedule_name_prefix: String,
}

fn default_tag_key() -> String {
    crate::policy::DEFAULT_TAG_KEY.to_string()
}

fn default_tag_prefix() -> String {
    "LINUX".to_string()
}

fn default_schedule_name_prefix() -> String {
    "fleet-securitylinux-".to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tag_key: default_tag_key(),
            tag_prefix: default_tag_prefix(),
            schedule_name_prefix: default_schedule_name_prefix(),
        }
    }
}

/// Maintenance-window timezone settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Timezone label handed to the scheduler.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Fixed offset from UTC, in minutes east, used for wall-clock "now".
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

fn default_time_zone() -> String {
    "Europe/Paris".to_string()
}

fn default_utc_offset_minutes() -> i32 {
    120
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            time_zone: default_time_zone(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

/// Telemetry query lookback windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Lookback of the pending-updates query, in hours.
    #[serde(default = "default_update_lookback_hours")]
    pub update_lookback_hours: i64,

    /// Lookback of the heartbeat roster query, in hours.
    #[serde(default = "default_heartbeat_lookback_hours")]
    pub heartbeat_lookback_hours: i64,
}

fn default_update_lookback_hours() -> i64 {
    5
}

fn default_heartbeat_lookback_hours() -> i64 {
    24
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            update_lookback_hours: default_update_lookback_hours(),
            heartbeat_lookback_hours: default_heartbeat_lookback_hours(),
        }
    }
}

/// Service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_management_base")]
    pub management_base: String,

    #[serde(default = "default_logs_base")]
    pub logs_base: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_management_base() -> String {
    "https://management.azure.com".to_string()
}

fn default_logs_base() -> String {
    "https://api.loganalytics.io".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            management_base: default_management_base(),
            logs_base: default_logs_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

impl Config {
    /// Load configuration: file pointed at by `FLEETPATCH_CONFIG` (or the
    /// default path), then environment overrides, then validation.
    pub fn load() -> Result<Self, FleetError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| CONFIG_PATH.to_string());
        let mut config = Self::load_from(Path::new(&path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, FleetError> {
        if !path.exists() {
            warn!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Account identifiers can be supplied by the hosting environment
    /// instead of the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FLEETPATCH_SUBSCRIPTION_ID") {
            self.account.subscription_id = v;
        }
        if let Ok(v) = std::env::var("FLEETPATCH_RESOURCE_GROUP") {
            self.account.resource_group = v;
        }
        if let Ok(v) = std::env::var("FLEETPATCH_AUTOMATION_ACCOUNT") {
            self.account.automation_account = v;
        }
        if let Ok(v) = std::env::var("FLEETPATCH_SAVED_SEARCH") {
            self.account.saved_search_alias = v;
        }
    }

    fn validate(&self) -> Result<(), FleetError> {
        for (field, value) in [
            ("account.subscription_id", &self.account.subscription_id),
            ("account.resource_group", &self.account.resource_group),
            ("account.automation_account", &self.account.automation_account),
        ] {
            if value.trim().is_empty() {
                return Err(FleetError::Config(format!("{} is required", field)));
            }
        }
        Ok(())
    }
}

/// Read the bearer token from the environment.
pub fn access_token_from_env() -> Result<String, FleetError> {
    std::env::var(ACCESS_TOKEN_ENV)
        .map_err(|_| FleetError::Config(format!("{} is not set", ACCESS_TOKEN_ENV)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.policy.tag_key, "patch");
        assert_eq!(config.policy.tag_prefix, "LINUX");
        assert_eq!(config.window.time_zone, "Europe/Paris");
        assert_eq!(config.telemetry.update_lookback_hours, 5);
        assert_eq!(config.telemetry.heartbeat_lookback_hours, 24);
        assert_eq!(config.endpoints.management_base, "https://management.azure.com");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/fleetpatch.toml")).unwrap();
        assert_eq!(config.policy.tag_prefix, "LINUX");
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[account]\nsubscription_id = \"sub-1\"\n\n[policy]\ntag_prefix = \"CENTOS\"\n"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.account.subscription_id, "sub-1");
        assert_eq!(config.policy.tag_prefix, "CENTOS");
        // Untouched sections fall back to defaults.
        assert_eq!(config.window.utc_offset_minutes, 120);
        assert_eq!(config.policy.tag_key, "patch");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not toml at all [[[").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_validation_requires_account_identifiers() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
        assert!(err.is_run_fatal());
    }

    #[test]
    fn test_validation_passes_with_identifiers() {
        let mut config = Config::default();
        config.account.subscription_id = "sub-1".to_string();
        config.account.resource_group = "rg-1".to_string();
        config.account.automation_account = "aa-1".to_string();
        assert!(config.validate().is_ok());
    }
}
