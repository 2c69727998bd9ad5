//! Error types for fleetpatch.
//!
//! Per-machine and per-configuration failures are isolated by the passes;
//! only workspace resolution is run-fatal. Absent or malformed policy
//! tags and empty update lists are skip outcomes, not errors, and never
//! appear here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot resolve linked workspace: {0}")]
    WorkspaceResolution(String),

    #[error("telemetry query returned partial results: {0}")]
    TelemetryPartial(String),

    #[error("machine {0} not found in inventory")]
    MachineLookup(String),

    #[error("schedule upsert rejected for {name}: {message}")]
    ScheduleUpsert { name: String, message: String },

    #[error("management API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FleetError {
    /// Whether this failure may abort the whole run. Everything else is
    /// recorded against the single item it hit and the batch continues.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            FleetError::Config(_) | FleetError::WorkspaceResolution(_)
        )
    }
}
