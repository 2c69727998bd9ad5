//! Fleetpatch batch runner library - exposes modules for testing.

pub mod clients;
pub mod deploy;
pub mod queries;
pub mod reconcile;
