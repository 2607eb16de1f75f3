//! AndroidSDK controller
//!
//! Watches AndroidSDK resources and recognized ConfigMaps and drives the SDK
//! lifecycle:
//! - `Unset` → `Install` → launch install Pod → `Installing`
//! - `Installing` → install Pod succeeded → `Sync`
//! - `Sync` → launch sync Pod → `Syncing`
//! - `Syncing` → sync Pod succeeded → `Done`
//! - `Done` → package list changed → `Sync`
//!
//! Worker Pods are one-shot and cleaned up by the controller once they
//! succeed. The fingerprint of the package list handed to the last worker is
//! kept in the resource status for drift detection.

#![deny(missing_docs)]

pub mod client;
pub mod config_source;
mod controller;
pub mod job;
pub mod lifecycle;
pub mod transition;

pub use client::{SdkKubeClient, SdkKubeClientImpl};
pub use controller::{
    environments_for_config, error_policy, handle, reconcile, reconcile_config_map, Observed,
    ReconcileSettings, SdkContext, DEFAULT_POLL_INTERVAL, DEFAULT_RESYNC_INTERVAL,
};
