//! Operator configuration from flags and environment

use std::time::Duration;

use clap::Args;

use android_sdk_controller::job::{WorkerSettings, DEFAULT_SDK_CLAIM_NAME, DEFAULT_WORKER_IMAGE};
use android_sdk_controller::ReconcileSettings;

/// Runtime settings for the controller
#[derive(Args, Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch (all namespaces if unset or empty)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Image used for install and sync worker Pods
    #[arg(long, env = "ANDROID_SDK_WORKER_IMAGE", default_value = DEFAULT_WORKER_IMAGE)]
    pub worker_image: String,

    /// PersistentVolumeClaim holding the SDK root
    #[arg(long, env = "ANDROID_SDK_CLAIM_NAME", default_value = DEFAULT_SDK_CLAIM_NAME)]
    pub sdk_claim_name: String,

    /// Seconds between checks of a running worker
    #[arg(
        long,
        env = "ANDROID_SDK_POLL_INTERVAL_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_secs: u64,

    /// Seconds between drift checks once the SDK is in sync
    #[arg(
        long,
        env = "ANDROID_SDK_RESYNC_INTERVAL_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub resync_interval_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl OperatorConfig {
    /// Namespace to scope watches to, `None` for cluster-wide
    pub fn namespace(&self) -> Option<&str> {
        self.watch_namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
    }

    /// Reconciler settings derived from the flags
    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            worker: WorkerSettings {
                image: self.worker_image.clone(),
                sdk_claim_name: self.sdk_claim_name.clone(),
            },
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            resync_interval: Duration::from_secs(self.resync_interval_secs),
        }
    }
}
