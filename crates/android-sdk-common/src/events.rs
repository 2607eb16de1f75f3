//! Kubernetes Events on AndroidSDK environments.
//!
//! Phase changes, worker launches and worker failures show up under
//! `kubectl describe androidsdk`. Publishing is best effort: a rejected
//! Event is logged and reconciliation carries on.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

use crate::FIELD_MANAGER;

/// Sink for Events about an environment.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (see [`reasons`])
    /// * `action` - What action was taken (see [`actions`])
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Upper bound the Events API accepts for `note`
pub const MAX_NOTE_BYTES: usize = 1024;

/// Publishes through `kube::runtime::events::Recorder` as the operator.
///
/// The reporting instance is the operator Pod (`POD_NAME`, set from the
/// downward API) so events from a restarted operator are distinguishable.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Publisher reporting as [`FIELD_MANAGER`]
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

/// Cut a note down to [`MAX_NOTE_BYTES`] on a char boundary.
///
/// Worker failure messages embed container output and can exceed the
/// limit, which would make the API server reject the whole Event.
pub fn clamp_note(mut note: String) -> String {
    if note.len() > MAX_NOTE_BYTES {
        let mut end = MAX_NOTE_BYTES;
        while !note.is_char_boundary(end) {
            end -= 1;
        }
        note.truncate(end);
    }
    note
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: note.map(clamp_note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                object = resource_ref.name.as_deref().unwrap_or_default(),
                namespace = resource_ref.namespace.as_deref().unwrap_or_default(),
                reason,
                error = %e,
                "Failed to publish AndroidSDK event"
            );
        }
    }
}

/// Discards every event; for tests and dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _: &ObjectReference, _: EventType, _: &str, _: &str, _: Option<String>) {}
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    /// Environment initialized, install will start
    pub const INITIALIZED: &str = "Initialized";
    /// Install worker Pod launched
    pub const INSTALL_STARTED: &str = "InstallStarted";
    /// Install worker Pod succeeded and was cleaned up
    pub const INSTALL_COMPLETE: &str = "InstallComplete";
    /// Sync worker Pod launched
    pub const SYNC_STARTED: &str = "SyncStarted";
    /// Sync worker Pod succeeded and was cleaned up
    pub const SYNC_COMPLETE: &str = "SyncComplete";
    /// Package list changed since the last install or sync
    pub const DRIFT_DETECTED: &str = "DriftDetected";
    /// Worker Pod finished in the Failed phase
    pub const WORKER_FAILED: &str = "WorkerFailed";
    /// Worker Pod expected but not found; assumed already cleaned up
    pub const WORKER_MISSING: &str = "WorkerMissing";
}

/// Well-known event action strings.
pub mod actions {
    /// Phase transition written to status
    pub const RECONCILE: &str = "Reconcile";
    /// Worker Pod created
    pub const LAUNCH: &str = "Launch";
    /// Worker Pod deleted
    pub const CLEANUP: &str = "Cleanup";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_notes_are_untouched() {
        let note = "Pod android-sdk-pkg-update failed: Error (exit code 1)".to_string();
        assert_eq!(clamp_note(note.clone()), note);
    }

    #[test]
    fn long_notes_fit_the_event_limit() {
        let note = "x".repeat(MAX_NOTE_BYTES + 200);
        assert_eq!(clamp_note(note).len(), MAX_NOTE_BYTES);
    }

    #[test]
    fn clamping_never_splits_a_character() {
        // 3-byte chars: 1024 is not a boundary
        let note = "\u{2603}".repeat(MAX_NOTE_BYTES);
        let clamped = clamp_note(note);
        assert_eq!(clamped.len(), 1023);
        assert!(clamped.chars().all(|c| c == '\u{2603}'));
    }
}
