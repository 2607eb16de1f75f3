//! AndroidSDK CRD types
//!
//! An `AndroidSDK` resource represents one managed SDK installation. Its spec
//! points at the ConfigMap holding the desired package list; its status tracks
//! the install/sync lifecycle and the fingerprint of the package list that was
//! last handed to a worker.

use std::fmt;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Fingerprint;

/// Name used for environments created from a recognized ConfigMap
pub const DEFAULT_ENVIRONMENT_NAME: &str = "android-sdk";

/// AndroidSDK keeps a persistent Android SDK in sync with a package list.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "androidsdk.aerogear.org",
    version = "v1",
    kind = "AndroidSDK",
    plural = "androidsdks",
    shortname = "asdk",
    namespaced,
    status = "AndroidSdkStatus",
    printcolumn = r#"{"name":"Config","type":"string","jsonPath":".spec.configMapName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AndroidSdkSpec {
    /// Name of the ConfigMap (same namespace) holding the `packages` list
    pub config_map_name: String,
}

/// Status of an AndroidSDK
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AndroidSdkStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: SdkPhase,

    /// Fingerprint of the package list handed to the last install or sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,

    /// Note about the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the phase last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Lifecycle phase of an AndroidSDK
///
/// `Unset` is stored as an empty string so that a resource without status and
/// one with `phase: ""` read the same.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum SdkPhase {
    /// Freshly observed, not yet initialized
    #[default]
    #[serde(rename = "")]
    Unset,
    /// Install requested
    Install,
    /// Install worker running
    Installing,
    /// Sync requested
    Sync,
    /// Sync worker running
    Syncing,
    /// Installed packages match the config
    Done,
}

impl SdkPhase {
    /// Every phase, in lifecycle order
    pub const ALL: [SdkPhase; 6] = [
        SdkPhase::Unset,
        SdkPhase::Install,
        SdkPhase::Installing,
        SdkPhase::Sync,
        SdkPhase::Syncing,
        SdkPhase::Done,
    ];

    /// String form as stored in the status
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkPhase::Unset => "",
            SdkPhase::Install => "Install",
            SdkPhase::Installing => "Installing",
            SdkPhase::Sync => "Sync",
            SdkPhase::Syncing => "Syncing",
            SdkPhase::Done => "Done",
        }
    }
}

impl fmt::Display for SdkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkPhase::Unset => f.write_str("Unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl AndroidSDK {
    /// Current phase, treating a missing status as `Unset`
    pub fn phase(&self) -> SdkPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Baseline fingerprint recorded at the last launch, if any
    pub fn baseline(&self) -> Option<&Fingerprint> {
        self.status.as_ref().and_then(|s| s.fingerprint.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn phase_default_is_unset() {
        assert_eq!(SdkPhase::default(), SdkPhase::Unset);
    }

    #[test]
    fn unset_phase_round_trips_as_empty_string() {
        assert_eq!(serde_json::to_string(&SdkPhase::Unset).unwrap(), "\"\"");
        let phase: SdkPhase = serde_json::from_str("\"\"").unwrap();
        assert_eq!(phase, SdkPhase::Unset);
    }

    #[test]
    fn phases_serialize_with_original_names() {
        for phase in SdkPhase::ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase.as_str()));
        }
    }

    #[test]
    fn status_without_phase_reads_as_unset() {
        let status: AndroidSdkStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status.phase, SdkPhase::Unset);
        assert_eq!(status.fingerprint, None);
    }

    #[test]
    fn spec_uses_camel_case() {
        let spec: AndroidSdkSpec =
            serde_json::from_str(r#"{"configMapName":"android-sdk-config"}"#).unwrap();
        assert_eq!(spec.config_map_name, "android-sdk-config");
    }

    #[test]
    fn missing_status_reads_as_unset_phase() {
        let env = AndroidSDK::new(
            "android-sdk",
            AndroidSdkSpec {
                config_map_name: "android-sdk-config".to_string(),
            },
        );
        assert_eq!(env.phase(), SdkPhase::Unset);
        assert_eq!(env.baseline(), None);
    }

    #[test]
    fn crd_has_expected_names() {
        let crd = AndroidSDK::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("androidsdks.androidsdk.aerogear.org")
        );
        assert_eq!(crd.spec.names.kind, "AndroidSDK");
        assert_eq!(crd.spec.scope, "Namespaced");

        let yaml = serde_yaml::to_string(&crd).unwrap();
        assert!(yaml.contains("configMapName"));
    }

    #[test]
    fn display_names_unset_explicitly() {
        assert_eq!(SdkPhase::Unset.to_string(), "Unset");
        assert_eq!(SdkPhase::Syncing.to_string(), "Syncing");
    }
}
