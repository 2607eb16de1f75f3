//! Worker Pod construction
//!
//! Builds the one-shot Pods that install the SDK or sync its packages. Each
//! Pod runs the SDK tooling image, mounts the persistent SDK volume and the
//! package-list ConfigMap, and never restarts.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use android_sdk_common::{FIELD_MANAGER, MANAGED_BY_LABEL};

/// Default SDK tooling image
pub const DEFAULT_WORKER_IMAGE: &str = "docker.io/aerogear/digger-android-sdk-image:1.0.0-alpha";
/// Default PVC holding the SDK root
pub const DEFAULT_SDK_CLAIM_NAME: &str = "android-sdk";
/// Name of the install worker Pod
pub const INSTALL_JOB_NAME: &str = "android-sdk-pkg-install";
/// Name of the sync worker Pod
pub const SYNC_JOB_NAME: &str = "android-sdk-pkg-update";
/// Label carrying the worker action
pub const ACTION_LABEL: &str = "androidsdk.aerogear.org/action";

const CONTAINER_NAME: &str = "android-sdk-pkg";
const SDK_VOLUME: &str = "android-sdk";
const SDK_MOUNT_PATH: &str = "/opt/android-sdk-linux";
const CONFIG_VOLUME: &str = "android-sdk-config";
const CONFIG_MOUNT_PATH: &str = "/tmp/android-sdk-config";

/// What a worker Pod does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerAction {
    /// Install the SDK into the persistent volume
    Install,
    /// Install/remove packages to match the package list
    Sync,
}

impl WorkerAction {
    /// Fixed Pod name for this action
    pub fn job_name(&self) -> &'static str {
        match self {
            WorkerAction::Install => INSTALL_JOB_NAME,
            WorkerAction::Sync => SYNC_JOB_NAME,
        }
    }

    /// Label value for this action
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerAction::Install => "install",
            WorkerAction::Sync => "sync",
        }
    }

    fn command(&self) -> Vec<String> {
        let cmd: &[&str] = match self {
            WorkerAction::Install => &["androidctl", "sdk", "install"],
            WorkerAction::Sync => &[
                "/opt/tools/androidctl-sync",
                "-y",
                "/tmp/android-sdk-config/packages",
            ],
        };
        cmd.iter().map(|s| s.to_string()).collect()
    }
}

/// Image and volume settings shared by all worker Pods
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Container image with the SDK tooling
    pub image: String,
    /// PVC holding the SDK root
    pub sdk_claim_name: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_WORKER_IMAGE.to_string(),
            sdk_claim_name: DEFAULT_SDK_CLAIM_NAME.to_string(),
        }
    }
}

/// Build the worker Pod for an action.
///
/// The Pod:
/// - Runs a single `android-sdk-pkg` container with the action's command
/// - Mounts the SDK PVC read-write at `/opt/android-sdk-linux`
/// - Mounts `config_map_name` read-only at `/tmp/android-sdk-config`
/// - Uses `restartPolicy: Never`
/// - Is owned by the environment when `owner` is given (garbage collection)
pub fn build_worker_pod(
    action: WorkerAction,
    config_map_name: &str,
    namespace: &str,
    settings: &WorkerSettings,
    owner: Option<OwnerReference>,
) -> Pod {
    let labels = BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string()),
        (ACTION_LABEL.to_string(), action.as_str().to_string()),
    ]);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(settings.image.clone()),
        command: Some(action.command()),
        volume_mounts: Some(vec![
            VolumeMount {
                name: SDK_VOLUME.to_string(),
                mount_path: SDK_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let volumes = vec![
        Volume {
            name: SDK_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: settings.sdk_claim_name.clone(),
                read_only: Some(false),
            }),
            ..Default::default()
        },
        Volume {
            name: CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_name.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    Pod {
        metadata: ObjectMeta {
            name: Some(action.job_name().to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: owner.map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            volumes: Some(volumes),
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_spec(pod: &Pod) -> &PodSpec {
        pod.spec.as_ref().unwrap()
    }

    fn install_pod() -> Pod {
        build_worker_pod(
            WorkerAction::Install,
            "android-sdk-config",
            "android",
            &WorkerSettings::default(),
            None,
        )
    }

    #[test]
    fn job_names_are_fixed_per_action() {
        assert_eq!(WorkerAction::Install.job_name(), "android-sdk-pkg-install");
        assert_eq!(WorkerAction::Sync.job_name(), "android-sdk-pkg-update");

        let pod = install_pod();
        assert_eq!(pod.metadata.name.as_deref(), Some(INSTALL_JOB_NAME));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("android"));
    }

    #[test]
    fn install_runs_androidctl_install() {
        let pod = install_pod();
        assert_eq!(
            pod_spec(&pod).containers[0].command.as_deref(),
            Some(
                &[
                    "androidctl".to_string(),
                    "sdk".to_string(),
                    "install".to_string()
                ][..]
            )
        );
    }

    #[test]
    fn sync_runs_androidctl_sync_against_mounted_packages() {
        let pod = build_worker_pod(
            WorkerAction::Sync,
            "android-sdk-config",
            "android",
            &WorkerSettings::default(),
            None,
        );
        let command = pod_spec(&pod).containers[0].command.clone().unwrap();
        assert_eq!(command[0], "/opt/tools/androidctl-sync");
        assert_eq!(command[2], format!("{}/packages", CONFIG_MOUNT_PATH));
        assert_eq!(pod.metadata.name.as_deref(), Some(SYNC_JOB_NAME));
    }

    #[test]
    fn pod_never_restarts() {
        assert_eq!(pod_spec(&install_pod()).restart_policy.as_deref(), Some("Never"));
    }

    #[test]
    fn mounts_sdk_volume_and_read_only_config() {
        let pod = install_pod();
        let spec = pod_spec(&pod);

        let volumes = spec.volumes.as_ref().unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(
            volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name,
            DEFAULT_SDK_CLAIM_NAME
        );
        assert_eq!(
            volumes[1].config_map.as_ref().unwrap().name,
            "android-sdk-config"
        );

        let mounts = spec.containers[0].volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, SDK_MOUNT_PATH);
        assert_eq!(mounts[0].read_only, None);
        assert_eq!(mounts[1].mount_path, CONFIG_MOUNT_PATH);
        assert_eq!(mounts[1].read_only, Some(true));
    }

    #[test]
    fn uses_configured_image_and_claim() {
        let settings = WorkerSettings {
            image: "registry.example.com/android-sdk:2".to_string(),
            sdk_claim_name: "shared-sdk".to_string(),
        };
        let pod = build_worker_pod(WorkerAction::Sync, "cfg", "ci", &settings, None);
        let spec = pod_spec(&pod);
        assert_eq!(
            spec.containers[0].image.as_deref(),
            Some("registry.example.com/android-sdk:2")
        );
        assert_eq!(
            spec.volumes.as_ref().unwrap()[0]
                .persistent_volume_claim
                .as_ref()
                .unwrap()
                .claim_name,
            "shared-sdk"
        );
    }

    #[test]
    fn labels_identify_operator_and_action() {
        let pod = install_pod();
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get(MANAGED_BY_LABEL),
            Some(&"android-sdk-operator".to_string())
        );
        assert_eq!(labels.get(ACTION_LABEL), Some(&"install".to_string()));
    }

    #[test]
    fn owner_reference_is_attached_when_given() {
        let owner = OwnerReference {
            api_version: "androidsdk.aerogear.org/v1".to_string(),
            kind: "AndroidSDK".to_string(),
            name: "android-sdk".to_string(),
            uid: "uid-123".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        };
        let pod = build_worker_pod(
            WorkerAction::Install,
            "android-sdk-config",
            "android",
            &WorkerSettings::default(),
            Some(owner),
        );
        let refs = pod.metadata.owner_references.as_ref().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, "AndroidSDK");
        assert_eq!(refs[0].uid, "uid-123");

        assert_eq!(install_pod().metadata.owner_references, None);
    }
}
