//! Worker Pod lifecycle
//!
//! Observes a worker Pod by name and removes it once it is finished.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

use android_sdk_common::Error;

use crate::client::SdkKubeClient;

/// Observed state of a worker Pod
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
    /// No Pod with that name exists
    Absent,
    /// Pod exists and has not finished (Pending, Running, Unknown)
    Running,
    /// Pod finished successfully
    Succeeded,
    /// Pod finished with a failure
    Failed,
}

impl JobState {
    /// Every state, for exhaustive table tests
    pub const ALL: [JobState; 4] = [
        JobState::Absent,
        JobState::Running,
        JobState::Succeeded,
        JobState::Failed,
    ];

    /// True for Pods that will not run again
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Map a Pod's phase to a [`JobState`]
pub fn pod_state(pod: &Pod) -> JobState {
    match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Succeeded") => JobState::Succeeded,
        Some("Failed") => JobState::Failed,
        _ => JobState::Running,
    }
}

/// True if the Pod was created before `since`, i.e. by an earlier run.
///
/// `creationTimestamp` has second precision, so a Pod created within the
/// same second as `since` counts as current. Without either timestamp the
/// Pod cannot be tied to the current run and counts as earlier.
pub fn predates(pod: &Pod, since: Option<DateTime<Utc>>) -> bool {
    match (pod.metadata.creation_timestamp.as_ref(), since) {
        (Some(created), Some(since)) => created.0.timestamp() < since.timestamp(),
        _ => true,
    }
}

/// Extract a failure message from a failed Pod
pub fn failure_message(pod: &Pod) -> Option<String> {
    let status = pod.status.as_ref()?;
    status.message.clone().or_else(|| {
        status
            .container_statuses
            .as_ref()?
            .iter()
            .find_map(|cs| {
                let terminated = cs.state.as_ref()?.terminated.as_ref()?;
                Some(match &terminated.reason {
                    Some(reason) => format!("{} (exit code {})", reason, terminated.exit_code),
                    None => format!("exit code {}", terminated.exit_code),
                })
            })
    })
}

/// Observes and cleans up worker Pods through the gateway
pub struct JobLifecycle<'a> {
    kube: &'a dyn SdkKubeClient,
}

impl<'a> JobLifecycle<'a> {
    /// Create a lifecycle helper over the given gateway
    pub fn new(kube: &'a dyn SdkKubeClient) -> Self {
        Self { kube }
    }

    /// Fetch the named Pod, if it exists
    pub async fn get(&self, name: &str, namespace: &str) -> Result<Option<Pod>, Error> {
        self.kube.get_pod(name, namespace).await
    }

    /// Current state of the named Pod
    pub async fn state(&self, name: &str, namespace: &str) -> Result<JobState, Error> {
        Ok(self
            .get(name, namespace)
            .await?
            .as_ref()
            .map(pod_state)
            .unwrap_or(JobState::Absent))
    }

    /// True iff the Pod exists and succeeded
    ///
    /// An absent Pod reads as not complete: there is nothing to clean up.
    pub async fn is_complete(&self, name: &str, namespace: &str) -> Result<bool, Error> {
        Ok(self.state(name, namespace).await? == JobState::Succeeded)
    }

    /// Delete the Pod; deleting an absent Pod is not an error
    pub async fn remove(&self, name: &str, namespace: &str) -> Result<(), Error> {
        if self.kube.delete_pod(name, namespace).await? {
            info!(pod = %name, namespace = %namespace, "Deleted worker Pod");
        } else {
            debug!(pod = %name, namespace = %namespace, "Worker Pod already gone");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockSdkKubeClient;
    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn apiserver_unavailable() -> Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "apiserver unavailable".to_string(),
            reason: "ServiceUnavailable".to_string(),
            code: 503,
        })
        .into()
    }

    fn pod_in_phase(phase: Option<&str>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: phase.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pod_phases_map_to_job_states() {
        assert_eq!(pod_state(&pod_in_phase(Some("Succeeded"))), JobState::Succeeded);
        assert_eq!(pod_state(&pod_in_phase(Some("Failed"))), JobState::Failed);
        assert_eq!(pod_state(&pod_in_phase(Some("Running"))), JobState::Running);
        assert_eq!(pod_state(&pod_in_phase(Some("Pending"))), JobState::Running);
        assert_eq!(pod_state(&pod_in_phase(Some("Unknown"))), JobState::Running);
        assert_eq!(pod_state(&pod_in_phase(None)), JobState::Running);
        assert_eq!(pod_state(&Pod::default()), JobState::Running);
    }

    #[test]
    fn only_terminal_states_are_finished() {
        assert!(JobState::Succeeded.is_finished());
        assert!(JobState::Failed.is_finished());
        assert!(!JobState::Running.is_finished());
        assert!(!JobState::Absent.is_finished());
    }

    fn created_at(secs: i64) -> Pod {
        let mut pod = pod_in_phase(Some("Failed"));
        pod.metadata.creation_timestamp = Some(Time(Utc.timestamp_opt(secs, 0).unwrap()));
        pod
    }

    #[test]
    fn pods_from_earlier_runs_predate_the_transition() {
        let transition = Utc.timestamp_opt(1_000, 700_000_000).unwrap();

        assert!(predates(&created_at(999), Some(transition)));
        assert!(
            !predates(&created_at(1_000), Some(transition)),
            "same second as the transition is the current run"
        );
        assert!(!predates(&created_at(1_005), Some(transition)));
    }

    #[test]
    fn missing_timestamps_count_as_earlier_run() {
        assert!(predates(&created_at(1_000), None));
        assert!(predates(
            &pod_in_phase(Some("Failed")),
            Some(Utc.timestamp_opt(1_000, 0).unwrap())
        ));
    }

    #[test]
    fn failure_message_prefers_pod_message() {
        let mut pod = pod_in_phase(Some("Failed"));
        pod.status.as_mut().unwrap().message = Some("node lost".to_string());
        assert_eq!(failure_message(&pod), Some("node lost".to_string()));
    }

    #[test]
    fn failure_message_falls_back_to_container_exit() {
        let mut pod = pod_in_phase(Some("Failed"));
        pod.status.as_mut().unwrap().container_statuses = Some(vec![ContainerStatus {
            name: "android-sdk-pkg".to_string(),
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 2,
                    reason: Some("Error".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert_eq!(
            failure_message(&pod),
            Some("Error (exit code 2)".to_string())
        );
        assert_eq!(failure_message(&Pod::default()), None);
    }

    #[tokio::test]
    async fn absent_pod_is_not_complete() {
        let mut mock = MockSdkKubeClient::new();
        mock.expect_get_pod().returning(|_, _| Ok(None));

        let lifecycle = JobLifecycle::new(&mock);
        assert_eq!(
            lifecycle.state("android-sdk-pkg-install", "android").await.unwrap(),
            JobState::Absent
        );
        assert!(!lifecycle
            .is_complete("android-sdk-pkg-install", "android")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn succeeded_pod_is_complete() {
        let mut mock = MockSdkKubeClient::new();
        mock.expect_get_pod()
            .returning(|_, _| Ok(Some(pod_in_phase(Some("Succeeded")))));

        let lifecycle = JobLifecycle::new(&mock);
        assert!(lifecycle
            .is_complete("android-sdk-pkg-install", "android")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn remove_tolerates_missing_pod() {
        let mut mock = MockSdkKubeClient::new();
        mock.expect_delete_pod().times(1).returning(|_, _| Ok(false));

        let lifecycle = JobLifecycle::new(&mock);
        lifecycle
            .remove("android-sdk-pkg-update", "android")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_propagates_gateway_errors() {
        let mut mock = MockSdkKubeClient::new();
        mock.expect_delete_pod()
            .returning(|_, _| Err(apiserver_unavailable()));

        let lifecycle = JobLifecycle::new(&mock);
        assert!(lifecycle
            .remove("android-sdk-pkg-update", "android")
            .await
            .is_err());
    }
}
