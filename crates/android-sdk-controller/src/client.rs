//! Cluster API gateway used by the reconciler
//!
//! The reconciler only needs a handful of calls, each with a precise "not
//! found" / "already exists" / "conflict" contract. They are collected in
//! [`SdkKubeClient`] so tests can mock the cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use android_sdk_common::crd::{AndroidSDK, AndroidSdkStatus};
use android_sdk_common::error::{is_already_exists, is_conflict, is_not_found};
use android_sdk_common::{Error, FIELD_MANAGER};

/// Trait abstracting Kubernetes client operations for AndroidSDK
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SdkKubeClient: Send + Sync {
    /// Create an AndroidSDK resource
    ///
    /// Returns `false` if it already exists.
    async fn create_environment(&self, env: &AndroidSDK) -> Result<bool, Error>;

    /// Replace the status of an AndroidSDK
    ///
    /// When `resource_version` is set the write is rejected with
    /// [`Error::Conflict`] if the resource changed since it was read.
    async fn patch_environment_status(
        &self,
        name: &str,
        namespace: &str,
        resource_version: Option<String>,
        status: &AndroidSdkStatus,
    ) -> Result<(), Error>;

    /// Get a ConfigMap by name and namespace
    async fn get_config_map(&self, name: &str, namespace: &str)
        -> Result<Option<ConfigMap>, Error>;

    /// Get a Pod by name and namespace
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<Pod>, Error>;

    /// Create a Pod in its own namespace
    ///
    /// Returns `false` if a Pod with the same name already exists.
    async fn create_pod(&self, pod: &Pod) -> Result<bool, Error>;

    /// Delete a Pod
    ///
    /// Returns `false` if the Pod did not exist.
    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<bool, Error>;
}

/// Real Kubernetes client implementation
pub struct SdkKubeClientImpl {
    client: Client,
}

impl SdkKubeClientImpl {
    /// Create a new SdkKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, Error> {
    obj.namespace()
        .ok_or_else(|| Error::validation_for(obj.name_any(), "object must be namespaced"))
}

#[async_trait]
impl SdkKubeClient for SdkKubeClientImpl {
    async fn create_environment(&self, env: &AndroidSDK) -> Result<bool, Error> {
        let namespace = namespace_of(env)?;
        let api: Api<AndroidSDK> = Api::namespaced(self.client.clone(), &namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        match api.create(&params, env).await {
            Ok(_) => Ok(true),
            Err(e) if is_already_exists(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_environment_status(
        &self,
        name: &str,
        namespace: &str,
        resource_version: Option<String>,
        status: &AndroidSdkStatus,
    ) -> Result<(), Error> {
        let api: Api<AndroidSDK> = Api::namespaced(self.client.clone(), namespace);

        let mut patch = serde_json::json!({ "status": status });
        if let Some(rv) = resource_version {
            // Merge patches carrying a resourceVersion are rejected with 409
            // when the object changed since it was read.
            patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
        }

        match api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_conflict(&e) => Err(Error::conflict(name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_config_map(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<bool, Error> {
        let namespace = namespace_of(pod)?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);

        match api.create(&PostParams::default(), pod).await {
            Ok(_) => Ok(true),
            Err(e) if is_already_exists(&e) => {
                debug!(pod = %pod.name_any(), namespace = %namespace, "Pod already exists");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<bool, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
