//! Package-list ConfigMaps
//!
//! A ConfigMap is a config source only if it carries both marker labels.
//! The desired package list lives under the `packages` data key.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use android_sdk_common::Error;

use crate::client::SdkKubeClient;

/// Label key identifying the application
pub const APP_LABEL: &str = "app";
/// Expected value of [`APP_LABEL`]
pub const APP_LABEL_VALUE: &str = "android-sdk-persistent";
/// Label key identifying the config context
pub const CONTEXT_LABEL: &str = "context";
/// Expected value of [`CONTEXT_LABEL`]
pub const CONTEXT_LABEL_VALUE: &str = "android-sdk-config";
/// Label selector matching recognized ConfigMaps
pub const LABEL_SELECTOR: &str = "app=android-sdk-persistent,context=android-sdk-config";
/// Data key holding the package list
pub const PACKAGES_KEY: &str = "packages";

/// True if the ConfigMap carries both marker labels with the expected values
pub fn is_recognized(config: &ConfigMap) -> bool {
    let labels = config.labels();
    labels.get(APP_LABEL).map(String::as_str) == Some(APP_LABEL_VALUE)
        && labels.get(CONTEXT_LABEL).map(String::as_str) == Some(CONTEXT_LABEL_VALUE)
}

/// Read the package list from a ConfigMap
pub fn package_list(config: &ConfigMap) -> Result<&str, Error> {
    config
        .data
        .as_ref()
        .and_then(|data| data.get(PACKAGES_KEY))
        .map(String::as_str)
        .ok_or_else(|| Error::missing_field(config.name_any(), PACKAGES_KEY))
}

/// Fetch the named ConfigMap and return its package list
///
/// The ConfigMap is referenced explicitly by an environment, so the marker
/// labels are not required here.
pub async fn load_package_list(
    kube: &dyn SdkKubeClient,
    name: &str,
    namespace: &str,
) -> Result<String, Error> {
    let config = kube
        .get_config_map(name, namespace)
        .await?
        .ok_or_else(|| Error::config_not_found(name, namespace))?;
    package_list(&config).map(str::to_string)
}
