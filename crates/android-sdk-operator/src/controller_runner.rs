//! Controller runner - builds the controller futures for the operator
//!
//! Returns boxed futures that the caller composes, keeping controller
//! construction separate from process startup.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::core::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use android_sdk_common::crd::AndroidSDK;
use android_sdk_common::{FIELD_MANAGER, MANAGED_BY_LABEL};
use android_sdk_controller::config_source::LABEL_SELECTOR;
use android_sdk_controller::{
    environments_for_config, error_policy, reconcile, reconcile_config_map, ReconcileSettings,
    SdkContext,
};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Build the AndroidSDK and ConfigMap controller futures.
///
/// - AndroidSDK controller: reconciles environments, re-triggered by changes
///   to the ConfigMap an environment references and by its worker Pods
/// - ConfigMap controller: creates an environment for each recognized
///   package list
pub fn build_controllers(
    client: Client,
    namespace: Option<&str>,
    settings: ReconcileSettings,
) -> Vec<ControllerFuture> {
    let ctx = Arc::new(SdkContext::new(client.clone(), settings));

    let environments: Api<AndroidSDK> = scoped_api(&client, namespace);
    let config_maps: Api<ConfigMap> = scoped_api(&client, namespace);
    let pods: Api<Pod> = scoped_api(&client, namespace);

    let config_watch = || {
        WatcherConfig::default()
            .labels(LABEL_SELECTOR)
            .timeout(WATCH_TIMEOUT_SECS)
    };
    let worker_selector = format!("{}={}", MANAGED_BY_LABEL, FIELD_MANAGER);

    let env_controller = Controller::new(
        environments,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let env_store = env_controller.store();

    let env_ctrl = env_controller
        .watches(config_maps.clone(), config_watch(), move |config| {
            let affected = environments_for_config(env_store.state(), &config);
            tracing::debug!(
                config_map = %config.metadata.name.as_deref().unwrap_or_default(),
                affected_count = affected.len(),
                "Package list changed, re-reconciling referencing environments"
            );
            affected
        })
        .owns(
            pods,
            WatcherConfig::default()
                .labels(&worker_selector)
                .timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy::<AndroidSDK>, ctx.clone())
        .for_each(log_reconcile_result("AndroidSDK"));

    let config_ctrl = Controller::new(config_maps, config_watch())
        .shutdown_on_signal()
        .run(reconcile_config_map, error_policy::<ConfigMap>, ctx)
        .for_each(log_reconcile_result("ConfigMap"));

    tracing::info!(namespace = namespace.unwrap_or("<all>"), "- AndroidSDK controller");
    tracing::info!(selector = LABEL_SELECTOR, "- ConfigMap controller");

    vec![Box::pin(env_ctrl), Box::pin(config_ctrl)]
}

/// Namespaced API when a watch namespace is configured, cluster-wide otherwise
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
