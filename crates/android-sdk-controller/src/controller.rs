//! AndroidSDK reconciliation controller
//!
//! Every delivered event is either an AndroidSDK or a ConfigMap. Environment
//! events walk the phase table in [`crate::transition`]; ConfigMap events
//! make sure an environment exists for every recognized package list.
//!
//! Ordering within a step is fixed: status is written before a worker Pod is
//! launched, and after a finished worker has been deleted. A crash between
//! the two halves is recovered on the next event:
//! - status says `Installing`/`Syncing` but the Pod was never created or is
//!   already deleted → the worker is treated as completed
//! - Pod already exists when launching → the create is a no-op

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use android_sdk_common::crd::{AndroidSDK, AndroidSdkSpec, SdkPhase, DEFAULT_ENVIRONMENT_NAME};
use android_sdk_common::events::{actions, reasons};
use android_sdk_common::{Error, EventPublisher, Fingerprint, KubeEventPublisher};

use crate::client::{SdkKubeClient, SdkKubeClientImpl};
use crate::config_source;
use crate::job::{self, WorkerAction, WorkerSettings};
use crate::lifecycle::{self, JobLifecycle, JobState};
use crate::transition::{next_phase, Observation};

/// Default interval for re-checking a running worker
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default interval for periodic drift checks of settled environments
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Timing and worker settings for the reconciler
#[derive(Clone, Debug)]
pub struct ReconcileSettings {
    /// Image and volumes for worker Pods
    pub worker: WorkerSettings,
    /// Requeue delay while a worker is pending or running
    pub poll_interval: Duration,
    /// Requeue delay once an environment is `Done` (or its worker failed)
    pub resync_interval: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            worker: WorkerSettings::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

/// Shared context for the AndroidSDK controllers
pub struct SdkContext {
    /// Cluster API gateway (trait object for testability)
    pub kube: Arc<dyn SdkKubeClient>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Worker and timing settings
    pub settings: ReconcileSettings,
}

impl SdkContext {
    /// Create a context backed by a real Kubernetes client
    pub fn new(client: Client, settings: ReconcileSettings) -> Self {
        Self {
            kube: Arc::new(SdkKubeClientImpl::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client)),
            settings,
        }
    }

    /// Create a context from explicit gateway and event implementations
    pub fn with_clients(
        kube: Arc<dyn SdkKubeClient>,
        events: Arc<dyn EventPublisher>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            kube,
            events,
            settings,
        }
    }
}

/// An object delivered by the event source
#[derive(Clone, Debug)]
pub enum Observed {
    /// An AndroidSDK changed or its requeue fired
    Environment(Arc<AndroidSDK>),
    /// A ConfigMap changed
    Config(Arc<ConfigMap>),
}

/// Handle one observed object
pub async fn handle(observed: Observed, ctx: &SdkContext) -> Result<Action, Error> {
    match observed {
        Observed::Environment(env) => reconcile_environment(&env, ctx).await,
        Observed::Config(config) => reconcile_config(&config, ctx).await,
    }
}

/// Reconcile an AndroidSDK (controller entry point)
#[instrument(skip_all, fields(environment = %env.name_any()))]
pub async fn reconcile(env: Arc<AndroidSDK>, ctx: Arc<SdkContext>) -> Result<Action, Error> {
    handle(Observed::Environment(env), &ctx).await
}

/// Reconcile a recognized ConfigMap (controller entry point)
#[instrument(skip_all, fields(config_map = %config.name_any()))]
pub async fn reconcile_config_map(
    config: Arc<ConfigMap>,
    ctx: Arc<SdkContext>,
) -> Result<Action, Error> {
    handle(Observed::Config(config), &ctx).await
}

/// Error policy shared by both controllers.
///
/// The phase is untouched on error, so the requeued event retries the same
/// transition. Conflicts retry almost immediately; errors that need a user
/// fix wait for the watches to deliver the fix.
pub fn error_policy<K: ResourceExt>(obj: Arc<K>, error: &Error, _ctx: Arc<SdkContext>) -> Action {
    warn!(
        object = %obj.name_any(),
        namespace = obj.namespace().as_deref().unwrap_or_default(),
        error = %error,
        retryable = error.is_retryable(),
        "AndroidSDK reconcile error, will retry"
    );
    Action::requeue(retry_delay(error))
}

fn retry_delay(error: &Error) -> Duration {
    match error {
        Error::Conflict { .. } => Duration::from_secs(1),
        e if e.is_retryable() => Duration::from_secs(30),
        _ => Duration::from_secs(300),
    }
}

/// Watch mapper: environments in the ConfigMap's namespace that reference it
pub fn environments_for_config<I>(environments: I, config: &ConfigMap) -> Vec<ObjectRef<AndroidSDK>>
where
    I: IntoIterator<Item = Arc<AndroidSDK>>,
{
    let name = config.name_any();
    let namespace = config.namespace();

    environments
        .into_iter()
        .filter(|env| env.namespace() == namespace && env.spec.config_map_name == name)
        .map(|env| ObjectRef::from_obj(env.as_ref()))
        .collect()
}

// =============================================================================
// Environment phases
// =============================================================================

/// The environment being reconciled, with its identity resolved
struct Target<'a> {
    env: &'a AndroidSDK,
    name: String,
    namespace: String,
}

impl<'a> Target<'a> {
    fn new(env: &'a AndroidSDK) -> Result<Self, Error> {
        let name = env.name_any();
        let namespace = env
            .namespace()
            .ok_or_else(|| Error::validation_for(&name, "AndroidSDK must be namespaced"))?;
        Ok(Self {
            env,
            name,
            namespace,
        })
    }

    fn config_map_name(&self) -> &str {
        &self.env.spec.config_map_name
    }

    async fn package_fingerprint(&self, ctx: &SdkContext) -> Result<Fingerprint, Error> {
        let packages = config_source::load_package_list(
            ctx.kube.as_ref(),
            self.config_map_name(),
            &self.namespace,
        )
        .await?;
        Ok(Fingerprint::of(&packages))
    }

    /// Optimistically write a new status, keeping the baseline unless replaced
    async fn write_status(
        &self,
        ctx: &SdkContext,
        phase: SdkPhase,
        fingerprint: Option<Fingerprint>,
        message: String,
    ) -> Result<(), Error> {
        let mut status = self.env.status.clone().unwrap_or_default();
        if status.phase != phase {
            status.last_transition_time = Some(Utc::now());
        }
        status.phase = phase;
        if let Some(fp) = fingerprint {
            status.fingerprint = Some(fp);
        }
        status.message = Some(message);

        ctx.kube
            .patch_environment_status(
                &self.name,
                &self.namespace,
                self.env.resource_version(),
                &status,
            )
            .await?;

        info!(
            environment = %self.name,
            namespace = %self.namespace,
            from = %self.env.phase(),
            to = %phase,
            "Updated AndroidSDK phase"
        );
        Ok(())
    }

    /// Put back the status this reconcile started from.
    ///
    /// Used when a launch fails after its phase was written, so the next
    /// event retries the launch instead of waiting on a worker that was
    /// never created. Best effort: the version check is skipped because the
    /// failed launch already bumped it.
    async fn restore_status(&self, ctx: &SdkContext) {
        let status = self.env.status.clone().unwrap_or_default();
        match ctx
            .kube
            .patch_environment_status(&self.name, &self.namespace, None, &status)
            .await
        {
            Ok(()) => info!(
                environment = %self.name,
                phase = %status.phase,
                "Restored AndroidSDK phase after failed launch"
            ),
            Err(e) => warn!(
                environment = %self.name,
                phase = %status.phase,
                error = %e,
                "Failed to restore AndroidSDK phase after failed launch"
            ),
        }
    }

    async fn publish(
        &self,
        ctx: &SdkContext,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        ctx.events
            .publish(&self.env.object_ref(&()), type_, reason, action, note)
            .await;
    }
}

async fn reconcile_environment(env: &AndroidSDK, ctx: &SdkContext) -> Result<Action, Error> {
    let target = Target::new(env)?;
    let phase = env.phase();

    info!(
        environment = %target.name,
        namespace = %target.namespace,
        %phase,
        "Reconciling AndroidSDK"
    );

    match phase {
        SdkPhase::Unset => initialize(&target, ctx).await,
        SdkPhase::Install => launch(&target, WorkerAction::Install, ctx).await,
        SdkPhase::Installing => await_worker(&target, WorkerAction::Install, ctx).await,
        SdkPhase::Sync => launch(&target, WorkerAction::Sync, ctx).await,
        SdkPhase::Syncing => await_worker(&target, WorkerAction::Sync, ctx).await,
        SdkPhase::Done => detect_drift(&target, ctx).await,
    }
}

/// Unset: record the explicit start of the lifecycle
async fn initialize(target: &Target<'_>, ctx: &SdkContext) -> Result<Action, Error> {
    let next = next_phase(SdkPhase::Unset, Observation::Nothing);
    target
        .write_status(ctx, next, None, "SDK install requested".to_string())
        .await?;
    target
        .publish(
            ctx,
            EventType::Normal,
            reasons::INITIALIZED,
            actions::RECONCILE,
            None,
        )
        .await;
    Ok(Action::requeue(ctx.settings.poll_interval))
}

/// Install/Sync: record the baseline, then launch the worker.
///
/// A finished Pod left over from an earlier run is removed first so the new
/// run is observed on a fresh Pod.
async fn launch(
    target: &Target<'_>,
    action: WorkerAction,
    ctx: &SdkContext,
) -> Result<Action, Error> {
    let lifecycle = JobLifecycle::new(ctx.kube.as_ref());
    let job_name = action.job_name();

    if let Some(existing) = lifecycle.get(job_name, &target.namespace).await? {
        let state = lifecycle::pod_state(&existing);
        let transitioned = target.env.status.as_ref().and_then(|s| s.last_transition_time);
        if state.is_finished() && lifecycle::predates(&existing, transitioned) {
            info!(
                environment = %target.name,
                pod = %job_name,
                state = ?state,
                "Removing finished worker Pod from an earlier run"
            );
            lifecycle.remove(job_name, &target.namespace).await?;
            return Ok(Action::requeue(ctx.settings.poll_interval));
        }
        if state.is_finished() {
            // Created after this phase began: this copy of the environment is
            // stale and the status write below is rejected.
            debug!(
                environment = %target.name,
                pod = %job_name,
                state = ?state,
                "Finished worker Pod belongs to the current run, keeping it"
            );
        }
    }

    let fingerprint = target.package_fingerprint(ctx).await?;
    let next = next_phase(target.env.phase(), Observation::Nothing);
    target
        .write_status(
            ctx,
            next,
            Some(fingerprint.clone()),
            format!("{} worker launched", action.as_str()),
        )
        .await?;

    let pod = job::build_worker_pod(
        action,
        target.config_map_name(),
        &target.namespace,
        &ctx.settings.worker,
        target.env.controller_owner_ref(&()),
    );
    let created = match ctx.kube.create_pod(&pod).await {
        Ok(created) => created,
        Err(e) => {
            target.restore_status(ctx).await;
            return Err(e);
        }
    };
    if created {
        info!(
            environment = %target.name,
            pod = %job_name,
            fingerprint = %fingerprint,
            "Created worker Pod"
        );
    } else {
        info!(
            environment = %target.name,
            pod = %job_name,
            "Worker Pod already exists, adopting it"
        );
    }

    let reason = match action {
        WorkerAction::Install => reasons::INSTALL_STARTED,
        WorkerAction::Sync => reasons::SYNC_STARTED,
    };
    target
        .publish(
            ctx,
            EventType::Normal,
            reason,
            actions::LAUNCH,
            Some(format!("Created Pod {}", job_name)),
        )
        .await;

    Ok(Action::requeue(ctx.settings.poll_interval))
}

/// Installing/Syncing: wait for the worker, clean it up, move on
async fn await_worker(
    target: &Target<'_>,
    action: WorkerAction,
    ctx: &SdkContext,
) -> Result<Action, Error> {
    let lifecycle = JobLifecycle::new(ctx.kube.as_ref());
    let job_name = action.job_name();

    let pod = lifecycle.get(job_name, &target.namespace).await?;
    let state = pod
        .as_ref()
        .map(lifecycle::pod_state)
        .unwrap_or(JobState::Absent);
    let next = next_phase(target.env.phase(), Observation::Job(state));

    let (event_type, reason, message) = match state {
        JobState::Running => {
            debug!(environment = %target.name, pod = %job_name, "Worker Pod still running");
            return Ok(Action::requeue(ctx.settings.poll_interval));
        }
        JobState::Failed => {
            let msg = pod
                .as_ref()
                .and_then(lifecycle::failure_message)
                .unwrap_or_else(|| "unknown failure".to_string());
            warn!(
                environment = %target.name,
                pod = %job_name,
                error = %msg,
                "Worker Pod failed; leaving it in place for inspection"
            );
            target
                .publish(
                    ctx,
                    EventType::Warning,
                    reasons::WORKER_FAILED,
                    actions::RECONCILE,
                    Some(format!("Pod {} failed: {}", job_name, msg)),
                )
                .await;
            return Ok(Action::requeue(ctx.settings.resync_interval));
        }
        JobState::Succeeded => {
            lifecycle.remove(job_name, &target.namespace).await?;
            let reason = match action {
                WorkerAction::Install => reasons::INSTALL_COMPLETE,
                WorkerAction::Sync => reasons::SYNC_COMPLETE,
            };
            (
                EventType::Normal,
                reason,
                format!("{} worker succeeded", action.as_str()),
            )
        }
        JobState::Absent => {
            warn!(
                environment = %target.name,
                pod = %job_name,
                "Worker Pod not found, assuming it completed and was cleaned up"
            );
            (
                EventType::Warning,
                reasons::WORKER_MISSING,
                format!("{} worker not found, assumed complete", action.as_str()),
            )
        }
    };

    target.write_status(ctx, next, None, message.clone()).await?;
    target
        .publish(ctx, event_type, reason, actions::CLEANUP, Some(message))
        .await;

    if next == SdkPhase::Done {
        Ok(Action::requeue(ctx.settings.resync_interval))
    } else {
        Ok(Action::requeue(ctx.settings.poll_interval))
    }
}

/// Done: compare the package list against the baseline
async fn detect_drift(target: &Target<'_>, ctx: &SdkContext) -> Result<Action, Error> {
    let current = target.package_fingerprint(ctx).await?;

    let Some(baseline) = target.env.baseline() else {
        info!(
            environment = %target.name,
            fingerprint = %current,
            "No baseline recorded, adopting current package list"
        );
        target
            .write_status(
                ctx,
                SdkPhase::Done,
                Some(current),
                "baseline adopted from current package list".to_string(),
            )
            .await?;
        return Ok(Action::requeue(ctx.settings.resync_interval));
    };

    let changed = *baseline != current;
    let next = next_phase(SdkPhase::Done, Observation::Drift { changed });
    if next == SdkPhase::Done {
        debug!(environment = %target.name, "Package list unchanged");
        return Ok(Action::requeue(ctx.settings.resync_interval));
    }

    info!(
        environment = %target.name,
        baseline = %baseline,
        current = %current,
        "Package list changed, scheduling sync"
    );
    target
        .write_status(ctx, next, None, "package list changed".to_string())
        .await?;
    target
        .publish(
            ctx,
            EventType::Normal,
            reasons::DRIFT_DETECTED,
            actions::RECONCILE,
            Some(format!("ConfigMap {} changed", target.config_map_name())),
        )
        .await;

    Ok(Action::requeue(ctx.settings.poll_interval))
}

// =============================================================================
// ConfigMap events
// =============================================================================

/// Recognized ConfigMap: make sure an environment exists for it
async fn reconcile_config(config: &ConfigMap, ctx: &SdkContext) -> Result<Action, Error> {
    let name = config.name_any();

    if !config_source::is_recognized(config) {
        debug!(config_map = %name, "Ignoring unrecognized ConfigMap");
        return Ok(Action::await_change());
    }

    let namespace = config
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, "ConfigMap must be namespaced"))?;
    config_source::package_list(config)?;

    let mut env = AndroidSDK::new(
        DEFAULT_ENVIRONMENT_NAME,
        AndroidSdkSpec {
            config_map_name: name.clone(),
        },
    );
    env.metadata.namespace = Some(namespace.clone());

    if ctx.kube.create_environment(&env).await? {
        info!(
            config_map = %name,
            namespace = %namespace,
            environment = DEFAULT_ENVIRONMENT_NAME,
            "Created AndroidSDK for package list"
        );
    } else {
        debug!(
            config_map = %name,
            namespace = %namespace,
            "AndroidSDK already exists"
        );
    }

    Ok(Action::await_change())
}
