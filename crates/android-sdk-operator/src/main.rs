//! Android SDK Operator - keeps a shared Android SDK volume in sync with a package list

use clap::{Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use android_sdk_common::crd::AndroidSDK;
use android_sdk_common::FIELD_MANAGER;
use android_sdk_operator::config::OperatorConfig;
use android_sdk_operator::controller_runner;

/// Android SDK operator - installs the SDK into a shared volume and syncs its packages
#[derive(Parser, Debug)]
#[command(name = "android-sdk-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches AndroidSDK resources and labelled package-list ConfigMaps,
    /// launching install and sync worker Pods as the package list changes.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&AndroidSDK::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_tracing(cli.config.log_json);

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Ensure the AndroidSDK CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply so
/// the schema always matches the operator version.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing AndroidSDK CRD...");
    crds.patch(
        "androidsdks.androidsdk.aerogear.org",
        &params,
        &Patch::Apply(&AndroidSDK::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install AndroidSDK CRD: {}", e))?;

    Ok(())
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Android SDK operator starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client).await?;

    let settings = config.reconcile_settings();
    tracing::info!(
        worker_image = %settings.worker.image,
        sdk_claim = %settings.worker.sdk_claim_name,
        poll_interval = ?settings.poll_interval,
        resync_interval = ?settings.resync_interval,
        "Starting controllers..."
    );

    let controllers = controller_runner::build_controllers(client, config.namespace(), settings);
    futures::future::join_all(controllers).await;

    tracing::info!("Android SDK operator shut down");
    Ok(())
}
