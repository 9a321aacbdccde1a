//! Application Operator - runs Application resources as Deployments, Services and Ingresses

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use tokio_util::sync::CancellationToken;

use application_operator::controller::{
    error_policy, reconcile, reconcile_application, ApplicationKey, Context,
};
use application_operator::crd::Application;
use application_operator::telemetry::{self, LogFormat};
use application_operator::workload::DesiredState;
use application_operator::FIELD_MANAGER;

/// Application Operator - keeps workloads in line with Application resources
#[derive(Parser, Debug)]
#[command(name = "application-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Log output format
    #[arg(long, value_enum, global = true, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches Application resources and the Deployments, Services and
    /// Ingresses they own, reconciling on every change.
    Controller(ControllerArgs),

    /// Run a single reconciliation pass for one Application and exit
    Reconcile(ReconcileArgs),

    /// Print the objects an Application manifest would produce
    ///
    /// Does not contact the cluster.
    Render(RenderArgs),
}

/// Controller mode arguments
#[derive(Args, Debug, Default)]
struct ControllerArgs {
    /// Only watch Applications in this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Maximum number of Applications reconciled in parallel (0 = unbounded)
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value = "0")]
    max_concurrent_reconciles: u16,

    /// Do not install or update the CRD on startup
    #[arg(long)]
    skip_crd_install: bool,
}

/// One-shot reconcile arguments
#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Namespace of the Application
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Name of the Application
    #[arg(long)]
    name: String,
}

/// Render arguments
#[derive(Args, Debug)]
struct RenderArgs {
    /// Path to the Application YAML manifest
    #[arg(short = 'f', long = "file")]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init(cli.log_format);

    if cli.crd {
        // Generate CRD YAML
        let crd = serde_yaml::to_string(&Application::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Reconcile(args)) => run_once(args).await,
        Some(Commands::Render(args)) => run_render(args).await,
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::default()).await,
    }
}

/// Ensure the Application CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply.
/// This ensures the CRD version always matches the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let crd = Application::crd();

    tracing::info!(crd = %crd.name_any(), "Installing Application CRD...");
    crds.patch(&crd.name_any(), &params, &Patch::Apply(&crd))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Application CRD: {}", e))?;

    tracing::info!("Application CRD installed/updated");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM, only handling Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}

/// Run the controller
///
/// Watches Applications (in one namespace or cluster-wide) together with the
/// children they own until a shutdown signal arrives.
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("Application operator starting...");

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.skip_crd_install {
        tracing::info!("Skipping CRD installation");
    } else {
        ensure_crds_installed(&client).await?;
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let ctx = Arc::new(
        Context::builder(client.clone())
            .shutdown(shutdown.clone())
            .build(),
    );

    let (applications, deployments, services, ingresses) = match args.namespace.as_deref() {
        Some(ns) => (
            Api::<Application>::namespaced(client.clone(), ns),
            Api::<Deployment>::namespaced(client.clone(), ns),
            Api::<Service>::namespaced(client.clone(), ns),
            Api::<Ingress>::namespaced(client, ns),
        ),
        None => (
            Api::<Application>::all(client.clone()),
            Api::<Deployment>::all(client.clone()),
            Api::<Service>::all(client.clone()),
            Api::<Ingress>::all(client),
        ),
    };

    tracing::info!(
        namespace = args.namespace.as_deref().unwrap_or("<all>"),
        max_concurrent_reconciles = args.max_concurrent_reconciles,
        "Starting Application controller"
    );

    Controller::new(applications, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default())
        .owns(services, WatcherConfig::default())
        .owns(ingresses, WatcherConfig::default())
        .with_config(ControllerConfig::default().concurrency(args.max_concurrent_reconciles))
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(application = %obj, ?action, "Application reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Application reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Application operator shutting down");
    Ok(())
}

/// Run one pass for a single Application and print the resulting action
async fn run_once(args: ReconcileArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let ctx = Context::builder(client).shutdown(shutdown).build();
    let key = ApplicationKey::new(args.namespace, args.name);
    let action = reconcile_application(&ctx, &ctx.pass(key.clone()))
        .await
        .map_err(|e| anyhow::anyhow!("Reconciliation of {} failed: {}", key, e))?;

    println!("{key}: {action:?}");
    Ok(())
}

/// Print the children an Application manifest would produce as a YAML stream
async fn run_render(args: RenderArgs) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", args.file, e))?;

    let mut app: Application = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse Application manifest: {}", e))?;
    if app.metadata.namespace.is_none() {
        app.metadata.namespace = Some("default".to_string());
    }

    let exposure = app
        .spec
        .validate(&app.key().to_string())
        .map_err(|e| anyhow::anyhow!("{}", e.reason()))?;
    let desired = DesiredState::synthesize(&app, &exposure);

    let mut documents = vec![
        serde_yaml::to_string(&desired.deployment)?,
        serde_yaml::to_string(&desired.service)?,
    ];
    if let Some(ingress) = &desired.ingress {
        documents.push(serde_yaml::to_string(ingress)?);
    }
    println!("{}", documents.join("---\n"));
    Ok(())
}
