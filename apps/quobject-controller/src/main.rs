//! quobject controller - provisions S3 buckets for `QuObjectBucketClaim` resources.
//!
//! Watches claims (and the Secrets and ConfigMaps it derives from them) and
//! reconciles each one against the S3-compatible backend described by the
//! credential Secret.
//!
//! # Usage
//!
//! ```text
//! quobject-controller               # run the controller
//! quobject-controller --print-crd   # print the CustomResourceDefinition
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CONTROLLER_NAMESPACE` | `quobject-controller` | Namespace of the credential Secret |
//! | `CREDENTIALS_SECRET` | `s3-credentials` | Name of the credential Secret |
//! | `WATCH_NAMESPACE` | *(unset)* | Only watch claims in this namespace |
//! | `RECONCILE_CONCURRENCY` | `4` | Claims reconciled in parallel |
//! | `RESYNC_INTERVAL_SECS` | `300` | Requeue delay after success |
//! | `ERROR_REQUEUE_SECS` | `5` | Requeue delay after failure |
//! | `RECONCILE_TIMEOUT_SECS` | `60` | Deadline per pass and per S3 call |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::runtime::controller::{self, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, CustomResourceExt, Resource};
use quobject_core::config::ControllerConfig;
use quobject_core::{Context, error_policy, reconcile};
use quobject_model::{MANAGED_BY, QuObjectBucketClaim};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Controller version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// The CustomResourceDefinition as pretty-printed JSON.
fn crd_manifest() -> Result<String> {
    serde_json::to_string_pretty(&QuObjectBucketClaim::crd()).context("failed to serialize CRD")
}

/// Api scoped to one namespace, or to the whole cluster.
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

/// Label selector matching the artifacts this controller writes.
fn managed_selector() -> String {
    format!("app.kubernetes.io/managed-by={MANAGED_BY}")
}

/// Run the controller until a shutdown signal is received.
async fn run(client: Client, config: ControllerConfig) -> Result<()> {
    let namespace = config.watch_namespace.as_deref();
    let claims: Api<QuObjectBucketClaim> = scoped_api(&client, namespace);
    let secrets: Api<Secret> = scoped_api(&client, namespace);
    let config_maps: Api<ConfigMap> = scoped_api(&client, namespace);

    // Fail fast when the CRD is not installed.
    claims
        .list(&kube::api::ListParams::default().limit(1))
        .await
        .context("QuObjectBucketClaim CRD is not queryable; is it installed?")?;

    let artifacts = watcher::Config::default().labels(&managed_selector());
    let controller_config = controller::Config::default().concurrency(config.reconcile_concurrency);
    let ctx = Arc::new(Context::new(client, config));

    Controller::new(claims, watcher::Config::default())
        .owns(secrets, artifacts.clone())
        .owns(config_maps, artifacts)
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((claim, action)) => debug!(%claim, ?action, "reconciled"),
                Err(e) => warn!(error = %e, "reconcile failed"),
            }
        })
        .await;

    info!("controller stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().any(|a| a == "--print-crd") {
        println!("{}", crd_manifest()?);
        return Ok(());
    }

    let config = ControllerConfig::from_env();
    init_tracing(&config.log_level)?;

    info!(
        controller_namespace = %config.controller_namespace,
        credentials_secret = %config.credentials_secret,
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        concurrency = config.reconcile_concurrency,
        version = VERSION,
        "starting quobject controller",
    );

    let client = Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;

    run(client, config).await
}
