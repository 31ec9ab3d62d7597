use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use kulta_sidecarset::controller::{reconcile, Context, ReconcileError};
use kulta_sidecarset::crd::sidecarset::SidecarSet;
use kulta_sidecarset::server::{
    create_metrics, run_server, run_server_tls, wait_for_signal, ReadinessState, ServerState,
    Shutdown,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default port for health endpoints (HTTP)
const HEALTH_PORT: u16 = 8080;

/// Port for health and webhook endpoints when TLS is enabled
const WEBHOOK_PORT: u16 = 8443;

const DEFAULT_CERT_DIR: &str = "/tmp/k8s-webhook-server/serving-certs";

/// How long the server gets to drain after the controller stops
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Port from `KULTA_HEALTH_PORT`, falling back to the default on absence or garbage
fn parse_port(value: Option<String>) -> u16 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(HEALTH_PORT)
}

fn is_enabled(value: Option<String>) -> bool {
    value.map(|v| v == "true" || v == "1").unwrap_or(false)
}

fn cert_dir(value: Option<String>) -> PathBuf {
    PathBuf::from(value.unwrap_or_else(|| DEFAULT_CERT_DIR.to_string()))
}

/// Error policy for the controller
///
/// Uses `warn!` since reconciliation errors are expected and trigger retries.
pub fn error_policy(
    sidecarset: Arc<SidecarSet>,
    error: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    warn!(
        sidecarset = ?sidecarset.metadata.name,
        error = %error,
        "Reconcile error (will retry)"
    );

    if let Some(ref metrics) = ctx.metrics {
        // Duration unknown for errors (didn't complete), use 0
        metrics.record_reconciliation_error(0.0);
    }

    Action::requeue(Duration::from_secs(10))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting KULTA SidecarSet controller");

    // kube and axum-server both use rustls; pin the provider once
    let _ = rustls::crypto::ring::default_provider().install_default();

    let shutdown = Shutdown::new();
    let readiness = ReadinessState::new();

    let metrics = create_metrics()?;
    info!("Prometheus metrics registry initialized");

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let state = ServerState::new(readiness.clone(), metrics.clone());
    let listener = shutdown.listener();
    let server_handle = if is_enabled(std::env::var("KULTA_WEBHOOK_TLS").ok()) {
        let dir = cert_dir(std::env::var("KULTA_WEBHOOK_CERT_DIR").ok());
        info!(port = WEBHOOK_PORT, cert_dir = %dir.display(), "Webhook TLS enabled");
        tokio::spawn(async move {
            if let Err(e) = run_server_tls(WEBHOOK_PORT, state, &dir, listener).await {
                warn!(error = %e, "HTTPS server failed");
            }
        })
    } else {
        let port = parse_port(std::env::var("KULTA_HEALTH_PORT").ok());
        info!(port, "Webhook TLS disabled - running HTTP only");
        tokio::spawn(async move {
            if let Err(e) = run_server(port, state, listener).await {
                warn!(error = %e, "Health server failed");
            }
        })
    };

    let sidecarsets = Api::<SidecarSet>::all(client.clone());
    let ctx = Arc::new(Context::new(client, Some(metrics)));

    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    // error_policy already logs failures
    let controller = Controller::new(sidecarsets, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok((object, _)) = res {
                info!(sidecarset = %object.name, "Reconciled");
            }
        });

    tokio::select! {
        _ = controller => {
            info!("Controller stream ended");
        }
        signal = wait_for_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "Initiating graceful shutdown"),
                Err(e) => error!(error = %e, "Signal handling failed, shutting down"),
            }
        }
    }

    readiness.set_not_ready();
    shutdown.trigger();

    if tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server_handle)
        .await
        .is_err()
    {
        warn!("Server did not drain in time");
    }

    info!("KULTA SidecarSet controller shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
