use super::control::SidecarSetControl;
use super::hash::HashError;
use super::instance::Instance;
use super::selection::select_next_upgrade;
use super::selector::{matches, SelectorError};
use super::status::{calculate_requeue_interval, calculate_status};
use super::upgrade::build_upgrade_patch;
use super::validation::validate_sidecarset;
use crate::crd::sidecarset::SidecarSet;
use crate::server::SharedMetrics;
use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("SidecarSet missing name")]
    MissingName,

    #[error("Invalid SidecarSet spec: {0}")]
    ValidationError(String),

    #[error("Failed to hash sidecar template: {0}")]
    HashError(#[from] HashError),

    #[error("Invalid label selector: {0}")]
    SelectorError(#[from] SelectorError),

    #[error("Failed to build pod patch: {0}")]
    SerializationError(String),
}

pub struct Context {
    pub client: kube::Client,
    /// Optional controller metrics for Prometheus
    /// When Some, records reconciliation counts and durations
    pub metrics: Option<SharedMetrics>,
}

impl Context {
    pub fn new(client: kube::Client, metrics: Option<SharedMetrics>) -> Self {
        Context { client, metrics }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used)] // Test helper - panicking is acceptable
    pub fn new_mock() -> Self {
        // reqwest/kube use rustls and need a process-wide crypto provider
        let _ = rustls::crypto::ring::default_provider().install_default();

        // The client is never used to reach a server in unit tests
        let mut config = kube::Config::new("https://localhost:8080".parse().unwrap());
        config.default_namespace = "default".to_string();
        config.accept_invalid_certs = true;

        Context {
            client: kube::Client::try_from(config).unwrap(),
            metrics: None,
        }
    }
}

/// Reconcile a SidecarSet resource
///
/// 1. Validates the SidecarSet spec
/// 2. Lists pods matched by `spec.selector` that carry this SidecarSet
/// 3. Patches the status counts
/// 4. Selects the next batch of pods and swaps their sidecar images in place
///
/// # Returns
/// * `Ok(Action)` - Requeue quickly while pods are still upgrading, slowly once settled
/// * `Err(ReconcileError)` - Reconciliation error
pub async fn reconcile(
    sidecarset: Arc<SidecarSet>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start_time = Instant::now();

    let name = sidecarset
        .metadata
        .name
        .clone()
        .ok_or(ReconcileError::MissingName)?;

    info!(sidecarset = ?name, "Reconciling SidecarSet");

    if let Err(validation_error) = validate_sidecarset(&sidecarset) {
        error!(
            sidecarset = ?name,
            error = ?validation_error,
            "SidecarSet spec validation failed"
        );
        return Err(ReconcileError::ValidationError(validation_error));
    }

    let control = SidecarSetControl::new(&sidecarset)?;

    let pod_api: Api<Pod> = match &sidecarset.spec.namespace {
        Some(namespace) => Api::namespaced(ctx.client.clone(), namespace),
        None => Api::all(ctx.client.clone()),
    };
    let mut params = ListParams::default();
    if let Some(query) = match_labels_query(&sidecarset.spec.selector) {
        params = params.labels(&query);
    }
    let listed = pod_api.list(&params).await?;

    let mut pods = Vec::new();
    let mut instances = Vec::new();
    for pod in listed.items {
        if !matches(&sidecarset.spec.selector, pod.labels())? {
            continue;
        }
        let instance = Instance::from_pod(&pod, &control.sidecar_names);
        if instance.is_injected(&name) {
            pods.push(pod);
            instances.push(instance);
        }
    }
    debug!(sidecarset = ?name, pods = instances.len(), "Collected injected pods");

    let desired_status = calculate_status(&sidecarset, &instances, &control);
    if sidecarset.status.as_ref() != Some(&desired_status) {
        info!(
            sidecarset = ?name,
            matched = desired_status.matched_pods,
            updated = desired_status.updated_pods,
            ready = desired_status.ready_pods,
            updated_ready = desired_status.updated_ready_pods,
            "Updating SidecarSet status"
        );

        let sidecarset_api: Api<SidecarSet> = Api::all(ctx.client.clone());
        if let Err(e) = sidecarset_api
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(&serde_json::json!({ "status": desired_status })),
            )
            .await
        {
            error!(error = ?e, sidecarset = ?name, "Failed to update status");
            return Err(ReconcileError::KubeError(e));
        }
    }

    let outcome = select_next_upgrade(&sidecarset.spec.update_strategy, &instances, &control);
    if let Some(e) = &outcome.error {
        warn!(
            sidecarset = ?name,
            error = %e,
            "Update strategy selector is invalid, upgrading no pods this pass"
        );
    }

    let now = Utc::now();
    for instance in &outcome.selected {
        let Some(namespace) = instance.namespace.as_deref() else {
            warn!(sidecarset = ?name, pod = %instance.name, "Pod has no namespace, skipping");
            continue;
        };
        let Some(pod) = pods.iter().find(|p| {
            p.metadata.name.as_deref() == Some(instance.name.as_str())
                && p.metadata.namespace.as_deref() == Some(namespace)
        }) else {
            continue;
        };

        let patch = build_upgrade_patch(&sidecarset, &control.hashes, pod, now)
            .map_err(|e| ReconcileError::SerializationError(e.to_string()))?;

        Api::<Pod>::namespaced(ctx.client.clone(), namespace)
            .patch(&instance.name, &PatchParams::default(), &Patch::Strategic(&patch))
            .await?;

        info!(
            sidecarset = ?name,
            pod = %instance.name,
            namespace = %namespace,
            revision = %control.hashes.full,
            "Upgraded pod sidecars in place"
        );
    }

    if let Some(ref metrics) = ctx.metrics {
        metrics.record_pods_selected(&name, outcome.selected.len());
        metrics.record_reconciliation_success(start_time.elapsed().as_secs_f64());
    }

    info!(
        sidecarset = ?name,
        need_upgrade = outcome.need_upgrade_count,
        selected = outcome.selected.len(),
        "SidecarSet reconciled"
    );

    Ok(Action::requeue(calculate_requeue_interval(&desired_status)))
}

/// Server-side pre-filter from `matchLabels`; expressions are evaluated locally
fn match_labels_query(selector: &LabelSelector) -> Option<String> {
    let labels = selector.match_labels.as_ref().filter(|l| !l.is_empty())?;
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}
