use super::budget::is_valid_bound;
use super::selector::validate_selector;
use crate::crd::sidecarset::SidecarSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::HashSet;

/// Validate SidecarSet specification
///
/// Validates runtime constraints that cannot be enforced via CRD schema.
/// Used by both the reconcile loop (runtime) and the validating webhook (admission).
///
/// # Validation Rules
/// - `spec.selector` must be non-empty and well-formed
/// - `spec.containers[*].name` must be non-empty and unique, `image` must be set
/// - `updateStrategy.partition` / `maxUnavailable` must be a non-negative
///   number or a percentage between 0% and 100%
/// - `updateStrategy.selector` must be well-formed
/// - `updateStrategy.scatterStrategy` keys and values must be non-empty and unique
///
/// # Returns
/// * `Ok(())` - Validation passed
/// * `Err(String)` - Validation error message
pub fn validate_sidecarset(sidecarset: &SidecarSet) -> Result<(), String> {
    let spec = &sidecarset.spec;

    if is_empty_selector(&spec.selector) {
        return Err("spec.selector must select at least one label".to_string());
    }
    validate_selector(&spec.selector).map_err(|e| format!("spec.selector invalid: {}", e))?;

    let mut names = HashSet::new();
    for (i, sidecar) in spec.containers.iter().enumerate() {
        let container = &sidecar.container;
        if container.name.is_empty() {
            return Err(format!("spec.containers[{}].name cannot be empty", i));
        }
        if !names.insert(container.name.as_str()) {
            return Err(format!(
                "spec.containers[{}].name '{}' is duplicated",
                i, container.name
            ));
        }
        if container.image.as_deref().map_or(true, str::is_empty) {
            return Err(format!("spec.containers[{}].image is required", i));
        }
    }

    let strategy = &spec.update_strategy;
    validate_bound("spec.updateStrategy.partition", strategy.partition.as_ref())?;
    validate_bound(
        "spec.updateStrategy.maxUnavailable",
        strategy.max_unavailable.as_ref(),
    )?;

    if let Some(selector) = &strategy.selector {
        validate_selector(selector)
            .map_err(|e| format!("spec.updateStrategy.selector invalid: {}", e))?;
    }

    let mut terms = HashSet::new();
    for (i, term) in strategy.scatter_strategy.iter().enumerate() {
        if term.key.is_empty() || term.value.is_empty() {
            return Err(format!(
                "spec.updateStrategy.scatterStrategy[{}] key and value cannot be empty",
                i
            ));
        }
        if !terms.insert((term.key.as_str(), term.value.as_str())) {
            return Err(format!(
                "spec.updateStrategy.scatterStrategy[{}] '{}={}' is duplicated",
                i, term.key, term.value
            ));
        }
    }

    Ok(())
}

fn validate_bound(field: &str, value: Option<&IntOrString>) -> Result<(), String> {
    match value {
        Some(v) if !is_valid_bound(v) => Err(format!(
            "{} invalid value {:?}: must be percentage (e.g., '10%') or non-negative number",
            field, v
        )),
        _ => Ok(()),
    }
}

fn is_empty_selector(selector: &LabelSelector) -> bool {
    selector.match_labels.as_ref().map_or(true, |l| l.is_empty())
        && selector
            .match_expressions
            .as_ref()
            .map_or(true, |e| e.is_empty())
}
