//! Kubernetes label selector evaluation

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector has an empty label key")]
    EmptyKey,

    #[error("unsupported selector operator '{operator}' for key '{key}'")]
    UnknownOperator { key: String, operator: String },

    #[error("selector operator '{operator}' for key '{key}' requires at least one value")]
    MissingValues { key: String, operator: String },

    #[error("selector operator '{operator}' for key '{key}' must not have values")]
    UnexpectedValues { key: String, operator: String },
}

/// Check a whole selector for syntax errors without evaluating it
pub fn validate_selector(selector: &LabelSelector) -> Result<(), SelectorError> {
    if let Some(labels) = &selector.match_labels {
        if labels.keys().any(|k| k.is_empty()) {
            return Err(SelectorError::EmptyKey);
        }
    }
    for requirement in selector.match_expressions.iter().flatten() {
        validate_requirement(requirement)?;
    }
    Ok(())
}

/// Evaluate a selector against a label set
///
/// An empty selector matches everything. The selector is validated in full
/// before any requirement is evaluated, so a malformed selector is an error
/// regardless of the labels it is tested against.
pub fn matches(
    selector: &LabelSelector,
    labels: &BTreeMap<String, String>,
) -> Result<bool, SelectorError> {
    validate_selector(selector)?;

    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(k, v)| labels.get(k) == Some(v));

    let expressions_match = selector
        .match_expressions
        .iter()
        .flatten()
        .all(|r| requirement_matches(r, labels));

    Ok(labels_match && expressions_match)
}

fn validate_requirement(requirement: &LabelSelectorRequirement) -> Result<(), SelectorError> {
    if requirement.key.is_empty() {
        return Err(SelectorError::EmptyKey);
    }
    let has_values = requirement.values.as_ref().is_some_and(|v| !v.is_empty());
    match requirement.operator.as_str() {
        "In" | "NotIn" if !has_values => Err(SelectorError::MissingValues {
            key: requirement.key.clone(),
            operator: requirement.operator.clone(),
        }),
        "Exists" | "DoesNotExist" if has_values => Err(SelectorError::UnexpectedValues {
            key: requirement.key.clone(),
            operator: requirement.operator.clone(),
        }),
        "In" | "NotIn" | "Exists" | "DoesNotExist" => Ok(()),
        other => Err(SelectorError::UnknownOperator {
            key: requirement.key.clone(),
            operator: other.to_string(),
        }),
    }
}

// Only called on validated requirements
fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let value = labels.get(&requirement.key);
    let in_values = || {
        value.is_some_and(|v| requirement.values.iter().flatten().any(|candidate| candidate == v))
    };
    match requirement.operator.as_str() {
        "In" => in_values(),
        "NotIn" => !in_values(),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expression(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: if values.is_empty() {
                None
            } else {
                Some(values.iter().map(|v| v.to_string()).collect())
            },
        }
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert_eq!(matches(&selector, &labels(&[])), Ok(true));
        assert_eq!(matches(&selector, &labels(&[("app", "x")])), Ok(true));
    }

    #[test]
    fn test_match_labels() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "test")])),
            ..Default::default()
        };
        assert_eq!(matches(&selector, &labels(&[("app", "test")])), Ok(true));
        assert_eq!(matches(&selector, &labels(&[("app", "sidecar")])), Ok(false));
        assert_eq!(matches(&selector, &labels(&[])), Ok(false));
    }

    #[test]
    fn test_match_expressions() {
        let selector = LabelSelector {
            match_expressions: Some(vec![
                expression("zone", "In", &["a", "b"]),
                expression("tier", "NotIn", &["db"]),
                expression("app", "Exists", &[]),
                expression("legacy", "DoesNotExist", &[]),
            ]),
            ..Default::default()
        };

        assert_eq!(
            matches(&selector, &labels(&[("zone", "a"), ("app", "x")])),
            Ok(true)
        );
        assert_eq!(
            matches(&selector, &labels(&[("zone", "c"), ("app", "x")])),
            Ok(false)
        );
        assert_eq!(
            matches(&selector, &labels(&[("zone", "a"), ("app", "x"), ("tier", "db")])),
            Ok(false)
        );
        assert_eq!(
            matches(&selector, &labels(&[("zone", "a"), ("app", "x"), ("legacy", "1")])),
            Ok(false)
        );
        assert_eq!(matches(&selector, &labels(&[("zone", "a")])), Ok(false));
    }

    #[test]
    fn test_malformed_selectors_error_regardless_of_labels() {
        let unknown = LabelSelector {
            match_expressions: Some(vec![expression("zone", "Equals", &["a"])]),
            ..Default::default()
        };
        assert!(matches!(
            matches(&unknown, &labels(&[("zone", "a")])),
            Err(SelectorError::UnknownOperator { .. })
        ));

        let missing = LabelSelector {
            match_expressions: Some(vec![expression("zone", "In", &[])]),
            ..Default::default()
        };
        assert!(matches!(
            matches(&missing, &labels(&[])),
            Err(SelectorError::MissingValues { .. })
        ));

        let unexpected = LabelSelector {
            match_expressions: Some(vec![expression("zone", "Exists", &["a"])]),
            ..Default::default()
        };
        assert!(matches!(
            matches(&unexpected, &labels(&[])),
            Err(SelectorError::UnexpectedValues { .. })
        ));

        let empty_key = LabelSelector {
            match_labels: Some(labels(&[("", "x")])),
            ..Default::default()
        };
        assert_eq!(matches(&empty_key, &labels(&[])), Err(SelectorError::EmptyKey));
    }
}
