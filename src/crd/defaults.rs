//! Admission-time defaulting for SidecarSet
//!
//! Fills every optional field the controller relies on so that the stored
//! object (and therefore its template hash) is fully specified.

use super::sidecarset::{SidecarSet, UpdateStrategyType};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Default partition: roll out to every matched pod
pub const DEFAULT_PARTITION: i32 = 0;

/// Default maxUnavailable: one pod at a time
pub const DEFAULT_MAX_UNAVAILABLE: i32 = 1;

pub const DEFAULT_TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";
pub const DEFAULT_TERMINATION_MESSAGE_POLICY: &str = "File";

/// Kubernetes' implicit pull policy for an image reference:
/// `Always` for untagged or `:latest` images, `IfNotPresent` otherwise.
pub fn default_image_pull_policy(image: Option<&str>) -> &'static str {
    let Some(image) = image else {
        return "IfNotPresent";
    };
    if image.contains('@') {
        return "IfNotPresent";
    }
    // A ':' after the last '/' separates the tag; earlier ones belong to a registry port
    let name = image.rsplit('/').next().unwrap_or(image);
    match name.split_once(':') {
        Some((_, "latest")) | None => "Always",
        Some(_) => "IfNotPresent",
    }
}

/// Apply defaults to a SidecarSet
///
/// On update (`old` is Some), a container whose imagePullPolicy was left
/// unset keeps the policy stored on the previous object, so re-applying a
/// manifest does not silently flip the policy and change the hash.
pub fn set_defaults_sidecarset(sidecarset: &mut SidecarSet, old: Option<&SidecarSet>) {
    let strategy = &mut sidecarset.spec.update_strategy;
    strategy
        .strategy_type
        .get_or_insert(UpdateStrategyType::RollingUpdate);
    strategy
        .partition
        .get_or_insert(IntOrString::Int(DEFAULT_PARTITION));
    strategy
        .max_unavailable
        .get_or_insert(IntOrString::Int(DEFAULT_MAX_UNAVAILABLE));

    for sidecar in &mut sidecarset.spec.containers {
        sidecar.pod_inject_policy.get_or_insert_with(Default::default);
        sidecar.share_volume_policy.get_or_insert_with(Default::default);

        let container = &mut sidecar.container;
        if container.image_pull_policy.is_none() {
            let inherited = old
                .and_then(|o| {
                    o.spec
                        .containers
                        .iter()
                        .find(|c| c.container.name == container.name)
                })
                .and_then(|c| c.container.image_pull_policy.clone());
            container.image_pull_policy = Some(inherited.unwrap_or_else(|| {
                default_image_pull_policy(container.image.as_deref()).to_string()
            }));
        }
        container
            .termination_message_path
            .get_or_insert_with(|| DEFAULT_TERMINATION_MESSAGE_PATH.to_string());
        container
            .termination_message_policy
            .get_or_insert_with(|| DEFAULT_TERMINATION_MESSAGE_POLICY.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::sidecarset::{
        PodInjectPolicy, ShareVolumePolicyType, SidecarContainer, SidecarSetSpec,
    };
    use k8s_openapi::api::core::v1::Container;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn sidecarset_with(image: &str, pull_policy: Option<&str>) -> SidecarSet {
        SidecarSet::new(
            "sidecarset-test",
            SidecarSetSpec {
                selector: LabelSelector::default(),
                namespace: None,
                containers: vec![SidecarContainer {
                    container: Container {
                        name: "dns-f".to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: pull_policy.map(str::to_string),
                        ..Default::default()
                    },
                    ..Default::default()
                }],
                update_strategy: Default::default(),
            },
        )
    }

    #[test]
    fn test_defaults_fill_strategy_and_containers() {
        let mut ss = sidecarset_with("dns:1.0", None);
        set_defaults_sidecarset(&mut ss, None);

        let strategy = &ss.spec.update_strategy;
        assert_eq!(
            strategy.strategy_type,
            Some(UpdateStrategyType::RollingUpdate)
        );
        assert_eq!(strategy.partition, Some(IntOrString::Int(0)));
        assert_eq!(strategy.max_unavailable, Some(IntOrString::Int(1)));

        let sidecar = &ss.spec.containers[0];
        assert_eq!(
            sidecar.pod_inject_policy,
            Some(PodInjectPolicy::BeforeAppContainer)
        );
        assert_eq!(
            sidecar.share_volume_policy.as_ref().map(|p| &p.policy_type),
            Some(&ShareVolumePolicyType::Disabled)
        );
        assert_eq!(
            sidecar.container.image_pull_policy.as_deref(),
            Some("IfNotPresent")
        );
        assert_eq!(
            sidecar.container.termination_message_path.as_deref(),
            Some("/dev/termination-log")
        );
        assert_eq!(
            sidecar.container.termination_message_policy.as_deref(),
            Some("File")
        );
    }

    #[test]
    fn test_defaults_keep_explicit_values() {
        let mut ss = sidecarset_with("dns:1.0", Some("Never"));
        ss.spec.update_strategy.max_unavailable = Some(IntOrString::String("20%".to_string()));
        set_defaults_sidecarset(&mut ss, None);

        assert_eq!(
            ss.spec.update_strategy.max_unavailable,
            Some(IntOrString::String("20%".to_string()))
        );
        assert_eq!(
            ss.spec.containers[0].container.image_pull_policy.as_deref(),
            Some("Never")
        );
    }

    #[test]
    fn test_defaults_inherit_pull_policy_from_old_object() {
        let old = sidecarset_with("dns:1.0", Some("Always"));
        let mut ss = sidecarset_with("dns:2.0", None);
        set_defaults_sidecarset(&mut ss, Some(&old));

        assert_eq!(
            ss.spec.containers[0].container.image_pull_policy.as_deref(),
            Some("Always")
        );
    }

    #[test]
    fn test_default_image_pull_policy() {
        assert_eq!(default_image_pull_policy(Some("nginx")), "Always");
        assert_eq!(default_image_pull_policy(Some("nginx:latest")), "Always");
        assert_eq!(default_image_pull_policy(Some("nginx:1.25")), "IfNotPresent");
        assert_eq!(
            default_image_pull_policy(Some("registry:5000/team/nginx")),
            "Always"
        );
        assert_eq!(
            default_image_pull_policy(Some("nginx@sha256:abcd")),
            "IfNotPresent"
        );
    }
}
