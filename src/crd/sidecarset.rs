use k8s_openapi::api::core::v1::Container;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation holding the full template hash.
///
/// On a SidecarSet the value is the bare hash. On a pod it is a JSON map
/// keyed by SidecarSet name (see [`PodSidecarRevision`]).
pub const SIDECARSET_HASH_ANNOTATION: &str = "kulta.io/sidecarset-hash";

/// Annotation holding the image-insensitive template hash (same layout as above)
pub const SIDECARSET_HASH_WITHOUT_IMAGE_ANNOTATION: &str =
    "kulta.io/sidecarset-hash-without-image";

/// Comma-separated list of SidecarSets injected into a pod
pub const SIDECARSET_INJECTED_LIST_ANNOTATION: &str = "kulta.io/sidecarset-injected-list";

/// Value of a scatter term that expands to every observed label value
pub const SCATTER_WILDCARD: &str = "*";

/// SidecarSet injects a set of sidecar containers into every matching pod
/// and rolls new sidecar revisions out in place.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "kulta.io",
    version = "v1alpha1",
    kind = "SidecarSet",
    status = "SidecarSetStatus",
    printcolumn = r#"{"name":"Matched", "type":"integer", "jsonPath":".status.matchedPods"}"#,
    printcolumn = r#"{"name":"Updated", "type":"integer", "jsonPath":".status.updatedPods"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyPods"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct SidecarSetSpec {
    /// Label selector for pods that receive the sidecars
    pub selector: LabelSelector,

    /// Restrict injection to a single namespace (all namespaces when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Sidecar containers injected into matching pods
    #[serde(default)]
    pub containers: Vec<SidecarContainer>,

    /// How new sidecar revisions are rolled out to already-injected pods
    #[serde(rename = "updateStrategy", default)]
    pub update_strategy: UpdateStrategy,
}

/// A sidecar container plus its injection policies
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SidecarContainer {
    #[serde(flatten)]
    pub container: Container,

    /// Where the sidecar lands relative to the app containers
    #[serde(rename = "podInjectPolicy", skip_serializing_if = "Option::is_none")]
    pub pod_inject_policy: Option<PodInjectPolicy>,

    /// Whether the sidecar mounts the app containers' volumes
    #[serde(rename = "shareVolumePolicy", skip_serializing_if = "Option::is_none")]
    pub share_volume_policy: Option<ShareVolumePolicy>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum PodInjectPolicy {
    #[default]
    BeforeAppContainer,
    AfterAppContainer,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ShareVolumePolicy {
    #[serde(rename = "type")]
    pub policy_type: ShareVolumePolicyType,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ShareVolumePolicyType {
    #[serde(rename = "enabled")]
    Enabled,
    #[default]
    #[serde(rename = "disabled")]
    Disabled,
}

/// Rollout type of an [`UpdateStrategy`]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum UpdateStrategyType {
    /// Upgrade injected pods in batches bounded by maxUnavailable and partition
    #[default]
    RollingUpdate,
    /// Only inject into new pods, never touch existing ones
    NotUpdate,
}

/// Rolling upgrade configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct UpdateStrategy {
    /// Rollout type (defaults to RollingUpdate)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub strategy_type: Option<UpdateStrategyType>,

    /// Stop selecting new pods for upgrade
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,

    /// Number or percentage of matched pods that stay on the old revision.
    /// Defaults to 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<IntOrString>,

    /// Number or percentage of upgraded pods allowed to be unavailable at once.
    /// Defaults to 1.
    #[serde(rename = "maxUnavailable", skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,

    /// Further restricts which matched pods take part in the rollout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Labels used to spread each upgrade batch across pod groups
    #[serde(
        rename = "scatterStrategy",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub scatter_strategy: Vec<ScatterTerm>,
}

impl UpdateStrategy {
    /// True when the strategy may select pods at all
    pub fn is_rolling(&self) -> bool {
        !self.paused && !matches!(self.strategy_type, Some(UpdateStrategyType::NotUpdate))
    }
}

/// A label key/value used to spread upgrades; `value` may be `*`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ScatterTerm {
    pub key: String,
    pub value: String,
}

impl ScatterTerm {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.value == SCATTER_WILDCARD
    }

    /// Whether a label set carries exactly this key/value.
    /// Wildcard terms never match; they must be resolved first.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        !self.is_wildcard() && labels.get(&self.key) == Some(&self.value)
    }
}

/// Per-SidecarSet revision record stored in pod annotations
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PodSidecarRevision {
    pub hash: String,

    #[serde(rename = "updateTimestamp", skip_serializing_if = "Option::is_none")]
    pub update_timestamp: Option<String>,

    #[serde(rename = "sidecarList", default)]
    pub sidecar_list: Vec<String>,
}

/// Status of the SidecarSet
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SidecarSetStatus {
    /// Generation last processed by the controller
    #[serde(rename = "observedGeneration", skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Pods matched by the selector with this SidecarSet injected
    #[serde(rename = "matchedPods", default)]
    pub matched_pods: i32,

    /// Matched pods whose sidecars are on the latest revision
    #[serde(rename = "updatedPods", default)]
    pub updated_pods: i32,

    /// Matched pods that are ready
    #[serde(rename = "readyPods", default)]
    pub ready_pods: i32,

    /// Matched pods that are both updated and ready
    #[serde(rename = "updatedReadyPods", default)]
    pub updated_ready_pods: i32,

    /// Hash of the latest sidecar template
    #[serde(rename = "latestHash", skip_serializing_if = "Option::is_none")]
    pub latest_hash: Option<String>,
}

#[cfg(test)]
#[path = "sidecarset_test.rs"]
mod tests;
