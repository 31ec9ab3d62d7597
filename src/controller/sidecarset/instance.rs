//! Point-in-time view of a pod, as seen by the upgrade selection engine

use crate::crd::sidecarset::{
    PodSidecarRevision, SIDECARSET_HASH_ANNOTATION, SIDECARSET_HASH_WITHOUT_IMAGE_ANNOTATION,
    SIDECARSET_INJECTED_LIST_ANNOTATION,
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::debug;

/// One pod carrying injected sidecars
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Instance {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub ready: bool,
    /// Pod has a deletion timestamp
    pub terminating: bool,
    /// SidecarSets injected into this pod
    pub injected: Vec<String>,
    /// Applied full hash per SidecarSet name
    pub revisions: BTreeMap<String, String>,
    /// Applied image-insensitive hash per SidecarSet name
    pub revisions_without_image: BTreeMap<String, String>,
}

impl Instance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build the snapshot of a pod
    ///
    /// A pod only counts as ready when its Ready condition is True and every
    /// sidecar in `sidecar_names` reports ready on the image its spec names,
    /// so a pod whose in-place image swap has not finished still occupies
    /// the unavailability budget.
    pub fn from_pod(pod: &Pod, sidecar_names: &[String]) -> Self {
        let meta = &pod.metadata;
        let annotations = meta.annotations.clone().unwrap_or_default();

        let injected = annotations
            .get(SIDECARSET_INJECTED_LIST_ANNOTATION)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone(),
            labels: meta.labels.clone().unwrap_or_default(),
            creation_timestamp: creation_time(meta),
            ready: is_pod_ready(pod) && sidecars_consistent(pod, sidecar_names),
            terminating: meta.deletion_timestamp.is_some(),
            injected,
            revisions: parse_revisions(&annotations, SIDECARSET_HASH_ANNOTATION),
            revisions_without_image: parse_revisions(
                &annotations,
                SIDECARSET_HASH_WITHOUT_IMAGE_ANNOTATION,
            ),
        }
    }

    pub fn revision(&self, sidecarset: &str) -> Option<&str> {
        self.revisions.get(sidecarset).map(String::as_str)
    }

    pub fn revision_without_image(&self, sidecarset: &str) -> Option<&str> {
        self.revisions_without_image
            .get(sidecarset)
            .map(String::as_str)
    }

    pub fn is_injected(&self, sidecarset: &str) -> bool {
        self.injected.iter().any(|name| name == sidecarset)
    }
}

/// Read the per-SidecarSet hashes out of a pod annotation
///
/// Malformed JSON yields no revisions: the pod is then treated as never
/// upgraded, which at worst re-applies the current revision.
pub(crate) fn parse_revisions(
    annotations: &BTreeMap<String, String>,
    key: &str,
) -> BTreeMap<String, String> {
    let Some(raw) = annotations.get(key) else {
        return BTreeMap::new();
    };
    match serde_json::from_str::<BTreeMap<String, PodSidecarRevision>>(raw) {
        Ok(records) => records
            .into_iter()
            .map(|(name, record)| (name, record.hash))
            .collect(),
        Err(e) => {
            debug!(annotation = key, error = %e, "Ignoring malformed revision annotation");
            BTreeMap::new()
        }
    }
}

// Go through serde so this does not depend on which time type k8s-openapi wraps
fn creation_time(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    let raw = serde_json::to_value(meta.creation_timestamp.as_ref()?).ok()?;
    DateTime::parse_from_rfc3339(raw.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Pod has condition Ready=True
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Every named sidecar is ready and running the image its spec asks for
fn sidecars_consistent(pod: &Pod, sidecar_names: &[String]) -> bool {
    let containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    sidecar_names.iter().all(|name| {
        let Some(container) = containers.iter().find(|c| &c.name == name) else {
            // Not injected into this pod, nothing to wait for
            return true;
        };
        let Some(status) = statuses.iter().find(|s| &s.name == name) else {
            return false;
        };
        status.ready
            && container
                .image
                .as_deref()
                .is_some_and(|image| images_equivalent(image, &status.image))
    })
}

/// Compare a spec image with the fully-qualified image the kubelet reports
///
/// `nginx`, `nginx:latest`, `docker.io/library/nginx:latest` are equivalent.
pub fn images_equivalent(spec_image: &str, status_image: &str) -> bool {
    normalize_image(spec_image) == normalize_image(status_image)
}

fn normalize_image(image: &str) -> String {
    let mut image = image
        .strip_prefix("docker.io/library/")
        .or_else(|| image.strip_prefix("docker.io/"))
        .unwrap_or(image)
        .to_string();
    if image.starts_with("library/") {
        image = image["library/".len()..].to_string();
    }
    let name = image.rsplit('/').next().unwrap_or(&image);
    if !name.contains(':') && !name.contains('@') {
        image.push_str(":latest");
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn pod_json(ready: &str, status_image: &str) -> Pod {
        serde_json::from_value(json!({
            "metadata": {
                "name": "pod-1",
                "namespace": "default",
                "labels": {"app": "sidecar"},
                "creationTimestamp": "2024-04-27T10:04:45Z",
                "annotations": {
                    "kulta.io/sidecarset-injected-list": "test-sidecarset, other",
                    "kulta.io/sidecarset-hash":
                        r#"{"test-sidecarset":{"hash":"aaa","sidecarList":["test-sidecar"]}}"#,
                    "kulta.io/sidecarset-hash-without-image":
                        r#"{"test-sidecarset":{"hash":"without-aaa","sidecarList":["test-sidecar"]}}"#
                }
            },
            "spec": {
                "containers": [
                    {"name": "nginx", "image": "nginx:1.15.1"},
                    {"name": "test-sidecar", "image": "test-image:v2"}
                ]
            },
            "status": {
                "phase": "Running",
                "conditions": [{"type": "Ready", "status": ready}],
                "containerStatuses": [
                    {"name": "nginx", "image": "nginx:1.15.1", "imageID": "", "ready": true,
                     "restartCount": 0},
                    {"name": "test-sidecar", "image": status_image, "imageID": "", "ready": true,
                     "restartCount": 0}
                ]
            }
        }))
        .expect("valid pod fixture")
    }

    #[test]
    fn test_from_pod_reads_metadata_and_revisions() {
        let pod = pod_json("True", "test-image:v2");
        let instance = Instance::from_pod(&pod, &["test-sidecar".to_string()]);

        assert_eq!(instance.name, "pod-1");
        assert_eq!(instance.namespace.as_deref(), Some("default"));
        assert_eq!(instance.labels.get("app").map(String::as_str), Some("sidecar"));
        assert_eq!(
            instance.creation_timestamp,
            Some(Utc.with_ymd_and_hms(2024, 4, 27, 10, 4, 45).unwrap())
        );
        assert!(instance.ready);
        assert!(!instance.terminating);
        assert!(instance.is_injected("test-sidecarset"));
        assert!(instance.is_injected("other"));
        assert_eq!(instance.revision("test-sidecarset"), Some("aaa"));
        assert_eq!(
            instance.revision_without_image("test-sidecarset"),
            Some("without-aaa")
        );
        assert_eq!(instance.revision("other"), None);
    }

    #[test]
    fn test_from_pod_not_ready_condition() {
        let pod = pod_json("False", "test-image:v2");
        let instance = Instance::from_pod(&pod, &["test-sidecar".to_string()]);
        assert!(!instance.ready);
    }

    #[test]
    fn test_from_pod_sidecar_image_not_yet_swapped_is_not_ready() {
        let pod = pod_json("True", "test-image:v1");
        let instance = Instance::from_pod(&pod, &["test-sidecar".to_string()]);
        assert!(!instance.ready);

        // Pod readiness alone ignores the sidecar
        assert!(is_pod_ready(&pod));
    }

    #[test]
    fn test_malformed_revision_annotation_is_ignored() {
        let annotations: BTreeMap<String, String> = [(
            SIDECARSET_HASH_ANNOTATION.to_string(),
            "not-json".to_string(),
        )]
        .into_iter()
        .collect();

        assert!(parse_revisions(&annotations, SIDECARSET_HASH_ANNOTATION).is_empty());
    }

    #[test]
    fn test_images_equivalent() {
        assert!(images_equivalent("nginx", "docker.io/library/nginx:latest"));
        assert!(images_equivalent("nginx:1.25", "docker.io/library/nginx:1.25"));
        assert!(images_equivalent("team/app:v1", "docker.io/team/app:v1"));
        assert!(images_equivalent(
            "registry:5000/app:v1",
            "registry:5000/app:v1"
        ));
        assert!(!images_equivalent("nginx:1.25", "nginx:1.26"));
        assert!(!images_equivalent("registry:5000/app", "registry:5000/app:v1"));
    }
}
