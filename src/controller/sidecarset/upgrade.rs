use super::hash::TemplateHash;
use crate::crd::sidecarset::{
    PodSidecarRevision, SidecarSet, SIDECARSET_HASH_ANNOTATION,
    SIDECARSET_HASH_WITHOUT_IMAGE_ANNOTATION,
};
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Strategic-merge patch that moves a pod onto the SidecarSet's revision
///
/// Swaps the image of every sidecar container present in the pod (the
/// kubelet restarts only those containers) and records the new full and
/// without-image hashes for this SidecarSet in the pod's revision
/// annotations. Records for other SidecarSets are preserved.
pub fn build_upgrade_patch(
    sidecarset: &SidecarSet,
    hashes: &TemplateHash,
    pod: &Pod,
    now: DateTime<Utc>,
) -> Result<Value, serde_json::Error> {
    let pod_containers: Vec<&str> = pod
        .spec
        .as_ref()
        .map(|s| s.containers.iter().map(|c| c.name.as_str()).collect())
        .unwrap_or_default();

    let mut containers = Vec::new();
    let mut sidecar_list = Vec::new();
    for sidecar in &sidecarset.spec.containers {
        let container = &sidecar.container;
        if !pod_containers.contains(&container.name.as_str()) {
            continue;
        }
        sidecar_list.push(container.name.clone());
        if let Some(image) = &container.image {
            containers.push(json!({"name": container.name, "image": image}));
        }
    }

    let name = sidecarset.name_any();
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut annotations = Map::new();
    for (key, hash) in [
        (SIDECARSET_HASH_ANNOTATION, &hashes.full),
        (SIDECARSET_HASH_WITHOUT_IMAGE_ANNOTATION, &hashes.without_image),
    ] {
        let mut records = revision_records(pod, key);
        records.insert(
            name.clone(),
            PodSidecarRevision {
                hash: hash.clone(),
                update_timestamp: Some(timestamp.clone()),
                sidecar_list: sidecar_list.clone(),
            },
        );
        annotations.insert(key.to_string(), Value::String(serde_json::to_string(&records)?));
    }

    Ok(json!({
        "metadata": {"annotations": annotations},
        "spec": {"containers": containers},
    }))
}

// Malformed records are dropped; the rewrite then repairs the annotation
fn revision_records(pod: &Pod, key: &str) -> BTreeMap<String, PodSidecarRevision> {
    pod.annotations()
        .get(key)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}
