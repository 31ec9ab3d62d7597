use crate::crd::sidecarset::{
    SidecarContainer, SidecarSet, SIDECARSET_HASH_ANNOTATION,
    SIDECARSET_HASH_WITHOUT_IMAGE_ANNOTATION,
};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Failed to serialize sidecar template: {0}")]
    SerializationError(String),
}

/// Full and image-insensitive hashes of one sidecar template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateHash {
    pub full: String,
    pub without_image: String,
}

impl TemplateHash {
    /// Hash pair for a SidecarSet's containers
    pub fn of(sidecarset: &SidecarSet) -> Result<Self, HashError> {
        Ok(Self {
            full: compute_sidecarset_hash(&sidecarset.spec.containers)?,
            without_image: compute_sidecarset_hash_without_image(&sidecarset.spec.containers)?,
        })
    }

    /// Hash pair recorded on the SidecarSet by the admission webhook,
    /// recomputed from the spec when either annotation is missing.
    pub fn for_sidecarset(sidecarset: &SidecarSet) -> Result<Self, HashError> {
        let annotations = sidecarset.metadata.annotations.as_ref();
        let recorded = |key: &str| annotations.and_then(|a| a.get(key)).cloned();

        match (
            recorded(SIDECARSET_HASH_ANNOTATION),
            recorded(SIDECARSET_HASH_WITHOUT_IMAGE_ANNOTATION),
        ) {
            (Some(full), Some(without_image)) => Ok(Self {
                full,
                without_image,
            }),
            _ => Self::of(sidecarset),
        }
    }
}

/// Compute a stable 16-character hash of the sidecar containers
///
/// The containers are serialized to JSON, re-encoded with sorted object keys
/// and hashed with FNV-1a, so the digest depends only on content and is
/// stable across processes and re-serialization.
///
/// # Errors
/// Returns SerializationError if the containers cannot be serialized to JSON
pub fn compute_sidecarset_hash(containers: &[SidecarContainer]) -> Result<String, HashError> {
    let value = serde_json::to_value(containers)
        .map_err(|e| HashError::SerializationError(e.to_string()))?;

    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;

    Ok(fnv1a_hex(canonical.as_bytes()))
}

/// Same as [`compute_sidecarset_hash`] with every container image cleared,
/// so image-only changes leave the digest untouched.
pub fn compute_sidecarset_hash_without_image(
    containers: &[SidecarContainer],
) -> Result<String, HashError> {
    let mut stripped = containers.to_vec();
    for sidecar in &mut stripped {
        sidecar.container.image = None;
    }
    compute_sidecarset_hash(&stripped)
}

/// Write the hash pair into the SidecarSet's annotations
pub fn set_hash_annotations(sidecarset: &mut SidecarSet) -> Result<TemplateHash, HashError> {
    let hashes = TemplateHash::of(sidecarset)?;
    let annotations = sidecarset.metadata.annotations.get_or_insert_with(Default::default);
    annotations.insert(SIDECARSET_HASH_ANNOTATION.to_string(), hashes.full.clone());
    annotations.insert(
        SIDECARSET_HASH_WITHOUT_IMAGE_ANNOTATION.to_string(),
        hashes.without_image.clone(),
    );
    Ok(hashes)
}

/// Compact JSON with object keys in sorted order, independent of how the
/// `serde_json::Map` behind `value` orders its entries.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), HashError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode(&Value::String(key.clone()))?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&encode(scalar)?),
    }
    Ok(())
}

fn encode(value: &Value) -> Result<String, HashError> {
    serde_json::to_string(value).map_err(|e| HashError::SerializationError(e.to_string()))
}

// FNV-1a (deterministic across processes, unlike DefaultHasher/SipHash)
fn fnv1a_hex(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}
