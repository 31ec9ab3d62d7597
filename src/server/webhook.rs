//! Admission webhooks for SidecarSet resources
//!
//! ## Endpoints
//! - POST /mutate - fills defaults and records the template hash annotations
//! - POST /validate - rejects SidecarSets the controller cannot roll out
//!
//! Both speak `admission.k8s.io/v1` AdmissionReview.

use axum::{http::StatusCode, response::IntoResponse, Json};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::controller::sidecarset::{set_hash_annotations, validate_sidecarset};
use crate::crd::defaults::set_defaults_sidecarset;
use crate::crd::sidecarset::SidecarSet;

const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";

/// Kubernetes AdmissionReview request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    pub api_version: String,
    pub kind: String,
    pub request: AdmissionRequest,
}

/// The admission request from Kubernetes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    /// CREATE, UPDATE, DELETE or CONNECT
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub object: Option<Value>,
    #[serde(default)]
    pub old_object: Option<Value>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AdmissionStatus {
    pub code: u16,
    pub message: String,
}

/// Response for an admission request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
    /// Base64-encoded JSONPatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

impl AdmissionResponse {
    fn allow(uid: String) -> Self {
        Self {
            uid,
            allowed: true,
            status: None,
            patch_type: None,
            patch: None,
        }
    }

    fn deny(uid: String, code: u16, message: String) -> Self {
        Self {
            uid,
            allowed: false,
            status: Some(AdmissionStatus { code, message }),
            patch_type: None,
            patch: None,
        }
    }
}

/// Full AdmissionReview response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: AdmissionResponse,
}

impl AdmissionReviewResponse {
    fn new(response: AdmissionResponse) -> Self {
        Self {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: "AdmissionReview".to_string(),
            response,
        }
    }
}

fn decode(value: Option<&Value>) -> Result<SidecarSet, String> {
    let value = value.ok_or_else(|| "request has no object".to_string())?;
    serde_json::from_value(value.clone()).map_err(|e| format!("invalid SidecarSet: {}", e))
}

fn is_write(operation: &str) -> bool {
    matches!(operation, "CREATE" | "UPDATE")
}

/// Default a SidecarSet and stamp its template hashes
///
/// Returns a JSONPatch replacing `/spec` and `/metadata/annotations` when
/// anything changed, or a plain allow when the object was already complete.
pub fn mutate_sidecarset(request: AdmissionRequest) -> AdmissionResponse {
    if !is_write(&request.operation) {
        return AdmissionResponse::allow(request.uid);
    }

    let mut sidecarset = match decode(request.object.as_ref()) {
        Ok(ss) => ss,
        Err(e) => return AdmissionResponse::deny(request.uid, 400, e),
    };
    let old = if request.operation == "UPDATE" {
        match request.old_object.as_ref().map(|o| decode(Some(o))).transpose() {
            Ok(old) => old,
            Err(e) => return AdmissionResponse::deny(request.uid, 400, e),
        }
    } else {
        None
    };

    let before = serde_json::to_value(&sidecarset).ok();

    set_defaults_sidecarset(&mut sidecarset, old.as_ref());
    if let Err(e) = set_hash_annotations(&mut sidecarset) {
        return AdmissionResponse::deny(request.uid, 500, e.to_string());
    }

    let after = match serde_json::to_value(&sidecarset) {
        Ok(v) => v,
        Err(e) => return AdmissionResponse::deny(request.uid, 500, e.to_string()),
    };
    if before.as_ref() == Some(&after) {
        return AdmissionResponse::allow(request.uid);
    }

    let patch = json!([
        {"op": "add", "path": "/spec", "value": after["spec"]},
        {"op": "add", "path": "/metadata/annotations", "value": after["metadata"]["annotations"]},
    ]);
    debug!(uid = %request.uid, patch = %patch, "SidecarSet after mutating");

    AdmissionResponse {
        patch_type: Some("JSONPatch".to_string()),
        patch: Some(STANDARD.encode(patch.to_string())),
        ..AdmissionResponse::allow(request.uid)
    }
}

/// Admit or reject a SidecarSet write
pub fn validate_request(request: AdmissionRequest) -> AdmissionResponse {
    if !is_write(&request.operation) {
        return AdmissionResponse::allow(request.uid);
    }

    let sidecarset = match decode(request.object.as_ref()) {
        Ok(ss) => ss,
        Err(e) => return AdmissionResponse::deny(request.uid, 400, e),
    };

    match validate_sidecarset(&sidecarset) {
        Ok(()) => AdmissionResponse::allow(request.uid),
        Err(e) => AdmissionResponse::deny(request.uid, 403, e),
    }
}

/// Axum handler for the /mutate endpoint
pub async fn handle_mutate(Json(review): Json<AdmissionReview>) -> impl IntoResponse {
    info!(
        uid = %review.request.uid,
        operation = %review.request.operation,
        "Processing SidecarSet mutation"
    );

    let response = mutate_sidecarset(review.request);
    if let Some(status) = &response.status {
        warn!(uid = %response.uid, error = %status.message, "SidecarSet mutation failed");
    }

    (StatusCode::OK, Json(AdmissionReviewResponse::new(response)))
}

/// Axum handler for the /validate endpoint
pub async fn handle_validate(Json(review): Json<AdmissionReview>) -> impl IntoResponse {
    let response = validate_request(review.request);

    if response.allowed {
        info!(uid = %response.uid, "SidecarSet admitted");
    } else {
        warn!(
            uid = %response.uid,
            reason = ?response.status.as_ref().map(|s| &s.message),
            "SidecarSet rejected"
        );
    }

    (StatusCode::OK, Json(AdmissionReviewResponse::new(response)))
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;
