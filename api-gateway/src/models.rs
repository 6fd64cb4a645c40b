// ==============================================================================
// models.rs - API Data Models
// ==============================================================================
// Description: Request/response models for the cluster assignment API
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sketch submission body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub project_hash: String,

    /// Sketches keyed by content hash, in client order
    pub sketches: Map<String, Value>,

    /// Original filenames keyed by content hash
    #[serde(default)]
    pub names: BTreeMap<String, String>,
}

/// Envelope shared by every project endpoint
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    pub errors: Vec<String>,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failure,
}

impl ApiResponse {
    pub fn success(data: impl Serialize) -> Self {
        Self {
            status: ResponseStatus::Success,
            errors: Vec::new(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failure,
            errors: vec![error.into()],
            data: Value::Array(Vec::new()),
        }
    }
}

/// API information response
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub redis: bool,
    pub storage: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_keeps_sketch_order() {
        let body = r#"{
            "projectHash": "p1",
            "sketches": {"zz": {"14": ["0x1"]}, "aa": {"14": ["0x2"]}}
        }"#;
        let request: SubmitRequest = serde_json::from_str(body).unwrap();

        let hashes: Vec<&String> = request.sketches.keys().collect();
        assert_eq!(hashes, vec!["zz", "aa"]);
        assert!(request.names.is_empty());
    }

    #[test]
    fn test_failure_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::failure("Unknown project hash")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "failure", "errors": ["Unknown project hash"], "data": []})
        );
    }
}
