//! services/api/src/adapters/submission.rs
//!
//! This module contains the adapter that delivers finished submissions to the
//! persistence collaborator. It implements the `SubmissionSink` port from the
//! `core` crate.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use eco_report_core::{
    domain::SubmissionPayload,
    ports::{PortError, PortResult, SubmissionSink},
};
use serde::Serialize;
use std::time::Duration;

//=========================================================================================
// Wire Payload
//=========================================================================================

/// The POST body the persistence collaborator expects. The image travels as
/// base64; `classification` and `confidence` are placeholders for the later
/// administrative review.
#[derive(Serialize)]
struct WireSubmission<'a> {
    #[serde(rename = "senderId")]
    sender_id: &'a str,
    #[serde(rename = "imageData")]
    image_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endereco: Option<&'a str>,
    description: &'a str,
    classification: &'a str,
    confidence: &'a str,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that POSTs submissions to the configured persistence endpoint.
/// Delivery is fire-and-forget from the intake engine's point of view; the
/// engine logs an `Err` and moves on.
#[derive(Clone)]
pub struct HttpSubmissionSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSubmissionSink {
    /// Creates a new `HttpSubmissionSink` with a per-request timeout.
    pub fn new(endpoint: String, timeout: Duration) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SubmissionSink for HttpSubmissionSink {
    async fn dispatch(&self, payload: &SubmissionPayload) -> PortResult<()> {
        let wire = WireSubmission {
            sender_id: &payload.sender_id,
            image_data: BASE64.encode(&payload.image_data),
            latitude: payload.location.latitude,
            longitude: payload.location.longitude,
            endereco: payload.location.address.as_deref(),
            description: &payload.description,
            classification: &payload.classification,
            confidence: &payload.confidence,
        };

        self.client
            .post(&self.endpoint)
            .json(&wire)
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eco_report_core::domain::LocationRecord;

    #[test]
    fn wire_shape_matches_the_collaborator_contract() {
        let payload = SubmissionPayload {
            sender_id: "554197309009@c.us".to_string(),
            image_data: vec![1, 2, 3],
            location: LocationRecord {
                latitude: Some(-25.4),
                longitude: Some(-49.2),
                address: None,
            },
            description: "garrafas plásticas na rua".to_string(),
            classification: String::new(),
            confidence: String::new(),
        };

        let wire = WireSubmission {
            sender_id: &payload.sender_id,
            image_data: BASE64.encode(&payload.image_data),
            latitude: payload.location.latitude,
            longitude: payload.location.longitude,
            endereco: payload.location.address.as_deref(),
            description: &payload.description,
            classification: &payload.classification,
            confidence: &payload.confidence,
        };

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["senderId"], "554197309009@c.us");
        assert_eq!(json["imageData"], BASE64.encode([1u8, 2, 3]));
        assert_eq!(json["latitude"], -25.4);
        assert_eq!(json["longitude"], -49.2);
        assert!(json.get("endereco").is_none());
        assert_eq!(json["description"], "garrafas plásticas na rua");
        assert_eq!(json["classification"], "");
    }
}
