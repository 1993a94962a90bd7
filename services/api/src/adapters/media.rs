//! services/api/src/adapters/media.rs
//!
//! This module contains the adapter that resolves gateway media handles.
//! It implements the `MediaFetcher` port from the `core` crate.

use async_trait::async_trait;
use eco_report_core::ports::{MediaFetcher, PortError, PortResult};
use std::time::Duration;

/// An adapter that downloads media payloads from the URLs the messaging
/// gateway hands out.
#[derive(Clone)]
pub struct HttpMediaFetcher {
    client: reqwest::Client,
}

impl HttpMediaFetcher {
    /// Creates a new `HttpMediaFetcher` with a per-request timeout.
    pub fn new(timeout: Duration) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, media_ref: &str) -> PortResult<Vec<u8>> {
        let bytes = self
            .client
            .get(media_ref)
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        if bytes.is_empty() {
            return Err(PortError::Unavailable(format!(
                "media download for {} returned an empty body",
                media_ref
            )));
        }

        Ok(bytes.to_vec())
    }
}
