//! services/api/src/adapters/geocode.rs
//!
//! This module contains the adapter for the Nominatim geocoding service.
//! It implements the `Geocoder` port from the `core` crate.

use async_trait::async_trait;
use eco_report_core::{
    domain::Coordinates,
    ports::{Geocoder, PortError, PortResult},
};
use serde::Deserialize;
use std::time::Duration;

/// Nominatim asks API users to identify themselves.
const USER_AGENT: &str = concat!("eco-report/", env!("CARGO_PKG_VERSION"));

//=========================================================================================
// Wire Response Structs
//=========================================================================================

#[derive(Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
}

#[derive(Deserialize)]
struct ReverseResult {
    display_name: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `Geocoder` port against the Nominatim API.
///
/// Both directions take only the first result; a no-match answer is `Ok(None)`
/// so callers can degrade without treating it as a failure.
#[derive(Clone)]
pub struct NominatimAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimAdapter {
    /// Creates a new `NominatimAdapter` with an operation-level timeout on
    /// every request.
    pub fn new(base_url: String, timeout: Duration) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

//=========================================================================================
// `Geocoder` Trait Implementation
//=========================================================================================

#[async_trait]
impl Geocoder for NominatimAdapter {
    /// Resolves a free-text address to the first matching coordinate pair.
    async fn forward(&self, address: &str) -> PortResult<Option<Coordinates>> {
        let url = format!("{}/search", self.base_url);
        let results: Vec<SearchResult> = self
            .client
            .get(url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let Some(first) = results.into_iter().next() else {
            return Ok(None);
        };

        // Nominatim serializes coordinates as strings.
        match (first.lat.parse::<f64>(), first.lon.parse::<f64>()) {
            (Ok(latitude), Ok(longitude)) => Ok(Some(Coordinates {
                latitude,
                longitude,
            })),
            _ => Err(PortError::Unexpected(format!(
                "unparseable coordinates in geocode result: {}/{}",
                first.lat, first.lon
            ))),
        }
    }

    /// Resolves a coordinate pair to its display name, if any.
    async fn reverse(&self, latitude: f64, longitude: f64) -> PortResult<Option<String>> {
        let url = format!("{}/reverse", self.base_url);
        let result: ReverseResult = self
            .client
            .get(url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(result.display_name.filter(|name| !name.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_result_decodes_string_coordinates() {
        let body = r#"[{"lat": "-25.4284", "lon": "-49.2733", "display_name": "Curitiba"}]"#;
        let results: Vec<SearchResult> = serde_json::from_str(body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lat.parse::<f64>().unwrap(), -25.4284);
        assert_eq!(results[0].lon.parse::<f64>().unwrap(), -49.2733);
    }

    #[test]
    fn empty_search_response_decodes_to_no_results() {
        let results: Vec<SearchResult> = serde_json::from_str("[]").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn reverse_result_reads_display_name() {
        let body = r#"{"display_name": "Rua XV de Novembro, Curitiba, Brasil"}"#;
        let result: ReverseResult = serde_json::from_str(body).unwrap();
        assert_eq!(
            result.display_name.as_deref(),
            Some("Rua XV de Novembro, Curitiba, Brasil")
        );

        let missing: ReverseResult = serde_json::from_str("{}").unwrap();
        assert!(missing.display_name.is_none());
    }
}
