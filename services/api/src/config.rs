//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Allow-listed sender addresses for the closed pilot. Overridable with the
/// `ALLOWED_SENDERS` environment variable (comma-separated).
const DEFAULT_ALLOWED_SENDERS: &[&str] = &[
    "554197309009@c.us",
    "554184611703@c.us",
    "554197399754@c.us",
];

/// The bind address is often a wildcard like 0.0.0.0, which is a listen
/// address, not one a client can connect to; loopback reaches our own
/// listener on any bind.
fn default_submission_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/images", port)
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub vision_model: String,
    pub report_model: String,
    pub allowed_senders: Vec<String>,
    pub uploads_dir: PathBuf,
    pub geocoder_base_url: String,
    pub submission_url: String,
    pub external_call_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let vision_model =
            std::env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        let report_model =
            std::env::var("REPORT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let allowed_senders = match std::env::var("ALLOWED_SENDERS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => DEFAULT_ALLOWED_SENDERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        let uploads_dir = std::env::var("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));

        let geocoder_base_url = std::env::var("GEOCODER_BASE_URL")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string());

        // The persistence collaborator the finished submissions are POSTed to.
        // Defaults to this service's own images endpoint.
        let submission_url = std::env::var("SUBMISSION_URL")
            .unwrap_or_else(|_| default_submission_url(bind_address.port()));

        let timeout_secs = match std::env::var("EXTERNAL_CALL_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "EXTERNAL_CALL_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a number of seconds", raw),
                )
            })?,
            Err(_) => 30,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            vision_model,
            report_model,
            allowed_senders,
            uploads_dir,
            geocoder_base_url,
            submission_url,
            external_call_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_submission_url_targets_loopback_not_the_bind_address() {
        assert_eq!(
            default_submission_url(3000),
            "http://127.0.0.1:3000/images"
        );
    }
}
