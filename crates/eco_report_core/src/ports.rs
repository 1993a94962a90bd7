//! crates/eco_report_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::{
    ClassificationResult, Coordinates, GeneratedReport, NewWasteImage, Report, ReportStats,
    SubmissionPayload, User, WasteImage, WasteImageUpdate,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The external service answered but produced nothing usable, or did not
    /// answer within the operation timeout.
    #[error("External service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Classifies an image with the external vision service.
///
/// Exactly one request per call, no caching and no retry; an empty model
/// response is `PortError::Unavailable` so the caller can reprompt.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> PortResult<ClassificationResult>;
}

/// Forward and reverse geocoding against the external geocoding collaborator.
/// Both operations are best-effort: `Ok(None)` on no match, `Err` on
/// transport failure, and callers degrade on either.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward(&self, address: &str) -> PortResult<Option<Coordinates>>;
    async fn reverse(&self, latitude: f64, longitude: f64) -> PortResult<Option<String>>;
}

/// Resolves a gateway media handle to the raw image bytes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, media_ref: &str) -> PortResult<Vec<u8>>;
}

/// Durable temporary storage for inbound image payloads.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persists `data` under `file_name` and returns the stored path.
    async fn save(&self, file_name: &str, data: &[u8]) -> PortResult<PathBuf>;
    /// Removes a previously saved artifact, best-effort.
    async fn delete(&self, path: &Path) -> PortResult<()>;
}

/// Delivers a completed submission to the persistence collaborator.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn dispatch(&self, payload: &SubmissionPayload) -> PortResult<()>;
}

/// Turns aggregate report counters into a narrative summary for officials.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn generate(&self, stats: &ReportStats) -> PortResult<GeneratedReport>;
}

/// Record CRUD for users, waste captures and narrative reports.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Waste captures ---
    async fn create_image(&self, new_image: NewWasteImage) -> PortResult<WasteImage>;
    async fn list_images(&self) -> PortResult<Vec<WasteImage>>;
    async fn get_image(&self, id: Uuid) -> PortResult<WasteImage>;
    async fn update_image(&self, id: Uuid, update: WasteImageUpdate) -> PortResult<WasteImage>;
    async fn delete_image(&self, id: Uuid) -> PortResult<()>;

    // --- Users ---
    async fn create_user(&self, nome: &str, email: &str) -> PortResult<User>;
    async fn update_user(&self, id: Uuid, nome: &str, email: &str) -> PortResult<User>;
    async fn delete_user(&self, id: Uuid) -> PortResult<()>;

    // --- Narrative reports ---
    async fn create_report(
        &self,
        stats: &ReportStats,
        generated: &GeneratedReport,
        image_ids: &[Uuid],
    ) -> PortResult<Report>;
    async fn list_reports(&self) -> PortResult<Vec<Report>>;
    async fn get_report(&self, id: Uuid) -> PortResult<Report>;
    async fn get_report_images(&self, report_id: Uuid) -> PortResult<Vec<WasteImage>>;
    async fn update_report(
        &self,
        id: Uuid,
        description: Option<String>,
        acoes_recomendadas: Option<String>,
    ) -> PortResult<Report>;
    async fn delete_report(&self, id: Uuid) -> PortResult<()>;
}
