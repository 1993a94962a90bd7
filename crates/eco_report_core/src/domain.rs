//! crates/eco_report_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

//=========================================================================================
// Conversational Intake Types
//=========================================================================================

/// A latitude/longitude pair as delivered by the messaging gateway or
/// resolved by the geocoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The kind of an inbound message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Location,
}

/// One inbound message event from the messaging gateway.
///
/// `media_ref` is an opaque handle (a URL in practice) that the media-fetch
/// port resolves to raw bytes when the message carries an image.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_id: String,
    pub is_group: bool,
    pub kind: MessageKind,
    pub body: Option<String>,
    pub media_ref: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// An image that passed classification, together with where its bytes were
/// parked in the artifact store and the description the classifier produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub data: Vec<u8>,
    pub stored_at: PathBuf,
    pub description: String,
}

/// The session's position in the intake protocol.
///
/// Each variant carries exactly the data that is valid at that stage, so a
/// stored description can only exist once an image has been accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Intro,
    AwaitingImage,
    AwaitingConfirmation { capture: CapturedImage },
    AwaitingLocation { capture: CapturedImage },
    Done,
}

impl Stage {
    /// A short stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Intro => "intro",
            Stage::AwaitingImage => "awaiting_image",
            Stage::AwaitingConfirmation { .. } => "awaiting_confirmation",
            Stage::AwaitingLocation { .. } => "awaiting_location",
            Stage::Done => "done",
        }
    }
}

/// Per-sender conversation state, keyed by the sender address.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub sender_id: String,
    pub stage: Stage,
}

impl Session {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            stage: Stage::Intro,
        }
    }
}

//=========================================================================================
// Classification Types
//=========================================================================================

/// Sentinel the vision model emits when the image looks generated or unreal.
pub const FAKE_MARKER: &str = "<fake>";
/// Sentinel the vision model emits when no waste is visible.
pub const NOT_FOUND_MARKER: &str = "<not-found>";

/// Why an image was rejected by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotReal,
    NoWasteFound,
}

/// The outcome of classifying one image.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationResult {
    Accepted(String),
    Rejected(RejectReason),
}

impl ClassificationResult {
    /// Interprets the raw model text: the fixed sentinel markers signal a
    /// rejection, any other non-empty text is an accepted description.
    /// Callers must treat empty text as a failed call, not pass it here.
    pub fn from_model_text(text: &str) -> Self {
        if text.contains(FAKE_MARKER) {
            ClassificationResult::Rejected(RejectReason::NotReal)
        } else if text.contains(NOT_FOUND_MARKER) {
            ClassificationResult::Rejected(RejectReason::NoWasteFound)
        } else {
            ClassificationResult::Accepted(text.trim().to_string())
        }
    }
}

//=========================================================================================
// Submission Types
//=========================================================================================

/// A location as captured from the user: coordinates, a free-text address,
/// or both. The dispatcher fills the missing half best-effort at submission
/// time; a half it cannot resolve simply stays `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationRecord {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

impl LocationRecord {
    pub fn from_coordinates(coordinates: Coordinates) -> Self {
        Self {
            latitude: Some(coordinates.latitude),
            longitude: Some(coordinates.longitude),
            address: None,
        }
    }

    pub fn from_address(address: impl Into<String>) -> Self {
        Self {
            latitude: None,
            longitude: None,
            address: Some(address.into()),
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn has_address(&self) -> bool {
        self.address.as_deref().map_or(false, |a| !a.trim().is_empty())
    }
}

/// The completed unit handed to the persistence collaborator.
///
/// `classification` and `confidence` are placeholders filled later by the
/// administrative review flow, not by the intake pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPayload {
    pub sender_id: String,
    pub image_data: Vec<u8>,
    pub location: LocationRecord,
    pub description: String,
    pub classification: String,
    pub confidence: String,
}

//=========================================================================================
// Persisted Record Types (REST CRUD surface)
//=========================================================================================

/// A stored waste capture, as created by the bot's submission or the REST API.
#[derive(Debug, Clone)]
pub struct WasteImage {
    pub id: Uuid,
    pub phone: String,
    pub image_base64: String,
    pub endereco: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub classification: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a new waste capture.
#[derive(Debug, Clone, Default)]
pub struct NewWasteImage {
    pub phone: String,
    pub image_base64: String,
    pub endereco: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub classification: Option<String>,
}

/// Partial update for a stored waste capture. `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct WasteImageUpdate {
    pub endereco: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub classification: Option<String>,
}

/// A registered user of the reporting programme.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub nome: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters a narrative report is generated from.
#[derive(Debug, Clone, Default)]
pub struct ReportStats {
    pub total_denuncias: i32,
    pub ia_approved: i32,
    pub bairros_criticos: Vec<String>,
    pub locais_reincidentes: Vec<String>,
    pub engajamento_colaborativo: i32,
    pub alunos_engajados: i32,
    pub parcerias_ativas: i32,
}

/// Prose produced by the report writer from a `ReportStats`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReport {
    pub description: String,
    pub acoes_recomendadas: String,
}

/// A stored narrative report for public officials.
#[derive(Debug, Clone)]
pub struct Report {
    pub id: Uuid,
    pub description: Option<String>,
    pub acoes_recomendadas: Option<String>,
    pub total_denuncias: i32,
    pub ia_approved: i32,
    pub bairros_criticos: Vec<String>,
    pub locais_reincidentes: Vec<String>,
    pub engajamento_colaborativo: i32,
    pub alunos_engajados: i32,
    pub parcerias_ativas: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_marker_is_rejected_as_not_real() {
        let result = ClassificationResult::from_model_text("<fake>");
        assert_eq!(
            result,
            ClassificationResult::Rejected(RejectReason::NotReal)
        );
    }

    #[test]
    fn not_found_marker_is_rejected_as_no_waste() {
        let result = ClassificationResult::from_model_text("  <not-found>  ");
        assert_eq!(
            result,
            ClassificationResult::Rejected(RejectReason::NoWasteFound)
        );
    }

    #[test]
    fn marker_embedded_in_surrounding_text_still_rejects() {
        let result = ClassificationResult::from_model_text("resposta: <fake>.");
        assert_eq!(
            result,
            ClassificationResult::Rejected(RejectReason::NotReal)
        );
    }

    #[test]
    fn free_text_is_accepted_and_trimmed() {
        let result =
            ClassificationResult::from_model_text("  garrafas plásticas na rua  ");
        assert_eq!(
            result,
            ClassificationResult::Accepted("garrafas plásticas na rua".to_string())
        );
    }

    #[test]
    fn location_record_halves() {
        let coords = LocationRecord::from_coordinates(Coordinates {
            latitude: -25.4,
            longitude: -49.2,
        });
        assert!(coords.has_coordinates());
        assert!(!coords.has_address());

        let addr = LocationRecord::from_address("Rua XV de Novembro, Curitiba");
        assert!(!addr.has_coordinates());
        assert!(addr.has_address());

        let blank = LocationRecord::from_address("   ");
        assert!(!blank.has_address());
    }

    #[test]
    fn new_session_starts_at_intro() {
        let session = Session::new("554197309009@c.us");
        assert_eq!(session.stage, Stage::Intro);
        assert_eq!(session.stage.name(), "intro");
    }
}
