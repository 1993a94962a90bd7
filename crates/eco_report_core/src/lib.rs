pub mod domain;
pub mod ports;

pub use domain::{
    CapturedImage, ClassificationResult, Coordinates, GeneratedReport, InboundMessage,
    LocationRecord, MessageKind, NewWasteImage, RejectReason, Report, ReportStats, Session,
    Stage, SubmissionPayload, User, WasteImage, WasteImageUpdate,
};
pub use ports::{
    ArtifactStore, DatabaseService, Geocoder, ImageClassifier, MediaFetcher, PortError,
    PortResult, ReportWriter, SubmissionSink,
};
