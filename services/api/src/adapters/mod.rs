pub mod artifacts;
pub mod db;
pub mod geocode;
pub mod media;
pub mod report_llm;
pub mod submission;
pub mod vision;

pub use artifacts::LocalArtifactStore;
pub use db::DbAdapter;
pub use geocode::NominatimAdapter;
pub use media::HttpMediaFetcher;
pub use report_llm::OpenAiReportAdapter;
pub use submission::HttpSubmissionSink;
pub use vision::OpenAiVisionAdapter;
