//! services/api/src/bot/engine.rs
//!
//! The conversational intake engine: consumes one inbound gateway event and
//! the sender's current session, decides the next stage and the reply, and
//! coordinates the external collaborators (media fetch, classification,
//! artifact storage, geocoding, submission delivery).

use crate::bot::{messages, sessions::SessionMap};
use chrono::Utc;
use eco_report_core::domain::{
    CapturedImage, ClassificationResult, InboundMessage, LocationRecord, MessageKind,
    RejectReason, Session, Stage, SubmissionPayload,
};
use eco_report_core::ports::{
    ArtifactStore, Geocoder, ImageClassifier, MediaFetcher, PortError, PortResult,
    SubmissionSink,
};
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Case-insensitive tokens of the yes/no gate. This is a deliberately narrow
/// two-token classifier, not a parser.
const AFFIRMATIVE_TOKEN: &str = "sim";
const NEGATIVE_TOKEN: &str = "não";

//=========================================================================================
// The Engine
//=========================================================================================

/// Drives the per-sender intake state machine.
///
/// All externals are injected as ports so the transition logic can be tested
/// without any network. Each external call is bounded by `call_timeout`; a
/// timeout behaves like the corresponding failure branch.
pub struct IntakeEngine {
    allowed_senders: HashSet<String>,
    sessions: SessionMap,
    classifier: Arc<dyn ImageClassifier>,
    geocoder: Arc<dyn Geocoder>,
    media: Arc<dyn MediaFetcher>,
    artifacts: Arc<dyn ArtifactStore>,
    submissions: Arc<dyn SubmissionSink>,
    call_timeout: Duration,
}

impl IntakeEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        allowed_senders: impl IntoIterator<Item = String>,
        classifier: Arc<dyn ImageClassifier>,
        geocoder: Arc<dyn Geocoder>,
        media: Arc<dyn MediaFetcher>,
        artifacts: Arc<dyn ArtifactStore>,
        submissions: Arc<dyn SubmissionSink>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            allowed_senders: allowed_senders.into_iter().collect(),
            sessions: SessionMap::new(),
            classifier,
            geocoder,
            media,
            artifacts,
            submissions,
            call_timeout,
        }
    }

    /// The session store, exposed for the web layer and tests.
    pub fn sessions(&self) -> &SessionMap {
        &self.sessions
    }

    /// Handles one inbound gateway event end to end.
    ///
    /// Returns the reply to send back to the sender, or `None` when the event
    /// is dropped by the access filter (no session is created, no reply is
    /// sent). The per-sender session slot stays locked for the whole cycle,
    /// which serializes same-sender messages in arrival order.
    pub async fn handle_message(&self, msg: InboundMessage) -> Option<String> {
        if !self.admit(&msg) {
            debug!(sender = %msg.sender_id, group = msg.is_group, "message dropped by access filter");
            return None;
        }

        let slot = self.sessions.entry(&msg.sender_id).await;
        let mut session = slot.lock().await;
        let reply = self.step(&mut session, &msg).await;
        debug!(sender = %msg.sender_id, stage = session.stage.name(), "session advanced");
        Some(reply)
    }

    /// Coarse fail-closed gate for the closed pilot: not a group chat, and
    /// the sender is on the allow-list.
    fn admit(&self, msg: &InboundMessage) -> bool {
        !msg.is_group && self.allowed_senders.contains(&msg.sender_id)
    }

    async fn step(&self, session: &mut Session, msg: &InboundMessage) -> String {
        // The transition is computed on a copy and only written back once the
        // whole step has run. This future can be dropped at any await (the
        // gateway hangs up, the webhook request is aborted); the session must
        // then still read as its prior stage, never a half-finished one.
        let mut stage = session.stage.clone();

        // A fresh photo always restarts the capture flow, whatever stage the
        // conversation was in. Any half-done capture is discarded with its
        // stored artifact.
        if msg.kind == MessageKind::Image && !matches!(stage, Stage::AwaitingImage) {
            if let Stage::AwaitingConfirmation { capture } | Stage::AwaitingLocation { capture } =
                stage
            {
                self.remove_artifact(&capture.stored_at).await;
            }
            stage = Stage::AwaitingImage;
        }

        let (next, reply) = match stage {
            Stage::Intro => (Stage::AwaitingImage, messages::INTRO.to_string()),
            Stage::AwaitingImage => self.on_awaiting_image(msg).await,
            Stage::AwaitingConfirmation { capture } => {
                self.on_awaiting_confirmation(capture, msg).await
            }
            Stage::AwaitingLocation { capture } => {
                self.on_awaiting_location(&msg.sender_id, capture, msg).await
            }
            Stage::Done => (Stage::Done, messages::CLOSING.to_string()),
        };

        session.stage = next;
        reply
    }

    //-------------------------------------------------------------------------------------
    // Stage handlers
    //-------------------------------------------------------------------------------------

    async fn on_awaiting_image(&self, msg: &InboundMessage) -> (Stage, String) {
        if msg.kind != MessageKind::Image {
            return (Stage::AwaitingImage, messages::PHOTO_REPROMPT.to_string());
        }

        let Some(media_ref) = msg.media_ref.as_deref() else {
            warn!(sender = %msg.sender_id, "image message without a media handle");
            return (Stage::AwaitingImage, messages::MEDIA_FAILED.to_string());
        };

        let bytes = match self
            .with_timeout("media fetch", self.media.fetch(media_ref))
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(sender = %msg.sender_id, error = %e, "media fetch failed");
                return (Stage::AwaitingImage, messages::MEDIA_FAILED.to_string());
            }
        };

        let file_name = format!("report_{}.jpg", Utc::now().timestamp_millis());
        let stored_at = match self.artifacts.save(&file_name, &bytes).await {
            Ok(path) => path,
            Err(e) => {
                error!(sender = %msg.sender_id, error = %e, "failed to store image artifact");
                return (Stage::AwaitingImage, messages::MEDIA_FAILED.to_string());
            }
        };

        match self
            .with_timeout("classification", self.classifier.classify(&bytes))
            .await
        {
            Ok(ClassificationResult::Accepted(description)) => {
                info!(sender = %msg.sender_id, "image accepted by classifier");
                let reply = messages::analysis_reply(&description);
                let capture = CapturedImage {
                    data: bytes,
                    stored_at,
                    description,
                };
                (Stage::AwaitingConfirmation { capture }, reply)
            }
            Ok(ClassificationResult::Rejected(reason)) => {
                info!(sender = %msg.sender_id, ?reason, "image rejected by classifier");
                self.remove_artifact(&stored_at).await;
                let reply = match reason {
                    RejectReason::NotReal => messages::IMAGE_NOT_REAL,
                    RejectReason::NoWasteFound => messages::NO_WASTE_FOUND,
                };
                (Stage::AwaitingImage, reply.to_string())
            }
            Err(e) => {
                error!(sender = %msg.sender_id, error = %e, "classification unavailable");
                self.remove_artifact(&stored_at).await;
                (Stage::AwaitingImage, messages::ANALYSIS_RETRY.to_string())
            }
        }
    }

    async fn on_awaiting_confirmation(
        &self,
        capture: CapturedImage,
        msg: &InboundMessage,
    ) -> (Stage, String) {
        let body = msg.body.as_deref().unwrap_or("").to_lowercase();

        if body.contains(AFFIRMATIVE_TOKEN) {
            (
                Stage::AwaitingLocation { capture },
                messages::LOCATION_REQUEST.to_string(),
            )
        } else if body.contains(NEGATIVE_TOKEN) {
            // The description is discarded together with the stored image.
            self.remove_artifact(&capture.stored_at).await;
            (Stage::AwaitingImage, messages::RESEND_PHOTO.to_string())
        } else {
            (
                Stage::AwaitingConfirmation { capture },
                messages::YES_NO_REPROMPT.to_string(),
            )
        }
    }

    async fn on_awaiting_location(
        &self,
        sender_id: &str,
        capture: CapturedImage,
        msg: &InboundMessage,
    ) -> (Stage, String) {
        let location = match (msg.kind, msg.coordinates, msg.body.as_deref()) {
            (MessageKind::Location, Some(coordinates), _) => {
                LocationRecord::from_coordinates(coordinates)
            }
            (MessageKind::Text, _, Some(body)) if !body.trim().is_empty() => {
                LocationRecord::from_address(body.trim())
            }
            _ => {
                return (
                    Stage::AwaitingLocation { capture },
                    messages::LOCATION_REPROMPT.to_string(),
                )
            }
        };

        self.dispatch_submission(sender_id, capture, location).await;
        (Stage::Done, messages::THANK_YOU.to_string())
    }

    //-------------------------------------------------------------------------------------
    // Submission dispatch
    //-------------------------------------------------------------------------------------

    /// Packages the accumulated session data and hands it to the persistence
    /// collaborator. Delivery failure is logged, never surfaced to the user
    /// and never rolled back; the artifact is removed after the attempt
    /// regardless of the outcome.
    async fn dispatch_submission(
        &self,
        sender_id: &str,
        capture: CapturedImage,
        mut location: LocationRecord,
    ) {
        self.fill_missing_location_half(&mut location).await;

        let CapturedImage {
            data,
            stored_at,
            description,
        } = capture;

        let payload = SubmissionPayload {
            sender_id: sender_id.to_string(),
            image_data: data,
            location,
            description,
            classification: String::new(),
            confidence: String::new(),
        };

        match self
            .with_timeout("submission dispatch", self.submissions.dispatch(&payload))
            .await
        {
            Ok(()) => info!(sender = %sender_id, "submission delivered"),
            Err(e) => {
                error!(sender = %sender_id, error = %e, "submission delivery failed, report may be lost")
            }
        }

        self.remove_artifact(&stored_at).await;
    }

    /// Fills whichever half of the location is missing, best-effort. Never
    /// queries the geocoder when both halves are already present.
    async fn fill_missing_location_half(&self, location: &mut LocationRecord) {
        if location.has_address() && !location.has_coordinates() {
            let address = location.address.as_deref().unwrap_or_default();
            match self
                .with_timeout("forward geocode", self.geocoder.forward(address))
                .await
            {
                Ok(Some(coordinates)) => {
                    location.latitude = Some(coordinates.latitude);
                    location.longitude = Some(coordinates.longitude);
                }
                Ok(None) => debug!(address, "address did not geocode"),
                Err(e) => warn!(address, error = %e, "forward geocoding failed"),
            }
        } else if location.has_coordinates() && !location.has_address() {
            let (latitude, longitude) = (
                location.latitude.unwrap_or_default(),
                location.longitude.unwrap_or_default(),
            );
            match self
                .with_timeout("reverse geocode", self.geocoder.reverse(latitude, longitude))
                .await
            {
                Ok(Some(address)) => location.address = Some(address),
                Ok(None) => debug!(latitude, longitude, "coordinates did not reverse-geocode"),
                Err(e) => warn!(latitude, longitude, error = %e, "reverse geocoding failed"),
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Helpers
    //-------------------------------------------------------------------------------------

    async fn remove_artifact(&self, path: &Path) {
        if let Err(e) = self.artifacts.delete(path).await {
            warn!(path = %path.display(), error = %e, "failed to delete stored artifact");
        }
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl Future<Output = PortResult<T>> + Send,
    ) -> PortResult<T> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Unavailable(format!("{} timed out", what))),
        }
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use eco_report_core::domain::Coordinates;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const ALLOWED: &str = "554197309009@c.us";

    //-------------------------------------------------------------------------------------
    // Mock ports
    //-------------------------------------------------------------------------------------

    /// Pops a scripted outcome per call so multi-step scenarios can vary the
    /// classifier's answer.
    struct ScriptedClassifier {
        script: StdMutex<Vec<PortResult<ClassificationResult>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn accepting(description: &str) -> Self {
            Self::with_script(vec![Ok(ClassificationResult::Accepted(
                description.to_string(),
            ))])
        }

        fn with_script(mut script: Vec<PortResult<ClassificationResult>>) -> Self {
            script.reverse();
            Self {
                script: StdMutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ImageClassifier for ScriptedClassifier {
        async fn classify(&self, _image: &[u8]) -> PortResult<ClassificationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .expect("classifier called more times than scripted")
        }
    }

    struct StubGeocoder {
        forward_result: Option<Coordinates>,
        reverse_result: Option<String>,
        forward_calls: AtomicUsize,
        reverse_calls: AtomicUsize,
    }

    impl StubGeocoder {
        fn empty() -> Self {
            Self {
                forward_result: None,
                reverse_result: None,
                forward_calls: AtomicUsize::new(0),
                reverse_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Geocoder for StubGeocoder {
        async fn forward(&self, _address: &str) -> PortResult<Option<Coordinates>> {
            self.forward_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.forward_result)
        }

        async fn reverse(&self, _latitude: f64, _longitude: f64) -> PortResult<Option<String>> {
            self.reverse_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reverse_result.clone())
        }
    }

    struct StubMedia {
        bytes: Option<Vec<u8>>,
        calls: AtomicUsize,
    }

    impl StubMedia {
        fn serving(bytes: &[u8]) -> Self {
            Self {
                bytes: Some(bytes.to_vec()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                bytes: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl MediaFetcher for StubMedia {
        async fn fetch(&self, media_ref: &str) -> PortResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bytes
                .clone()
                .ok_or_else(|| PortError::Unavailable(format!("no media at {}", media_ref)))
        }
    }

    /// A media fetch that never finishes within the test's patience.
    struct StalledMedia;

    #[async_trait::async_trait]
    impl MediaFetcher for StalledMedia {
        async fn fetch(&self, _media_ref: &str) -> PortResult<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(PortError::Unavailable("stalled download".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingArtifacts {
        saved: StdMutex<Vec<PathBuf>>,
        deleted: StdMutex<Vec<PathBuf>>,
    }

    impl RecordingArtifacts {
        fn saves(&self) -> usize {
            self.saved.lock().unwrap().len()
        }

        fn deletes(&self) -> usize {
            self.deleted.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl ArtifactStore for RecordingArtifacts {
        async fn save(&self, file_name: &str, _data: &[u8]) -> PortResult<PathBuf> {
            let path = PathBuf::from("/tmp/uploads").join(file_name);
            self.saved.lock().unwrap().push(path.clone());
            Ok(path)
        }

        async fn delete(&self, path: &Path) -> PortResult<()> {
            self.deleted.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        dispatched: StdMutex<Vec<SubmissionPayload>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                dispatched: StdMutex::default(),
                fail: true,
            }
        }

        fn payloads(&self) -> Vec<SubmissionPayload> {
            self.dispatched.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl SubmissionSink for RecordingSink {
        async fn dispatch(&self, payload: &SubmissionPayload) -> PortResult<()> {
            self.dispatched.lock().unwrap().push(payload.clone());
            if self.fail {
                Err(PortError::Unavailable("persistence unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Test rig
    //-------------------------------------------------------------------------------------

    struct Rig {
        engine: IntakeEngine,
        classifier: Arc<ScriptedClassifier>,
        geocoder: Arc<StubGeocoder>,
        media: Arc<StubMedia>,
        artifacts: Arc<RecordingArtifacts>,
        sink: Arc<RecordingSink>,
    }

    impl Rig {
        fn new(
            classifier: ScriptedClassifier,
            geocoder: StubGeocoder,
            media: StubMedia,
            sink: RecordingSink,
        ) -> Self {
            let classifier = Arc::new(classifier);
            let geocoder = Arc::new(geocoder);
            let media = Arc::new(media);
            let artifacts = Arc::new(RecordingArtifacts::default());
            let sink = Arc::new(sink);
            let engine = IntakeEngine::new(
                vec![ALLOWED.to_string()],
                classifier.clone(),
                geocoder.clone(),
                media.clone(),
                artifacts.clone(),
                sink.clone(),
                Duration::from_secs(5),
            );
            Rig {
                engine,
                classifier,
                geocoder,
                media,
                artifacts,
                sink,
            }
        }

        fn accepting(description: &str) -> Self {
            Self::new(
                ScriptedClassifier::accepting(description),
                StubGeocoder::empty(),
                StubMedia::serving(b"jpeg"),
                RecordingSink::default(),
            )
        }

        async fn stage(&self, sender: &str) -> Stage {
            self.engine
                .sessions()
                .entry(sender)
                .await
                .lock()
                .await
                .stage
                .clone()
        }
    }

    fn text(sender: &str, body: &str) -> InboundMessage {
        InboundMessage {
            sender_id: sender.to_string(),
            is_group: false,
            kind: MessageKind::Text,
            body: Some(body.to_string()),
            media_ref: None,
            coordinates: None,
        }
    }

    fn image(sender: &str) -> InboundMessage {
        InboundMessage {
            sender_id: sender.to_string(),
            is_group: false,
            kind: MessageKind::Image,
            body: None,
            media_ref: Some("https://gateway.example/media/1".to_string()),
            coordinates: None,
        }
    }

    fn location(sender: &str, latitude: f64, longitude: f64) -> InboundMessage {
        InboundMessage {
            sender_id: sender.to_string(),
            is_group: false,
            kind: MessageKind::Location,
            body: None,
            media_ref: None,
            coordinates: Some(Coordinates {
                latitude,
                longitude,
            }),
        }
    }

    /// Drives an allow-listed sender up to `AwaitingLocation`.
    async fn advance_to_location(rig: &Rig) {
        rig.engine.handle_message(text(ALLOWED, "oi")).await;
        rig.engine.handle_message(image(ALLOWED)).await;
        rig.engine.handle_message(text(ALLOWED, "sim")).await;
    }

    //-------------------------------------------------------------------------------------
    // Access filter
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_sender_is_dropped_without_a_session() {
        let rig = Rig::accepting("lixo");
        let reply = rig.engine.handle_message(text("stranger@c.us", "oi")).await;
        assert_eq!(reply, None);
        assert!(!rig.engine.sessions().contains("stranger@c.us").await);
    }

    #[tokio::test]
    async fn group_messages_are_dropped_even_from_allowed_senders() {
        let rig = Rig::accepting("lixo");
        let mut msg = text(ALLOWED, "oi");
        msg.is_group = true;
        assert_eq!(rig.engine.handle_message(msg).await, None);
        assert!(rig.engine.sessions().is_empty().await);
    }

    //-------------------------------------------------------------------------------------
    // Intro and image capture
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn first_message_gets_the_intro_and_advances() {
        let rig = Rig::accepting("lixo");
        let reply = rig.engine.handle_message(text(ALLOWED, "olá")).await;
        assert_eq!(reply.as_deref(), Some(messages::INTRO));
        assert_eq!(rig.stage(ALLOWED).await, Stage::AwaitingImage);
    }

    #[tokio::test]
    async fn non_image_while_awaiting_image_reprompts_without_classifying() {
        let rig = Rig::accepting("lixo");
        rig.engine.handle_message(text(ALLOWED, "oi")).await;

        let reply = rig.engine.handle_message(text(ALLOWED, "cadê?")).await;
        assert_eq!(reply.as_deref(), Some(messages::PHOTO_REPROMPT));
        assert_eq!(rig.stage(ALLOWED).await, Stage::AwaitingImage);
        assert_eq!(rig.classifier.calls(), 0);
        assert_eq!(rig.media.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_media_fetch_reprompts_and_keeps_the_stage() {
        let rig = Rig::new(
            ScriptedClassifier::with_script(vec![]),
            StubGeocoder::empty(),
            StubMedia::failing(),
            RecordingSink::default(),
        );
        rig.engine.handle_message(text(ALLOWED, "oi")).await;

        let reply = rig.engine.handle_message(image(ALLOWED)).await;
        assert_eq!(reply.as_deref(), Some(messages::MEDIA_FAILED));
        assert_eq!(rig.stage(ALLOWED).await, Stage::AwaitingImage);
        assert_eq!(rig.classifier.calls(), 0);
        assert_eq!(rig.artifacts.saves(), 0);
    }

    #[tokio::test]
    async fn fake_image_is_rejected_without_storing_a_description() {
        let rig = Rig::new(
            ScriptedClassifier::with_script(vec![Ok(ClassificationResult::Rejected(
                RejectReason::NotReal,
            ))]),
            StubGeocoder::empty(),
            StubMedia::serving(b"jpeg"),
            RecordingSink::default(),
        );
        rig.engine.handle_message(text(ALLOWED, "oi")).await;

        let reply = rig.engine.handle_message(image(ALLOWED)).await;
        assert_eq!(reply.as_deref(), Some(messages::IMAGE_NOT_REAL));
        assert_eq!(rig.stage(ALLOWED).await, Stage::AwaitingImage);
        // The parked artifact is cleaned up on rejection.
        assert_eq!(rig.artifacts.saves(), 1);
        assert_eq!(rig.artifacts.deletes(), 1);
    }

    #[tokio::test]
    async fn image_without_waste_is_rejected() {
        let rig = Rig::new(
            ScriptedClassifier::with_script(vec![Ok(ClassificationResult::Rejected(
                RejectReason::NoWasteFound,
            ))]),
            StubGeocoder::empty(),
            StubMedia::serving(b"jpeg"),
            RecordingSink::default(),
        );
        rig.engine.handle_message(text(ALLOWED, "oi")).await;

        let reply = rig.engine.handle_message(image(ALLOWED)).await;
        assert_eq!(reply.as_deref(), Some(messages::NO_WASTE_FOUND));
        assert_eq!(rig.stage(ALLOWED).await, Stage::AwaitingImage);
    }

    #[tokio::test]
    async fn classifier_outage_asks_the_user_to_retry() {
        let rig = Rig::new(
            ScriptedClassifier::with_script(vec![Err(PortError::Unavailable(
                "no text output".to_string(),
            ))]),
            StubGeocoder::empty(),
            StubMedia::serving(b"jpeg"),
            RecordingSink::default(),
        );
        rig.engine.handle_message(text(ALLOWED, "oi")).await;

        let reply = rig.engine.handle_message(image(ALLOWED)).await;
        assert_eq!(reply.as_deref(), Some(messages::ANALYSIS_RETRY));
        assert_eq!(rig.stage(ALLOWED).await, Stage::AwaitingImage);
    }

    #[tokio::test]
    async fn accepted_image_embeds_the_description_in_the_reply() {
        let rig = Rig::accepting("garrafas plásticas na rua");
        rig.engine.handle_message(text(ALLOWED, "oi")).await;

        let reply = rig.engine.handle_message(image(ALLOWED)).await.unwrap();
        assert!(reply.contains("garrafas plásticas na rua"));
        assert!(reply.contains(messages::CONFIRMATION_QUESTION));

        match rig.stage(ALLOWED).await {
            Stage::AwaitingConfirmation { capture } => {
                assert_eq!(capture.description, "garrafas plásticas na rua");
                assert_eq!(capture.data, b"jpeg");
            }
            other => panic!("expected AwaitingConfirmation, got {:?}", other),
        }
    }

    //-------------------------------------------------------------------------------------
    // Confirmation gate
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn affirmative_answer_moves_on_to_location() {
        let rig = Rig::accepting("lixo");
        rig.engine.handle_message(text(ALLOWED, "oi")).await;
        rig.engine.handle_message(image(ALLOWED)).await;

        let reply = rig.engine.handle_message(text(ALLOWED, "SIM, é isso")).await;
        assert_eq!(reply.as_deref(), Some(messages::LOCATION_REQUEST));
        assert!(matches!(
            rig.stage(ALLOWED).await,
            Stage::AwaitingLocation { .. }
        ));
    }

    #[tokio::test]
    async fn negative_answer_discards_the_capture() {
        let rig = Rig::accepting("lixo");
        rig.engine.handle_message(text(ALLOWED, "oi")).await;
        rig.engine.handle_message(image(ALLOWED)).await;

        let reply = rig.engine.handle_message(text(ALLOWED, "Não!")).await;
        assert_eq!(reply.as_deref(), Some(messages::RESEND_PHOTO));
        assert_eq!(rig.stage(ALLOWED).await, Stage::AwaitingImage);
        assert_eq!(rig.artifacts.deletes(), 1);
    }

    #[tokio::test]
    async fn ambiguous_answer_reprompts_for_yes_or_no() {
        let rig = Rig::accepting("lixo");
        rig.engine.handle_message(text(ALLOWED, "oi")).await;
        rig.engine.handle_message(image(ALLOWED)).await;

        let reply = rig.engine.handle_message(text(ALLOWED, "talvez")).await;
        assert_eq!(reply.as_deref(), Some(messages::YES_NO_REPROMPT));
        assert!(matches!(
            rig.stage(ALLOWED).await,
            Stage::AwaitingConfirmation { .. }
        ));
    }

    #[tokio::test]
    async fn a_new_image_restarts_the_capture_from_confirmation() {
        let rig = Rig::new(
            ScriptedClassifier::with_script(vec![
                Ok(ClassificationResult::Accepted("primeira".to_string())),
                Ok(ClassificationResult::Accepted("segunda".to_string())),
            ]),
            StubGeocoder::empty(),
            StubMedia::serving(b"jpeg"),
            RecordingSink::default(),
        );
        rig.engine.handle_message(text(ALLOWED, "oi")).await;
        rig.engine.handle_message(image(ALLOWED)).await;

        // Instead of confirming, the user sends a fresh photo.
        let reply = rig.engine.handle_message(image(ALLOWED)).await.unwrap();
        assert!(reply.contains("segunda"));
        assert_eq!(rig.classifier.calls(), 2);
        // The first capture's artifact was discarded.
        assert_eq!(rig.artifacts.deletes(), 1);
    }

    //-------------------------------------------------------------------------------------
    // Location and dispatch
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn coordinates_complete_the_report_with_one_dispatch_and_one_delete() {
        let rig = Rig::accepting("garrafas plásticas na rua");
        advance_to_location(&rig).await;

        let reply = rig
            .engine
            .handle_message(location(ALLOWED, -25.4, -49.2))
            .await;
        assert_eq!(reply.as_deref(), Some(messages::THANK_YOU));
        assert_eq!(rig.stage(ALLOWED).await, Stage::Done);

        let payloads = rig.sink.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].sender_id, ALLOWED);
        assert_eq!(payloads[0].image_data, b"jpeg");
        assert_eq!(payloads[0].description, "garrafas plásticas na rua");
        assert_eq!(payloads[0].location.latitude, Some(-25.4));
        assert_eq!(payloads[0].location.longitude, Some(-49.2));
        assert_eq!(rig.artifacts.deletes(), 1);
    }

    #[tokio::test]
    async fn text_address_is_accepted_and_forward_geocoded() {
        let rig = Rig::new(
            ScriptedClassifier::accepting("entulho"),
            StubGeocoder {
                forward_result: Some(Coordinates {
                    latitude: -25.43,
                    longitude: -49.27,
                }),
                reverse_result: None,
                forward_calls: AtomicUsize::new(0),
                reverse_calls: AtomicUsize::new(0),
            },
            StubMedia::serving(b"jpeg"),
            RecordingSink::default(),
        );
        advance_to_location(&rig).await;

        rig.engine
            .handle_message(text(ALLOWED, "Rua XV de Novembro, Curitiba"))
            .await;

        let payloads = rig.sink.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(
            payloads[0].location.address.as_deref(),
            Some("Rua XV de Novembro, Curitiba")
        );
        assert_eq!(payloads[0].location.latitude, Some(-25.43));
        assert_eq!(rig.geocoder.forward_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.geocoder.reverse_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn coordinates_are_reverse_geocoded_best_effort() {
        let rig = Rig::new(
            ScriptedClassifier::accepting("entulho"),
            StubGeocoder {
                forward_result: None,
                reverse_result: Some("Praça Tiradentes, Curitiba".to_string()),
                forward_calls: AtomicUsize::new(0),
                reverse_calls: AtomicUsize::new(0),
            },
            StubMedia::serving(b"jpeg"),
            RecordingSink::default(),
        );
        advance_to_location(&rig).await;

        rig.engine
            .handle_message(location(ALLOWED, -25.43, -49.27))
            .await;

        let payloads = rig.sink.payloads();
        assert_eq!(
            payloads[0].location.address.as_deref(),
            Some("Praça Tiradentes, Curitiba")
        );
        assert_eq!(rig.geocoder.reverse_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.geocoder.forward_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_location_message_reprompts() {
        let rig = Rig::accepting("entulho");
        advance_to_location(&rig).await;

        let reply = rig.engine.handle_message(text(ALLOWED, "   ")).await;
        assert_eq!(reply.as_deref(), Some(messages::LOCATION_REPROMPT));
        assert!(matches!(
            rig.stage(ALLOWED).await,
            Stage::AwaitingLocation { .. }
        ));
        assert!(rig.sink.payloads().is_empty());
    }

    #[tokio::test]
    async fn failed_dispatch_still_thanks_the_user_and_cleans_up() {
        let rig = Rig::new(
            ScriptedClassifier::accepting("entulho"),
            StubGeocoder::empty(),
            StubMedia::serving(b"jpeg"),
            RecordingSink::failing(),
        );
        advance_to_location(&rig).await;

        let reply = rig
            .engine
            .handle_message(location(ALLOWED, -25.4, -49.2))
            .await;
        assert_eq!(reply.as_deref(), Some(messages::THANK_YOU));
        assert_eq!(rig.stage(ALLOWED).await, Stage::Done);
        // The artifact is removed even when delivery failed.
        assert_eq!(rig.artifacts.deletes(), 1);
    }

    //-------------------------------------------------------------------------------------
    // Cancellation
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn aborted_handler_leaves_the_session_at_its_prior_stage() {
        let artifacts = Arc::new(RecordingArtifacts::default());
        let engine = IntakeEngine::new(
            vec![ALLOWED.to_string()],
            Arc::new(ScriptedClassifier::with_script(vec![])),
            Arc::new(StubGeocoder::empty()),
            Arc::new(StalledMedia),
            artifacts.clone(),
            Arc::new(RecordingSink::default()),
            Duration::from_secs(60),
        );

        engine.handle_message(text(ALLOWED, "oi")).await;

        // The gateway hangs up while the media download is still in flight,
        // which drops the handler future at the fetch await.
        let aborted = tokio::time::timeout(
            Duration::from_millis(50),
            engine.handle_message(image(ALLOWED)),
        )
        .await;
        assert!(aborted.is_err());

        let stage = engine
            .sessions()
            .entry(ALLOWED)
            .await
            .lock()
            .await
            .stage
            .clone();
        assert_eq!(stage, Stage::AwaitingImage);
        assert_eq!(artifacts.saves(), 0);

        // The sender can simply resend; the slot is unlocked and the stage
        // machine intact.
        let reply = engine.handle_message(text(ALLOWED, "e aí?")).await;
        assert_eq!(reply.as_deref(), Some(messages::PHOTO_REPROMPT));
    }

    //-------------------------------------------------------------------------------------
    // Done stage
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn done_stage_is_idempotent() {
        let rig = Rig::accepting("entulho");
        advance_to_location(&rig).await;
        rig.engine
            .handle_message(location(ALLOWED, -25.4, -49.2))
            .await;

        let classifier_calls = rig.classifier.calls();
        let deletes = rig.artifacts.deletes();

        for _ in 0..3 {
            let reply = rig.engine.handle_message(text(ALLOWED, "e agora?")).await;
            assert_eq!(reply.as_deref(), Some(messages::CLOSING));
        }

        assert_eq!(rig.stage(ALLOWED).await, Stage::Done);
        assert_eq!(rig.sink.payloads().len(), 1);
        assert_eq!(rig.classifier.calls(), classifier_calls);
        assert_eq!(rig.artifacts.deletes(), deletes);
    }

    //-------------------------------------------------------------------------------------
    // End-to-end scenario
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn full_intake_flow_for_an_allowed_sender() {
        let rig = Rig::accepting("garrafas plásticas na rua");

        let intro = rig.engine.handle_message(text(ALLOWED, "olá")).await;
        assert_eq!(intro.as_deref(), Some(messages::INTRO));
        assert_eq!(rig.stage(ALLOWED).await, Stage::AwaitingImage);

        let analysis = rig.engine.handle_message(image(ALLOWED)).await.unwrap();
        assert!(analysis.contains("garrafas plásticas na rua"));
        assert!(matches!(
            rig.stage(ALLOWED).await,
            Stage::AwaitingConfirmation { .. }
        ));

        let ask_location = rig.engine.handle_message(text(ALLOWED, "sim")).await;
        assert_eq!(ask_location.as_deref(), Some(messages::LOCATION_REQUEST));
        assert!(matches!(
            rig.stage(ALLOWED).await,
            Stage::AwaitingLocation { .. }
        ));

        let thanks = rig
            .engine
            .handle_message(location(ALLOWED, -25.4, -49.2))
            .await;
        assert_eq!(thanks.as_deref(), Some(messages::THANK_YOU));
        assert_eq!(rig.stage(ALLOWED).await, Stage::Done);

        let payloads = rig.sink.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].location.latitude, Some(-25.4));
        assert_eq!(payloads[0].location.longitude, Some(-49.2));
        assert_eq!(payloads[0].description, "garrafas plásticas na rua");
    }
}
