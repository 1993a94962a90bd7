//! services/api/src/web/webhook.rs
//!
//! The messaging-gateway webhook: one inbound message event per request,
//! answered with at most one reply text. The gateway is expected to relay
//! `reply` back to the sender verbatim; a `null` reply means the event was
//! dropped by the access filter and nothing should be sent.

use crate::web::state::AppState;
use axum::{extract::State, response::Json};
use eco_report_core::domain::{Coordinates, InboundMessage, MessageKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

//=========================================================================================
// Wire Types
//=========================================================================================

/// The kind discriminator of an inbound gateway event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Text,
    Image,
    Location,
}

impl From<EventKind> for MessageKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Text => MessageKind::Text,
            EventKind::Image => MessageKind::Image,
            EventKind::Location => MessageKind::Location,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct EventCoordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One inbound message event as delivered by the messaging gateway.
///
/// `mediaUrl` is the fetchable handle for image payloads; the gateway keeps
/// the bytes on its side until this service asks for them.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub sender_id: String,
    #[serde(default)]
    pub is_group_chat: bool,
    pub kind: EventKind,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub coordinates: Option<EventCoordinates>,
}

impl InboundEvent {
    fn into_domain(self) -> InboundMessage {
        InboundMessage {
            sender_id: self.sender_id,
            is_group: self.is_group_chat,
            kind: self.kind.into(),
            body: self.body,
            media_ref: self.media_url,
            coordinates: self.coordinates.map(|c| Coordinates {
                latitude: c.lat,
                longitude: c.lon,
            }),
        }
    }
}

/// The webhook's answer: the text to relay to the sender, or `null`.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookReply {
    pub reply: Option<String>,
}

//=========================================================================================
// Handler
//=========================================================================================

/// Process one inbound messaging-gateway event.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = InboundEvent,
    responses(
        (status = 200, description = "Event processed; reply is null when the sender was filtered out", body = WebhookReply)
    )
)]
pub async fn webhook_handler(
    State(app_state): State<Arc<AppState>>,
    Json(event): Json<InboundEvent>,
) -> Json<WebhookReply> {
    let reply = app_state.engine.handle_message(event.into_domain()).await;
    Json(WebhookReply { reply })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_event_shape_deserializes() {
        let event: InboundEvent = serde_json::from_str(
            r#"{
                "senderId": "554197309009@c.us",
                "isGroupChat": false,
                "kind": "location",
                "coordinates": { "lat": -25.4, "lon": -49.2 }
            }"#,
        )
        .unwrap();

        assert_eq!(event.sender_id, "554197309009@c.us");
        assert_eq!(event.kind, EventKind::Location);
        let msg = event.into_domain();
        assert_eq!(msg.kind, MessageKind::Location);
        assert_eq!(
            msg.coordinates,
            Some(Coordinates {
                latitude: -25.4,
                longitude: -49.2
            })
        );
    }

    #[test]
    fn group_flag_defaults_to_false() {
        let event: InboundEvent = serde_json::from_str(
            r#"{ "senderId": "x@c.us", "kind": "text", "body": "oi" }"#,
        )
        .unwrap();
        assert!(!event.is_group_chat);
        assert_eq!(event.body.as_deref(), Some("oi"));
    }

    #[test]
    fn image_event_carries_the_media_url() {
        let event: InboundEvent = serde_json::from_str(
            r#"{
                "senderId": "x@c.us",
                "kind": "image",
                "mediaUrl": "https://gateway.example/media/42"
            }"#,
        )
        .unwrap();
        let msg = event.into_domain();
        assert_eq!(msg.kind, MessageKind::Image);
        assert_eq!(
            msg.media_ref.as_deref(),
            Some("https://gateway.example/media/42")
        );
    }

    #[test]
    fn dropped_events_serialize_a_null_reply() {
        let json = serde_json::to_string(&WebhookReply { reply: None }).unwrap();
        assert_eq!(json, r#"{"reply":null}"#);
    }
}
