//! services/api/src/bot/mod.rs
//!
//! The conversational intake bot: per-sender sessions, the fixed reply
//! catalogue, and the stage-machine engine that drives a report from photo
//! to dispatched submission.

pub mod engine;
pub mod messages;
pub mod sessions;

pub use engine::IntakeEngine;
pub use sessions::SessionMap;
