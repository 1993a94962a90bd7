//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::bot::IntakeEngine;
use crate::config::Config;
use eco_report_core::ports::{DatabaseService, ReportWriter};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub report_writer: Arc<dyn ReportWriter>,
    /// The conversational intake engine that the webhook endpoint feeds.
    pub engine: Arc<IntakeEngine>,
}
