//! services/api/src/web/mod.rs

pub mod rest;
pub mod state;
pub mod webhook;

// Re-export the handlers the binary wires into the router.
pub use rest::{
    create_image_handler, create_report_handler, create_user_handler, delete_image_handler,
    delete_report_handler, delete_user_handler, get_image_handler, get_report_handler,
    health_handler, list_images_handler, list_reports_handler, update_image_handler,
    update_report_handler, update_user_handler,
};
pub use webhook::webhook_handler;
