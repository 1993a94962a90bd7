//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        artifacts::LocalArtifactStore, db::DbAdapter, geocode::NominatimAdapter,
        media::HttpMediaFetcher, report_llm::OpenAiReportAdapter, submission::HttpSubmissionSink,
        vision::OpenAiVisionAdapter,
    },
    bot::IntakeEngine,
    config::Config,
    error::ApiError,
    web::{
        create_image_handler, create_report_handler, create_user_handler, delete_image_handler,
        delete_report_handler, delete_user_handler, get_image_handler, get_report_handler,
        health_handler, list_images_handler, list_reports_handler, rest::ApiDoc, state::AppState,
        update_image_handler, update_report_handler, update_user_handler, webhook_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);

    let vision_adapter = Arc::new(OpenAiVisionAdapter::new(
        openai_client.clone(),
        config.vision_model.clone(),
    ));
    let report_adapter = Arc::new(OpenAiReportAdapter::new(
        openai_client.clone(),
        config.report_model.clone(),
    ));
    let geocoder = Arc::new(NominatimAdapter::new(
        config.geocoder_base_url.clone(),
        config.external_call_timeout,
    )?);
    let media_fetcher = Arc::new(HttpMediaFetcher::new(config.external_call_timeout)?);
    let artifact_store = Arc::new(LocalArtifactStore::new(config.uploads_dir.clone()).await?);
    let submission_sink = Arc::new(HttpSubmissionSink::new(
        config.submission_url.clone(),
        config.external_call_timeout,
    )?);

    // --- 4. Build the Intake Engine & Shared AppState ---
    let engine = Arc::new(IntakeEngine::new(
        config.allowed_senders.iter().cloned(),
        vision_adapter,
        geocoder,
        media_fetcher,
        artifact_store,
        submission_sink,
        config.external_call_timeout,
    ));

    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        report_writer: report_adapter,
        engine,
    });

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .route("/images", get(list_images_handler).post(create_image_handler))
        .route(
            "/images/{id}",
            get(get_image_handler)
                .put(update_image_handler)
                .delete(delete_image_handler),
        )
        .route("/users", post(create_user_handler))
        .route(
            "/users/{id}",
            axum::routing::put(update_user_handler).delete(delete_user_handler),
        )
        .route("/reports", get(list_reports_handler).post(create_report_handler))
        .route(
            "/reports/{id}",
            get(get_report_handler)
                .put(update_report_handler)
                .delete(delete_report_handler),
        )
        // Image payloads travel as base64 JSON, so allow room for them.
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
