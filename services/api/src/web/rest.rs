//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use crate::web::webhook;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use eco_report_core::domain::{
    NewWasteImage, Report, ReportStats, User, WasteImage, WasteImageUpdate,
};
use eco_report_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        webhook::webhook_handler,
        list_images_handler,
        get_image_handler,
        create_image_handler,
        update_image_handler,
        delete_image_handler,
        create_user_handler,
        update_user_handler,
        delete_user_handler,
        create_report_handler,
        list_reports_handler,
        get_report_handler,
        update_report_handler,
        delete_report_handler,
    ),
    components(
        schemas(
            HealthResponse,
            webhook::InboundEvent,
            webhook::EventKind,
            webhook::EventCoordinates,
            webhook::WebhookReply,
            WasteImageResponse,
            CreateImageRequest,
            UpdateImageRequest,
            UserResponse,
            UserRequest,
            ReportResponse,
            ReportWithImagesResponse,
            CreateReportRequest,
            UpdateReportRequest,
        )
    ),
    tags(
        (name = "Eco Report API", description = "Citizen waste-report intake, captures, users and narrative reports.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps a port error to an HTTP response, hiding internals from the client.
fn port_error(context: &str, e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, what),
        PortError::Unavailable(reason) => {
            error!(context, reason, "upstream service unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, format!("{} unavailable", context))
        }
        PortError::Unexpected(reason) => {
            error!(context, reason, "unexpected port failure");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to {}", context))
        }
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
}

/// A stored waste capture as returned by the API.
#[derive(Serialize, ToSchema)]
pub struct WasteImageResponse {
    id: Uuid,
    phone: String,
    image_base64: String,
    endereco: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    classification: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<WasteImage> for WasteImageResponse {
    fn from(image: WasteImage) -> Self {
        Self {
            id: image.id,
            phone: image.phone,
            image_base64: image.image_base64,
            endereco: image.endereco,
            latitude: image.latitude,
            longitude: image.longitude,
            classification: image.classification,
            created_at: image.created_at,
        }
    }
}

/// Payload for creating a waste capture.
///
/// The aliases accept the field names the intake bot uses when it dispatches
/// a finished submission (`senderId`/`imageData`), so the bot and external
/// clients share one endpoint.
#[derive(Deserialize, ToSchema)]
pub struct CreateImageRequest {
    #[serde(alias = "senderId")]
    phone: Option<String>,
    #[serde(rename = "imageBase64", alias = "imageData")]
    image_base64: Option<String>,
    endereco: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    classification: Option<String>,
}

/// Partial update for a waste capture; omitted fields are left untouched.
#[derive(Deserialize, ToSchema)]
pub struct UpdateImageRequest {
    endereco: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    classification: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    id: Uuid,
    nome: String,
    email: String,
    phone: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            nome: user.nome,
            email: user.email,
            phone: user.phone,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Payload for creating or updating a user.
#[derive(Deserialize, ToSchema)]
pub struct UserRequest {
    nome: Option<String>,
    email: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ReportResponse {
    id: Uuid,
    description: Option<String>,
    acoes_recomendadas: Option<String>,
    total_denuncias: i32,
    ia_approved: i32,
    bairros_criticos: Vec<String>,
    locais_reincidentes: Vec<String>,
    engajamento_colaborativo: i32,
    alunos_engajados: i32,
    parcerias_ativas: i32,
    created_at: DateTime<Utc>,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        Self {
            id: report.id,
            description: report.description,
            acoes_recomendadas: report.acoes_recomendadas,
            total_denuncias: report.total_denuncias,
            ia_approved: report.ia_approved,
            bairros_criticos: report.bairros_criticos,
            locais_reincidentes: report.locais_reincidentes,
            engajamento_colaborativo: report.engajamento_colaborativo,
            alunos_engajados: report.alunos_engajados,
            parcerias_ativas: report.parcerias_ativas,
            created_at: report.created_at,
        }
    }
}

/// A report together with the captures linked to it.
#[derive(Serialize, ToSchema)]
pub struct ReportWithImagesResponse {
    #[serde(flatten)]
    report: ReportResponse,
    images: Vec<WasteImageResponse>,
}

/// Aggregate counters for generating a new narrative report. The prose
/// itself is produced server-side by the report writer.
#[derive(Deserialize, ToSchema)]
pub struct CreateReportRequest {
    #[serde(default)]
    total_denuncias: i32,
    #[serde(default)]
    ia_approved: i32,
    #[serde(default)]
    bairros_criticos: Vec<String>,
    #[serde(default)]
    locais_reincidentes: Vec<String>,
    #[serde(default)]
    engajamento_colaborativo: i32,
    #[serde(default)]
    alunos_engajados: i32,
    #[serde(default)]
    parcerias_ativas: i32,
    #[serde(default)]
    image_ids: Vec<Uuid>,
}

/// Manual correction of a generated report's prose.
#[derive(Deserialize, ToSchema)]
pub struct UpdateReportRequest {
    description: Option<String>,
    acoes_recomendadas: Option<String>,
}

//=========================================================================================
// Health
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

//=========================================================================================
// Waste Capture Handlers
//=========================================================================================

/// List all stored waste captures, newest first.
#[utoipa::path(
    get,
    path = "/images",
    responses(
        (status = 200, description = "All stored captures", body = [WasteImageResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_images_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let images = app_state
        .db
        .list_images()
        .await
        .map_err(|e| port_error("list captures", e))?;
    let body: Vec<WasteImageResponse> = images.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Fetch a single waste capture by id.
#[utoipa::path(
    get,
    path = "/images/{id}",
    params(("id" = Uuid, Path, description = "Capture id")),
    responses(
        (status = 200, description = "The capture", body = WasteImageResponse),
        (status = 404, description = "Capture not found")
    )
)]
pub async fn get_image_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let image = app_state
        .db
        .get_image(id)
        .await
        .map_err(|e| port_error("fetch capture", e))?;
    Ok(Json(WasteImageResponse::from(image)))
}

/// Create a waste capture.
///
/// This is also the endpoint the intake bot dispatches finished submissions
/// to. `phone` and `imageBase64` are required; location fields are optional
/// and stored as given.
#[utoipa::path(
    post,
    path = "/images",
    request_body = CreateImageRequest,
    responses(
        (status = 201, description = "Capture created", body = WasteImageResponse),
        (status = 400, description = "Missing phone or image"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_image_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateImageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let phone = payload
        .phone
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "phone and imageBase64 are required".to_string(),
            )
        })?;
    let image_base64 = payload
        .image_base64
        .filter(|i| !i.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "phone and imageBase64 are required".to_string(),
            )
        })?;

    let new_image = NewWasteImage {
        phone,
        image_base64,
        endereco: payload.endereco,
        latitude: payload.latitude,
        longitude: payload.longitude,
        classification: payload.classification,
    };

    let created = app_state
        .db
        .create_image(new_image)
        .await
        .map_err(|e| port_error("create capture", e))?;
    Ok((StatusCode::CREATED, Json(WasteImageResponse::from(created))))
}

/// Update a waste capture's location or classification.
#[utoipa::path(
    put,
    path = "/images/{id}",
    params(("id" = Uuid, Path, description = "Capture id")),
    request_body = UpdateImageRequest,
    responses(
        (status = 200, description = "Updated capture", body = WasteImageResponse),
        (status = 404, description = "Capture not found")
    )
)]
pub async fn update_image_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateImageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let update = WasteImageUpdate {
        endereco: payload.endereco,
        latitude: payload.latitude,
        longitude: payload.longitude,
        classification: payload.classification,
    };
    let updated = app_state
        .db
        .update_image(id, update)
        .await
        .map_err(|e| port_error("update capture", e))?;
    Ok(Json(WasteImageResponse::from(updated)))
}

/// Delete a waste capture.
#[utoipa::path(
    delete,
    path = "/images/{id}",
    params(("id" = Uuid, Path, description = "Capture id")),
    responses(
        (status = 204, description = "Capture deleted"),
        (status = 404, description = "Capture not found")
    )
)]
pub async fn delete_image_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .db
        .delete_image(id)
        .await
        .map_err(|e| port_error("delete capture", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// User Handlers
//=========================================================================================

/// Register a user.
#[utoipa::path(
    post,
    path = "/users",
    request_body = UserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Missing nome or email"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_user_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<UserRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (nome, email) = require_user_fields(payload)?;
    let user = app_state
        .db
        .create_user(&nome, &email)
        .await
        .map_err(|e| port_error("create user", e))?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Update a user's registration.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (nome, email) = require_user_fields(payload)?;
    let user = app_state
        .db
        .update_user(id, &nome, &email)
        .await
        .map_err(|e| port_error("update user", e))?;
    Ok(Json(UserResponse::from(user)))
}

/// Delete a user.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .db
        .delete_user(id)
        .await
        .map_err(|e| port_error("delete user", e))?;
    Ok(StatusCode::NO_CONTENT)
}

fn require_user_fields(payload: UserRequest) -> Result<(String, String), (StatusCode, String)> {
    let missing = || {
        (
            StatusCode::BAD_REQUEST,
            "nome and email are required".to_string(),
        )
    };
    let nome = payload.nome.filter(|n| !n.trim().is_empty()).ok_or_else(missing)?;
    let email = payload.email.filter(|e| !e.trim().is_empty()).ok_or_else(missing)?;
    Ok((nome, email))
}

//=========================================================================================
// Narrative Report Handlers
//=========================================================================================

/// Generate and store a narrative report from aggregate counters.
///
/// The report writer produces the prose; the counters and any linked capture
/// ids are persisted alongside it.
#[utoipa::path(
    post,
    path = "/reports",
    request_body = CreateReportRequest,
    responses(
        (status = 201, description = "Report generated and stored", body = ReportResponse),
        (status = 503, description = "Report writer unavailable"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_report_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let stats = ReportStats {
        total_denuncias: payload.total_denuncias,
        ia_approved: payload.ia_approved,
        bairros_criticos: payload.bairros_criticos,
        locais_reincidentes: payload.locais_reincidentes,
        engajamento_colaborativo: payload.engajamento_colaborativo,
        alunos_engajados: payload.alunos_engajados,
        parcerias_ativas: payload.parcerias_ativas,
    };

    let generated = app_state
        .report_writer
        .generate(&stats)
        .await
        .map_err(|e| port_error("generate report", e))?;

    let report = app_state
        .db
        .create_report(&stats, &generated, &payload.image_ids)
        .await
        .map_err(|e| port_error("store report", e))?;

    Ok((StatusCode::CREATED, Json(ReportResponse::from(report))))
}

/// List all narrative reports, newest first.
#[utoipa::path(
    get,
    path = "/reports",
    responses(
        (status = 200, description = "All reports", body = [ReportResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_reports_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let reports = app_state
        .db
        .list_reports()
        .await
        .map_err(|e| port_error("list reports", e))?;
    let body: Vec<ReportResponse> = reports.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Fetch one report together with its linked captures.
#[utoipa::path(
    get,
    path = "/reports/{id}",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 200, description = "The report with its captures", body = ReportWithImagesResponse),
        (status = 404, description = "Report not found")
    )
)]
pub async fn get_report_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let report = app_state
        .db
        .get_report(id)
        .await
        .map_err(|e| port_error("fetch report", e))?;
    let images = app_state
        .db
        .get_report_images(id)
        .await
        .map_err(|e| port_error("fetch report captures", e))?;

    Ok(Json(ReportWithImagesResponse {
        report: ReportResponse::from(report),
        images: images.into_iter().map(Into::into).collect(),
    }))
}

/// Correct a report's generated prose.
#[utoipa::path(
    put,
    path = "/reports/{id}",
    params(("id" = Uuid, Path, description = "Report id")),
    request_body = UpdateReportRequest,
    responses(
        (status = 200, description = "Updated report", body = ReportResponse),
        (status = 404, description = "Report not found")
    )
)]
pub async fn update_report_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReportRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let updated = app_state
        .db
        .update_report(id, payload.description, payload.acoes_recomendadas)
        .await
        .map_err(|e| port_error("update report", e))?;
    Ok(Json(ReportResponse::from(updated)))
}

/// Delete a report and its capture links.
#[utoipa::path(
    delete,
    path = "/reports/{id}",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 204, description = "Report deleted"),
        (status = 404, description = "Report not found")
    )
)]
pub async fn delete_report_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .db
        .delete_report(id)
        .await
        .map_err(|e| port_error("delete report", e))?;
    Ok(StatusCode::NO_CONTENT)
}
