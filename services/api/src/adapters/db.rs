//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eco_report_core::domain::{
    GeneratedReport, NewWasteImage, Report, ReportStats, User, WasteImage, WasteImageUpdate,
};
use eco_report_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn not_found(e: sqlx::Error, what: &str, id: Uuid) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// The report list columns are stored as jsonb arrays of strings.
fn json_to_list(value: serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn list_to_json(items: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        items
            .iter()
            .map(|item| serde_json::Value::String(item.clone()))
            .collect(),
    )
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ImageRecord {
    id: Uuid,
    phone: String,
    image_base64: String,
    endereco: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    classification: Option<String>,
    created_at: DateTime<Utc>,
}
impl ImageRecord {
    fn to_domain(self) -> WasteImage {
        WasteImage {
            id: self.id,
            phone: self.phone,
            image_base64: self.image_base64,
            endereco: self.endereco,
            latitude: self.latitude,
            longitude: self.longitude,
            classification: self.classification,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    nome: String,
    email: String,
    phone: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            nome: self.nome,
            email: self.email,
            phone: self.phone,
            role: self.role,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ReportRecord {
    id: Uuid,
    description: Option<String>,
    acoes_recomendadas: Option<String>,
    total_denuncias: i32,
    ia_approved: i32,
    bairros_criticos: serde_json::Value,
    locais_reincidentes: serde_json::Value,
    engajamento_colaborativo: i32,
    alunos_engajados: i32,
    parcerias_ativas: i32,
    created_at: DateTime<Utc>,
}
impl ReportRecord {
    fn to_domain(self) -> Report {
        Report {
            id: self.id,
            description: self.description,
            acoes_recomendadas: self.acoes_recomendadas,
            total_denuncias: self.total_denuncias,
            ia_approved: self.ia_approved,
            bairros_criticos: json_to_list(self.bairros_criticos),
            locais_reincidentes: json_to_list(self.locais_reincidentes),
            engajamento_colaborativo: self.engajamento_colaborativo,
            alunos_engajados: self.alunos_engajados,
            parcerias_ativas: self.parcerias_ativas,
            created_at: self.created_at,
        }
    }
}

const IMAGE_COLUMNS: &str =
    "id, phone, image_base64, endereco, latitude, longitude, classification, created_at";
const USER_COLUMNS: &str = "id, nome, email, phone, role, created_at, updated_at";
const REPORT_COLUMNS: &str = "id, description, acoes_recomendadas, total_denuncias, ia_approved, \
bairros_criticos, locais_reincidentes, engajamento_colaborativo, alunos_engajados, \
parcerias_ativas, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_image(&self, new_image: NewWasteImage) -> PortResult<WasteImage> {
        let sql = format!(
            "INSERT INTO images (phone, image_base64, endereco, latitude, longitude, classification) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {IMAGE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ImageRecord>(&sql)
            .bind(&new_image.phone)
            .bind(&new_image.image_base64)
            .bind(&new_image.endereco)
            .bind(new_image.latitude)
            .bind(new_image.longitude)
            .bind(&new_image.classification)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_images(&self) -> PortResult<Vec<WasteImage>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY created_at DESC");
        let records = sqlx::query_as::<_, ImageRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_image(&self, id: Uuid) -> PortResult<WasteImage> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1");
        let record = sqlx::query_as::<_, ImageRecord>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, "Image", id))?;
        Ok(record.to_domain())
    }

    async fn update_image(&self, id: Uuid, update: WasteImageUpdate) -> PortResult<WasteImage> {
        let sql = format!(
            "UPDATE images SET \
                endereco = COALESCE($2, endereco), \
                latitude = COALESCE($3, latitude), \
                longitude = COALESCE($4, longitude), \
                classification = COALESCE($5, classification) \
             WHERE id = $1 RETURNING {IMAGE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ImageRecord>(&sql)
            .bind(id)
            .bind(&update.endereco)
            .bind(update.latitude)
            .bind(update.longitude)
            .bind(&update.classification)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, "Image", id))?;
        Ok(record.to_domain())
    }

    async fn delete_image(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Image {} not found", id)));
        }
        Ok(())
    }

    async fn create_user(&self, nome: &str, email: &str) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (nome, email) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(nome)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn update_user(&self, id: Uuid, nome: &str, email: &str) -> PortResult<User> {
        let sql = format!(
            "UPDATE users SET nome = $2, email = $3, updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(nome)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, "User", id))?;
        Ok(record.to_domain())
    }

    async fn delete_user(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    async fn create_report(
        &self,
        stats: &ReportStats,
        generated: &GeneratedReport,
        image_ids: &[Uuid],
    ) -> PortResult<Report> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let sql = format!(
            "INSERT INTO reports (description, acoes_recomendadas, total_denuncias, ia_approved, \
                bairros_criticos, locais_reincidentes, engajamento_colaborativo, \
                alunos_engajados, parcerias_ativas) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {REPORT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ReportRecord>(&sql)
            .bind(&generated.description)
            .bind(&generated.acoes_recomendadas)
            .bind(stats.total_denuncias)
            .bind(stats.ia_approved)
            .bind(list_to_json(&stats.bairros_criticos))
            .bind(list_to_json(&stats.locais_reincidentes))
            .bind(stats.engajamento_colaborativo)
            .bind(stats.alunos_engajados)
            .bind(stats.parcerias_ativas)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;

        for image_id in image_ids {
            sqlx::query(
                "INSERT INTO report_images (report_id, image_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(record.id)
            .bind(image_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_reports(&self) -> PortResult<Vec<Report>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC");
        let records = sqlx::query_as::<_, ReportRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_report(&self, id: Uuid) -> PortResult<Report> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1");
        let record = sqlx::query_as::<_, ReportRecord>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, "Report", id))?;
        Ok(record.to_domain())
    }

    async fn get_report_images(&self, report_id: Uuid) -> PortResult<Vec<WasteImage>> {
        let sql = "SELECT i.id, i.phone, i.image_base64, i.endereco, i.latitude, i.longitude, \
                    i.classification, i.created_at \
             FROM images i \
             JOIN report_images ri ON i.id = ri.image_id \
             WHERE ri.report_id = $1";
        let records = sqlx::query_as::<_, ImageRecord>(sql)
            .bind(report_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_report(
        &self,
        id: Uuid,
        description: Option<String>,
        acoes_recomendadas: Option<String>,
    ) -> PortResult<Report> {
        let sql = format!(
            "UPDATE reports SET \
                description = COALESCE($2, description), \
                acoes_recomendadas = COALESCE($3, acoes_recomendadas) \
             WHERE id = $1 RETURNING {REPORT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ReportRecord>(&sql)
            .bind(id)
            .bind(description)
            .bind(acoes_recomendadas)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, "Report", id))?;
        Ok(record.to_domain())
    }

    async fn delete_report(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Report {} not found", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonb_lists_convert_both_ways() {
        let items = vec!["Centro".to_string(), "Boqueirão".to_string()];
        let value = list_to_json(&items);
        assert_eq!(json_to_list(value), items);
    }

    #[test]
    fn non_array_json_converts_to_empty_list() {
        assert!(json_to_list(serde_json::json!({"not": "a list"})).is_empty());
        assert!(json_to_list(serde_json::Value::Null).is_empty());
    }
}
