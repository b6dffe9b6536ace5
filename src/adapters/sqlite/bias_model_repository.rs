//! SQLite adapter for BiasModelRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{from_sql_id, parse_datetime, parse_handle, to_sql_id};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{BiasModel, ModelId, NewBiasModel};
use crate::domain::ports::BiasModelRepository;

/// Bias model store over the `bias_models` table.
#[derive(Clone)]
pub struct SqliteBiasModelRepository {
    pool: SqlitePool,
}

impl SqliteBiasModelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BiasModelRow {
    id: i64,
    encrypted_bias_threshold: String,
    encrypted_calibration_range: String,
    created_at: String,
}

fn row_to_model(row: BiasModelRow) -> DomainResult<BiasModel> {
    Ok(BiasModel {
        id: ModelId(from_sql_id(row.id)?),
        encrypted_bias_threshold: parse_handle(&row.encrypted_bias_threshold)?,
        encrypted_calibration_range: parse_handle(&row.encrypted_calibration_range)?,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[async_trait]
impl BiasModelRepository for SqliteBiasModelRepository {
    async fn create(&self, model: NewBiasModel) -> DomainResult<ModelId> {
        let result = sqlx::query(
            "INSERT INTO bias_models (encrypted_bias_threshold, encrypted_calibration_range, created_at)
             VALUES (?1, ?2, ?3)"
        )
        .bind(model.encrypted_bias_threshold.to_hex())
        .bind(model.encrypted_calibration_range.to_hex())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ModelId(from_sql_id(result.last_insert_rowid())?))
    }

    async fn get(&self, id: ModelId) -> DomainResult<BiasModel> {
        let row: Option<BiasModelRow> = sqlx::query_as(
            "SELECT id, encrypted_bias_threshold, encrypted_calibration_range, created_at
             FROM bias_models WHERE id = ?"
        )
        .bind(to_sql_id(id.0)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_model)
            .transpose()?
            .ok_or(DomainError::BiasModelNotFound(id))
    }
}
