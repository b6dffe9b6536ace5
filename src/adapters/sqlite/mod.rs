//! SQLite database adapters for sealed-review.

pub mod bias_model_repository;
pub mod connection;
pub mod migrations;
pub mod review_repository;

pub use bias_model_repository::SqliteBiasModelRepository;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use review_repository::SqliteReviewRepository;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CiphertextHandle;

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a hex ciphertext handle from a SQLite row field.
pub fn parse_handle(s: &str) -> DomainResult<CiphertextHandle> {
    CiphertextHandle::from_hex(s)
}

/// Parse an optional hex ciphertext handle from a SQLite row field.
pub fn parse_optional_handle(s: Option<String>) -> DomainResult<Option<CiphertextHandle>> {
    s.as_deref().map(parse_handle).transpose()
}

/// SQLite integers are signed; ids and scores are stored widened.
pub fn to_sql_id(id: u64) -> DomainResult<i64> {
    i64::try_from(id).map_err(|_| DomainError::SerializationError(format!("id {id} out of range")))
}

pub fn from_sql_id(id: i64) -> DomainResult<u64> {
    u64::try_from(id).map_err(|_| DomainError::SerializationError(format!("negative id {id}")))
}

pub fn from_sql_u32(value: i64, column: &str) -> DomainResult<u32> {
    u32::try_from(value)
        .map_err(|_| DomainError::SerializationError(format!("{column} out of range: {value}")))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

pub async fn initialize_database(database_url: &str, config: Option<PoolConfig>) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_conversions() {
        assert_eq!(to_sql_id(5).unwrap(), 5);
        assert!(to_sql_id(u64::MAX).is_err());
        assert!(from_sql_id(-1).is_err());
        assert_eq!(from_sql_u32(85, "score").unwrap(), 85);
        assert!(from_sql_u32(i64::from(u32::MAX) + 1, "score").is_err());
    }

    #[test]
    fn test_parse_optional_handle() {
        assert_eq!(parse_optional_handle(None).unwrap(), None);
        let hex = CiphertextHandle([4; 32]).to_hex();
        assert_eq!(
            parse_optional_handle(Some(hex)).unwrap(),
            Some(CiphertextHandle([4; 32]))
        );
    }
}
