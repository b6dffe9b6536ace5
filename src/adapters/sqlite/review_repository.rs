//! SQLite adapter for ReviewRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{
    from_sql_id, from_sql_u32, parse_datetime, parse_handle, parse_optional_handle, to_sql_id,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnalysisResult, CiphertextHandle, EncryptedReview, EncryptedValue, NewReview, ReviewId,
};
use crate::domain::ports::ReviewRepository;

/// Reviews and their analysis results share one row, so the 1:1 lifetime
/// holds by construction. The database's AUTOINCREMENT key is the id
/// allocator.
#[derive(Clone)]
pub struct SqliteReviewRepository {
    pool: SqlitePool,
}

impl SqliteReviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: ReviewId) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM reviews WHERE id = ?")
            .bind(to_sql_id(id.0)?)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Explain why a conditional calibration update touched no row.
    async fn calibration_conflict(&self, id: ReviewId) -> DomainError {
        match self.exists(id).await {
            Ok(true) => DomainError::AlreadyCalibrated(id),
            Ok(false) => DomainError::ReviewNotFound(id),
            Err(e) => e,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: i64,
    encrypted_score: String,
    encrypted_reviewer_group: String,
    encrypted_reviewee_group: String,
    calibration_handle: Option<String>,
    created_at: String,
}

fn row_to_review(row: ReviewRow) -> DomainResult<EncryptedReview> {
    Ok(EncryptedReview {
        id: ReviewId(from_sql_id(row.id)?),
        encrypted_score: parse_handle(&row.encrypted_score)?,
        encrypted_reviewer_group: parse_handle(&row.encrypted_reviewer_group)?,
        encrypted_reviewee_group: parse_handle(&row.encrypted_reviewee_group)?,
        encrypted_calibration_adjustment: parse_optional_handle(row.calibration_handle)?
            .map_or_else(EncryptedValue::uninitialized, EncryptedValue::from_handle),
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    bias_score: i64,
    calibrated_score: i64,
    is_biased: bool,
    is_calibrated: bool,
    is_analyzed: bool,
}

fn row_to_analysis(row: AnalysisRow) -> DomainResult<AnalysisResult> {
    Ok(AnalysisResult {
        bias_score: from_sql_u32(row.bias_score, "bias_score")?,
        calibrated_score: from_sql_u32(row.calibrated_score, "calibrated_score")?,
        is_biased: row.is_biased,
        is_calibrated: row.is_calibrated,
        is_analyzed: row.is_analyzed,
    })
}

const REVIEW_COLUMNS: &str = "id, encrypted_score, encrypted_reviewer_group, encrypted_reviewee_group, calibration_handle, created_at";
const ANALYSIS_COLUMNS: &str = "bias_score, calibrated_score, is_biased, is_calibrated, is_analyzed";

#[async_trait]
impl ReviewRepository for SqliteReviewRepository {
    async fn create(&self, review: NewReview) -> DomainResult<ReviewId> {
        let result = sqlx::query(
            "INSERT INTO reviews
             (encrypted_score, encrypted_reviewer_group, encrypted_reviewee_group, created_at)
             VALUES (?1, ?2, ?3, ?4)"
        )
        .bind(review.encrypted_score.to_hex())
        .bind(review.encrypted_reviewer_group.to_hex())
        .bind(review.encrypted_reviewee_group.to_hex())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ReviewId(from_sql_id(result.last_insert_rowid())?))
    }

    async fn get(&self, id: ReviewId) -> DomainResult<EncryptedReview> {
        let row: Option<ReviewRow> =
            sqlx::query_as(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"))
                .bind(to_sql_id(id.0)?)
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_review)
            .transpose()?
            .ok_or(DomainError::ReviewNotFound(id))
    }

    async fn set_calibration(&self, id: ReviewId, adjustment: CiphertextHandle) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE reviews SET calibration_handle = ?1
             WHERE id = ?2 AND calibration_handle IS NULL"
        )
        .bind(adjustment.to_hex())
        .bind(to_sql_id(id.0)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.calibration_conflict(id).await);
        }
        Ok(())
    }

    async fn get_analysis(&self, id: ReviewId) -> DomainResult<AnalysisResult> {
        let row: Option<AnalysisRow> =
            sqlx::query_as(&format!("SELECT {ANALYSIS_COLUMNS} FROM reviews WHERE id = ?"))
                .bind(to_sql_id(id.0)?)
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_analysis)
            .transpose()?
            .ok_or(DomainError::ReviewNotFound(id))
    }

    async fn update_analysis(&self, id: ReviewId, result: AnalysisResult) -> DomainResult<()> {
        let outcome = sqlx::query(
            "UPDATE reviews
             SET bias_score = ?1, calibrated_score = ?2, is_biased = ?3, is_calibrated = ?4, is_analyzed = ?5
             WHERE id = ?6"
        )
        .bind(i64::from(result.bias_score))
        .bind(i64::from(result.calibrated_score))
        .bind(result.is_biased)
        .bind(result.is_calibrated)
        .bind(result.is_analyzed)
        .bind(to_sql_id(id.0)?)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(DomainError::ReviewNotFound(id));
        }
        Ok(())
    }

    async fn complete_calibration(
        &self,
        id: ReviewId,
        adjustment: CiphertextHandle,
        calibrated_score: u32,
    ) -> DomainResult<AnalysisResult> {
        // One conditional statement: the set-once check and both writes
        // succeed or fail together.
        let result = sqlx::query(
            "UPDATE reviews
             SET calibration_handle = ?1, calibrated_score = ?2, is_calibrated = 1
             WHERE id = ?3 AND calibration_handle IS NULL"
        )
        .bind(adjustment.to_hex())
        .bind(i64::from(calibrated_score))
        .bind(to_sql_id(id.0)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.calibration_conflict(id).await);
        }
        self.get_analysis(id).await
    }

    async fn list(&self) -> DomainResult<Vec<EncryptedReview>> {
        let rows: Vec<ReviewRow> =
            sqlx::query_as(&format!("SELECT {REVIEW_COLUMNS} FROM reviews ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(row_to_review).collect()
    }

    async fn count(&self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reviews")
            .fetch_one(&self.pool)
            .await?;
        from_sql_id(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_repo() -> SqliteReviewRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteReviewRepository::new(pool)
    }

    fn submission() -> NewReview {
        NewReview {
            encrypted_score: CiphertextHandle([1; 32]),
            encrypted_reviewer_group: CiphertextHandle([2; 32]),
            encrypted_reviewee_group: CiphertextHandle([3; 32]),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_repo().await;
        let id = repo.create(submission()).await.unwrap();

        let review = repo.get(id).await.unwrap();
        assert_eq!(review.id, id);
        assert_eq!(review.encrypted_score, CiphertextHandle([1; 32]));
        assert_eq!(review.encrypted_reviewer_group, CiphertextHandle([2; 32]));
        assert_eq!(review.encrypted_reviewee_group, CiphertextHandle([3; 32]));
        assert!(!review.is_calibrated());
        assert_eq!(repo.get_analysis(id).await.unwrap(), AnalysisResult::default());
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let repo = setup_repo().await;
        let a = repo.create(submission()).await.unwrap();
        let b = repo.create(submission()).await.unwrap();
        assert!(b > a);
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_calibration_set_once() {
        let repo = setup_repo().await;
        let id = repo.create(submission()).await.unwrap();

        repo.set_calibration(id, CiphertextHandle([9; 32])).await.unwrap();
        assert!(matches!(
            repo.set_calibration(id, CiphertextHandle([8; 32])).await,
            Err(DomainError::AlreadyCalibrated(_))
        ));
        assert!(matches!(
            repo.set_calibration(ReviewId(999), CiphertextHandle([8; 32])).await,
            Err(DomainError::ReviewNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_analysis_update_and_calibration() {
        let repo = setup_repo().await;
        let id = repo.create(submission()).await.unwrap();

        let mut analysis = AnalysisResult::default();
        analysis.record_bias(15, true);
        repo.update_analysis(id, analysis).await.unwrap();

        let calibrated = repo
            .complete_calibration(id, CiphertextHandle([5; 32]), 85)
            .await
            .unwrap();
        assert_eq!(calibrated.bias_score, 15);
        assert!(calibrated.is_biased);
        assert!(calibrated.is_calibrated);
        assert_eq!(calibrated.calibrated_score, 85);

        assert!(matches!(
            repo.complete_calibration(id, CiphertextHandle([6; 32]), 1).await,
            Err(DomainError::AlreadyCalibrated(_))
        ));
        assert_eq!(repo.get_analysis(id).await.unwrap().calibrated_score, 85);
    }
}
