mod models;

pub use models::*;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Result;
use crate::service::SubmissionStore;

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| crate::error::Error::Internal(format!("migration failed: {}", e)))
}

/// Postgres-backed structured store gateway.
pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SubmissionStore for PgSubmissionStore {
    async fn find_by_uuid(&self, uuid: uuid::Uuid) -> Result<Option<SubmissionRow>> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            "SELECT * FROM submissions WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<SubmissionRow>> {
        // Duplicate hashes are possible under racing creates; the earliest
        // row wins as the canonical copy.
        let row = sqlx::query_as::<_, SubmissionRow>(
            "SELECT * FROM submissions WHERE content_hash = $1 ORDER BY id LIMIT 1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64) -> Result<Vec<SubmissionRow>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            "SELECT * FROM submissions ORDER BY id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn create(&self, new: &NewSubmissionRow) -> Result<SubmissionRow> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            INSERT INTO submissions (uuid, title, language, content_hash, short_feedback, document_ref)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.uuid)
        .bind(&new.title)
        .bind(new.language.as_str())
        .bind(&new.content_hash)
        .bind(&new.short_feedback)
        .bind(new.document_ref)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
