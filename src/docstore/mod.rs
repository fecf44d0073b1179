//! Document store gateway.
//!
//! Large free-form payloads (submitted code plus the full AI review) live in
//! a schema-flexible JSONB table on an independently configured pool. There
//! is no shared transaction with the structured store; the orchestrator
//! writes the document first and accepts an orphan if the metadata insert
//! fails afterwards.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::service::DocumentStore;

/// Payload held by the document store for one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub content: String,
    /// Absent when review generation failed for this submission.
    #[serde(default)]
    pub ai_response: Option<String>,
}

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The document side is schema-light; one table created at startup in
    /// place of migration tooling.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review_documents (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}

fn store_err(e: sqlx::Error) -> Error {
    Error::DocumentStore(e.to_string())
}

impl DocumentStore for PgDocumentStore {
    async fn find(&self, id: Uuid) -> Result<Option<ReviewDocument>> {
        let row: Option<(Json<ReviewDocument>,)> =
            sqlx::query_as("SELECT payload FROM review_documents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;

        Ok(row.map(|(Json(doc),)| doc))
    }

    async fn insert(&self, content: &str, ai_response: Option<&str>) -> Result<Uuid> {
        let doc = ReviewDocument {
            content: content.to_string(),
            ai_response: ai_response.map(str::to_string),
        };

        let (id,): (Uuid,) =
            sqlx::query_as("INSERT INTO review_documents (payload) VALUES ($1) RETURNING id")
                .bind(Json(doc))
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;

        Ok(id)
    }
}
