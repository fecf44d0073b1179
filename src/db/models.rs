use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Languages accepted at the submission boundary. Anything else is a
/// deserialization failure before the service layer is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    Python,
    JavaScript,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::Java => "Java",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Python" => Some(Language::Python),
            "JavaScript" => Some(Language::JavaScript),
            "Java" => Some(Language::Java),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission metadata as persisted in the structured store. The language is
/// stored as text and parsed back into [`Language`] at assembly time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubmissionRow {
    pub id: i32,
    pub uuid: Uuid,
    pub title: String,
    pub language: String,
    pub content_hash: String,
    pub short_feedback: String,
    pub document_ref: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new submission row. The document reference must already
/// resolve in the document store when this is handed to the gateway.
#[derive(Debug, Clone)]
pub struct NewSubmissionRow {
    pub uuid: Uuid,
    pub title: String,
    pub language: Language,
    pub content_hash: String,
    pub short_feedback: String,
    pub document_ref: Uuid,
}
