//! Submission orchestration.
//!
//! Composes the structured store, the document store and the review
//! generator behind the create/get/list operations. Writes are an explicit
//! two-phase sequence: the review document first, then the metadata row
//! referencing it. A metadata row is never persisted without a resolvable
//! document reference; the inverse (an orphaned document after a failed
//! metadata insert) is accepted and logged, not cleaned up.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{Language, NewSubmissionRow, SubmissionRow};
use crate::docstore::ReviewDocument;
use crate::error::{Error, Result};
use crate::hash::content_hash;

/// Upper bound for the stored feedback preview, excluding the ellipsis.
pub const SHORT_FEEDBACK_MAX: usize = 62;

const TITLE_MAX: usize = 255;
const LIST_LIMIT: i64 = 100;

/// Structured store gateway.
///
/// Methods return `impl Future + Send` so the futures stay `Send` under
/// static dispatch. Failures are store-level and surfaced by the
/// orchestrator without retry.
pub trait SubmissionStore: Send + Sync {
    fn find_by_uuid(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Option<SubmissionRow>>> + Send;
    fn find_by_hash(
        &self,
        content_hash: &str,
    ) -> impl Future<Output = Result<Option<SubmissionRow>>> + Send;
    fn find_all(&self, limit: i64) -> impl Future<Output = Result<Vec<SubmissionRow>>> + Send;
    fn create(&self, new: &NewSubmissionRow)
        -> impl Future<Output = Result<SubmissionRow>> + Send;
}

/// Document store gateway.
pub trait DocumentStore: Send + Sync {
    fn find(&self, id: Uuid) -> impl Future<Output = Result<Option<ReviewDocument>>> + Send;
    fn insert(
        &self,
        content: &str,
        ai_response: Option<&str>,
    ) -> impl Future<Output = Result<Uuid>> + Send;
}

/// Review generation capability.
///
/// `Some(text)` on success (including degraded sentinel text for transient
/// provider failures); `None` when generation failed outright, letting the
/// orchestrator substitute an empty review.
pub trait ReviewGenerator: Send + Sync {
    fn generate(
        &self,
        language: Language,
        code: &str,
    ) -> impl Future<Output = Option<String>> + Send;
}

/// Inbound fields for a new submission.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub title: String,
    pub language: Language,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionPayload {
    pub content: String,
    pub ai_response: String,
}

/// Externally visible submission: metadata plus, where available, the
/// document payload.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOut {
    pub uuid: Uuid,
    pub title: String,
    pub language: Language,
    pub short_feedback: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: Option<SubmissionPayload>,
}

/// Listing entry: metadata only, no document hydration.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionSummary {
    pub uuid: Uuid,
    pub title: String,
    pub language: Language,
    pub short_feedback: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn short_feedback(text: &str) -> String {
    if text.chars().count() <= SHORT_FEEDBACK_MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(SHORT_FEEDBACK_MAX).collect();
        format!("{}...", head)
    }
}

fn row_language(row: &SubmissionRow) -> Result<Language> {
    Language::parse(&row.language)
        .ok_or_else(|| Error::Internal(format!("unknown language in store: {}", row.language)))
}

fn assemble(row: SubmissionRow, payload: Option<SubmissionPayload>) -> Result<SubmissionOut> {
    let language = row_language(&row)?;
    Ok(SubmissionOut {
        uuid: row.uuid,
        title: row.title,
        language,
        short_feedback: row.short_feedback,
        created_at: row.created_at,
        updated_at: row.updated_at,
        payload,
    })
}

pub struct SubmissionService<S, D, G> {
    submissions: S,
    documents: D,
    reviewer: G,
}

impl<S, D, G> SubmissionService<S, D, G>
where
    S: SubmissionStore,
    D: DocumentStore,
    G: ReviewGenerator,
{
    pub fn new(submissions: S, documents: D, reviewer: G) -> Self {
        Self {
            submissions,
            documents,
            reviewer,
        }
    }

    /// Create a submission.
    ///
    /// Identical content submitted earlier short-circuits to the cached
    /// review with no AI call and no new writes. The hash lookup is
    /// advisory: concurrent identical submissions may each take the fresh
    /// path before either commits, and both rows are kept.
    pub async fn create(&self, new: NewSubmission) -> Result<SubmissionOut> {
        if new.content.trim().is_empty() {
            return Err(Error::Validation(
                "submission content must not be empty".to_string(),
            ));
        }
        if new.title.chars().count() > TITLE_MAX {
            return Err(Error::Validation(format!(
                "title must be at most {} characters",
                TITLE_MAX
            )));
        }

        let hash = content_hash(&new.content);

        if let Some(existing) = self.submissions.find_by_hash(&hash).await? {
            match self.documents.find(existing.document_ref).await {
                Ok(Some(doc)) => {
                    debug!(uuid = %existing.uuid, "duplicate content, returning cached review");
                    let payload = SubmissionPayload {
                        content: doc.content,
                        ai_response: doc.ai_response.unwrap_or_default(),
                    };
                    return assemble(existing, Some(payload));
                }
                Ok(None) => {
                    warn!(
                        document_ref = %existing.document_ref,
                        "duplicate content but document missing, generating fresh review"
                    );
                }
                Err(e) => {
                    warn!(
                        document_ref = %existing.document_ref,
                        "duplicate content but document fetch failed ({}), generating fresh review",
                        e
                    );
                }
            }
        }

        let ai_response = self.reviewer.generate(new.language, &new.content).await;
        if ai_response.is_none() {
            warn!("review generation failed, persisting submission with empty feedback");
        }

        // Document first. Without it a metadata row would dangle, so an
        // insert failure aborts the whole request.
        let document_ref = self
            .documents
            .insert(&new.content, ai_response.as_deref())
            .await?;

        let ai_text = ai_response.unwrap_or_default();
        let row = NewSubmissionRow {
            uuid: Uuid::new_v4(),
            title: new.title,
            language: new.language,
            content_hash: hash,
            short_feedback: short_feedback(&ai_text),
            document_ref,
        };

        let stored = match self.submissions.create(&row).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    document_ref = %document_ref,
                    "metadata insert failed after document write, document is now orphaned"
                );
                return Err(e);
            }
        };

        let payload = SubmissionPayload {
            content: new.content,
            ai_response: ai_text,
        };
        assemble(stored, Some(payload))
    }

    /// Fetch one submission. A document-store failure or a missing document
    /// degrades to an absent payload rather than failing the read.
    pub async fn get(&self, uuid: Uuid) -> Result<SubmissionOut> {
        let row = self
            .submissions
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("submission {} not found", uuid)))?;

        let payload = match self.documents.find(row.document_ref).await {
            Ok(Some(doc)) => Some(SubmissionPayload {
                content: doc.content,
                ai_response: doc.ai_response.unwrap_or_default(),
            }),
            Ok(None) => {
                warn!(document_ref = %row.document_ref, "document missing, returning metadata only");
                None
            }
            Err(e) => {
                warn!(
                    document_ref = %row.document_ref,
                    "document fetch failed ({}), returning metadata only",
                    e
                );
                None
            }
        };

        assemble(row, payload)
    }

    /// List submissions, metadata only.
    pub async fn get_all(&self) -> Result<Vec<SubmissionSummary>> {
        let rows = self.submissions.find_all(LIST_LIMIT).await?;

        rows.into_iter()
            .map(|row| {
                let language = row_language(&row)?;
                Ok(SubmissionSummary {
                    uuid: row.uuid,
                    title: row.title,
                    language,
                    short_feedback: row.short_feedback,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeSubmissions {
        rows: Arc<Mutex<Vec<SubmissionRow>>>,
        find_by_hash_calls: Arc<AtomicUsize>,
        create_calls: Arc<AtomicUsize>,
        fail_create: bool,
    }

    impl FakeSubmissions {
        fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Self::default()
            }
        }

        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    impl SubmissionStore for FakeSubmissions {
        async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<SubmissionRow>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|r| r.uuid == uuid).cloned())
        }

        async fn find_by_hash(&self, content_hash: &str) -> Result<Option<SubmissionRow>> {
            self.find_by_hash_calls.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|r| r.content_hash == content_hash).cloned())
        }

        async fn find_all(&self, limit: i64) -> Result<Vec<SubmissionRow>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().take(limit as usize).cloned().collect())
        }

        async fn create(&self, new: &NewSubmissionRow) -> Result<SubmissionRow> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(Error::Internal("structured store down".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            let row = SubmissionRow {
                id: rows.len() as i32 + 1,
                uuid: new.uuid,
                title: new.title.clone(),
                language: new.language.as_str().to_string(),
                content_hash: new.content_hash.clone(),
                short_feedback: new.short_feedback.clone(),
                document_ref: new.document_ref,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            rows.push(row.clone());
            Ok(row)
        }
    }

    #[derive(Clone, Default)]
    struct FakeDocuments {
        docs: Arc<Mutex<HashMap<Uuid, ReviewDocument>>>,
        insert_calls: Arc<AtomicUsize>,
        fail_insert: bool,
        fail_find: bool,
    }

    impl FakeDocuments {
        fn failing_insert() -> Self {
            Self {
                fail_insert: true,
                ..Self::default()
            }
        }

        fn failing_find() -> Self {
            Self {
                fail_find: true,
                ..Self::default()
            }
        }

        fn document(&self, id: Uuid) -> Option<ReviewDocument> {
            self.docs.lock().unwrap().get(&id).cloned()
        }
    }

    impl DocumentStore for FakeDocuments {
        async fn find(&self, id: Uuid) -> Result<Option<ReviewDocument>> {
            if self.fail_find {
                return Err(Error::DocumentStore("document store down".to_string()));
            }
            Ok(self.docs.lock().unwrap().get(&id).cloned())
        }

        async fn insert(&self, content: &str, ai_response: Option<&str>) -> Result<Uuid> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_insert {
                return Err(Error::DocumentStore("document store down".to_string()));
            }
            let id = Uuid::new_v4();
            self.docs.lock().unwrap().insert(
                id,
                ReviewDocument {
                    content: content.to_string(),
                    ai_response: ai_response.map(str::to_string),
                },
            );
            Ok(id)
        }
    }

    #[derive(Clone)]
    struct FakeReviewer {
        response: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeReviewer {
        fn returning(text: &str) -> Self {
            Self {
                response: Some(text.to_string()),
                calls: Arc::default(),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: Arc::default(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ReviewGenerator for FakeReviewer {
        async fn generate(&self, _language: Language, _code: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn request(content: &str) -> NewSubmission {
        NewSubmission {
            title: "t".to_string(),
            language: Language::Python,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_payload() {
        let subs = FakeSubmissions::default();
        let docs = FakeDocuments::default();
        let reviewer = FakeReviewer::returning("Looks fine");
        let service = SubmissionService::new(subs.clone(), docs.clone(), reviewer);

        let created = service.create(request("print('hi')")).await.unwrap();
        let fetched = service.get(created.uuid).await.unwrap();

        let payload = fetched.payload.expect("payload present");
        assert_eq!(payload.content, "print('hi')");
        assert_eq!(payload.ai_response, "Looks fine");
    }

    #[tokio::test]
    async fn create_persists_metadata_and_document() {
        let subs = FakeSubmissions::default();
        let docs = FakeDocuments::default();
        let reviewer = FakeReviewer::returning("Looks fine");
        let service = SubmissionService::new(subs.clone(), docs.clone(), reviewer);

        let out = service.create(request("print('hi')")).await.unwrap();

        assert_eq!(out.short_feedback, "Looks fine");
        assert_eq!(out.payload.as_ref().unwrap().content, "print('hi')");

        let rows = subs.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].short_feedback, "Looks fine");
        assert_eq!(rows[0].language, "Python");
        let doc = docs.document(rows[0].document_ref).expect("document exists");
        assert_eq!(doc.ai_response.as_deref(), Some("Looks fine"));
        assert_eq!(doc.content, "print('hi')");
    }

    #[tokio::test]
    async fn duplicate_content_returns_cached_review_without_new_work() {
        let subs = FakeSubmissions::default();
        let docs = FakeDocuments::default();
        let reviewer = FakeReviewer::returning("First review");
        let service = SubmissionService::new(subs.clone(), docs.clone(), reviewer.clone());

        let first = service.create(request("x = 1")).await.unwrap();
        let second = service.create(request("x = 1")).await.unwrap();

        assert_eq!(reviewer.call_count(), 1);
        assert_eq!(docs.insert_calls.load(Ordering::SeqCst), 1);
        assert_eq!(subs.row_count(), 1);
        assert_eq!(second.uuid, first.uuid);
        assert_eq!(
            second.payload.unwrap().ai_response,
            first.payload.unwrap().ai_response
        );
    }

    #[tokio::test]
    async fn empty_content_is_rejected_before_any_io() {
        let subs = FakeSubmissions::default();
        let docs = FakeDocuments::default();
        let reviewer = FakeReviewer::returning("unused");
        let service = SubmissionService::new(subs.clone(), docs.clone(), reviewer.clone());

        let err = service.create(request("   ")).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(subs.find_by_hash_calls.load(Ordering::SeqCst), 0);
        assert_eq!(subs.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(docs.insert_calls.load(Ordering::SeqCst), 0);
        assert_eq!(reviewer.call_count(), 0);
    }

    #[tokio::test]
    async fn overlong_title_is_rejected() {
        let service = SubmissionService::new(
            FakeSubmissions::default(),
            FakeDocuments::default(),
            FakeReviewer::returning("unused"),
        );

        let mut req = request("print('hi')");
        req.title = "t".repeat(256);
        let err = service.create(req).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn document_write_failure_aborts_create() {
        let subs = FakeSubmissions::default();
        let docs = FakeDocuments::failing_insert();
        let reviewer = FakeReviewer::returning("never stored");
        let service = SubmissionService::new(subs.clone(), docs, reviewer);

        let err = service.create(request("print('hi')")).await.unwrap_err();

        assert!(matches!(err, Error::DocumentStore(_)));
        assert_eq!(subs.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(subs.row_count(), 0);
    }

    #[tokio::test]
    async fn metadata_insert_failure_surfaces_after_document_write() {
        let subs = FakeSubmissions::failing_create();
        let docs = FakeDocuments::default();
        let reviewer = FakeReviewer::returning("orphaned");
        let service = SubmissionService::new(subs, docs.clone(), reviewer);

        let err = service.create(request("print('hi')")).await.unwrap_err();

        assert!(matches!(err, Error::Internal(_)));
        // The document write went through and is left behind.
        assert_eq!(docs.insert_calls.load(Ordering::SeqCst), 1);
        assert_eq!(docs.docs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_degrades_to_metadata_when_document_fetch_fails() {
        let subs = FakeSubmissions::default();
        let working_docs = FakeDocuments::default();
        let reviewer = FakeReviewer::returning("Looks fine");

        let created = {
            let service =
                SubmissionService::new(subs.clone(), working_docs.clone(), reviewer.clone());
            service.create(request("print('hi')")).await.unwrap()
        };

        // Same structured rows, document store now failing on reads.
        let service =
            SubmissionService::new(subs.clone(), FakeDocuments::failing_find(), reviewer);
        let fetched = service.get(created.uuid).await.unwrap();

        assert_eq!(fetched.title, "t");
        assert_eq!(fetched.short_feedback, "Looks fine");
        assert!(fetched.payload.is_none());
    }

    #[tokio::test]
    async fn get_unknown_uuid_is_not_found() {
        let service = SubmissionService::new(
            FakeSubmissions::default(),
            FakeDocuments::default(),
            FakeReviewer::returning("unused"),
        );

        let err = service.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn generation_failure_persists_submission_with_empty_feedback() {
        let subs = FakeSubmissions::default();
        let docs = FakeDocuments::default();
        let service = SubmissionService::new(subs.clone(), docs.clone(), FakeReviewer::failing());

        let out = service.create(request("print('hi')")).await.unwrap();

        assert_eq!(out.short_feedback, "");
        assert_eq!(out.payload.unwrap().ai_response, "");
        let rows = subs.rows.lock().unwrap();
        let doc = docs.document(rows[0].document_ref).unwrap();
        assert_eq!(doc.content, "print('hi')");
        assert!(doc.ai_response.is_none());
    }

    #[tokio::test]
    async fn dangling_document_ref_falls_through_to_fresh_review() {
        let subs = FakeSubmissions::default();
        let docs = FakeDocuments::default();
        let reviewer = FakeReviewer::returning("Fresh review");
        let service = SubmissionService::new(subs.clone(), docs.clone(), reviewer.clone());

        // Seed a row whose document reference does not resolve.
        let hash = content_hash("x = 1");
        subs.rows.lock().unwrap().push(SubmissionRow {
            id: 1,
            uuid: Uuid::new_v4(),
            title: "stale".to_string(),
            language: "Python".to_string(),
            content_hash: hash,
            short_feedback: "old".to_string(),
            document_ref: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        let out = service.create(request("x = 1")).await.unwrap();

        assert_eq!(reviewer.call_count(), 1);
        assert_eq!(out.payload.unwrap().ai_response, "Fresh review");
        assert_eq!(subs.row_count(), 2);
    }

    #[tokio::test]
    async fn get_all_returns_summaries_without_touching_documents() {
        let subs = FakeSubmissions::default();
        let docs = FakeDocuments::failing_find();
        let reviewer = FakeReviewer::returning("r");

        {
            let service =
                SubmissionService::new(subs.clone(), FakeDocuments::default(), reviewer.clone());
            service.create(request("a = 1")).await.unwrap();
            service.create(request("b = 2")).await.unwrap();
        }

        // Listing must not care that document reads would fail.
        let service = SubmissionService::new(subs, docs, reviewer);
        let all = service.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|s| s.title == "t"));
    }

    #[test]
    fn short_feedback_truncates_with_ellipsis() {
        let long = "x".repeat(SHORT_FEEDBACK_MAX + 10);
        let truncated = short_feedback(&long);
        assert_eq!(truncated.len(), SHORT_FEEDBACK_MAX + 3);
        assert!(truncated.ends_with("..."));
        assert!(truncated.starts_with(&"x".repeat(SHORT_FEEDBACK_MAX)));
    }

    #[test]
    fn short_feedback_keeps_bounded_text_unmodified() {
        let exact = "y".repeat(SHORT_FEEDBACK_MAX);
        assert_eq!(short_feedback(&exact), exact);
        assert_eq!(short_feedback("Looks fine"), "Looks fine");
        assert_eq!(short_feedback(""), "");
    }
}
