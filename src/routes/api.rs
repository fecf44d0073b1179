use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::Language;
use crate::error::{Error, Result};
use crate::service::{NewSubmission, SubmissionOut, SubmissionSummary};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CodePayload {
    // Missing content is a 400 at the service boundary, not a 422, so the
    // field is optional here.
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionCreate {
    pub title: String,
    pub language: Language,
    pub payload: CodePayload,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub language: Language,
    pub payload: CodePayload,
}

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Hello from Code Review Mentor" }))
}

pub async fn create_submission(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmissionCreate>,
) -> Result<(StatusCode, Json<SubmissionOut>)> {
    let out = state
        .service
        .create(NewSubmission {
            title: req.title,
            language: req.language,
            content: req.payload.content.unwrap_or_default(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(out)))
}

pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<SubmissionOut>> {
    Ok(Json(state.service.get(uuid).await?))
}

pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SubmissionSummary>>> {
    Ok(Json(state.service.get_all().await?))
}

/// Streamed review: plain-text chunks, one per AI fragment, no framing.
/// Client disconnects simply drop the stream.
pub async fn review_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReviewRequest>,
) -> Result<Response> {
    let content = req.payload.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(Error::Validation(
            "review content must not be empty".to_string(),
        ));
    }

    let stream = state
        .reviewer
        .stream_review(req.language, content)
        .map(Ok::<_, Infallible>);

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(e.to_string()))
}
