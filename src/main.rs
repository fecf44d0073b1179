mod agents;
mod config;
mod db;
mod docstore;
mod error;
mod hash;
mod routes;
mod service;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mentor=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let document_pool = db::create_pool(&config.document_database_url).await?;
    let documents = docstore::PgDocumentStore::new(document_pool);
    documents.ensure_schema().await?;

    let reviewer = agents::ClaudeAgent::new(config.claude_api_key.clone())?;
    let service = service::SubmissionService::new(
        db::PgSubmissionStore::new(pool),
        documents,
        reviewer.clone(),
    );

    let state = Arc::new(state::AppState { service, reviewer });

    let app = Router::new()
        .route("/", get(routes::root))
        .route(
            "/submissions",
            post(routes::create_submission).get(routes::list_submissions),
        )
        .route("/submissions/:uuid", get(routes::get_submission))
        .route("/review", post(routes::review_code))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Code Review Mentor listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
