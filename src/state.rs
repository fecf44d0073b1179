use crate::agents::ClaudeAgent;
use crate::db::PgSubmissionStore;
use crate::docstore::PgDocumentStore;
use crate::service::SubmissionService;

pub type Service = SubmissionService<PgSubmissionStore, PgDocumentStore, ClaudeAgent>;

pub struct AppState {
    pub service: Service,
    pub reviewer: ClaudeAgent,
}
