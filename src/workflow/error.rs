use axum::{response::IntoResponse, Json};
use uuid::Uuid;

/// Typed engine errors. All of them are returned to the caller; none are
/// retried or swallowed inside the engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("action not permitted: {0}")]
    ActionNotPermitted(String),
    #[error("invalid transition input: {0}")]
    InvalidTransitionInput(String),
    #[error("stale ticket state: expected version {expected}, found {found}")]
    StaleTicketState { expected: u64, found: u64 },
    #[error("ticket not found: {0}")]
    TicketNotFound(Uuid),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Self::ActionNotPermitted(_) => StatusCode::FORBIDDEN,
            Self::InvalidTransitionInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StaleTicketState { .. } => StatusCode::CONFLICT,
            Self::TicketNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.to_string();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
