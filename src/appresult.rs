use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

/// Failures the chat core can report. Everything except `Storage` is a
/// caller mistake and carries a message that is safe to show to clients.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        use ChatError::*;
        match self {
            Validation(_) => StatusCode::BAD_REQUEST,
            NotFound(_) => StatusCode::NOT_FOUND,
            Forbidden(_) => StatusCode::FORBIDDEN,
            Conflict(_) => StatusCode::CONFLICT,
            Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message for the client. Storage details stay in the logs.
    pub fn public_message(&self, fallback: &str) -> String {
        match self {
            ChatError::Storage(_) => fallback.to_owned(),
            other => other.to_string(),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0.downcast_ref::<ChatError>() {
            Some(err) => (err.status(), err.public_message("Internal server error")),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_owned()),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
        }

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
