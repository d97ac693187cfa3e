use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Access token required")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MissingToken | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Failure taxonomy for the fan-out worker. Transient failures leave the
/// stream entry pending so the group redelivers it; permanent ones are
/// acknowledged anyway and logged, otherwise a poison event would be
/// redelivered forever.
#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("malformed event {entry_id}: {reason}")]
    Malformed { entry_id: String, reason: String },

    #[error("author {0} not found in social graph")]
    AuthorGone(String),

    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl FanoutError {
    pub fn is_permanent(&self) -> bool {
        !matches!(self, FanoutError::Transient(_))
    }
}
