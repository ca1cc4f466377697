//! The shard's single error type (`SPEC_FULL.md` §A.3), following
//! `control::error::AppError`'s shape: a `thiserror` enum whose
//! `IntoResponse` impl picks a status code and logs server errors, with
//! `From` impls absorbing the lower layers' error types so handlers can
//! propagate with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::kv::KvError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("storage error")]
    Storage(#[from] std::io::Error),

    #[error("malformed request body")]
    Json(#[from] serde_json::Error),

    #[error("collaborator request failed")]
    Directory(#[from] crate::directory::DirectoryError),
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Exists { kind, id } => AppError::BadRequest(format!("{kind} {id} already exists")),
            KvError::NotFound { kind, id } => AppError::NotFound { kind, id },
            KvError::IndexCollision { index, value } => {
                AppError::BadRequest(format!("{value} already indexed under {index}"))
            }
            KvError::Precondition(msg) => AppError::BadRequest(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::BAD_REQUEST,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(?self, "request failed");
        }

        let body = Json(ErrorBody { error: self.to_string() });
        (status, body).into_response()
    }
}
