use crate::db::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Potentially dangerous operation detected: {0}. Only SELECT queries are allowed for safety.")]
    Rejected(&'static str),

    #[error(transparent)]
    Database(#[from] DbError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;

        match &self {
            ServiceError::InvalidRequest(_) => {}
            ServiceError::Rejected(keyword) => warn!(keyword, "statement rejected"),
            ServiceError::Database(err) => warn!(error = %err, "statement failed"),
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
