//! API errors and their JSON responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use prism::orchestrator::OrchestratorError;
use prism::store::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    NotFound { message: String, key: Option<String> },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            key: None,
        }
    }

    pub fn key_not_found(message: impl Into<String>, key: &str) -> Self {
        Self::NotFound {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(key) => Self::BadRequest(format!("Invalid key: {}", key)),
            StoreError::Io(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Configuration(e) => Self::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(message) => json!({ "error": message }),
            Self::NotFound { message, key } => match key {
                Some(key) => json!({ "error": message, "key": key }),
                None => json!({ "error": message }),
            },
            Self::Internal(message) => {
                error!("request failed: {}", message);
                json!({ "error": "Internal server error", "message": message })
            }
        };
        (status, Json(body)).into_response()
    }
}
