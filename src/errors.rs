use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::data::{ModelError, ValidationErrors};

/// Error returned by HTTP handlers, rendered as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(errors: ValidationErrors) -> Self {
        ApiError::Model(ModelError::Validation(errors))
    }

    fn status_and_body(&self) -> (StatusCode, Value) {
        match self {
            ApiError::Model(ModelError::NotFound) => (
                StatusCode::NOT_FOUND,
                json!("the requested resource could not be found"),
            ),
            ApiError::Model(e @ ModelError::EditConflict) => {
                (StatusCode::CONFLICT, json!(e.to_string()))
            }
            ApiError::Model(ModelError::Validation(errors)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, json!(errors))
            }
            ApiError::Model(ModelError::DuplicateEmail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "email": "a user with this email address already exists" }),
            ),
            ApiError::Model(ModelError::Timeout) => (
                StatusCode::GATEWAY_TIMEOUT,
                json!("the server did not finish the request in time"),
            ),
            ApiError::Model(ModelError::Storage(_)) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!("the server encountered a problem and could not process your request"),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!(msg)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            let source = std::error::Error::source(&self)
                .map(|s| s.to_string())
                .unwrap_or_default();
            error!(error = %self, %source, %status, "request failed");
        }
        (status, Json(json!({ "error": body }))).into_response()
    }
}
