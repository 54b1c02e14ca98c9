use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use diesel::result::Error as DieselError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::classify::ClassifyError;
use crate::srs::TransitionError;

/// Errors surfaced by the JSON API. Each variant maps to one status
/// code; bodies follow the same `{error, status}` shape as the auth
/// responses.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("No usable flashcard could be extracted")]
    EmptyExtraction,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Classification failed: {0}")]
    Classify(#[from] ClassifyError),
    #[error("Database error")]
    Database(#[from] DieselError),
    #[error("Database connection error")]
    Pool(#[from] r2d2::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::EmptyExtraction => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Transition(_) => StatusCode::CONFLICT,
            ApiError::Classify(ClassifyError::MissingApiKey) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Classify(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "error": self.to_string(),
            "status": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
