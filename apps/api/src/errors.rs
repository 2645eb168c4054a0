use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::data::DataError;
use crate::model::store::StoreError;
use crate::model::ModelError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No training data available from {0}")]
    EmptyDataset(String),

    #[error("Encoder produces {found} features but the model expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Model store error: {0}")]
    Store(#[from] StoreError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::EmptyDataset(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "EMPTY_DATASET",
                self.to_string(),
            ),
            AppError::DimensionMismatch { .. }
            | AppError::Model(ModelError::DimensionMismatch { .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "DIMENSION_MISMATCH",
                self.to_string(),
            ),
            AppError::Training(msg) => {
                tracing::error!("Training error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "TRAINING_ERROR",
                    self.to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Model store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A model storage error occurred".to_string(),
                )
            }
            AppError::Data(e) => {
                tracing::error!("Data error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATA_ERROR",
                    e.to_string(),
                )
            }
            AppError::Model(e) => {
                tracing::error!("Model error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MODEL_ERROR",
                    e.to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_maps_to_422() {
        let response = AppError::DimensionMismatch {
            expected: 112,
            found: 90,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = AppError::from(ModelError::DimensionMismatch {
            expected: 112,
            found: 90,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::EmptyDataset("data.json".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Training("diverged".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
