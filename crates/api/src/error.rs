use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use triage_core::error::{LoadError, RouteError};

use crate::config::ConfigError;

/// Application-level error type.
///
/// Wraps [`RouteError`] for request-time failures and the startup errors
/// raised while configuring and loading routes. Implements [`IntoResponse`]
/// to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A failure raised by a pipeline stage.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Route discovery, resolution or registration failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for fallible application code.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Route errors carry their own status and reach the client unchanged.
            AppError::Route(err) => (
                StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                err.code(),
                err.to_string(),
            ),

            AppError::Load(err) => {
                tracing::error!(error = %err, "Route loading error");
                internal()
            }
            AppError::Config(err) => {
                tracing::error!(error = %err, "Configuration error");
                internal()
            }
            AppError::Io(err) => {
                tracing::error!(error = %err, "I/O error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
