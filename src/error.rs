use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::identity::IdentityError;
use crate::interaction::InteractionError;
use crate::posts::RepositoryError;
use crate::upload::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Interaction(#[from] InteractionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Sign in first".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Repository(RepositoryError::BackendUnavailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Posts are unavailable right now".to_string(),
            ),
            AppError::Repository(e) => {
                tracing::error!("Repository error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Identity(IdentityError::ProviderUnavailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Sign-in is unavailable".to_string(),
            ),
            AppError::Identity(e @ IdentityError::ProviderError(_)) => {
                tracing::warn!("Identity provider error: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            AppError::Interaction(e @ InteractionError::NotMounted(_)) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            AppError::Interaction(e @ InteractionError::ToggleInFlight(_)) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
