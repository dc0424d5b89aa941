use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::linking::LinkingError;
use crate::avatars::UploadError;
use crate::social::{SocialError, ValidationErrors};
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Account linking failed: {0}")]
    LinkingFailed(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SocialError> for AppError {
    fn from(err: SocialError) -> Self {
        match err {
            SocialError::Pool(e) => AppError::Pool(e),
            SocialError::Sql(e) => AppError::Database(e),
            SocialError::Validation(errors) => AppError::Validation(errors),
            SocialError::Hash(e) => AppError::Internal(e.to_string()),
            SocialError::NotFound(what) => {
                tracing::debug!("Not found: {}", what);
                AppError::NotFound
            }
            SocialError::Conflict(msg) => AppError::Conflict(msg),
            SocialError::Forbidden(msg) => {
                tracing::debug!("Forbidden: {}", msg);
                AppError::Forbidden
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(_) => AppError::NotFound,
            StorageError::Io(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Validation(errors) => AppError::Validation(errors),
            UploadError::Social(e) => e.into(),
            UploadError::Storage(e) => e.into(),
        }
    }
}

impl From<LinkingError> for AppError {
    fn from(err: LinkingError) -> Self {
        match err {
            LinkingError::EmailTaken(email) => AppError::LinkingFailed(format!(
                "{email} is already linked to a different sign-in provider"
            )),
            LinkingError::AvatarFetch(e) => AppError::Upstream(e.to_string()),
            LinkingError::Storage(e) => e.into(),
            LinkingError::Social(SocialError::Validation(errors)) => AppError::Validation(errors),
            LinkingError::Social(SocialError::Conflict(msg)) => AppError::LinkingFailed(msg),
            LinkingError::Social(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Validation(errors) => {
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(errors.clone())).into_response();
            }
            AppError::LinkingFailed(msg) => {
                tracing::warn!("Account linking failed: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream service failed".to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
