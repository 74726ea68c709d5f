use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{auth::AuthError, importer::ImportError, locator::LocatorError, recorder::RecordError};

/// Error surfaced at the HTTP boundary. Every component error folds into one
/// of these variants, which decides the status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    ForeignKey(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::ForeignKey(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Upstream(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Validation(msg) => AppError::Validation(msg),
            RecordError::ForeignKey(msg) => AppError::ForeignKey(msg),
            RecordError::NotOwner => AppError::Forbidden,
            RecordError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl From<LocatorError> for AppError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::Validation(msg) => AppError::Validation(msg),
            LocatorError::Transport(_) | LocatorError::Decode(_) => {
                AppError::BadGateway(err.to_string())
            },
            LocatorError::MissingCredentials | LocatorError::Upstream(_) => {
                AppError::Upstream(err.to_string())
            },
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::Unauthenticated => {
                AppError::Unauthorized(err.to_string())
            },
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Conflict(msg) => AppError::Conflict(msg),
            AuthError::Hash(msg) => AppError::Internal(anyhow::anyhow!(msg)),
            AuthError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Storage(e) => AppError::Storage(e),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Storage(err) => {
                tracing::error!(error = %err, "storage failure");
                "storage error, retry the request".to_string()
            },
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal failure");
                "internal server error".to_string()
            },
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
