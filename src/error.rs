use actix_web::{http::StatusCode, ResponseError};
use log::error;
use sea_orm::TransactionError;
use thiserror::Error;

use crate::response::response_from_error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{msg}")]
    Storage { msg: String, detail: Option<String> },
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Wraps a lower-level failure, logging it where it is converted.
    pub fn storage(msg: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        let msg = msg.into();
        let detail = cause.to_string();
        error!("{}: {}", msg, detail);
        Self::Storage { msg, detail: Some(detail) }
    }

    pub fn msg(&self) -> &str {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) => msg,
            Self::Storage { msg, .. } => msg,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Storage { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::storage("database error", err)
    }
}

impl From<TransactionError<AppError>> for AppError {
    fn from(err: TransactionError<AppError>) -> Self {
        match err {
            TransactionError::Connection(e) => Self::storage("transaction failed", e),
            TransactionError::Transaction(app) => app,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::storage("file system error", err)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        response_from_error(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AppError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::storage("db", "boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_keeps_cause_as_detail() {
        let err = AppError::storage("database error", "disk I/O error");
        assert_eq!(err.msg(), "database error");
        assert_eq!(err.detail(), Some("disk I/O error"));
        assert_eq!(AppError::validation("bad").detail(), None);
    }
}
