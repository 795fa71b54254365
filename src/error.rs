use actix_web::{http::StatusCode, ResponseError};
use log::error;
use sea_orm::{DbErr, SqlErr, TransactionError};
use thiserror::Error;

use crate::response::response_from_error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("storage failure")]
    Database,
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound(_) => 1,
            Self::Validation(_) => 2,
            Self::Conflict(_) => 3,
            Self::Database => 99,
        }
    }

    pub fn msg(&self) -> String {
        self.to_string()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(msg)) = err.sql_err() {
            return Self::conflict(msg);
        }
        // sqlite and mysql surface constraint failures as plain text on some paths
        let msg = err.to_string();
        if msg.contains("UNIQUE") || msg.contains("Duplicate") {
            return Self::conflict(msg);
        }
        error!("database error: {}", err);
        Self::Database
    }
}

impl From<TransactionError<AppError>> for AppError {
    fn from(err: TransactionError<AppError>) -> Self {
        match err {
            TransactionError::Connection(e) => e.into(),
            TransactionError::Transaction(app) => app,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        response_from_error(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::RuntimeErr;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        assert_eq!(AppError::not_found("user").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::validation("bad token").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::conflict("dup").status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Database.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unique_constraint_maps_to_conflict() {
        let err = DbErr::Query(RuntimeErr::Internal(
            "UNIQUE constraint failed: tags.name".to_string(),
        ));
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }

    #[test]
    fn other_db_errors_map_to_opaque_database_failure() {
        let err = DbErr::Query(RuntimeErr::Internal("disk I/O error".to_string()));
        assert!(matches!(AppError::from(err), AppError::Database));
    }

    #[test]
    fn transaction_error_unwraps_inner_app_error() {
        let err: TransactionError<AppError> =
            TransactionError::Transaction(AppError::not_found("tag"));
        assert!(matches!(AppError::from(err), AppError::NotFound(_)));
    }
}
