use crate::middleware::error_handling;
use actix_web::{HttpResponse, ResponseError};
use error_types::ErrorKind;
use thiserror::Error;

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("message already recalled")]
    AlreadyRecalled,

    #[error("recall window expired (created_at: {created_at}, window_secs: {window_secs})")]
    RecallWindowExpired {
        created_at: chrono::DateTime<chrono::Utc>,
        window_secs: i64,
    },

    #[error("message status changed concurrently")]
    StatusConflict,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(format!("migration: {e}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Upstream(e.to_string())
    }
}

impl From<notification_bus::BusError> for AppError {
    fn from(e: notification_bus::BusError) -> Self {
        AppError::Upstream(format!("notification bus: {e}"))
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BadRequest(_) => ErrorKind::InvalidArgument,
            AppError::Unauthorized => ErrorKind::Unauthenticated,
            AppError::Forbidden(_) => ErrorKind::PermissionDenied,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::AlreadyRecalled | AppError::StatusConflict => ErrorKind::FailedPrecondition,
            AppError::RecallWindowExpired { .. } => ErrorKind::TimeLimitExceeded,
            AppError::Config(_) | AppError::Database(_) | AppError::Upstream(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Domain string code used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        use error_types::error_codes;
        match self {
            AppError::AlreadyRecalled => error_codes::MESSAGE_ALREADY_RECALLED,
            AppError::RecallWindowExpired { .. } => error_codes::RECALL_WINDOW_EXPIRED,
            AppError::Unauthorized => error_codes::TOKEN_INVALID,
            AppError::Database(_) => error_codes::DATABASE_ERROR,
            other => other.kind().as_str(),
        }
    }

    /// Message safe to show a client
    pub fn public_message(&self) -> String {
        if self.kind().is_internal() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}
