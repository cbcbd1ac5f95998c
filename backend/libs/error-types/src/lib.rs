use serde::{Deserialize, Serialize};

/// Closed set of business error kinds shared by every messaging surface.
///
/// Each kind carries a stable numeric code (used on the socket protocol), a
/// string code (used in HTTP bodies) and the HTTP status it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    FailedPrecondition,
    TimeLimitExceeded,
    ResourceExhausted,
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::InvalidArgument,
        ErrorKind::Unauthenticated,
        ErrorKind::PermissionDenied,
        ErrorKind::NotFound,
        ErrorKind::FailedPrecondition,
        ErrorKind::TimeLimitExceeded,
        ErrorKind::ResourceExhausted,
        ErrorKind::Internal,
    ];

    pub fn code(&self) -> u32 {
        match self {
            ErrorKind::InvalidArgument => 40001,
            ErrorKind::Unauthenticated => 40101,
            ErrorKind::PermissionDenied => 40301,
            ErrorKind::TimeLimitExceeded => 40302,
            ErrorKind::NotFound => 40401,
            ErrorKind::FailedPrecondition => 40901,
            ErrorKind::ResourceExhausted => 42901,
            ErrorKind::Internal => 50001,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::PermissionDenied | ErrorKind::TimeLimitExceeded => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::FailedPrecondition => 409,
            ErrorKind::ResourceExhausted => 429,
            ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorKind::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            ErrorKind::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// Client-facing category, one of the [`error_types`] constants.
    pub fn error_type(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => error_types::VALIDATION_ERROR,
            ErrorKind::Unauthenticated => error_types::AUTHENTICATION_ERROR,
            ErrorKind::PermissionDenied | ErrorKind::TimeLimitExceeded => {
                error_types::AUTHORIZATION_ERROR
            }
            ErrorKind::NotFound => error_types::NOT_FOUND_ERROR,
            ErrorKind::FailedPrecondition => error_types::CONFLICT_ERROR,
            ErrorKind::ResourceExhausted => error_types::RATE_LIMIT_ERROR,
            ErrorKind::Internal => error_types::SERVER_ERROR,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Internal errors never expose their detail to clients.
    pub fn is_internal(&self) -> bool {
        matches!(self, ErrorKind::Internal)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform error body returned by every HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP reason phrase
    pub error: String,

    pub message: String,

    pub status: u16,

    /// One of the [`error_types`] constants
    pub error_type: String,

    /// String code, e.g. "MESSAGE_NOT_FOUND" or an [`ErrorKind::as_str`] value
    pub code: String,

    /// Numeric code shared with the socket protocol
    pub numeric_code: u32,

    /// ISO 8601
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn from_kind(kind: ErrorKind, message: &str) -> Self {
        Self {
            error: reason_phrase(kind.status_code()).to_string(),
            message: message.to_string(),
            status: kind.status_code(),
            error_type: kind.error_type().to_string(),
            code: kind.as_str().to_string(),
            numeric_code: kind.code(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

/// Domain-specific string codes
pub mod error_codes {
    // Authentication
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";

    // Messaging
    pub const CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const MESSAGE_ALREADY_RECALLED: &str = "MESSAGE_ALREADY_RECALLED";
    pub const RECALL_WINDOW_EXPIRED: &str = "RECALL_WINDOW_EXPIRED";
    pub const NOT_CONVERSATION_MEMBER: &str = "NOT_CONVERSATION_MEMBER";
    pub const NOT_MESSAGE_SENDER: &str = "NOT_MESSAGE_SENDER";
    pub const CONTENT_TOO_LARGE: &str = "CONTENT_TOO_LARGE";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const NOTIFICATION_ERROR: &str = "NOTIFICATION_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Client-facing error categories
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const RATE_LIMIT_ERROR: &str = "rate_limit_error";
    pub const SERVER_ERROR: &str = "server_error";
}
