//! Error types for runsafe
//!
//! One taxonomy for the whole engine. Validation and authorization errors are
//! surfaced to callers as-is; `SourceUnavailable` is recoverable on reads
//! (callers fall back to static data) and becomes `PersistenceFailure` on writes.

use hyper::StatusCode;

/// Main error type for runsafe operations
#[derive(Debug, thiserror::Error)]
pub enum RunsafeError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Invalid value: {0}")]
    InvalidEnum(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunsafeError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCoordinate(_) => StatusCode::BAD_REQUEST,
            Self::InvalidEnum(_) => StatusCode::BAD_REQUEST,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Notification(_) => StatusCode::BAD_GATEWAY,
            Self::WebSocket(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error kind for JSON bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCoordinate(_) => "invalid_coordinate",
            Self::InvalidEnum(_) => "invalid_enum",
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::Notification(_) => "notification_failed",
            Self::WebSocket(_) => "websocket",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Re-label a store error raised by a write path.
    ///
    /// An unavailable store during a write is fatal to that call.
    pub fn into_persistence(self) -> Self {
        match self {
            Self::SourceUnavailable(msg) => Self::PersistenceFailure(msg),
            other => other,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, body.to_string())
    }
}

impl From<std::io::Error> for RunsafeError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for RunsafeError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for RunsafeError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RunsafeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<mongodb::error::Error> for RunsafeError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::SourceUnavailable(err.to_string())
    }
}

impl From<bson::de::Error> for RunsafeError {
    fn from(err: bson::de::Error) -> Self {
        Self::Internal(format!("BSON decode error: {}", err))
    }
}

impl From<async_nats::Error> for RunsafeError {
    fn from(err: async_nats::Error) -> Self {
        Self::Notification(err.to_string())
    }
}

/// Result type alias for runsafe operations
pub type Result<T> = std::result::Result<T, RunsafeError>;
