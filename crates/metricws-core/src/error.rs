//! Shared error type across metricws crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed message.
    BadRequest,
    /// No handler for the requested route or operation.
    NotFound,
    /// Name or correlation id already taken.
    Duplicate,
    /// Payload too large.
    PayloadTooLarge,
    /// Frame kind or operation mode not supported.
    Unsupported,
    /// Unsupported protocol version.
    UnsupportedVersion,
    /// Target connection is gone.
    Closed,
    /// Invalid configuration.
    Config,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Duplicate => "DUPLICATE",
            ClientCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ClientCode::Unsupported => "UNSUPPORTED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Closed => "CLOSED",
            ClientCode::Config => "CONFIG",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MwsError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum MwsError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("connection closed")]
    Closed,
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl MwsError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            MwsError::BadRequest(_) => ClientCode::BadRequest,
            MwsError::NotFound(_) => ClientCode::NotFound,
            MwsError::Duplicate(_) => ClientCode::Duplicate,
            MwsError::PayloadTooLarge => ClientCode::PayloadTooLarge,
            MwsError::Unsupported(_) => ClientCode::Unsupported,
            MwsError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            MwsError::Closed => ClientCode::Closed,
            MwsError::Config(_) => ClientCode::Config,
            MwsError::Internal(_) => ClientCode::Internal,
        }
    }

    /// True when the client caused the failure (protocol violation or
    /// routing miss) rather than the server.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            MwsError::BadRequest(_)
                | MwsError::NotFound(_)
                | MwsError::Duplicate(_)
                | MwsError::PayloadTooLarge
                | MwsError::Unsupported(_)
                | MwsError::UnsupportedVersion
        )
    }
}
