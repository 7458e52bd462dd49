//! Client-facing error taxonomy for the tile service.

use thiserror::Error;

/// Result type alias using ServiceError.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced to HTTP clients.
///
/// Pipeline stages keep their own error types; everything is converted into
/// one of these variants at the request boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    // === Request Errors ===
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    // === Data Errors ===
    #[error("No images found for the given parameters")]
    NoMatchingScene,

    #[error("Error searching STAC API: {0}")]
    CatalogUnavailable(String),

    #[error("{0}")]
    DecodeError(String),

    // === Infrastructure Errors ===
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidRequest(_) => 400,
            ServiceError::NotFound(_) | ServiceError::NoMatchingScene => 404,
            ServiceError::CatalogUnavailable(_)
            | ServiceError::DecodeError(_)
            | ServiceError::Internal(_) => 500,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidRequest(message.into())
    }

    /// Whether the error was caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        self.http_status_code() < 500
    }
}

impl From<crate::bbox::BboxParseError> for ServiceError {
    fn from(err: crate::bbox::BboxParseError) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}

impl From<crate::time::TimeParseError> for ServiceError {
    fn from(err: crate::time::TimeParseError) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("JSON error: {}", err))
    }
}
