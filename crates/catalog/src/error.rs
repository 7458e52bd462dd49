use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog answered with a non-success status.
    #[error("catalog returned HTTP {status}: {body}")]
    Unavailable { status: u16, body: String },

    #[error("catalog request failed: {0}")]
    Transport(String),

    #[error("malformed catalog response: {0}")]
    Malformed(String),
}

impl CatalogError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Unavailable { status, .. } => *status >= 500 || *status == 429,
            CatalogError::Transport(_) => true,
            CatalogError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        CatalogError::Transport(err.to_string())
    }
}
