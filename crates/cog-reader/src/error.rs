//! Error types for COG reading.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CogError {
    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Invalid TIFF: {0}")]
    InvalidTiff(String),

    #[error("Unsupported TIFF layout: {0}")]
    Unsupported(String),

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(u16),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Decompression failed: {0}")]
    Decompress(String),

    #[error("Tile {z}/{x}/{y} is outside the bounds of {asset}")]
    TileOutsideBounds { z: u32, x: u32, y: u32, asset: String },

    #[error("Decode task failed: {0}")]
    Task(String),
}

impl CogError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CogError::InvalidTiff(msg.into())
    }
}

impl From<reqwest::Error> for CogError {
    fn from(e: reqwest::Error) -> Self {
        CogError::Transport(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CogError {
    fn from(e: tokio::task::JoinError) -> Self {
        CogError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CogError>;
