//! Byte-range access to local and remote files.
//!
//! A COG is never downloaded whole: the reader asks its source for the
//! header and then for the individual compressed tiles it needs.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{CogError, Result};

/// Random access to the bytes of one file.
///
/// `read_range` may return fewer than `len` bytes when the range runs past
/// the end of the file.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Human-readable location, used in logs and errors.
    fn location(&self) -> &str;

    /// Total size in bytes, when the backend can tell cheaply.
    async fn len(&self) -> Result<Option<u64>>;

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Range requests against an HTTP(S) URL.
pub struct HttpRangeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpRangeSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    fn location(&self) -> &str {
        &self.url
    }

    async fn len(&self) -> Result<Option<u64>> {
        let resp = self.client.head(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(CogError::Http {
                status: resp.status().as_u16(),
                url: self.url.clone(),
            });
        }
        Ok(resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok()))
    }

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let range = format!("bytes={}-{}", offset, offset + len - 1);
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, range)
            .send()
            .await?;

        let status = resp.status();
        match status {
            reqwest::StatusCode::PARTIAL_CONTENT => Ok(resp.bytes().await?),
            // Server ignored the Range header and sent the whole file.
            reqwest::StatusCode::OK => {
                let body = resp.bytes().await?;
                let start = (offset as usize).min(body.len());
                let end = (offset.saturating_add(len) as usize).min(body.len());
                Ok(body.slice(start..end))
            }
            reqwest::StatusCode::RANGE_NOT_SATISFIABLE => Ok(Bytes::new()),
            _ => Err(CogError::Http {
                status: status.as_u16(),
                url: self.url.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Local file
// ---------------------------------------------------------------------------

/// Seek-and-read on a local file. The file is reopened per request so the
/// source can be shared freely between tasks.
pub struct FileRangeSource {
    path: PathBuf,
    display: String,
}

impl FileRangeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display = path.display().to_string();
        Self { path, display }
    }

    fn io_error(&self, e: std::io::Error) -> CogError {
        CogError::Io {
            path: self.display.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl RangeSource for FileRangeSource {
    fn location(&self) -> &str {
        &self.display
    }

    async fn len(&self) -> Result<Option<u64>> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(Some(meta.len()))
    }

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| self.io_error(e))?;

        let mut buf = Vec::with_capacity(len.min(16 * 1024 * 1024) as usize);
        file.take(len)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(Bytes::from(buf))
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

/// A file held entirely in memory.
pub struct MemorySource {
    name: String,
    data: Bytes,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl RangeSource for MemorySource {
    fn location(&self) -> &str {
        &self.name
    }

    async fn len(&self) -> Result<Option<u64>> {
        Ok(Some(self.data.len() as u64))
    }

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        let start = (offset as usize).min(self.data.len());
        let end = (offset.saturating_add(len) as usize).min(self.data.len());
        Ok(self.data.slice(start..end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source_clamps_to_end() {
        let src = MemorySource::new("mem", vec![1u8, 2, 3, 4, 5]);
        assert_eq!(src.len().await.unwrap(), Some(5));
        assert_eq!(&src.read_range(1, 2).await.unwrap()[..], &[2, 3]);
        assert_eq!(&src.read_range(3, 100).await.unwrap()[..], &[4, 5]);
        assert!(src.read_range(10, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_source_reads_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, (0u8..64).collect::<Vec<_>>()).unwrap();

        let src = FileRangeSource::new(&path);
        assert_eq!(src.len().await.unwrap(), Some(64));
        assert_eq!(&src.read_range(60, 10).await.unwrap()[..], &[60, 61, 62, 63]);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let src = FileRangeSource::new("/definitely/not/here.tif");
        assert!(matches!(src.read_range(0, 8).await, Err(CogError::Io { .. })));
    }
}
