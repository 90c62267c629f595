//! Streaming upload ingestion into a scoped temp file.
//!
//! Limits are checked before the temp file exists (declared size, content
//! type) and again while streaming (running total, per-chunk wait). A
//! rejected upload leaves nothing on disk.

use std::fmt::Display;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;
use vreward_media::{TempArtifact, TempMediaStore};
use vreward_models::EpisodeKey;

use crate::error::{IngestError, IngestResult};

/// Upload limits.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestLimits {
    /// Maximum upload size in bytes
    pub max_bytes: u64,
    /// Maximum wait for the next chunk
    pub chunk_timeout: Duration,
    /// Write buffer size
    pub buffer_size: usize,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            chunk_timeout: Duration::from_secs(10),
            buffer_size: 1024 * 1024,
        }
    }
}

/// Metadata sent alongside the upload body.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub episode: EpisodeKey,
    /// Size announced by the client; 0 when unknown
    pub declared_size: u64,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

impl UploadRequest {
    pub fn new(episode: EpisodeKey) -> Self {
        Self {
            episode,
            declared_size: 0,
            content_type: None,
            filename: None,
        }
    }

    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = size;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A fully received upload, owned by exactly one request.
#[derive(Debug)]
pub struct UploadArtifact {
    pub artifact: TempArtifact,
    /// Bytes written
    pub size: u64,
    pub episode: EpisodeKey,
    pub filename: Option<String>,
}

/// Checks that need no body: declared size and content type.
///
/// A missing or empty content type is accepted.
pub fn precheck(request: &UploadRequest, limits: &IngestLimits) -> IngestResult<()> {
    if request.declared_size > limits.max_bytes {
        return Err(IngestError::oversize(request.declared_size, limits.max_bytes));
    }
    if let Some(content_type) = request.content_type.as_deref().filter(|t| !t.is_empty()) {
        if !content_type.starts_with("video/") {
            return Err(IngestError::InvalidContentType(content_type.to_string()));
        }
    }
    Ok(())
}

/// Stream `body` into a new temp file from `store`.
pub async fn ingest<S, E>(
    store: &TempMediaStore,
    limits: &IngestLimits,
    request: &UploadRequest,
    body: S,
) -> IngestResult<UploadArtifact>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    precheck(request, limits)?;

    let artifact = store.acquire(".mp4")?;
    match write_body(&artifact, limits, body).await {
        Ok(size) => {
            debug!(
                episode = request.episode.episode_number,
                attempt = request.episode.attempt_number,
                path = %artifact.path().display(),
                size,
                "Upload written to temp file"
            );
            Ok(UploadArtifact {
                artifact,
                size,
                episode: request.episode,
                filename: request.filename.clone(),
            })
        }
        Err(e) => {
            artifact.cleanup().await;
            Err(e)
        }
    }
}

async fn write_body<S, E>(artifact: &TempArtifact, limits: &IngestLimits, body: S) -> IngestResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut writer = BufWriter::with_capacity(limits.buffer_size, artifact.writer().await?);
    let mut total: u64 = 0;

    loop {
        let chunk = match tokio::time::timeout(limits.chunk_timeout, body.next()).await {
            Err(_) => return Err(IngestError::ChunkTimeout(limits.chunk_timeout)),
            Ok(None) => break,
            Ok(Some(Err(e))) => return Err(IngestError::interrupted(e.to_string())),
            Ok(Some(Ok(chunk))) => chunk,
        };

        total += chunk.len() as u64;
        if total > limits.max_bytes {
            return Err(IngestError::oversize(total, limits.max_bytes));
        }
        writer.write_all(&chunk).await?;
    }

    writer.flush().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tempfile::TempDir;

    fn limits(max_bytes: u64) -> IngestLimits {
        IngestLimits {
            max_bytes,
            ..IngestLimits::default()
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(parts.iter().map(|p| Ok(Bytes::from_static(p))).collect::<Vec<_>>())
    }

    #[test]
    fn test_precheck_content_type() {
        let request = UploadRequest::new(EpisodeKey::new(1, 1));
        assert!(precheck(&request, &limits(10)).is_ok());
        assert!(precheck(&request.clone().with_content_type("video/mp4"), &limits(10)).is_ok());
        assert!(precheck(&request.clone().with_content_type(""), &limits(10)).is_ok());

        let err = precheck(&request.with_content_type("image/png"), &limits(10)).unwrap_err();
        assert!(matches!(err, IngestError::InvalidContentType(ref t) if t == "image/png"));
    }

    #[tokio::test]
    async fn test_ingest_writes_all_chunks() {
        let dir = TempDir::new().unwrap();
        let store = TempMediaStore::new(dir.path());
        let request = UploadRequest::new(EpisodeKey::new(3, 1)).with_filename("clip.mp4");

        let upload = ingest(&store, &limits(100), &request, chunks(&[b"hello ", b"world"]))
            .await
            .unwrap();

        assert_eq!(upload.size, 11);
        assert_eq!(upload.filename.as_deref(), Some("clip.mp4"));
        assert_eq!(std::fs::read(upload.artifact.path()).unwrap(), b"hello world");

        upload.artifact.cleanup().await;
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declared_oversize_creates_no_file() {
        let dir = TempDir::new().unwrap();
        let store = TempMediaStore::new(dir.path().join("work"));
        let request = UploadRequest::new(EpisodeKey::new(3, 1)).with_declared_size(101);

        let err = ingest(&store, &limits(100), &request, chunks(&[b"x"])).await.unwrap_err();
        assert!(matches!(err, IngestError::Oversize { size: 101, max: 100 }));
        assert!(!dir.path().join("work").exists());
    }

    #[tokio::test]
    async fn test_interrupted_stream_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = TempMediaStore::new(dir.path());
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ]);

        let err = ingest(&store, &limits(100), &UploadRequest::new(EpisodeKey::new(1, 1)), body)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Interrupted(ref m) if m.contains("connection reset")));
        assert!(store.list().unwrap().is_empty());
    }
}
