//! Upload ingestion error types.

use std::time::Duration;
use thiserror::Error;
use vreward_media::MediaError;

/// Result type for ingestion.
pub type IngestResult<T> = Result<T, IngestError>;

/// Ways an upload can be rejected before scoring starts.
///
/// Everything after ingestion degrades to a zero reward instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("File too large: {size} bytes exceeds limit of {max} bytes")]
    Oversize { size: u64, max: u64 },

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Upload stalled: no data received for {}s", .0.as_secs())]
    ChunkTimeout(Duration),

    #[error("Upload interrupted: {0}")]
    Interrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl IngestError {
    pub fn oversize(size: u64, max: u64) -> Self {
        Self::Oversize { size, max }
    }

    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::Interrupted(msg.into())
    }

    /// Whether the client caused the rejection.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::Oversize { .. }
                | IngestError::InvalidContentType(_)
                | IngestError::ChunkTimeout(_)
                | IngestError::Interrupted(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Oversize { .. } => "oversize",
            IngestError::InvalidContentType(_) => "invalid_content_type",
            IngestError::ChunkTimeout(_) => "timeout",
            IngestError::Interrupted(_) => "interrupted",
            IngestError::Io(_) | IngestError::Media(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = IngestError::oversize(200, 100);
        assert_eq!(err.to_string(), "File too large: 200 bytes exceeds limit of 100 bytes");
        assert!(err.is_client_error());

        let err = IngestError::ChunkTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "Upload stalled: no data received for 10s");
        assert_eq!(err.kind(), "timeout");

        let err = IngestError::from(std::io::Error::other("disk full"));
        assert!(!err.is_client_error());
    }
}
