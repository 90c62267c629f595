//! API error types.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vreward_worker::IngestError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    RequestTimeout(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Hide internal error details from clients in production.
    pub fn redact(self, production: bool) -> Self {
        match self {
            ApiError::Internal(_) if production => Self::Internal("An internal error occurred".to_string()),
            other => other,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Oversize { size, max } => {
                Self::PayloadTooLarge(format!("File too large: {} bytes (max: {})", size, max))
            }
            IngestError::InvalidContentType(content_type) => {
                Self::BadRequest(format!("Invalid file type: {}", content_type))
            }
            IngestError::ChunkTimeout(_) => Self::RequestTimeout("File upload timeout".to_string()),
            IngestError::Interrupted(msg) => Self::BadRequest(format!("Upload interrupted: {}", msg)),
            other @ (IngestError::Io(_) | IngestError::Media(_)) => Self::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge("File too large during upload".to_string()),
            status if status.is_server_error() => Self::Internal(err.body_text()),
            _ => Self::BadRequest(err.body_text()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.to_string();
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ingest_errors_map_to_client_statuses() {
        let cases = [
            (IngestError::oversize(200, 100), StatusCode::PAYLOAD_TOO_LARGE),
            (IngestError::InvalidContentType("image/png".into()), StatusCode::BAD_REQUEST),
            (IngestError::ChunkTimeout(Duration::from_secs(10)), StatusCode::REQUEST_TIMEOUT),
            (IngestError::interrupted("reset"), StatusCode::BAD_REQUEST),
            (IngestError::Io(std::io::Error::other("disk")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_detail_messages() {
        let err = ApiError::from(IngestError::InvalidContentType("text/plain".into()));
        assert_eq!(err.to_string(), "Invalid file type: text/plain");
        let err = ApiError::from(IngestError::ChunkTimeout(Duration::from_secs(10)));
        assert_eq!(err.to_string(), "File upload timeout");
    }

    #[test]
    fn test_redact_hides_internal_details_in_production() {
        let err = ApiError::from(IngestError::Io(std::io::Error::other("disk /var/tmp full")));
        assert_eq!(err.redact(true).to_string(), "An internal error occurred");

        let err = ApiError::from(IngestError::Io(std::io::Error::other("disk /var/tmp full")));
        assert!(err.redact(false).to_string().contains("/var/tmp"));

        let err = ApiError::bad_request("Field required: file").redact(true);
        assert_eq!(err.to_string(), "Field required: file");
    }
}
