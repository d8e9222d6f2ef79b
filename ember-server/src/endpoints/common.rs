//! Common facilities for ingest endpoints.

use std::time::Duration;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use ember_profiling::{DecodeError, ParseError};

use crate::context::DeadlineExceeded;
use crate::services::consumer::ConsumerError;
use crate::utils::{MultipartError, ParamError};

/// An error that rejects an ingest request.
///
/// The `Display` message is returned to the client as the plain text response body.
#[derive(Debug, thiserror::Error)]
pub enum BadIngestRequest {
    /// The query string is incomplete or malformed.
    #[error(transparent)]
    InvalidParams(#[from] ParamError),

    /// The request method is not `POST`.
    #[error("method not allowed, supported: [POST]")]
    MethodNotAllowed,

    /// No parser is registered for the requested format.
    #[error("unsupported format, supported: [{0}]")]
    UnsupportedFormat(String),

    /// The body does not contain the expected file part.
    #[error(transparent)]
    InvalidMultipart(#[from] MultipartError),

    /// The file part is not valid gzip or exceeds the size limit.
    #[error("failed to decompress body: {0}")]
    Decompression(#[from] DecodeError),

    /// The parser rejected the recording.
    #[error("failed to parse profile: {0}")]
    Parse(#[from] ParseError),

    /// The downstream consumer failed.
    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    /// The request did not complete within the configured timeout.
    #[error("request timeout elapsed: {0:?}")]
    Timeout(Duration),

    /// Processing observed the elapsed deadline.
    #[error(transparent)]
    DeadlineExceeded(#[from] DeadlineExceeded),

    /// The processing task panicked or was aborted.
    #[error("failed to process request")]
    Internal(#[source] tokio::task::JoinError),
}

impl BadIngestRequest {
    /// The HTTP status code of the response.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParams(_)
            | Self::UnsupportedFormat(_)
            | Self::InvalidMultipart(_)
            | Self::Decompression(_)
            | Self::Parse(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Timeout(_) | Self::DeadlineExceeded(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Consumer(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A stable tag identifying the kind of error, used in metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "invalid_params",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::InvalidMultipart(_) => "invalid_multipart",
            Self::Decompression(_) => "decompression_failed",
            Self::Parse(_) => "parse_failed",
            Self::Consumer(_) => "consumer_failed",
            Self::Timeout(_) | Self::DeadlineExceeded(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for BadIngestRequest {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref())],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                BadIngestRequest::InvalidParams(ParamError::MissingStart),
                StatusCode::BAD_REQUEST,
                "required start time is missing",
            ),
            (
                BadIngestRequest::MethodNotAllowed,
                StatusCode::METHOD_NOT_ALLOWED,
                "method not allowed, supported: [POST]",
            ),
            (
                BadIngestRequest::UnsupportedFormat("jfr".to_owned()),
                StatusCode::BAD_REQUEST,
                "unsupported format, supported: [jfr]",
            ),
            (
                BadIngestRequest::InvalidMultipart(MultipartError::MissingPart("jfr".to_owned())),
                StatusCode::BAD_REQUEST,
                "required jfr part is missing",
            ),
            (
                BadIngestRequest::Decompression(DecodeError::TooLarge(10)),
                StatusCode::BAD_REQUEST,
                "failed to decompress body: decompressed size exceeds the limit of 10 bytes",
            ),
            (
                BadIngestRequest::Timeout(Duration::from_secs(10)),
                StatusCode::REQUEST_TIMEOUT,
                "request timeout elapsed: 10s",
            ),
            (
                BadIngestRequest::Consumer(ConsumerError::Status(StatusCode::BAD_GATEWAY)),
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream responded with 502 Bad Gateway",
            ),
        ];

        for (error, status, message) in cases {
            assert_eq!(error.status(), status);
            assert_eq!(error.to_string(), message);
        }
    }

    #[test]
    fn test_into_response() {
        let response = BadIngestRequest::MethodNotAllowed.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
