//! Generation API providers
//!
//! A provider turns one `UpstreamRequest` into a raw byte stream. Decoding
//! the stream is the orchestrator's job, so providers stay thin.

mod gemini;
pub mod types;

pub use gemini::GeminiProvider;
pub use types::{Modality, UpstreamRequest};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::network::TimeoutError;

/// Raw response body of one upstream request
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Upstream request errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request failed to establish or broke mid-stream
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Error object embedded in the response stream
    #[error("API error: {message}")]
    Api { code: Option<i64>, message: String },

    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    #[error("Malformed stream: {0}")]
    MalformedStream(String),
}

impl UpstreamError {
    pub fn connection(message: impl std::fmt::Display) -> Self {
        Self::Connection(message.to_string())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedStream(message.into())
    }

    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::MalformedStream(error.to_string())
        } else {
            Self::Connection(error.to_string())
        }
    }
}

/// Source of generation byte streams
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Start one streaming generation request
    ///
    /// Resolves once response headers arrive; the body is consumed through
    /// the returned stream.
    async fn stream_generate(&self, request: &UpstreamRequest) -> Result<ByteStream, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UpstreamError::Api {
            code: Some(400),
            message: "Invalid prompt".to_string(),
        };
        assert_eq!(err.to_string(), "API error: Invalid prompt");

        let err = UpstreamError::from(TimeoutError { timeout_ms: 10 });
        assert_eq!(err.to_string(), "Request timed out after 10ms");
    }
}
