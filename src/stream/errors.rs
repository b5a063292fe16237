//! Stream-layer error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the remote agent service.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// TCP/HTTP connection to the agent endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not respond within the configured timeout.
    #[error("agent request timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the agent endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Reading the response body failed mid-stream.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// The response body closed before a terminal `done`/`error` record.
    #[error("stream ended before a terminal event")]
    StreamEnded,
}

impl TransportError {
    /// Stable machine-readable code surfaced in broadcasts.
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            TransportError::Timeout { .. } => "TRANSPORT_ERROR",
            TransportError::HttpError { .. } => "HTTP_ERROR",
            TransportError::StreamError { .. } => "TRANSPORT_ERROR",
            TransportError::StreamEnded => "STREAM_ENDED",
        }
    }

    /// Convert a `reqwest` failure into a transport error for `endpoint`.
    pub(crate) fn from_reqwest(endpoint: &str, err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                duration_secs: timeout_secs,
            }
        } else {
            TransportError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Why a single stream record was dropped.
///
/// Never fatal: the decoder logs it and moves on to the next record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Neither an `event:` line nor a `type` field in the data.
    #[error("record has no event type")]
    MissingEventType,

    /// An `event:` line without any `data:` line.
    #[error("record '{event_type}' has no data")]
    MissingData { event_type: String },

    /// The `data:` content is not valid JSON.
    #[error("invalid JSON in record data: {reason}")]
    InvalidJson { reason: String },

    /// The data is valid JSON but not an object.
    #[error("record '{event_type}' data is not an object")]
    NotAnObject { event_type: String },

    /// The event type is not part of the protocol.
    #[error("unknown event type '{event_type}'")]
    UnknownEventType { event_type: String },

    /// The data object lacks fields the event type requires.
    #[error("invalid '{event_type}' payload: {reason}")]
    InvalidPayload { event_type: String, reason: String },
}
