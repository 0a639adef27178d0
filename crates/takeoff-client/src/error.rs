//! Error types for node API calls.

use thiserror::Error;

/// Errors surfaced by [`crate::ApiClient`].
///
/// The client never retries and never masks a failure. Callers that do retry
/// (the health prober) use [`ClientError::is_retryable`] to decide.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, DNS failure, reset, malformed HTTP.
    #[error("transport error: {0}")]
    Transport(Box<ureq::Transport>),

    /// The node answered with a non-2xx status.
    #[error("node responded {code}: {body}")]
    Status { code: u16, body: String },

    /// The node answered 2xx but the body is not the expected JSON.
    #[error("invalid JSON response ({source}): {body}")]
    Decode {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// Request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// Reading the response body failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Base URL is not an `http(s)://` URL.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Result type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Whether repeating the same request may succeed.
    ///
    /// Transient network conditions and 5xx answers are retryable. A 4xx answer,
    /// a bad URL or a 2xx body that is not JSON points at misconfiguration and is
    /// reported as fatal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(transport) => matches!(
                transport.kind(),
                ureq::ErrorKind::Dns
                    | ureq::ErrorKind::ConnectionFailed
                    | ureq::ErrorKind::Io
                    | ureq::ErrorKind::BadStatus
                    | ureq::ErrorKind::ProxyConnect
            ),
            ClientError::Status { code, .. } => *code >= 500,
            ClientError::Io(_) => true,
            ClientError::Decode { .. }
            | ClientError::Encode(_)
            | ClientError::InvalidBaseUrl(_) => false,
        }
    }

    /// HTTP status code, when the node answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ureq::Transport> for ClientError {
    fn from(transport: ureq::Transport) -> Self {
        ClientError::Transport(Box::new(transport))
    }
}
