//! Stx sync error module

/// Transport errors.
///
/// Classified by the transport itself so callers never inspect error messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("network request failed. {0}")]
    Network(String),
    /// The request did not complete in time.
    #[error("network request timed out. {0}")]
    Timeout(String),
}

/// Errors that may occur while fetching a collection page or any other resource from the server.
///
/// Cheap to clone so every caller joined onto one in-flight fetch receives the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Transport error.
    #[error("server request failed. {0}")]
    Transport(#[from] TransportError),
    /// Server responded with a non-2xx status.
    #[error("server responded with status {status}. {status_text}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Reason phrase or body returned with the status
        status_text: String,
    },
    /// Server returned a body that could not be decoded.
    #[error("server returned invalid data. {0}")]
    InvalidResponse(String),
    /// The collection was unsubscribed before the response arrived.
    #[error("collection subscription has ended.")]
    Unsubscribed,
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidResponse(value.to_string())
    }
}
