use thiserror::Error;

/// All errors generated in `market-sync`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SyncError {
    #[error("invalid endpoint url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported push url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("push handshake failed: {0}")]
    Handshake(String),

    #[error("push channel error: {0}")]
    Socket(String),

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("fetch failed ({endpoint}): {reason}")]
    Fetch { endpoint: String, reason: String },
}

impl SyncError {
    /// Determine if an error ends the current push connection.
    ///
    /// Frame and fetch errors are recovered in place and never touch
    /// connection health.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, SyncError::Handshake(_) | SyncError::Socket(_))
    }

    pub(crate) fn fetch(endpoint: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::Frame(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(value.to_string())
    }
}
