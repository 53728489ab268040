use thiserror::Error;

/// All errors generated on the upstream feed path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("invalid feed url: {0}")]
    Url(#[from] url::ParseError),

    #[error("SocketError: {0}")]
    Socket(String),

    #[error("failed to parse upstream frame: {0}")]
    Parse(String),
}

impl FeedError {
    /// Determine if an error requires the supervisor to tear down the
    /// connection and re-enter backoff.
    pub fn is_terminal(&self) -> bool {
        match self {
            FeedError::Socket(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("closed")
                    || msg.contains("terminated")
                    || msg.contains("io(")
                    || msg.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(value.to_string())
    }
}

/// Errors surfaced by the durable alert store boundary.
///
/// Store failures degrade durability only; the in-memory alert state stays
/// authoritative regardless of the outcome of any store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
