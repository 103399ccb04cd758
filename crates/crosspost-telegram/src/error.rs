use thiserror::Error;

/// Errors returned by the messaging collaborator.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Network, TLS or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote side rejected the call (permissions, flood wait, unknown peer...).
    #[error("remote call failed with status {status}: {message}")]
    Rpc { status: u16, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid gateway base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
