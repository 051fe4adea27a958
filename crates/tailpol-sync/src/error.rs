use thiserror::Error;

/// Errors from pushing the policy document to the Tailscale API.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The API answered with a non-success status.
    #[error("remote rejected policy with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The OAuth client credentials could not be exchanged for a token.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The request never completed (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sanitized document could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The document could not be read from the store.
    #[error("store error: {0}")]
    Store(#[from] tailpol_store::StoreError),
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
