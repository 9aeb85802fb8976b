//! Provider error types.

use thiserror::Error;

/// Errors surfaced before a token stream starts.
///
/// Once a stream is handed out, failures are delivered in-band as a final
/// diagnostic fragment instead.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("provider '{0}' requires an api key and none is configured")]
    MissingApiKey(String),
}
