//! Errors raised by the external provider clients.

use async_openai::error::OpenAIError;

/// Any failure of an external call: network, non-2xx status, or a response
/// that does not carry what the caller needs.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} provider is not configured")]
    NotConfigured(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion request failed: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}
