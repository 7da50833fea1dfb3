//! Error taxonomy (spec §7). Tool failures are never errors here — they are
//! surfaced as `ok:false` tool-result turns inside the conversation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("provider unavailable: provider={provider} reason={reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("session busy: {0}")]
    SessionBusy(String),

    #[error("upstream timeout after {0:?}")]
    UpstreamTimeout(std::time::Duration),
}

impl RuntimeError {
    /// The stable `type` tag used in `{error:{type,message}}` bodies (spec §7).
    pub fn type_tag(&self) -> &'static str {
        match self {
            RuntimeError::Config(_) => "config",
            RuntimeError::ProviderNotFound(_) => "provider_not_found",
            RuntimeError::ProviderUnavailable { .. } => "provider_unavailable",
            RuntimeError::BadRequest(_) => "bad_request",
            RuntimeError::SessionBusy(_) => "session_busy",
            RuntimeError::UpstreamTimeout(_) => "upstream_timeout",
        }
    }

    /// The HTTP status this error maps to, per spec §7.
    pub fn status_code(&self) -> u16 {
        match self {
            RuntimeError::Config(_) => 500,
            RuntimeError::ProviderNotFound(_) | RuntimeError::ProviderUnavailable { .. } => 502,
            RuntimeError::BadRequest(_) => 400,
            RuntimeError::SessionBusy(_) => 409,
            RuntimeError::UpstreamTimeout(_) => 504,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
