//! `ProviderError` (SPEC_FULL.md §4.4, §4.5, §7): the error taxonomy a vendor
//! adapter surfaces to the forwarder, which maps it onto an OpenAI-shaped
//! error body and HTTP status.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("credential rejected: {0}")]
    InvalidCredential(String),

    #[error("account disabled: {0}")]
    AccountDisabled(String),

    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The upstream returned a non-2xx response; carries its status and body
    /// so the forwarder can decide whether to treat it as a failure-window
    /// event (§4.3: a 429 never counts).
    #[error("upstream returned HTTP {status}")]
    Upstream { status: u16, body: bytes::Bytes },

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Whether this error should count toward the balancer's failure window
    /// (§4.3: "a 429 response never counts as a failure").
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, ProviderError::Upstream { status: 429, .. })
    }
}
