//! `GatewayError` (SPEC_FULL.md §7): the four-way error taxonomy the forwarder
//! and router share, mapped onto an OpenAI-shaped error body and HTTP status.

use openmux_protocol::{ErrorBody, ErrorKind};
use openmux_provider_core::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("missing or unknown api key")]
    Unauthorized,
    #[error("no available account")]
    NoAvailableAccount,
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn from_provider_error(err: ProviderError) -> Self {
        match err {
            ProviderError::Upstream { status, body } => GatewayError::Upstream {
                status,
                message: String::from_utf8_lossy(&body).into_owned(),
            },
            ProviderError::Timeout(ms) => GatewayError::Upstream {
                status: 504,
                message: format!("request timed out after {ms}ms"),
            },
            other => GatewayError::Internal(other.to_string()),
        }
    }

    /// The HTTP status this error is reported with (§7).
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::Unauthorized => 401,
            GatewayError::NoAvailableAccount => 503,
            GatewayError::Upstream { status, .. } => {
                if *status >= 400 {
                    *status
                } else {
                    500
                }
            }
            GatewayError::Internal(_) => 500,
        }
    }

    /// The OpenAI-shaped error body this error renders as (§6, §7).
    pub fn body(&self) -> ErrorBody {
        match self {
            GatewayError::InvalidRequest(message) => {
                ErrorBody::new(ErrorKind::InvalidRequestError, message.clone())
            }
            GatewayError::Unauthorized => {
                ErrorBody::new(ErrorKind::InvalidApiKey, "invalid or missing api key")
            }
            GatewayError::NoAvailableAccount => {
                ErrorBody::new(ErrorKind::ServiceUnavailableError, "no available account")
                    .with_code("no_available_account")
            }
            GatewayError::Upstream { message, .. } => {
                ErrorBody::new(ErrorKind::ApiError, message.clone())
            }
            GatewayError::Internal(message) => {
                ErrorBody::new(ErrorKind::InternalError, message.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_available_account_reports_503_with_stable_code() {
        let err = GatewayError::NoAvailableAccount;
        assert_eq!(err.status(), 503);
        assert_eq!(err.body().error.code.as_deref(), Some("no_available_account"));
    }

    #[test]
    fn upstream_429_is_reported_verbatim() {
        let err = GatewayError::from_provider_error(ProviderError::Upstream {
            status: 429,
            body: bytes::Bytes::from_static(b"rate limited"),
        });
        assert_eq!(err.status(), 429);
    }

    #[test]
    fn provider_transport_error_becomes_internal_500() {
        let err = GatewayError::from_provider_error(ProviderError::Transport("boom".into()));
        assert_eq!(err.status(), 500);
    }
}
