//! Bearer API-key authentication (SPEC_FULL.md §6 "Authentication").
//!
//! Grounded on `gproxy-core/src/auth.rs`'s `extract_api_key` shape, narrowed
//! to the one scheme SPEC_FULL.md documents: `Authorization: Bearer <key>`.
//! The teacher also accepts a bare `x-api-key` header; this gateway doesn't,
//! since nothing in scope here issues keys that way (DESIGN.md).

use openmux_config::RuntimeSettings;

use crate::errors::GatewayError;

/// Checks `authorization_header` (the raw `Authorization` header value, if
/// present) against `settings`. A no-op when key enforcement is disabled.
pub fn authenticate(
    settings: &RuntimeSettings,
    authorization_header: Option<&str>,
) -> Result<(), GatewayError> {
    if !settings.enable_api_key {
        return Ok(());
    }

    let key = authorization_header
        .and_then(extract_bearer)
        .ok_or(GatewayError::Unauthorized)?;

    if settings.api_keys.iter().any(|configured| configured == key) {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized)
    }
}

fn extract_bearer(header: &str) -> Option<&str> {
    let rest = header.strip_prefix("Bearer ").or_else(|| header.strip_prefix("bearer "))?;
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool, keys: &[&str]) -> RuntimeSettings {
        RuntimeSettings {
            enable_api_key: enabled,
            api_keys: keys.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn disabled_enforcement_allows_any_request() {
        let settings = settings(false, &[]);
        assert!(authenticate(&settings, None).is_ok());
    }

    #[test]
    fn missing_header_is_unauthorized_when_enabled() {
        let settings = settings(true, &["sk-1"]);
        assert!(authenticate(&settings, None).is_err());
    }

    #[test]
    fn unknown_key_is_unauthorized() {
        let settings = settings(true, &["sk-1"]);
        assert!(authenticate(&settings, Some("Bearer sk-2")).is_err());
    }

    #[test]
    fn configured_key_is_authorized() {
        let settings = settings(true, &["sk-1"]);
        assert!(authenticate(&settings, Some("Bearer sk-1")).is_ok());
    }
}
