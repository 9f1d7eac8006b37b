//! JWT payload recognition (SPEC_FULL.md §4.5 "JWT recognition").
//!
//! Adapters never verify a JWT's signature here — vendors issue these tokens, the
//! gateway only needs to peek at the payload to recover user identity when the
//! vendor's introspection API is unreachable.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwtPayload {
    pub sub: Option<String>,
    pub email: Option<String>,
    pub exp: Option<i64>,
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub app_id: Option<String>,
    pub typ: Option<String>,
}

/// A token is treated as a JWT if it begins with `eyJ` and has three dot-separated
/// base64url segments.
pub fn looks_like_jwt(token: &str) -> bool {
    if !token.starts_with("eyJ") {
        return false;
    }
    token.split('.').count() == 3
}

pub fn decode_jwt_payload(token: &str) -> Option<JwtPayload> {
    if !looks_like_jwt(token) {
        return None;
    }
    let middle = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(middle).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_segment(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    #[test]
    fn recognizes_three_segment_eyj_token() {
        let token = format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.sig",
            encode_segment(r#"{"sub":"u1"}"#)
        );
        assert!(looks_like_jwt(&token));
    }

    #[test]
    fn rejects_non_jwt_tokens() {
        assert!(!looks_like_jwt("sk-plain-token"));
        assert!(!looks_like_jwt("eyJ.onlytwo"));
    }

    #[test]
    fn decodes_payload_fields() {
        let payload = encode_segment(r#"{"sub":"user-1","email":"a@b.com","exp":123}"#);
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig");
        let decoded = decode_jwt_payload(&token).unwrap();
        assert_eq!(decoded.sub.as_deref(), Some("user-1"));
        assert_eq!(decoded.email.as_deref(), Some("a@b.com"));
        assert_eq!(decoded.exp, Some(123));
    }
}
