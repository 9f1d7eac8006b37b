//! Plumbing shared by all five vendor adapters: the cached `wreq` client, the
//! response-to-`ForwardResult` wrapper, and the guest-account/composite-token
//! helpers the adapters that need them call into.

use std::sync::OnceLock;

use bytes::Bytes;
use futures_util::StreamExt;

use openmux_provider_core::{ForwardOutcome, ForwardResult, ProviderError, ProviderResult};

static SHARED_CLIENT: OnceLock<wreq::Client> = OnceLock::new();

/// One `wreq::Client` per process, shared by every adapter instance, matching
/// the teacher's cached-client-per-kind discipline without the proxy-keyed
/// cache map this gateway has no use for (no outbound-proxy config surface).
pub fn http_client() -> &'static wreq::Client {
    SHARED_CLIENT.get_or_init(|| {
        wreq::Client::builder()
            .build()
            .expect("failed to build the shared upstream http client")
    })
}

/// Turns a `wreq::Response` into a `ForwardResult`: a non-2xx status becomes
/// `ProviderError::Upstream` (the forwarder decides whether it counts toward
/// the failure window, §4.3); a 2xx either buffers the body or relays it
/// through a channel, per `stream`.
pub async fn wrap_response(
    response: wreq::Response,
    stream: bool,
    skip_transform: bool,
) -> ProviderResult<ForwardResult> {
    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response
            .bytes()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        return Err(ProviderError::Upstream { status, body });
    }

    if stream {
        let (tx, rx) = tokio::sync::mpsc::channel::<openmux_provider_core::StreamItem>(256);
        let mut body_stream = response.bytes_stream();
        tokio::spawn(async move {
            while let Some(item) = body_stream.next().await {
                match item {
                    Ok(chunk) => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err.to_string())).await;
                        break;
                    }
                }
            }
        });
        Ok(ForwardResult {
            outcome: ForwardOutcome::Stream {
                body: rx,
                skip_transform,
            },
            status,
        })
    } else {
        let body = response
            .bytes()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        Ok(ForwardResult {
            outcome: ForwardOutcome::Buffered {
                body,
                skip_transform,
            },
            status,
        })
    }
}

/// The stable mojibake string a guest session carries in place of a display
/// name for the composite-jwt vendor (§4.5, §9 — preserved verbatim; this is
/// a cargo-culted vendor quirk, not a string we get to clean up).
pub const GUEST_DISPLAY_NAME_MOJIBAKE: &str = "шо┐хов";

/// Splits a composite `realUserID+jwt` credential on the first `+`; when
/// absent, derives `realUserID` from the JWT payload's `user_id`, `id`, or
/// `sub` field, in that order (§4.5 "Tokens as composites").
pub fn split_composite_token(raw: &str) -> (String, String) {
    if let Some((user_id, jwt)) = raw.split_once('+') {
        return (user_id.to_string(), jwt.to_string());
    }
    let user_id = openmux_common::decode_jwt_payload(raw)
        .and_then(|payload| payload.user_id.or(payload.id).or(payload.sub))
        .unwrap_or_default();
    (user_id, raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_token_splits_on_first_plus() {
        let (user_id, jwt) = split_composite_token("user-1+eyJ.payload.sig");
        assert_eq!(user_id, "user-1");
        assert_eq!(jwt, "eyJ.payload.sig");
    }

    #[test]
    fn composite_token_without_plus_derives_user_id_from_jwt() {
        use base64::Engine;
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"user_id":"derived-1"}"#);
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig");
        let (user_id, jwt) = split_composite_token(&token);
        assert_eq!(user_id, "derived-1");
        assert_eq!(jwt, token);
    }
}
