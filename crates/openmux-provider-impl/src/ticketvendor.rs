//! Cookie-ticket vendor (SPEC_FULL.md §4.5, §6): credential shape
//! `{ ticket }`, authenticated via a session cookie plus the
//! timestamp-mangling request signature (§4.5 "Vendor-specific signing",
//! first algorithm). A reverse-engineered consumer chat endpoint, not a
//! native OpenAI API — its stream is routed through the transformer rather
//! than passed straight through.

use async_trait::async_trait;
use serde_json::Value;

use openmux_common::signing::{self, TICKET_VENDOR_SECRET};
use openmux_protocol::ChatCompletionRequest;
use openmux_provider_core::{
    AccountInfo, Credential, CredentialBag, ForwardResult, Provider, ProviderError, ProviderResult,
    TokenValidation,
};

use crate::shared::{http_client, wrap_response};

const PROVIDER_NAME: &str = "ticketvendor";

pub struct TicketVendorProvider {
    base_url: String,
}

impl TicketVendorProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn ticket<'a>(&self, credentials: &'a CredentialBag) -> ProviderResult<&'a str> {
        credentials
            .get("ticket")
            .map(String::as_str)
            .ok_or_else(|| ProviderError::InvalidCredential("missing ticket".to_string()))
    }

    fn signed_request(&self, path: &str) -> (String, String, String, String) {
        let now = signing::now_millis();
        let nonce = signing::random_hex_nonce(16);
        let sig = signing::sign_timestamp_mangled(now, TICKET_VENDOR_SECRET, &nonce);
        (
            format!("{}{}", self.base_url, path),
            sig.timestamp,
            sig.nonce,
            sig.sign,
        )
    }
}

#[async_trait]
impl Provider for TicketVendorProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn validate_token(&self, credentials: &CredentialBag) -> TokenValidation {
        let Ok(ticket) = self.ticket(credentials) else {
            return TokenValidation::rejected("missing ticket");
        };
        let (url, timestamp, nonce, sign) = self.signed_request("/v1/user/info");
        let response = http_client()
            .get(url)
            .header("Cookie", format!("ticket={ticket}"))
            .header("X-Timestamp", timestamp)
            .header("X-Nonce", nonce)
            .header("X-Sign", sign)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => {
                let info = resp
                    .json::<Value>()
                    .await
                    .ok()
                    .map(|body| AccountInfo {
                        user_id: body.get("id").and_then(Value::as_str).map(str::to_string),
                        email: body.get("email").and_then(Value::as_str).map(str::to_string),
                        name: body.get("nickname").and_then(Value::as_str).map(str::to_string),
                        is_guest: body
                            .get("is_guest")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    })
                    .unwrap_or_default();
                let phone = info.user_id.as_deref();
                if info.is_guest_account(phone) {
                    return TokenValidation::rejected(openmux_provider_core::GUEST_ACCOUNT_ERROR);
                }
                TokenValidation::ok(info)
            }
            Ok(resp) => TokenValidation::rejected(format!("validation failed with {}", resp.status())),
            Err(err) => TokenValidation::rejected(err.to_string()),
        }
    }

    async fn refresh_token(&self, _credentials: &CredentialBag) -> ProviderResult<Option<Credential>> {
        Ok(None)
    }

    async fn forward_chat_completion(
        &self,
        request: &ChatCompletionRequest,
        credentials: &CredentialBag,
        actual_model: &str,
    ) -> ProviderResult<ForwardResult> {
        let ticket = self.ticket(credentials)?;
        let mut body = serde_json::to_value(request)
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        body["model"] = Value::String(actual_model.to_string());
        let is_stream = request.stream.unwrap_or(false);

        let (url, timestamp, nonce, sign) = self.signed_request("/v1/chat/stream");
        let response = http_client()
            .post(url)
            .header("Cookie", format!("ticket={ticket}"))
            .header("X-Timestamp", timestamp)
            .header("X-Nonce", nonce)
            .header("X-Sign", sign)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        wrap_response(response, is_stream, false).await
    }

    async fn get_account_info(&self, credentials: &CredentialBag) -> ProviderResult<Option<AccountInfo>> {
        Ok(self.validate_token(credentials).await.account_info)
    }
}
