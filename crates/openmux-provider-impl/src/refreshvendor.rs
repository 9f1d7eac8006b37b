//! Refresh-token vendor (SPEC_FULL.md §4.5, §6): credential shape
//! `{ refresh_token }`; `refreshToken` exchanges it for `{ access_token,
//! refresh_token }`. The forwarder is responsible for calling `refresh_token`
//! and folding the result back into the account's credential bag before
//! `forward_chat_completion` runs (§7 "Refresh failures" — a failed refresh
//! does not itself fail the in-flight request).

use async_trait::async_trait;
use serde_json::Value;

use openmux_protocol::ChatCompletionRequest;
use openmux_provider_core::{
    AccountInfo, Credential, CredentialBag, CredentialKind, ForwardResult, Provider, ProviderError,
    ProviderResult, TokenValidation,
};

use crate::shared::{http_client, wrap_response};

const PROVIDER_NAME: &str = "refreshvendor";

pub struct RefreshVendorProvider {
    base_url: String,
}

impl RefreshVendorProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Provider for RefreshVendorProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn validate_token(&self, credentials: &CredentialBag) -> TokenValidation {
        let Some(access_token) = credentials.get("access_token") else {
            return TokenValidation::rejected("missing access_token");
        };
        let response = http_client()
            .get(format!("{}/v1/me", self.base_url))
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => {
                let info = resp
                    .json::<Value>()
                    .await
                    .ok()
                    .map(parse_account_info)
                    .unwrap_or_default();
                if info.is_guest_account(None) {
                    return TokenValidation::rejected(openmux_provider_core::GUEST_ACCOUNT_ERROR);
                }
                TokenValidation::ok(info)
            }
            Ok(resp) => TokenValidation::rejected(format!("validation failed with {}", resp.status())),
            Err(err) => TokenValidation::rejected(err.to_string()),
        }
    }

    async fn refresh_token(&self, credentials: &CredentialBag) -> ProviderResult<Option<Credential>> {
        let Some(refresh_token) = credentials.get("refresh_token") else {
            return Ok(None);
        };
        let response = http_client()
            .post(format!("{}/v1/oauth/token", self.base_url))
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Other("refresh response missing access_token".to_string()))?;
        let next_refresh_token = body
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(refresh_token.clone()));

        Ok(Some(Credential {
            kind: CredentialKind::Access,
            value: access_token.to_string(),
            refresh_token: next_refresh_token,
            expires_at: body.get("expires_at").and_then(Value::as_i64),
        }))
    }

    async fn forward_chat_completion(
        &self,
        request: &ChatCompletionRequest,
        credentials: &CredentialBag,
        actual_model: &str,
    ) -> ProviderResult<ForwardResult> {
        let access_token = credentials
            .get("access_token")
            .ok_or_else(|| ProviderError::InvalidCredential("missing access_token".to_string()))?;
        let mut body = serde_json::to_value(request)
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        body["model"] = Value::String(actual_model.to_string());
        let is_stream = request.stream.unwrap_or(false);

        let response = http_client()
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {access_token}"))
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        wrap_response(response, is_stream, true).await
    }

    async fn get_account_info(&self, credentials: &CredentialBag) -> ProviderResult<Option<AccountInfo>> {
        Ok(self.validate_token(credentials).await.account_info)
    }
}

fn parse_account_info(body: Value) -> AccountInfo {
    AccountInfo {
        user_id: body.get("id").and_then(Value::as_str).map(str::to_string),
        email: body.get("email").and_then(Value::as_str).map(str::to_string),
        name: body.get("name").and_then(Value::as_str).map(str::to_string),
        is_guest: body
            .get("is_guest")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}
