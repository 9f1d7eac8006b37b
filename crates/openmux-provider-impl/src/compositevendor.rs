//! Composite user-id+JWT vendor (SPEC_FULL.md §4.5, §6): credential shape
//! `{ token: "realUserID+jwt" }` or `{ jwt, realUserID }`, authenticated with
//! the `yy`/`x-signature` composite signature (§4.5 "Vendor-specific
//! signing", second algorithm). Guest sessions on this vendor surface as the
//! fixed mojibake display name rather than an email suffix or flag.

use async_trait::async_trait;
use serde_json::Value;

use openmux_common::signing;
use openmux_protocol::ChatCompletionRequest;
use openmux_provider_core::{
    AccountInfo, Credential, CredentialBag, ForwardResult, Provider, ProviderError, ProviderResult,
    TokenValidation,
};

use crate::shared::{GUEST_DISPLAY_NAME_MOJIBAKE, http_client, split_composite_token, wrap_response};

const PROVIDER_NAME: &str = "compositevendor";

pub struct CompositeVendorProvider {
    base_url: String,
}

impl CompositeVendorProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Resolves `(realUserID, jwt)` from either credential shape §6 allows.
    fn split(&self, credentials: &CredentialBag) -> ProviderResult<(String, String)> {
        if let Some(token) = credentials.get("token") {
            return Ok(split_composite_token(token));
        }
        let jwt = credentials
            .get("jwt")
            .ok_or_else(|| ProviderError::InvalidCredential("missing jwt".to_string()))?;
        let user_id = credentials
            .get("realUserID")
            .cloned()
            .unwrap_or_else(|| split_composite_token(jwt).0);
        Ok((user_id, jwt.clone()))
    }
}

#[async_trait]
impl Provider for CompositeVendorProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn validate_token(&self, credentials: &CredentialBag) -> TokenValidation {
        let Ok((user_id, jwt)) = self.split(credentials) else {
            return TokenValidation::rejected("missing credentials");
        };
        let now = signing::now_millis();
        let sig = signing::sign_composite(now, &user_id, &jwt);

        let response = http_client()
            .get(format!("{}/v1/api/user/info", self.base_url))
            .header("token", &sig.token)
            .header("x-timestamp", &sig.x_timestamp)
            .header("x-signature", &sig.x_signature)
            .header("yy", &sig.yy)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let info = resp
                    .json::<Value>()
                    .await
                    .ok()
                    .map(|body| parse_account_info(&body))
                    .unwrap_or_default();
                if info.name.as_deref() == Some(GUEST_DISPLAY_NAME_MOJIBAKE)
                    || info.is_guest_account(None)
                {
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
        let (user_id, jwt) = self.split(credentials)?;
        let mut body = serde_json::to_value(request)
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        body["model"] = Value::String(actual_model.to_string());
        let is_stream = request.stream.unwrap_or(false);

        let now = signing::now_millis();
        let sig = signing::sign_composite(now, &user_id, &jwt);

        let response = http_client()
            .post(format!("{}/v1/api/chat/completions", self.base_url))
            .header("token", &sig.token)
            .header("x-timestamp", &sig.x_timestamp)
            .header("x-signature", &sig.x_signature)
            .header("yy", &sig.yy)
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

fn parse_account_info(body: &Value) -> AccountInfo {
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
