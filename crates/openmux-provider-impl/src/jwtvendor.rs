//! Bare-JWT vendor (SPEC_FULL.md §4.5, §6): credential shape
//! `{ token: "eyJ..." }`. No signing beyond the bearer JWT itself; identity
//! falls back to the JWT payload peek (§4.5 "JWT recognition") when the
//! vendor's introspection endpoint is unreachable.

use async_trait::async_trait;
use serde_json::Value;

use openmux_common::decode_jwt_payload;
use openmux_protocol::ChatCompletionRequest;
use openmux_provider_core::{
    AccountInfo, Credential, CredentialBag, ForwardResult, Provider, ProviderError, ProviderResult,
    TokenValidation,
};

use crate::shared::{http_client, wrap_response};

const PROVIDER_NAME: &str = "jwtvendor";

pub struct JwtVendorProvider {
    base_url: String,
}

impl JwtVendorProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn token<'a>(&self, credentials: &'a CredentialBag) -> ProviderResult<&'a str> {
        credentials
            .get("token")
            .map(String::as_str)
            .ok_or_else(|| ProviderError::InvalidCredential("missing token".to_string()))
    }
}

#[async_trait]
impl Provider for JwtVendorProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn validate_token(&self, credentials: &CredentialBag) -> TokenValidation {
        let Ok(token) = self.token(credentials) else {
            return TokenValidation::rejected("missing token");
        };

        let response = http_client()
            .get(format!("{}/v1/introspect", self.base_url))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await;

        let info = match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Value>()
                .await
                .ok()
                .map(|body| AccountInfo {
                    user_id: body.get("id").and_then(Value::as_str).map(str::to_string),
                    email: body.get("email").and_then(Value::as_str).map(str::to_string),
                    name: body.get("name").and_then(Value::as_str).map(str::to_string),
                    is_guest: body
                        .get("is_guest")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                }),
            _ => decode_jwt_payload(token).map(|payload| AccountInfo {
                user_id: payload.user_id.or(payload.id).or(payload.sub),
                email: payload.email,
                name: None,
                is_guest: false,
            }),
        };

        let Some(info) = info else {
            return TokenValidation::rejected("unable to resolve account identity");
        };
        if info.is_guest_account(None) {
            return TokenValidation::rejected(openmux_provider_core::GUEST_ACCOUNT_ERROR);
        }
        TokenValidation::ok(info)
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
        let token = self.token(credentials)?;
        let mut body = serde_json::to_value(request)
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        body["model"] = Value::String(actual_model.to_string());
        let is_stream = request.stream.unwrap_or(false);

        let response = http_client()
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {token}"))
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
