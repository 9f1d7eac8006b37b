//! `ProviderRegistry` (ported near-verbatim from the teacher's registry).
//!
//! Keyed by config provider id rather than by adapter type name: two
//! providers in the pool can share one auth style (and therefore one `Provider`
//! impl) while pointing at different `endpoint_base_url`s, so the registry
//! must be built fresh from the config snapshot at bootstrap rather than
//! populated once per adapter type (SPEC_FULL.md §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::Provider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under the adapter's own static name. Useful when an adapter
    /// type is inherently singleton (only one `endpoint_base_url` in use).
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Registers under an explicit key, e.g. a config provider id.
    pub fn register_as(&mut self, key: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(key.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::credential::{AccountInfo, CredentialBag, TokenValidation};
    use crate::errors::ProviderResult;
    use crate::forward::ForwardResult;
    use openmux_protocol::ChatCompletionRequest;

    struct StubProvider(&'static str);

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &'static str {
            self.0
        }
        async fn validate_token(&self, _credentials: &CredentialBag) -> TokenValidation {
            TokenValidation::ok(AccountInfo::default())
        }
        async fn refresh_token(
            &self,
            _credentials: &CredentialBag,
        ) -> ProviderResult<Option<crate::credential::Credential>> {
            Ok(None)
        }
        async fn forward_chat_completion(
            &self,
            _request: &ChatCompletionRequest,
            _credentials: &CredentialBag,
            _actual_model: &str,
        ) -> ProviderResult<ForwardResult> {
            unreachable!("stub")
        }
        async fn get_account_info(
            &self,
            _credentials: &CredentialBag,
        ) -> ProviderResult<Option<AccountInfo>> {
            Ok(None)
        }
    }

    #[test]
    fn two_providers_sharing_an_auth_style_register_under_distinct_ids() {
        let mut registry = ProviderRegistry::new();
        let adapter = Arc::new(StubProvider("tokenvendor"));
        registry.register_as("provider-a", adapter.clone());
        registry.register_as("provider-b", adapter);

        assert!(registry.get("provider-a").is_some());
        assert!(registry.get("provider-b").is_some());
        assert!(registry.get("tokenvendor").is_none());
    }
}
