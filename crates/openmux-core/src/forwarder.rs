//! The forwarder (SPEC_FULL.md §4.4): candidate selection, the adapter call
//! under a deadline, and the counter/failure-window bookkeeping a completed
//! request (success, failure, or cancelled mid-stream) requires.
//!
//! Grounded on `gproxy-core/src/handler.rs`'s request-lifecycle shape (select,
//! call, record), generalized so the bookkeeping happens in two halves:
//! `dispatch` resolves the account and makes the initial upstream call (and
//! owns the bookkeeping for an error caught there, since no bytes have reached
//! the client yet); `finish_success`/`finish_failure` are driven by the router
//! once a buffered response is ready or a stream has ended, since a stream's
//! outcome isn't known until the last byte (§5 "the core must tolerate...").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use openmux_balancer::{LoadBalancer, StatusCollector};
use openmux_config::{Account, AccountPatch, AccountStatus, ConfigStore, resolve_model};
use openmux_protocol::ChatCompletionRequest;
use openmux_provider_core::{ForwardResult, ProviderRegistry};

use crate::errors::GatewayError;

pub use openmux_balancer::AccountSelection;

pub struct Forwarder {
    config: Arc<dyn ConfigStore>,
    balancer: Arc<LoadBalancer>,
    collector: Arc<StatusCollector>,
    registry: Arc<ProviderRegistry>,
    timeout: Duration,
}

pub struct DispatchResult {
    pub selection: AccountSelection,
    pub result: ForwardResult,
}

impl Forwarder {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        balancer: Arc<LoadBalancer>,
        collector: Arc<StatusCollector>,
        registry: Arc<ProviderRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            config,
            balancer,
            collector,
            registry,
            timeout,
        }
    }

    /// The configured request-level deadline (§4.4 "Timeouts"). The router
    /// needs this to extend the same deadline across the streaming phase,
    /// which runs after `dispatch` has already returned.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves a candidate account, issues the upstream call under the
    /// configured deadline, and returns either the initial `ForwardResult` or
    /// a `GatewayError` already booked against the failure window/collector
    /// (§4.4 "Counter updates", §7 "Upstream-failure"/"Internal-exception").
    pub async fn dispatch(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<DispatchResult, GatewayError> {
        let settings = self.config.get_config().await;
        let providers = self.config.get_providers().await;

        let mut accounts_by_provider: HashMap<String, Vec<Account>> = HashMap::new();
        for provider in &providers {
            let accounts = self.config.get_accounts_by_provider_id(&provider.id).await;
            accounts_by_provider.insert(provider.id.clone(), accounts);
        }

        let top = resolve_model(&settings.model_mappings, &request.model, None);

        let selection = self
            .balancer
            .select(
                &request.model,
                settings.load_balance_strategy,
                top.preferred_provider_id.as_deref(),
                top.preferred_account_id.as_deref(),
                &providers,
                &accounts_by_provider,
                &settings.model_mappings,
            )
            .ok_or(GatewayError::NoAvailableAccount)?;

        let adapter = self.registry.get(&selection.provider_id).ok_or_else(|| {
            GatewayError::Internal(format!(
                "no adapter registered for provider {}",
                selection.provider_id
            ))
        })?;

        self.collector.record_request_start(
            &request.model,
            Some(selection.provider_id.as_str()),
            Some(selection.account.id.as_str()),
        );
        let started_at = Instant::now();

        let call = adapter.forward_chat_completion(
            request,
            &selection.account.credentials,
            &selection.actual_model,
        );

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => Ok(DispatchResult { selection, result }),
            Ok(Err(provider_error)) => {
                let counts = provider_error.counts_as_failure();
                let gateway_error = GatewayError::from_provider_error(provider_error);
                let latency_ms = started_at.elapsed().as_millis() as u64;
                self.book_failure(&selection, gateway_error.status(), counts, latency_ms)
                    .await;
                Err(gateway_error)
            }
            Err(_elapsed) => {
                let latency_ms = started_at.elapsed().as_millis() as u64;
                self.book_failure(&selection, 504, true, latency_ms).await;
                Err(GatewayError::Upstream {
                    status: 504,
                    message: format!("request timed out after {}ms", self.timeout.as_millis()),
                })
            }
        }
    }

    /// Books a completed request as a success: collector latency, account
    /// counters, and clearing the failure window (§4.4 "Counter updates").
    pub async fn finish_success(&self, selection: &AccountSelection, latency_ms: u64) {
        self.collector.record_request_success(latency_ms);
        self.balancer.clear_account_failure(&selection.account.id);
        self.config
            .update_account(
                &selection.account.id,
                AccountPatch {
                    request_count_delta: 1,
                    today_used_delta: 1,
                    last_used: Some(now_unix_millis()),
                    status: None,
                    error_message: None,
                },
            )
            .await;
    }

    /// Books a completed request as a failure (mid-stream upstream error,
    /// §4.4/§7). `counts` is false only for a `429` caught after streaming
    /// began, which is the one case §4.3 says must not mark the account.
    pub async fn finish_failure(&self, selection: &AccountSelection, status: u16, latency_ms: u64) {
        self.book_failure(selection, status, status != 429, latency_ms)
            .await;
    }

    async fn book_failure(
        &self,
        selection: &AccountSelection,
        _status: u16,
        counts: bool,
        latency_ms: u64,
    ) {
        self.collector.record_request_failure(latency_ms);
        if counts {
            self.balancer.mark_account_failed(&selection.account.id);
        }
    }
}

pub fn account_is_active(account: &Account) -> bool {
    account.status == AccountStatus::Active
}

fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmux_config::{AuthStyle, ConfigSnapshot, InMemoryConfigStore, Provider as ConfigProvider, RuntimeSettings};
    use openmux_protocol::ChatMessage;
    use openmux_provider_core::{Provider, TokenValidation, AccountInfo, Credential, CredentialBag, ProviderResult};
    use async_trait::async_trait;

    struct NeverAvailableProvider;

    #[async_trait]
    impl Provider for NeverAvailableProvider {
        fn name(&self) -> &'static str {
            "never"
        }
        async fn validate_token(&self, _credentials: &CredentialBag) -> TokenValidation {
            TokenValidation::ok(AccountInfo::default())
        }
        async fn refresh_token(
            &self,
            _credentials: &CredentialBag,
        ) -> ProviderResult<Option<Credential>> {
            Ok(None)
        }
        async fn forward_chat_completion(
            &self,
            _request: &ChatCompletionRequest,
            _credentials: &CredentialBag,
            _actual_model: &str,
        ) -> ProviderResult<ForwardResult> {
            Err(openmux_provider_core::ProviderError::Upstream {
                status: 500,
                body: bytes::Bytes::from_static(b"boom"),
            })
        }
        async fn get_account_info(
            &self,
            _credentials: &CredentialBag,
        ) -> ProviderResult<Option<AccountInfo>> {
            Ok(None)
        }
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-4".into(),
            messages: vec![ChatMessage::user("hi")],
            stream: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
            n: None,
            presence_penalty: None,
            frequency_penalty: None,
            tools: None,
            tool_choice: None,
            reasoning_effort: None,
            web_search: None,
            deep_research: None,
        }
    }

    #[tokio::test]
    async fn dispatch_with_no_accounts_reports_no_available_account() {
        let snapshot = ConfigSnapshot {
            providers: vec![ConfigProvider {
                id: "p1".into(),
                display_name: "P1".into(),
                enabled: true,
                supported_models: vec![],
                model_mappings: Default::default(),
                auth_style: AuthStyle::Token,
                endpoint_base_url: "https://example.test".into(),
                request_headers: Default::default(),
                created_at: None,
            }],
            accounts: vec![],
            settings: RuntimeSettings::default(),
        };
        let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new(snapshot));
        let forwarder = Forwarder::new(
            config,
            Arc::new(LoadBalancer::new()),
            Arc::new(StatusCollector::new()),
            Arc::new(ProviderRegistry::new()),
            Duration::from_secs(5),
        );

        let err = forwarder.dispatch(&request()).await.unwrap_err();
        assert_eq!(err.status(), 503);
    }

    #[tokio::test]
    async fn dispatch_upstream_failure_marks_failure_window() {
        use openmux_config::{Account, AccountStatus};

        let snapshot = ConfigSnapshot {
            providers: vec![ConfigProvider {
                id: "p1".into(),
                display_name: "P1".into(),
                enabled: true,
                supported_models: vec![],
                model_mappings: Default::default(),
                auth_style: AuthStyle::Token,
                endpoint_base_url: "https://example.test".into(),
                request_headers: Default::default(),
                created_at: None,
            }],
            accounts: vec![Account {
                id: "a1".into(),
                provider_id: "p1".into(),
                display_name: "A1".into(),
                status: AccountStatus::Active,
                credentials: Default::default(),
                daily_limit: None,
                request_count: 0,
                today_used: 0,
                last_used: None,
                error_message: None,
            }],
            settings: RuntimeSettings::default(),
        };
        let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new(snapshot));
        let balancer = Arc::new(LoadBalancer::new());
        let mut registry = ProviderRegistry::new();
        registry.register_as("p1", Arc::new(NeverAvailableProvider));

        let forwarder = Forwarder::new(
            config,
            balancer.clone(),
            Arc::new(StatusCollector::new()),
            Arc::new(registry),
            Duration::from_secs(5),
        );

        // FAIL_THRESHOLD is 3 (§4.3): one failed dispatch marks the account
        // but does not yet push it into the failure window on its own.
        for _ in 0..3 {
            let err = forwarder.dispatch(&request()).await.unwrap_err();
            assert_eq!(err.status(), 500);
        }
        assert!(balancer.is_in_failure_window("a1"));
    }
}
