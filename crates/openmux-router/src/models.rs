//! `GET /v1/models` (SPEC_FULL.md §4.1): the union of supported models across
//! enabled providers that have at least one active account, duplicates
//! collapsed. A pure read over the `ConfigStore` snapshot — no upstream call.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};

use openmux_config::{AccountStatus, ConfigStore};
use openmux_core::AppState;
use openmux_protocol::{ModelListEntry, ModelListResponse};

pub async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    let response = build_model_list(state.config.as_ref(), state.started_at_unix).await;
    Json(response).into_response()
}

/// The actual join, factored out of the handler so it can be exercised
/// directly without standing up an axum `Response`.
async fn build_model_list(config: &dyn ConfigStore, started_at_unix: i64) -> ModelListResponse {
    let providers = config.get_providers().await;
    let mut entries: HashMap<String, ModelListEntry> = HashMap::new();

    for provider in providers.iter().filter(|p| p.enabled) {
        let accounts = config.get_accounts_by_provider_id(&provider.id).await;
        let has_active_account = accounts.iter().any(|a| a.status == AccountStatus::Active);
        if !has_active_account {
            continue;
        }

        let created = provider.created_at.unwrap_or(started_at_unix);
        for model in provider.supported_models.iter().filter(|m| !m.contains('*')) {
            entries
                .entry(model.clone())
                .or_insert_with(|| ModelListEntry::new(model.clone(), created, provider.id.clone()));
        }
    }

    let mut data: Vec<ModelListEntry> = entries.into_values().collect();
    data.sort_by(|a, b| a.id.cmp(&b.id));
    ModelListResponse::new(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    use openmux_config::{
        Account, AuthStyle, ConfigSnapshot, InMemoryConfigStore, Provider as ConfigProvider,
        RuntimeSettings,
    };

    fn provider(id: &str, models: &[&str], enabled: bool) -> ConfigProvider {
        ConfigProvider {
            id: id.to_string(),
            display_name: id.to_string(),
            enabled,
            supported_models: models.iter().map(|s| s.to_string()).collect(),
            model_mappings: Map::new(),
            auth_style: AuthStyle::Token,
            endpoint_base_url: "https://example.invalid".to_string(),
            request_headers: Map::new(),
            created_at: Some(1_700_000_000),
        }
    }

    fn account(id: &str, provider_id: &str, status: AccountStatus) -> Account {
        Account {
            id: id.to_string(),
            provider_id: provider_id.to_string(),
            display_name: id.to_string(),
            status,
            credentials: Map::new(),
            daily_limit: None,
            request_count: 0,
            today_used: 0,
            last_used: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn providers_without_an_active_account_contribute_nothing() {
        let store = InMemoryConfigStore::new(ConfigSnapshot {
            providers: vec![provider("p1", &["gpt-4o"], true)],
            accounts: vec![account("a1", "p1", AccountStatus::Inactive)],
            settings: RuntimeSettings::default(),
        });

        let list = build_model_list(&store, 0).await;
        assert!(list.data.is_empty());
    }

    #[tokio::test]
    async fn disabled_providers_are_excluded_even_with_active_accounts() {
        let store = InMemoryConfigStore::new(ConfigSnapshot {
            providers: vec![provider("p1", &["gpt-4o"], false)],
            accounts: vec![account("a1", "p1", AccountStatus::Active)],
            settings: RuntimeSettings::default(),
        });

        let list = build_model_list(&store, 0).await;
        assert!(list.data.is_empty());
    }

    #[tokio::test]
    async fn duplicate_model_ids_across_providers_collapse() {
        let store = InMemoryConfigStore::new(ConfigSnapshot {
            providers: vec![
                provider("p1", &["gpt-4o"], true),
                provider("p2", &["gpt-4o"], true),
            ],
            accounts: vec![
                account("a1", "p1", AccountStatus::Active),
                account("a2", "p2", AccountStatus::Active),
            ],
            settings: RuntimeSettings::default(),
        });

        let list = build_model_list(&store, 0).await;
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].id, "gpt-4o");
    }

    #[tokio::test]
    async fn wildcard_entries_are_not_listed_as_concrete_model_ids() {
        let store = InMemoryConfigStore::new(ConfigSnapshot {
            providers: vec![provider("p1", &["gpt-4o", "claude-*"], true)],
            accounts: vec![account("a1", "p1", AccountStatus::Active)],
            settings: RuntimeSettings::default(),
        });

        let list = build_model_list(&store, 0).await;
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].id, "gpt-4o");
    }

    #[tokio::test]
    async fn created_falls_back_to_process_start_time_when_unset() {
        let mut p = provider("p1", &["gpt-4o"], true);
        p.created_at = None;
        let store = InMemoryConfigStore::new(ConfigSnapshot {
            providers: vec![p],
            accounts: vec![account("a1", "p1", AccountStatus::Active)],
            settings: RuntimeSettings::default(),
        });

        let list = build_model_list(&store, 42).await;
        assert_eq!(list.data[0].created, 42);
    }
}
