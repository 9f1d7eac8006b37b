//! The configuration collaborator interface (SPEC_FULL.md §6) and an in-memory,
//! optionally file-hydrated implementation.
//!
//! Grounded on `gproxy-core/src/state/mod.rs`'s `ArcSwap`-snapshot discipline:
//! readers always see a consistent whole-config view, and a snapshot never
//! changes mid-request (§5 "the core must tolerate the snapshot changing between
//! requests (never within a request)").

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::account::{Account, AccountPatch};
use crate::mapping::ModelMapping;
use crate::provider::Provider;
use openmux_common::LoadBalanceStrategy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub load_balance_strategy: LoadBalanceStrategy,
    #[serde(default)]
    pub model_mappings: Vec<ModelMapping>,
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub enable_api_key: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub providers: Vec<Provider>,
    pub accounts: Vec<Account>,
    pub settings: RuntimeSettings,
}

/// Read side used by the core (§6 "Configuration collaborator interface").
/// `update_account` is the one write path the core itself drives.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_providers(&self) -> Vec<Provider>;
    async fn get_accounts_by_provider_id(&self, provider_id: &str) -> Vec<Account>;
    async fn get_config(&self) -> RuntimeSettings;
    async fn update_account(&self, id: &str, patch: AccountPatch);
    /// Fire-and-forget structured log, forwarded to the external log-viewer
    /// collaborator (§1 "out of scope: ... the log viewer").
    async fn add_log(&self, level: &str, message: &str, fields: serde_json::Value);
}

/// In-memory `ConfigStore`. Hydrated once from a JSON file at startup if
/// `config_path` is set (DESIGN.md Open Question 1); otherwise runs fully
/// in-memory, seeded directly via `InMemoryConfigStore::new`.
pub struct InMemoryConfigStore {
    snapshot: ArcSwap<ConfigSnapshot>,
}

impl InMemoryConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        }
    }

    pub async fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading config file at {path}"))?;
        let snapshot: ConfigSnapshot =
            serde_json::from_slice(&bytes).context("parsing config file as JSON")?;
        Ok(Self::new(snapshot))
    }

    pub async fn snapshot_to_file(&self, path: &str) -> anyhow::Result<()> {
        let snapshot = self.snapshot.load_full();
        let bytes = serde_json::to_vec_pretty(&*snapshot).context("serializing config snapshot")?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("writing config file at {path}"))
    }

    pub fn replace(&self, snapshot: ConfigSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    /// A clone of the current snapshot, e.g. for bootstrap to read the
    /// file-hydrated settings before overlaying CLI/env onto them.
    pub fn snapshot(&self) -> ConfigSnapshot {
        (*self.snapshot.load_full()).clone()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_providers(&self) -> Vec<Provider> {
        self.snapshot.load().providers.clone()
    }

    async fn get_accounts_by_provider_id(&self, provider_id: &str) -> Vec<Account> {
        self.snapshot
            .load()
            .accounts
            .iter()
            .filter(|a| a.provider_id == provider_id)
            .cloned()
            .collect()
    }

    async fn get_config(&self) -> RuntimeSettings {
        self.snapshot.load().settings.clone()
    }

    async fn update_account(&self, id: &str, patch: AccountPatch) {
        let current = self.snapshot.load_full();
        let mut next = (*current).clone();
        if let Some(account) = next.accounts.iter_mut().find(|a| a.id == id) {
            account.request_count += patch.request_count_delta;
            account.today_used += patch.today_used_delta;
            if let Some(last_used) = patch.last_used {
                account.last_used = Some(last_used);
            }
            if let Some(status) = patch.status {
                account.status = status;
            }
            if let Some(error_message) = patch.error_message {
                account.error_message = error_message;
            }
        }
        self.snapshot.store(Arc::new(next));
    }

    async fn add_log(&self, _level: &str, _message: &str, _fields: serde_json::Value) {
        // The log viewer is an external collaborator (§1); this store has no
        // sink of its own to forward to.
    }
}

pub fn providers_by_id(providers: &[Provider]) -> HashMap<&str, &Provider> {
    providers.iter().map(|p| (p.id.as_str(), p)).collect()
}
