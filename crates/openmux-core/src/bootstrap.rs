//! CLI/env bootstrap (SPEC_FULL.md §6 "CLI/env surface"), grounded on
//! `gproxy-core/src/bootstrap/mod.rs`'s precedence and small parsing-helper
//! shape, with the teacher's database connect/sync step replaced by an
//! optional JSON-file-hydrated `InMemoryConfigStore` (DESIGN.md Open
//! Question 1 — this gateway carries no database collaborator).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use openmux_balancer::{LoadBalancer, StatusCollector};
use openmux_common::{GlobalConfig, GlobalConfigPatch};
use openmux_config::{AuthStyle, ConfigSnapshot, ConfigStore, InMemoryConfigStore, Provider as ConfigProvider, RuntimeSettings};
use openmux_provider_core::{Provider, ProviderRegistry};
use openmux_provider_impl::{
    CompositeVendorProvider, JwtVendorProvider, RefreshVendorProvider, TicketVendorProvider,
    TokenVendorProvider,
};

use crate::app_state::AppState;
use crate::forwarder::Forwarder;

#[derive(Debug, Clone, Parser)]
#[command(name = "openmux", version, about = "Multi-account OpenAI-compatible gateway")]
pub struct CliArgs {
    /// Bind host.
    #[arg(long, env = "OPENMUX_HOST")]
    pub host: Option<String>,

    /// Bind port.
    #[arg(long, env = "OPENMUX_PORT")]
    pub port: Option<String>,

    /// Per-request upstream timeout in milliseconds.
    #[arg(long, env = "OPENMUX_TIMEOUT_MS")]
    pub timeout_ms: Option<String>,

    /// Load balancing strategy: round-robin | fill-first | failover.
    #[arg(long, env = "OPENMUX_LOAD_BALANCE_STRATEGY")]
    pub load_balance_strategy: Option<String>,

    /// Require `Authorization: Bearer <key>` on every request.
    #[arg(long, env = "OPENMUX_ENABLE_API_KEY")]
    pub enable_api_key: Option<String>,

    /// Comma-separated accepted API keys.
    #[arg(long, env = "OPENMUX_API_KEYS")]
    pub api_keys: Option<String>,

    /// Path to a JSON snapshot of providers/accounts/settings, hydrated at
    /// startup and re-written as account counters are updated.
    #[arg(long, env = "OPENMUX_CONFIG_PATH")]
    pub config_path: Option<String>,
}

pub struct Bootstrap {
    pub config: Arc<dyn ConfigStore>,
    pub state: Arc<AppState>,
    pub registry: Arc<ProviderRegistry>,
    pub global: GlobalConfig,
}

pub async fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    let args = CliArgs::parse();
    bootstrap(args).await
}

pub async fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let config_path = sanitize_optional_env_value(args.config_path.clone());

    let snapshot = match &config_path {
        Some(path) => InMemoryConfigStore::load_from_file(path)
            .await
            .with_context(|| format!("loading config snapshot at {path}"))?
            .snapshot(),
        None => ConfigSnapshot::default(),
    };

    // CLI/env patch overlaid on top of the snapshot's own settings — CLI/env
    // wins (§6 "CLI > env > snapshot-file precedence").
    let mut merged = GlobalConfigPatch {
        api_keys: if snapshot.settings.api_keys.is_empty() {
            None
        } else {
            Some(snapshot.settings.api_keys.clone())
        },
        enable_api_key: Some(snapshot.settings.enable_api_key),
        load_balance_strategy: Some(snapshot.settings.load_balance_strategy),
        config_path: config_path.clone(),
        ..Default::default()
    };
    merged.overlay(GlobalConfigPatch {
        host: sanitize_optional_env_value(args.host.clone()),
        port: parse_u16_env_value(args.port.clone(), "OPENMUX_PORT")?,
        timeout_ms: parse_u64_env_value(args.timeout_ms.clone(), "OPENMUX_TIMEOUT_MS")?,
        max_connections: None,
        cors_enabled: None,
        cors_origin: None,
        load_balance_strategy: parse_strategy_env_value(args.load_balance_strategy.clone())?,
        enable_api_key: parse_bool_env_value(args.enable_api_key.clone(), "OPENMUX_ENABLE_API_KEY")?,
        api_keys: sanitize_optional_env_value(args.api_keys.clone())
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()),
        config_path,
        log_level: None,
    });

    let global = merged.into_config().context("assembling global config")?;

    let mut final_snapshot = snapshot;
    final_snapshot.settings = RuntimeSettings {
        load_balance_strategy: global.load_balance_strategy,
        model_mappings: final_snapshot.settings.model_mappings,
        api_keys: global.api_keys.clone(),
        enable_api_key: global.enable_api_key,
    };

    let mut registry = ProviderRegistry::new();
    for provider in &final_snapshot.providers {
        registry.register_as(provider.id.clone(), adapter_for(provider));
    }
    let registry = Arc::new(registry);

    let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new(final_snapshot));

    let forwarder = Arc::new(Forwarder::new(
        config.clone(),
        Arc::new(LoadBalancer::new()),
        Arc::new(StatusCollector::new()),
        registry.clone(),
        Duration::from_millis(global.timeout_ms),
    ));

    let state = Arc::new(AppState::new(config.clone(), forwarder));

    Ok(Bootstrap {
        config,
        state,
        registry,
        global,
    })
}

/// Maps a provider's `AuthStyle` to its adapter (§4.5 "Adapter roster").
/// Two providers with the same `AuthStyle` but different `endpoint_base_url`s
/// each get their own adapter instance, registered under their own provider
/// id (`ProviderRegistry::register_as`) — see DESIGN.md's registry-keying
/// decision.
fn adapter_for(provider: &ConfigProvider) -> Arc<dyn Provider> {
    match provider.auth_style {
        AuthStyle::Token => Arc::new(TokenVendorProvider::new(provider.endpoint_base_url.clone())),
        AuthStyle::RefreshToken => {
            Arc::new(RefreshVendorProvider::new(provider.endpoint_base_url.clone()))
        }
        AuthStyle::Jwt => Arc::new(JwtVendorProvider::new(provider.endpoint_base_url.clone())),
        AuthStyle::CookieTicket => {
            Arc::new(TicketVendorProvider::new(provider.endpoint_base_url.clone()))
        }
        AuthStyle::CompositeJwt => {
            Arc::new(CompositeVendorProvider::new(provider.endpoint_base_url.clone()))
        }
    }
}

fn sanitize_optional_env_value(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() || (trimmed.starts_with("${") && trimmed.ends_with('}')) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_u16_env_value(value: Option<String>, field: &str) -> anyhow::Result<Option<u16>> {
    match sanitize_optional_env_value(value) {
        Some(raw) => raw
            .parse::<u16>()
            .map(Some)
            .with_context(|| format!("{field} must be a u16, got {raw:?}")),
        None => Ok(None),
    }
}

fn parse_u64_env_value(value: Option<String>, field: &str) -> anyhow::Result<Option<u64>> {
    match sanitize_optional_env_value(value) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{field} must be a u64, got {raw:?}")),
        None => Ok(None),
    }
}

fn parse_bool_env_value(value: Option<String>, field: &str) -> anyhow::Result<Option<bool>> {
    match sanitize_optional_env_value(value) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => anyhow::bail!("{field} must be a boolean, got {raw:?}"),
        },
        None => Ok(None),
    }
}

fn parse_strategy_env_value(
    value: Option<String>,
) -> anyhow::Result<Option<openmux_common::LoadBalanceStrategy>> {
    match sanitize_optional_env_value(value) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .with_context(|| format!("OPENMUX_LOAD_BALANCE_STRATEGY: unrecognized strategy {raw:?}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_with_no_args_uses_defaults() {
        let bootstrap = bootstrap(CliArgs {
            host: None,
            port: None,
            timeout_ms: None,
            load_balance_strategy: None,
            enable_api_key: None,
            api_keys: None,
            config_path: None,
        })
        .await
        .unwrap();

        assert_eq!(bootstrap.global.port, 8080);
        assert_eq!(bootstrap.global.timeout_ms, 120_000);
        assert!(!bootstrap.global.enable_api_key);
    }

    #[tokio::test]
    async fn bootstrap_applies_cli_overrides() {
        let bootstrap = bootstrap(CliArgs {
            host: Some("127.0.0.1".into()),
            port: Some("9090".into()),
            timeout_ms: Some("5000".into()),
            load_balance_strategy: Some("fill-first".into()),
            enable_api_key: Some("true".into()),
            api_keys: Some("sk-a, sk-b".into()),
            config_path: None,
        })
        .await
        .unwrap();

        assert_eq!(bootstrap.global.host, "127.0.0.1");
        assert_eq!(bootstrap.global.port, 9090);
        assert_eq!(bootstrap.global.timeout_ms, 5000);
        assert!(bootstrap.global.enable_api_key);
        assert_eq!(bootstrap.global.api_keys, vec!["sk-a", "sk-b"]);
        assert_eq!(
            bootstrap.global.load_balance_strategy,
            openmux_common::LoadBalanceStrategy::FillFirst
        );
    }
}
