use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Account-selection strategy, see SPEC_FULL.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalanceStrategy {
    RoundRobin,
    FillFirst,
    Failover,
}

impl Default for LoadBalanceStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

impl std::str::FromStr for LoadBalanceStrategy {
    type Err = GlobalConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(Self::RoundRobin),
            "fill-first" => Ok(Self::FillFirst),
            "failover" => Ok(Self::Failover),
            other => Err(GlobalConfigError::InvalidValue {
                field: "load-balance-strategy",
                value: other.to_string(),
            }),
        }
    }
}

/// Final, merged runtime configuration (SPEC_FULL.md §6 "CLI/env surface").
///
/// Merge order: CLI > ENV > config-file snapshot, then (if `config_path` is set)
/// persisted back to the snapshot file by the config store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    pub max_connections: u32,
    pub cors_enabled: bool,
    pub cors_origin: String,
    pub load_balance_strategy: LoadBalanceStrategy,
    pub enable_api_key: bool,
    pub api_keys: Vec<String>,
    pub config_path: Option<String>,
    pub log_level: String,
}

impl GlobalConfig {
    pub fn default_port() -> u16 {
        8080
    }

    pub fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    pub fn default_timeout_ms() -> u64 {
        120_000
    }
}

/// Optional layer used for merging CLI, env, and config-file values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub max_connections: Option<u32>,
    pub cors_enabled: Option<bool>,
    pub cors_origin: Option<String>,
    pub load_balance_strategy: Option<LoadBalanceStrategy>,
    pub enable_api_key: Option<bool>,
    pub api_keys: Option<Vec<String>>,
    pub config_path: Option<String>,
    pub log_level: Option<String>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.max_connections.is_some() {
            self.max_connections = other.max_connections;
        }
        if other.cors_enabled.is_some() {
            self.cors_enabled = other.cors_enabled;
        }
        if other.cors_origin.is_some() {
            self.cors_origin = other.cors_origin;
        }
        if other.load_balance_strategy.is_some() {
            self.load_balance_strategy = other.load_balance_strategy;
        }
        if other.enable_api_key.is_some() {
            self.enable_api_key = other.enable_api_key;
        }
        if other.api_keys.is_some() {
            self.api_keys = other.api_keys;
        }
        if other.config_path.is_some() {
            self.config_path = other.config_path;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(GlobalConfig::default_host),
            port: self.port.unwrap_or_else(GlobalConfig::default_port),
            timeout_ms: self
                .timeout_ms
                .unwrap_or_else(GlobalConfig::default_timeout_ms),
            max_connections: self.max_connections.unwrap_or(0),
            cors_enabled: self.cors_enabled.unwrap_or(false),
            cors_origin: self.cors_origin.unwrap_or_else(|| "*".to_string()),
            load_balance_strategy: self.load_balance_strategy.unwrap_or_default(),
            enable_api_key: self.enable_api_key.unwrap_or(false),
            api_keys: self.api_keys.unwrap_or_default(),
            config_path: self.config_path,
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

impl From<GlobalConfig> for GlobalConfigPatch {
    fn from(value: GlobalConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            timeout_ms: Some(value.timeout_ms),
            max_connections: Some(value.max_connections),
            cors_enabled: Some(value.cors_enabled),
            cors_origin: Some(value.cors_origin),
            load_balance_strategy: Some(value.load_balance_strategy),
            enable_api_key: Some(value.enable_api_key),
            api_keys: Some(value.api_keys),
            config_path: value.config_path,
            log_level: Some(value.log_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_overlay_prefers_later_values() {
        let mut base = GlobalConfigPatch {
            port: Some(8080),
            ..Default::default()
        };
        base.overlay(GlobalConfigPatch {
            port: Some(9090),
            ..Default::default()
        });
        assert_eq!(base.port, Some(9090));
    }

    #[test]
    fn into_config_applies_defaults() {
        let config = GlobalConfigPatch::default().into_config().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.load_balance_strategy, LoadBalanceStrategy::RoundRobin);
    }

    #[test]
    fn strategy_parses_from_str() {
        assert_eq!(
            "fill-first".parse::<LoadBalanceStrategy>().unwrap(),
            LoadBalanceStrategy::FillFirst
        );
        assert!("bogus".parse::<LoadBalanceStrategy>().is_err());
    }
}
