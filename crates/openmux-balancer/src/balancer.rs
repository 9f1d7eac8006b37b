//! The load balancer (SPEC_FULL.md §4.3): candidate enumeration, the preferred-
//! account short-circuit, and strategy arbitration.

use std::collections::HashMap;

use openmux_common::LoadBalanceStrategy;
use openmux_config::{Account, ModelMapping, Provider, resolve_model};

use crate::failure::FailureWindow;
use crate::selection::{AccountSelection, Candidate};
use crate::strategy::{self, RoundRobinCursor};

pub struct LoadBalancer {
    cursor: RoundRobinCursor,
    failures: FailureWindow,
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self {
            cursor: RoundRobinCursor::new(),
            failures: FailureWindow::new(),
        }
    }

    pub fn mark_account_failed(&self, account_id: &str) {
        self.failures.mark_failed(account_id);
    }

    pub fn clear_account_failure(&self, account_id: &str) {
        self.failures.clear_failure(account_id);
    }

    pub fn is_in_failure_window(&self, account_id: &str) -> bool {
        self.failures.is_in_window(account_id)
    }

    /// Given `(model, strategy, preferredProviderId, preferredAccountId)` and a
    /// snapshot of providers/accounts/global mappings, returns an
    /// `AccountSelection` or `None` (§4.3).
    pub fn select(
        &self,
        model: &str,
        strategy: LoadBalanceStrategy,
        preferred_provider_id: Option<&str>,
        preferred_account_id: Option<&str>,
        providers: &[Provider],
        accounts_by_provider: &HashMap<String, Vec<Account>>,
        global_mappings: &[ModelMapping],
    ) -> Option<AccountSelection> {
        let candidates = self.enumerate_candidates(
            model,
            providers,
            accounts_by_provider,
            global_mappings,
        );
        if candidates.is_empty() {
            return None;
        }

        if let Some(preferred) = preferred_account_id {
            if let Some(candidate) = candidates.iter().find(|c| c.account.id == preferred) {
                if !self.failures.is_in_window(&candidate.account.id) {
                    return Some(candidate.clone().into());
                }
            }
        }

        let candidates: Vec<Candidate> = match preferred_provider_id {
            Some(provider_id) => {
                let scoped: Vec<Candidate> = candidates
                    .iter()
                    .filter(|c| c.provider_id == provider_id)
                    .cloned()
                    .collect();
                if scoped.is_empty() { candidates } else { scoped }
            }
            None => candidates,
        };

        let picked = match strategy {
            LoadBalanceStrategy::RoundRobin => strategy::pick_round_robin(&self.cursor, &candidates),
            LoadBalanceStrategy::FillFirst => strategy::pick_fill_first(&candidates),
            LoadBalanceStrategy::Failover => {
                strategy::pick_failover(&self.cursor, &self.failures, &candidates)
            }
        };

        picked.cloned().map(AccountSelection::from)
    }

    fn enumerate_candidates(
        &self,
        model: &str,
        providers: &[Provider],
        accounts_by_provider: &HashMap<String, Vec<Account>>,
        global_mappings: &[ModelMapping],
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for provider in providers {
            if !provider.enabled || !provider.supports_model(model) {
                continue;
            }
            let Some(accounts) = accounts_by_provider.get(&provider.id) else {
                continue;
            };
            let actual_model = provider
                .model_mappings
                .get(model)
                .cloned()
                .unwrap_or_else(|| {
                    resolve_model(global_mappings, model, Some(provider.id.as_str())).actual_model
                });
            for account in accounts {
                if account.is_usable() {
                    candidates.push(Candidate {
                        account: account.clone(),
                        provider_id: provider.id.clone(),
                        actual_model: actual_model.clone(),
                    });
                }
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmux_config::{Account, AccountStatus, AuthStyle};
    use std::collections::HashMap as Map;

    fn provider(id: &str) -> Provider {
        Provider {
            id: id.to_string(),
            display_name: id.to_string(),
            enabled: true,
            supported_models: vec![],
            model_mappings: Map::new(),
            auth_style: AuthStyle::Token,
            endpoint_base_url: "https://example.invalid".to_string(),
            request_headers: Map::new(),
            created_at: None,
        }
    }

    fn account(id: &str, provider_id: &str) -> Account {
        Account {
            id: id.to_string(),
            provider_id: provider_id.to_string(),
            display_name: id.to_string(),
            status: AccountStatus::Active,
            credentials: Map::new(),
            daily_limit: None,
            request_count: 0,
            today_used: 0,
            last_used: None,
            error_message: None,
        }
    }

    /// S1: two providers with two accounts each, eight round-robin selections
    /// split evenly two-and-two.
    #[test]
    fn s1_round_robin_splits_evenly_across_four_accounts() {
        let balancer = LoadBalancer::new();
        let providers = vec![provider("A"), provider("B")];
        let mut accounts_by_provider = HashMap::new();
        accounts_by_provider.insert("A".to_string(), vec![account("a1", "A"), account("a2", "A")]);
        accounts_by_provider.insert("B".to_string(), vec![account("b1", "B"), account("b2", "B")]);

        let mut tally: HashMap<String, u32> = HashMap::new();
        for _ in 0..8 {
            let selection = balancer
                .select(
                    "m",
                    LoadBalanceStrategy::RoundRobin,
                    None,
                    None,
                    &providers,
                    &accounts_by_provider,
                    &[],
                )
                .unwrap();
            *tally.entry(selection.account.id).or_insert(0) += 1;
        }
        assert_eq!(tally.len(), 4);
        assert!(tally.values().all(|&n| n == 2));
    }

    /// S2: three failures on p1 push selection to p2; no recovery check here
    /// (time-based; covered by `FailureWindow` unit tests).
    #[test]
    fn s2_failure_isolation_routes_away_from_failing_account() {
        let balancer = LoadBalancer::new();
        let providers = vec![provider("P")];
        let mut accounts_by_provider = HashMap::new();
        accounts_by_provider.insert("P".to_string(), vec![account("p1", "P"), account("p2", "P")]);

        balancer.mark_account_failed("p1");
        balancer.mark_account_failed("p1");
        balancer.mark_account_failed("p1");

        let selection = balancer
            .select(
                "m",
                LoadBalanceStrategy::Failover,
                None,
                None,
                &providers,
                &accounts_by_provider,
                &[],
            )
            .unwrap();
        assert_eq!(selection.account.id, "p2");
    }

    #[test]
    fn disabled_provider_accounts_are_never_candidates_i1() {
        let balancer = LoadBalancer::new();
        let mut disabled = provider("A");
        disabled.enabled = false;
        let providers = vec![disabled];
        let mut accounts_by_provider = HashMap::new();
        accounts_by_provider.insert("A".to_string(), vec![account("a1", "A")]);

        assert!(balancer
            .select(
                "m",
                LoadBalanceStrategy::RoundRobin,
                None,
                None,
                &providers,
                &accounts_by_provider,
                &[]
            )
            .is_none());
    }

    #[test]
    fn preferred_account_short_circuits_unless_in_failure_window() {
        let balancer = LoadBalancer::new();
        let providers = vec![provider("A")];
        let mut accounts_by_provider = HashMap::new();
        accounts_by_provider.insert("A".to_string(), vec![account("a1", "A"), account("a2", "A")]);

        let selection = balancer
            .select(
                "m",
                LoadBalanceStrategy::RoundRobin,
                None,
                Some("a2"),
                &providers,
                &accounts_by_provider,
                &[],
            )
            .unwrap();
        assert_eq!(selection.account.id, "a2");
    }
}
