//! Candidate enumeration and the `AccountSelection` result (SPEC_FULL.md §3, §4.3).

use openmux_config::Account;

/// An `(account, provider, actualModel)` triple considered by the balancer.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub account: Account,
    pub provider_id: String,
    pub actual_model: String,
}

/// The whole interface between the load balancer and the forwarder (§3).
#[derive(Debug, Clone)]
pub struct AccountSelection {
    pub account: Account,
    pub provider_id: String,
    pub actual_model: String,
}

impl From<Candidate> for AccountSelection {
    fn from(c: Candidate) -> Self {
        Self {
            account: c.account,
            provider_id: c.provider_id,
            actual_model: c.actual_model,
        }
    }
}
