//! `Account` — a single credential bag bound to one `Provider` (SPEC_FULL.md §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Expired,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub provider_id: String,
    pub display_name: String,
    pub status: AccountStatus,
    /// Opaque credential bag; keys depend on the provider's `AuthStyle` (§6).
    pub credentials: HashMap<String, String>,
    pub daily_limit: Option<u64>,
    pub request_count: u64,
    pub today_used: u64,
    /// Unix millis of the last completed request, or `None` if never used.
    pub last_used: Option<i64>,
    pub error_message: Option<String>,
}

impl Account {
    /// §3 invariant: an account whose daily limit is exhausted is never
    /// selectable, independent of its `status`.
    pub fn daily_limit_exhausted(&self) -> bool {
        match self.daily_limit {
            Some(limit) => self.today_used >= limit,
            None => false,
        }
    }

    /// Whether this account is eligible to be handed to the balancer at all
    /// (§3 invariants, enabled provider is checked separately by the caller).
    pub fn is_usable(&self) -> bool {
        self.status == AccountStatus::Active && !self.daily_limit_exhausted()
    }
}

/// Patch applied by `ConfigStore::update_account` — counter bumps after a
/// completed forward (§4.4 "Counter updates").
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub request_count_delta: u64,
    pub today_used_delta: u64,
    pub last_used: Option<i64>,
    pub status: Option<AccountStatus>,
    pub error_message: Option<Option<String>>,
}
