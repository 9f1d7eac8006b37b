//! The three account-selection strategies (SPEC_FULL.md §4.3).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::failure::FailureWindow;
use crate::selection::Candidate;

/// Per-`sorted-provider-ids` round-robin cursor, as the strategies share: the
/// set of distinct providers among the current candidates forms the key, so a
/// model whose candidate set changes (e.g. a provider goes unhealthy) gets its
/// own independent cursor rather than corrupting one shared across model keys.
#[derive(Default)]
pub struct RoundRobinCursor {
    indices: Mutex<HashMap<String, usize>>,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the cursor for `key` by one (mod `len`) and returns the index
    /// to use for *this* call — i.e. the pre-advance index, per §4.3.
    pub fn next_index(&self, key: &str, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let mut indices = self.indices.lock();
        let slot = indices.entry(key.to_string()).or_insert(0);
        let chosen = *slot % len;
        *slot = (chosen + 1) % len;
        chosen
    }
}

pub fn round_robin_key(candidates: &[Candidate]) -> String {
    let mut ids: Vec<&str> = candidates.iter().map(|c| c.provider_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join(",")
}

pub fn pick_round_robin<'a>(
    cursor: &RoundRobinCursor,
    candidates: &'a [Candidate],
) -> Option<&'a Candidate> {
    if candidates.is_empty() {
        return None;
    }
    let key = round_robin_key(candidates);
    let idx = cursor.next_index(&key, candidates.len());
    candidates.get(idx)
}

/// Smallest `today_used`, ties broken by smallest `last_used` (never-used
/// accounts, `last_used = None`, sort before any used account).
pub fn pick_fill_first(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by_key(|c| {
        (
            c.account.today_used,
            c.account.last_used.unwrap_or(i64::MIN),
        )
    })
}

/// Filter to candidates outside the failure window; round-robin over that
/// subset if non-empty, else pick the fewest recent failures (ties broken by
/// oldest `lastFailTime`).
pub fn pick_failover<'a>(
    cursor: &RoundRobinCursor,
    failures: &FailureWindow,
    candidates: &'a [Candidate],
) -> Option<&'a Candidate> {
    let healthy: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| !failures.is_in_window(&c.account.id))
        .collect();

    if !healthy.is_empty() {
        let key = {
            let mut ids: Vec<&str> = healthy.iter().map(|c| c.provider_id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            ids.join(",")
        };
        let idx = cursor.next_index(&key, healthy.len());
        return healthy.into_iter().nth(idx);
    }

    candidates.iter().min_by_key(|c| {
        (
            failures.recent_failure_count(&c.account.id),
            failures.last_fail_time(&c.account.id),
        )
    })
}
