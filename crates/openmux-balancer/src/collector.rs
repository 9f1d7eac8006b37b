//! The status collector (SPEC_FULL.md §4.6): global request/latency counters
//! plus per-model/provider/account usage tallies, with a rolling 60-second
//! window for `requestsPerMinute`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const ROLLING_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub active_connections: u64,
    pub requests_per_minute: u64,
    pub avg_latency_ms: f64,
    pub by_model: HashMap<String, u64>,
    pub by_provider: HashMap<String, u64>,
    pub by_account: HashMap<String, u64>,
}

#[derive(Default)]
struct Counters {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    active_connections: i64,
    latency_sum_ms: u64,
    recent_starts: Vec<Instant>,
    by_model: HashMap<String, u64>,
    by_provider: HashMap<String, u64>,
    by_account: HashMap<String, u64>,
}

/// Tracks request counters. All methods take a short internal lock (§5).
#[derive(Default)]
pub struct StatusCollector {
    state: Mutex<Counters>,
}

impl StatusCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments `totalRequests`, `activeConnections`, and the per-`{model|
    /// provider|account}` usage maps; appends `now` to the rolling timestamp
    /// list (§4.6).
    pub fn record_request_start(
        &self,
        model: &str,
        provider_id: Option<&str>,
        account_id: Option<&str>,
    ) {
        let mut state = self.state.lock();
        state.total_requests += 1;
        state.active_connections += 1;
        *state.by_model.entry(model.to_string()).or_insert(0) += 1;
        if let Some(provider_id) = provider_id {
            *state.by_provider.entry(provider_id.to_string()).or_insert(0) += 1;
        }
        if let Some(account_id) = account_id {
            *state.by_account.entry(account_id.to_string()).or_insert(0) += 1;
        }
        state.recent_starts.push(Instant::now());
        prune_recent_starts(&mut state.recent_starts);
    }

    /// Decrements `activeConnections` (floored at 0), adds `latency` to the
    /// running sum, and increments `successfulRequests` (§4.6).
    pub fn record_request_success(&self, latency_ms: u64) {
        let mut state = self.state.lock();
        state.successful_requests += 1;
        state.latency_sum_ms += latency_ms;
        state.active_connections = (state.active_connections - 1).max(0);
    }

    /// Decrements `activeConnections` (floored at 0), adds `latency` to the
    /// running sum, and increments `failedRequests` (§4.6).
    pub fn record_request_failure(&self, latency_ms: u64) {
        let mut state = self.state.lock();
        state.failed_requests += 1;
        state.latency_sum_ms += latency_ms;
        state.active_connections = (state.active_connections - 1).max(0);
    }

    /// Lazily prunes timestamps older than 60s to compute `requestsPerMinute`
    /// and returns `avgLatency = latencySum / totalRequests` (0 when
    /// `totalRequests == 0`, §4.6).
    pub fn get_statistics(&self) -> Statistics {
        let mut state = self.state.lock();
        prune_recent_starts(&mut state.recent_starts);
        Statistics {
            total_requests: state.total_requests,
            successful_requests: state.successful_requests,
            failed_requests: state.failed_requests,
            active_connections: state.active_connections.max(0) as u64,
            requests_per_minute: state.recent_starts.len() as u64,
            avg_latency_ms: if state.total_requests == 0 {
                0.0
            } else {
                state.latency_sum_ms as f64 / state.total_requests as f64
            },
            by_model: state.by_model.clone(),
            by_provider: state.by_provider.clone(),
            by_account: state.by_account.clone(),
        }
    }

    /// Restores the zero state (§4.6).
    pub fn reset_statistics(&self) {
        *self.state.lock() = Counters::default();
    }
}

fn prune_recent_starts(starts: &mut Vec<Instant>) {
    let now = Instant::now();
    starts.retain(|t| now.duration_since(*t) <= ROLLING_WINDOW);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_across_dimensions() {
        let collector = StatusCollector::new();
        collector.record_request_start("gpt-4", Some("p1"), Some("a1"));
        collector.record_request_success(100);
        collector.record_request_start("gpt-4", Some("p1"), Some("a1"));
        collector.record_request_failure(50);

        let stats = collector.get_statistics();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.by_model.get("gpt-4"), Some(&2));
        assert_eq!(stats.by_provider.get("p1"), Some(&2));
        assert_eq!(stats.by_account.get("a1"), Some(&2));
    }

    /// avgLatency = latencySum / totalRequests, not latencySum / successCount:
    /// one 100ms success plus one (failed) 0ms-latency request averages to 50.
    #[test]
    fn average_latency_divides_by_total_requests_not_samples() {
        let collector = StatusCollector::new();
        collector.record_request_start("m", None, None);
        collector.record_request_success(100);
        collector.record_request_start("m", None, None);
        collector.record_request_failure(0);

        assert_eq!(collector.get_statistics().avg_latency_ms, 50.0);
    }

    #[test]
    fn active_connections_tracks_in_flight_requests_and_floors_at_zero() {
        let collector = StatusCollector::new();
        collector.record_request_start("m", None, None);
        collector.record_request_start("m", None, None);
        assert_eq!(collector.get_statistics().active_connections, 2);

        collector.record_request_success(10);
        assert_eq!(collector.get_statistics().active_connections, 1);

        // A spurious extra completion must not drive the counter negative.
        collector.record_request_success(10);
        collector.record_request_failure(10);
        assert_eq!(collector.get_statistics().active_connections, 0);
    }

    /// I8: requestsPerMinute matches the count of starts within the rolling window.
    #[test]
    fn requests_per_minute_matches_recent_start_count_i8() {
        let collector = StatusCollector::new();
        for _ in 0..5 {
            collector.record_request_start("m", None, None);
        }
        assert_eq!(collector.get_statistics().requests_per_minute, 5);
    }

    #[test]
    fn reset_statistics_restores_zero_state() {
        let collector = StatusCollector::new();
        collector.record_request_start("m", Some("p1"), Some("a1"));
        collector.record_request_success(100);
        collector.reset_statistics();

        let stats = collector.get_statistics();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert!(stats.by_model.is_empty());
    }

    #[test]
    fn no_requests_reports_zeroed_statistics() {
        let stats = StatusCollector::new().get_statistics();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.avg_latency_ms, 0.0);
    }
}
