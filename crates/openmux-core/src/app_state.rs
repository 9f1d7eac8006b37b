//! `AppState`: the shared handle the router's axum handlers extract (§4.1).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use openmux_config::ConfigStore;

use crate::forwarder::Forwarder;

pub struct AppState {
    pub config: Arc<dyn ConfigStore>,
    pub forwarder: Arc<Forwarder>,
    /// Process start time, unix seconds. `/v1/models` uses this as the
    /// `created` timestamp for every model entry, since neither `Provider`
    /// nor `Account` carries a creation timestamp of its own (§6 "/v1/models").
    pub started_at_unix: i64,
}

impl AppState {
    pub fn new(config: Arc<dyn ConfigStore>, forwarder: Arc<Forwarder>) -> Self {
        Self {
            config,
            forwarder,
            started_at_unix: now_unix_seconds(),
        }
    }
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
