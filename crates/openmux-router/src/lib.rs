//! The HTTP surface (SPEC_FULL.md §4.1): axum routes for
//! `/v1/chat/completions`, `/v1/completions`, `/v1/models`, and `/healthz`,
//! wired over `openmux_core::AppState`.
//!
//! Grounded on `gproxy-core/src/core.rs`'s `Router`/`with_state` wiring and
//! `gproxy-core/src/handler.rs`'s response-conversion idiom, narrowed to the
//! three OpenAI-shaped routes this gateway guarantees.

pub mod chat;
pub mod error;
pub mod models;
pub mod stream;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};

use openmux_core::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/completions", post(chat::completions))
        .route("/v1/models", get(models::list_models))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Process-supervisor check, not part of the OpenAI contract — ungated by
/// API-key enforcement (§4.1).
async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
