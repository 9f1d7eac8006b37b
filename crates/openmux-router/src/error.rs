//! Renders a `GatewayError` as the OpenAI-shaped error body §6/§7 specify.
//! A free function rather than `impl IntoResponse for GatewayError` — both
//! the trait and the type are foreign to this crate.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use openmux_core::GatewayError;

pub fn error_response(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.body())).into_response()
}
