//! `POST /v1/chat/completions` and its legacy `POST /v1/completions` sibling
//! (SPEC_FULL.md §4.1): request validation, auth, dispatch, and translating
//! the forwarder's `ForwardResult` into a buffered JSON body or a streaming
//! SSE body.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use openmux_common::new_chat_completion_id;
use openmux_core::{AppState, GatewayError};
use openmux_protocol::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, CompletionsRequest, NonStreamAggregator,
    Usage,
};
use openmux_provider_core::ForwardOutcome;

use crate::error::error_response;
use crate::stream;

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(&GatewayError::InvalidRequest(format!(
                "invalid JSON body: {err}"
            )));
        }
    };

    dispatch(state, headers, request).await
}

pub async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let legacy: CompletionsRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(&GatewayError::InvalidRequest(format!(
                "invalid JSON body: {err}"
            )));
        }
    };

    dispatch(state, headers, legacy.into_chat_request()).await
}

async fn dispatch(state: Arc<AppState>, headers: HeaderMap, request: ChatCompletionRequest) -> Response {
    if let Err(err) = validate(&request) {
        return error_response(&err);
    }

    let settings = state.config.get_config().await;
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if let Err(err) = openmux_core::auth::authenticate(&settings, auth_header) {
        return error_response(&err);
    }

    let wants_stream = request.stream.unwrap_or(false);
    let requested_model = request.model.clone();

    let started_at = Instant::now();
    let dispatched = match state.forwarder.dispatch(&request).await {
        Ok(dispatched) => dispatched,
        Err(err) => return error_response(&err),
    };

    let deadline = started_at + state.forwarder.timeout();
    let response_id = new_chat_completion_id();

    match dispatched.result.outcome {
        ForwardOutcome::Stream { body, skip_transform } => {
            let rx = stream::spawn(
                state.forwarder.clone(),
                dispatched.selection,
                body,
                skip_transform,
                response_id,
                requested_model,
                started_at,
                deadline,
            );
            streaming_response(rx)
        }
        ForwardOutcome::Buffered { body, skip_transform } => {
            let latency_ms = started_at.elapsed().as_millis() as u64;
            state
                .forwarder
                .finish_success(&dispatched.selection, latency_ms)
                .await;
            buffered_response(body, skip_transform, response_id, requested_model, wants_stream)
        }
    }
}

fn validate(request: &ChatCompletionRequest) -> Result<(), GatewayError> {
    if request.model.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("model is required".to_string()));
    }
    if request.messages.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "messages must be a non-empty array".to_string(),
        ));
    }
    Ok(())
}

fn streaming_response(rx: tokio::sync::mpsc::Receiver<Bytes>) -> Response {
    let body_stream = ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>);
    let mut response = Response::new(Body::from_stream(body_stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    headers.insert("connection", HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Renders a buffered `ForwardResult` as the non-stream `ChatCompletionResponse`
/// shape (§4.4.a "Non-stream aggregation"), or passes the adapter's own
/// OpenAI-shaped body through untouched when `skip_transform` is set.
fn buffered_response(
    body: Bytes,
    skip_transform: bool,
    response_id: String,
    requested_model: String,
    _wants_stream: bool,
) -> Response {
    if skip_transform {
        let mut response = Response::new(Body::from(body));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return response;
    }

    let Ok(text) = std::str::from_utf8(&body) else {
        return error_response(&GatewayError::Internal(
            "upstream response was not valid utf-8".to_string(),
        ));
    };

    let mut aggregator = NonStreamAggregator::new();
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => aggregator.push(&value),
        Err(_) => aggregator.push(&serde_json::Value::String(text.to_string())),
    }
    let aggregated = aggregator.finish();

    let message = openmux_protocol::ChatMessage {
        role: "assistant".to_string(),
        content: aggregated.content.map(serde_json::Value::String),
        reasoning_content: aggregated.reasoning_content,
        tool_calls: aggregated.tool_calls,
    };

    let response = ChatCompletionResponse::new(
        response_id,
        now_unix_seconds(),
        requested_model,
        Choice {
            index: 0,
            message,
            finish_reason: aggregated.finish_reason,
        },
        Usage::default(),
    );

    Json(response).into_response()
}

fn now_unix_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
