//! Wires an upstream `ByteStream` through the SSE parser and stream
//! transformer into the client-facing byte channel (SPEC_FULL.md §4.4
//! "Streaming wiring"), injecting the in-band terminal chunk on a mid-flight
//! upstream error or a deadline expiry (§4.4, §7 "Mid-stream failure", I2).
//!
//! Grounded on `gproxy-router/src/proxy.rs`'s tx_out/rx_out relay task: a
//! spawned task drains the upstream channel and writes translated bytes into
//! a fresh channel that becomes the axum response body.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::mpsc;

use openmux_core::{AccountSelection, Forwarder};
use openmux_protocol::{
    ChatCompletionChunk, ChunkChoice, Delta, FinishReason, SseEvent, SseParser, StreamTransformer,
    TransformOutput,
};
use openmux_provider_core::ByteStream;

const OUT_CHANNEL_CAPACITY: usize = 256;

/// Spawns the relay task and returns the receiving end the axum handler
/// wraps as the response body.
pub fn spawn(
    forwarder: Arc<Forwarder>,
    selection: AccountSelection,
    upstream: ByteStream,
    skip_transform: bool,
    response_id: String,
    requested_model: String,
    started_at: Instant,
    deadline: Instant,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(OUT_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        relay(
            forwarder,
            selection,
            upstream,
            skip_transform,
            response_id,
            requested_model,
            started_at,
            deadline,
            tx,
        )
        .await;
    });
    rx
}

enum Outcome {
    Success,
    Failure { status: u16 },
}

async fn relay(
    forwarder: Arc<Forwarder>,
    selection: AccountSelection,
    mut upstream: ByteStream,
    skip_transform: bool,
    response_id: String,
    requested_model: String,
    started_at: Instant,
    deadline: Instant,
    tx: mpsc::Sender<Bytes>,
) {
    let mut sse = SseParser::new();
    let mut transformer = if skip_transform {
        None
    } else {
        Some(StreamTransformer::new(response_id.clone(), requested_model.clone()))
    };
    let mut done_emitted = false;

    let outcome = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            inject_error(&tx, &response_id, &requested_model, "request timed out").await;
            break Outcome::Failure { status: 504 };
        }

        tokio::select! {
            biased;
            item = upstream.recv() => {
                match item {
                    None => {
                        flush_remaining(&tx, &mut sse, &mut transformer, &mut done_emitted).await;
                        break Outcome::Success;
                    }
                    Some(Ok(bytes)) => {
                        if skip_transform {
                            if contains_done(&bytes) {
                                done_emitted = true;
                            }
                            if tx.send(bytes).await.is_err() {
                                break Outcome::Success;
                            }
                        } else {
                            let events = sse.push_bytes(&bytes);
                            if !forward_events(&tx, transformer.as_mut().unwrap(), events, &mut done_emitted).await {
                                break Outcome::Success;
                            }
                        }
                        if done_emitted {
                            break Outcome::Success;
                        }
                    }
                    Some(Err(message)) => {
                        inject_error(&tx, &response_id, &requested_model, &message).await;
                        break Outcome::Failure { status: 502 };
                    }
                }
            }
            _ = tokio::time::sleep(remaining) => {
                inject_error(&tx, &response_id, &requested_model, "request timed out").await;
                break Outcome::Failure { status: 504 };
            }
        }
    };

    let latency_ms = started_at.elapsed().as_millis() as u64;
    match outcome {
        Outcome::Success => forwarder.finish_success(&selection, latency_ms).await,
        Outcome::Failure { status } => {
            forwarder.finish_failure(&selection, status, latency_ms).await
        }
    }
}

/// Drains any events left buffered in the SSE parser and the transformer's
/// own content buffer once the upstream channel has closed, so a clean
/// upstream EOF that never sent an explicit `[DONE]` still ends the client
/// stream properly (I2).
async fn flush_remaining(
    tx: &mpsc::Sender<Bytes>,
    sse: &mut SseParser,
    transformer: &mut Option<StreamTransformer>,
    done_emitted: &mut bool,
) {
    if *done_emitted {
        return;
    }
    let Some(transformer) = transformer.as_mut() else {
        let _ = tx.send(Bytes::from_static(b"data: [DONE]\n\n")).await;
        return;
    };

    let trailing = sse.finish();
    let _ = forward_events(tx, transformer, trailing, done_emitted).await;
    if !*done_emitted {
        for output in transformer.flush() {
            if !emit(tx, output, done_emitted).await {
                return;
            }
        }
    }
}

/// Runs each parsed SSE event through the transformer and writes the wire
/// bytes it emits. Returns `false` if the client has gone away.
async fn forward_events(
    tx: &mpsc::Sender<Bytes>,
    transformer: &mut StreamTransformer,
    events: Vec<SseEvent>,
    done_emitted: &mut bool,
) -> bool {
    for event in events {
        for output in transformer.push(&event) {
            if !emit(tx, output, done_emitted).await {
                return false;
            }
            if *done_emitted {
                return true;
            }
        }
    }
    true
}

async fn emit(tx: &mpsc::Sender<Bytes>, output: TransformOutput, done_emitted: &mut bool) -> bool {
    let bytes = match output {
        TransformOutput::Chunk(chunk) => encode_chunk(&chunk),
        TransformOutput::Raw(event) => encode_raw(&event),
        TransformOutput::Done => {
            *done_emitted = true;
            Bytes::from_static(b"data: [DONE]\n\n")
        }
    };
    tx.send(bytes).await.is_ok()
}

fn encode_chunk(chunk: &ChatCompletionChunk) -> Bytes {
    let json = serde_json::to_string(chunk).unwrap_or_default();
    Bytes::from(format!("data: {json}\n\n"))
}

fn encode_raw(event: &SseEvent) -> Bytes {
    let mut wire = String::new();
    if let Some(id) = &event.id {
        wire.push_str("id: ");
        wire.push_str(id);
        wire.push('\n');
    }
    if let Some(name) = &event.event {
        wire.push_str("event: ");
        wire.push_str(name);
        wire.push('\n');
    }
    for line in event.data.split('\n') {
        wire.push_str("data: ");
        wire.push_str(line);
        wire.push('\n');
    }
    wire.push('\n');
    Bytes::from(wire)
}

fn contains_done(bytes: &Bytes) -> bool {
    bytes.windows(b"[DONE]".len()).any(|window| window == b"[DONE]")
}

/// Injects the terminal error chunk (§4.4 "Streaming wiring"): once 200/SSE
/// headers are written, a failure can't revise the status code, so it is
/// folded into the stream as one final content chunk followed by `[DONE]`.
async fn inject_error(tx: &mpsc::Sender<Bytes>, response_id: &str, requested_model: &str, message: &str) {
    let chunk = ChatCompletionChunk::new(
        response_id.to_string(),
        now_unix_seconds(),
        requested_model.to_string(),
        ChunkChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: Some(format!("\n\n[Error: {message}]")),
                reasoning_content: None,
                tool_calls: None,
            },
            finish_reason: Some(FinishReason::Stop),
        },
    );
    let _ = tx.send(encode_chunk(&chunk)).await;
    let _ = tx.send(Bytes::from_static(b"data: [DONE]\n\n")).await;
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use openmux_balancer::{LoadBalancer, StatusCollector};
    use openmux_config::{
        Account, AccountStatus, AuthStyle, ConfigSnapshot, InMemoryConfigStore,
        Provider as ConfigProvider, RuntimeSettings,
    };
    use openmux_provider_core::ProviderRegistry;

    fn selection() -> AccountSelection {
        AccountSelection {
            account: Account {
                id: "a1".into(),
                provider_id: "p1".into(),
                display_name: "A1".into(),
                status: AccountStatus::Active,
                credentials: HashMap::new(),
                daily_limit: None,
                request_count: 0,
                today_used: 0,
                last_used: None,
                error_message: None,
            },
            provider_id: "p1".into(),
            actual_model: "gpt-4".into(),
        }
    }

    fn forwarder() -> Arc<Forwarder> {
        let snapshot = ConfigSnapshot {
            providers: vec![ConfigProvider {
                id: "p1".into(),
                display_name: "P1".into(),
                enabled: true,
                supported_models: vec![],
                model_mappings: Default::default(),
                auth_style: AuthStyle::Token,
                endpoint_base_url: "https://example.test".into(),
                request_headers: Default::default(),
                created_at: None,
            }],
            accounts: vec![],
            settings: RuntimeSettings::default(),
        };
        let config: Arc<dyn openmux_config::ConfigStore> =
            Arc::new(InMemoryConfigStore::new(snapshot));
        Arc::new(Forwarder::new(
            config,
            Arc::new(LoadBalancer::new()),
            Arc::new(StatusCollector::new()),
            Arc::new(ProviderRegistry::new()),
            Duration::from_secs(30),
        ))
    }

    async fn drain(mut rx: mpsc::Receiver<Bytes>) -> String {
        let mut out = String::new();
        while let Some(bytes) = rx.recv().await {
            out.push_str(&String::from_utf8_lossy(&bytes));
        }
        out
    }

    #[tokio::test]
    async fn clean_eof_without_explicit_done_still_ends_with_done() {
        let (upstream_tx, upstream) = mpsc::channel(8);
        upstream_tx
            .send(Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
            )))
            .await
            .unwrap();
        drop(upstream_tx);

        let rx = spawn(
            forwarder(),
            selection(),
            upstream,
            false,
            "resp-1".to_string(),
            "gpt-4".to_string(),
            Instant::now(),
            Instant::now() + Duration::from_secs(5),
        );
        let wire = drain(rx).await;
        assert!(wire.contains("\"content\":\"hi\""));
        assert!(wire.trim_end().ends_with("data: [DONE]"));
    }

    #[tokio::test]
    async fn explicit_done_event_is_not_duplicated() {
        let (upstream_tx, upstream) = mpsc::channel(8);
        upstream_tx
            .send(Ok(Bytes::from_static(b"data: [DONE]\n\n")))
            .await
            .unwrap();
        drop(upstream_tx);

        let rx = spawn(
            forwarder(),
            selection(),
            upstream,
            false,
            "resp-1".to_string(),
            "gpt-4".to_string(),
            Instant::now(),
            Instant::now() + Duration::from_secs(5),
        );
        let wire = drain(rx).await;
        assert_eq!(wire.matches("[DONE]").count(), 1);
    }

    #[tokio::test]
    async fn mid_stream_transport_error_injects_error_chunk_then_done() {
        let (upstream_tx, upstream) = mpsc::channel(8);
        upstream_tx
            .send(Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            )))
            .await
            .unwrap();
        upstream_tx.send(Err("connection reset".to_string())).await.unwrap();

        let rx = spawn(
            forwarder(),
            selection(),
            upstream,
            false,
            "resp-1".to_string(),
            "gpt-4".to_string(),
            Instant::now(),
            Instant::now() + Duration::from_secs(5),
        );
        let wire = drain(rx).await;
        assert!(wire.contains("connection reset"));
        assert!(wire.trim_end().ends_with("data: [DONE]"));
    }

    #[tokio::test]
    async fn skip_transform_passes_bytes_through_verbatim() {
        let (upstream_tx, upstream) = mpsc::channel(8);
        let raw = b"data: {\"id\":\"native\"}\n\ndata: [DONE]\n\n";
        upstream_tx.send(Ok(Bytes::from_static(raw))).await.unwrap();
        drop(upstream_tx);

        let rx = spawn(
            forwarder(),
            selection(),
            upstream,
            true,
            "resp-1".to_string(),
            "gpt-4".to_string(),
            Instant::now(),
            Instant::now() + Duration::from_secs(5),
        );
        let wire = drain(rx).await;
        assert_eq!(wire, String::from_utf8_lossy(raw));
    }

    #[tokio::test]
    async fn expired_deadline_injects_timeout_chunk() {
        let (_upstream_tx, upstream) = mpsc::channel(8);

        let rx = spawn(
            forwarder(),
            selection(),
            upstream,
            false,
            "resp-1".to_string(),
            "gpt-4".to_string(),
            Instant::now(),
            Instant::now(),
        );
        let wire = drain(rx).await;
        assert!(wire.contains("timed out"));
        assert!(wire.trim_end().ends_with("data: [DONE]"));
    }
}
