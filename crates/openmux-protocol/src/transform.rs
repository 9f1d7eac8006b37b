//! The stream transformer: converts upstream SSE events into OpenAI-chunk-shaped
//! output, running tool-call buffering inline (SPEC_FULL.md §4.4.a, §4.4.b, §9
//! "Coroutine-style suspension in the tool-call buffering").
//!
//! Modeled as the finite-state machine the design notes ask for: two states,
//! `PassThrough` and `Buffering`, folded into a single `is_buffering_tool_call`
//! flag rather than a separate enum, since every other field (content buffer,
//! tool-call index, first-chunk flag) is shared between the two states anyway.
//! `StreamTransformer::push` is the `advance` step: one call per SSE event in.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::openai::{
    ChatCompletionChunk, ChunkChoice, Delta, FinishReason, FunctionCall, ToolCall, ToolCallKind,
};
use crate::sse::SseEvent;
use crate::tool_call::{self, ParsedToolCall};

const MARKER: &str = "[function_calls]";
/// Give up buffering and flush as plain text past this length (§4.4.a).
const MAX_BUFFER_LEN: usize = 10_000;

/// One unit of output from the transformer for a single upstream SSE event.
#[derive(Debug, Clone)]
pub enum TransformOutput {
    /// A normalized OpenAI chunk, ready to be wrapped as `data: <json>\n\n`.
    Chunk(ChatCompletionChunk),
    /// The upstream event could not be parsed as JSON; forwarded verbatim
    /// (some adapters interleave non-JSON heartbeats).
    Raw(SseEvent),
    /// `data: [DONE]` was observed; the caller must end the client stream after
    /// emitting this.
    Done,
}

pub struct StreamTransformer {
    response_id: String,
    requested_model: String,
    created: i64,
    is_first_chunk: bool,
    content_buffer: String,
    is_buffering_tool_call: bool,
    tool_call_index: u32,
}

impl StreamTransformer {
    pub fn new(response_id: impl Into<String>, requested_model: impl Into<String>) -> Self {
        Self {
            response_id: response_id.into(),
            requested_model: requested_model.into(),
            created: now_unix_seconds(),
            is_first_chunk: true,
            content_buffer: String::new(),
            is_buffering_tool_call: false,
            tool_call_index: 0,
        }
    }

    /// Run one SSE event through the transformer. May emit zero or more chunks.
    pub fn push(&mut self, event: &SseEvent) -> Vec<TransformOutput> {
        if event.data == "[DONE]" {
            let mut out = Vec::new();
            if !self.content_buffer.is_empty() {
                out.push(self.content_chunk(std::mem::take(&mut self.content_buffer)));
            }
            out.push(TransformOutput::Done);
            return out;
        }

        let Ok(data) = serde_json::from_str::<Value>(&event.data) else {
            return vec![TransformOutput::Raw(event.clone())];
        };

        let content = extract_content(&data);
        let reasoning_content = extract_reasoning_content(&data);
        let native_tool_calls = extract_native_tool_calls(&data);
        let finish_reason = extract_finish_reason(&data);

        if content.is_none()
            && reasoning_content.is_none()
            && native_tool_calls.is_none()
            && finish_reason.is_none()
        {
            return Vec::new();
        }

        let mut out = Vec::new();

        if reasoning_content.is_some() || native_tool_calls.is_some() || finish_reason.is_some() {
            let role = if content.is_none() {
                self.take_first_chunk_role()
            } else {
                None
            };
            out.push(TransformOutput::Chunk(self.make_chunk(
                Delta {
                    role,
                    content: None,
                    reasoning_content,
                    tool_calls: native_tool_calls,
                },
                finish_reason,
            )));
        }

        if let Some(content) = content {
            self.content_buffer.push_str(&content);
            self.run_buffer_protocol(&mut out);
        }

        out
    }

    /// Flushes any residual buffered content and emits `Done`, as if the
    /// upstream had sent an explicit `[DONE]` event. Used when the upstream
    /// byte stream closes (cleanly or on error) without ever sending one
    /// (§4.4.a, I2 — every 200 stream ends with `[DONE]`).
    pub fn flush(&mut self) -> Vec<TransformOutput> {
        let mut out = Vec::new();
        if !self.content_buffer.is_empty() {
            out.push(self.content_chunk(std::mem::take(&mut self.content_buffer)));
        }
        out.push(TransformOutput::Done);
        out
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    fn run_buffer_protocol(&mut self, out: &mut Vec<TransformOutput>) {
        loop {
            if !self.is_buffering_tool_call {
                if let Some(pos) = self.content_buffer.find(MARKER) {
                    self.emit_prefix(pos, out);
                    self.is_buffering_tool_call = true;
                    continue;
                }
                if let Some(pos) = find_partial_marker(&self.content_buffer) {
                    self.emit_prefix(pos, out);
                    self.is_buffering_tool_call = true;
                    continue;
                }
                if !self.content_buffer.is_empty() {
                    out.push(self.content_chunk(std::mem::take(&mut self.content_buffer)));
                }
                return;
            }

            let parsed = tool_call::parse(&self.content_buffer);
            if parsed.tool_calls.is_empty() {
                if self.content_buffer.len() > MAX_BUFFER_LEN {
                    self.is_buffering_tool_call = false;
                    out.push(self.content_chunk(std::mem::take(&mut self.content_buffer)));
                }
                return;
            }

            for call in parsed.tool_calls {
                out.push(self.tool_call_chunk(call));
            }
            self.content_buffer = parsed.content;
            self.is_buffering_tool_call = self.content_buffer.contains(MARKER);
            if !self.is_buffering_tool_call {
                if !self.content_buffer.is_empty() {
                    out.push(self.content_chunk(std::mem::take(&mut self.content_buffer)));
                }
                return;
            }
            // Still buffering: another envelope may already be fully present
            // in the residual (e.g. two `[function_calls]` blocks arrived in
            // the same chunk), so loop once more instead of waiting.
        }
    }

    fn emit_prefix(&mut self, pos: usize, out: &mut Vec<TransformOutput>) {
        if pos > 0 {
            let prefix: String = self.content_buffer.drain(..pos).collect();
            if !prefix.is_empty() {
                out.push(self.content_chunk(prefix));
            }
        }
    }

    fn take_first_chunk_role(&mut self) -> Option<String> {
        if self.is_first_chunk {
            self.is_first_chunk = false;
            Some("assistant".to_string())
        } else {
            None
        }
    }

    fn content_chunk(&mut self, text: String) -> TransformOutput {
        let role = self.take_first_chunk_role();
        TransformOutput::Chunk(self.make_chunk(
            Delta {
                role,
                content: Some(text),
                reasoning_content: None,
                tool_calls: None,
            },
            None,
        ))
    }

    fn tool_call_chunk(&mut self, call: ParsedToolCall) -> TransformOutput {
        let role = self.take_first_chunk_role();
        let index = self.tool_call_index;
        self.tool_call_index += 1;
        let tool_call = ToolCall {
            index,
            id: format!("{}-call-{index}", self.response_id),
            kind: ToolCallKind::Function,
            function: FunctionCall {
                name: call.name,
                arguments: call.arguments,
            },
        };
        TransformOutput::Chunk(self.make_chunk(
            Delta {
                role,
                content: None,
                reasoning_content: None,
                tool_calls: Some(vec![tool_call]),
            },
            None,
        ))
    }

    fn make_chunk(&self, delta: Delta, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk::new(
            self.response_id.clone(),
            self.created,
            self.requested_model.clone(),
            ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            },
        )
    }
}

/// Scans for a `[` whose remaining tail is a proper (non-empty, non-full) prefix
/// of the `[function_calls]` marker — a marker that may still be growing as more
/// bytes arrive.
fn find_partial_marker(text: &str) -> Option<usize> {
    for (idx, _) in text.match_indices('[') {
        let tail = &text[idx..];
        if tail.len() < MARKER.len() && MARKER.starts_with(tail) {
            return Some(idx);
        }
    }
    None
}

fn extract_content(data: &Value) -> Option<String> {
    data.pointer("/choices/0/delta/content")
        .and_then(value_as_text)
        .or_else(|| data.pointer("/choices/0/text").and_then(value_as_text))
        .or_else(|| data.get("content").and_then(value_as_text))
        .or_else(|| data.get("message").and_then(value_as_text))
        .or_else(|| {
            if data.is_string() {
                data.as_str().map(str::to_string)
            } else {
                None
            }
        })
}

fn extract_reasoning_content(data: &Value) -> Option<String> {
    data.pointer("/choices/0/delta/reasoning_content")
        .and_then(value_as_text)
        .or_else(|| data.get("reasoning_content").and_then(value_as_text))
}

fn extract_native_tool_calls(data: &Value) -> Option<Vec<ToolCall>> {
    let raw = data.pointer("/choices/0/delta/tool_calls")?;
    serde_json::from_value(raw.clone()).ok()
}

fn extract_finish_reason(data: &Value) -> Option<FinishReason> {
    let raw = data
        .pointer("/choices/0/finish_reason")
        .or_else(|| data.get("finish_reason"))?;
    if raw.is_null() {
        return None;
    }
    serde_json::from_value(raw.clone()).ok()
}

fn value_as_text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Buffered non-stream aggregation of the same upstream events (§4.4.a
/// "Non-stream aggregation"): content/reasoning concatenate, native `tool_calls`
/// aggregate by index, and the bracket-marker parser runs once at EOF.
#[derive(Debug, Default)]
pub struct NonStreamAggregator {
    content: String,
    reasoning_content: String,
    native_tool_calls: std::collections::BTreeMap<u32, NativeToolCallAccumulator>,
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Default)]
struct NativeToolCallAccumulator {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl NonStreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one parsed SSE payload (already JSON-decoded). Returns `true` once
    /// `[DONE]` should end accumulation — callers check `event.data == "[DONE]"`
    /// themselves before calling this, since `[DONE]` is not JSON.
    pub fn push(&mut self, data: &Value) {
        if let Some(content) = extract_content(data) {
            self.content.push_str(&content);
        }
        if let Some(reasoning) = extract_reasoning_content(data) {
            self.reasoning_content.push_str(&reasoning);
        }
        if let Some(deltas) = data.pointer("/choices/0/delta/tool_calls") {
            if let Ok(deltas) = serde_json::from_value::<Vec<crate::openai::ToolCallDelta>>(deltas.clone())
            {
                for delta in deltas {
                    let entry = self.native_tool_calls.entry(delta.index).or_default();
                    if let Some(id) = delta.id {
                        entry.id = Some(id);
                    }
                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            entry.name.push_str(&name);
                        }
                        if let Some(arguments) = function.arguments {
                            entry.arguments.push_str(&arguments);
                        }
                    }
                }
            }
        }
        if let Some(reason) = extract_finish_reason(data) {
            self.finish_reason = Some(reason);
        }
    }

    /// Finalize into the `message` fields of a non-stream `ChatCompletionResponse`.
    pub fn finish(self) -> AggregatedMessage {
        let parsed = tool_call::parse(&self.content);
        let mut next_index = self
            .native_tool_calls
            .keys()
            .next_back()
            .map(|i| i + 1)
            .unwrap_or(0);

        let mut tool_calls: Vec<ToolCall> = self
            .native_tool_calls
            .into_iter()
            .map(|(index, acc)| ToolCall {
                index,
                id: acc.id.unwrap_or_else(|| format!("call-{index}")),
                kind: ToolCallKind::Function,
                function: FunctionCall {
                    name: acc.name,
                    arguments: acc.arguments,
                },
            })
            .collect();

        for call in parsed.tool_calls {
            let index = next_index;
            next_index += 1;
            tool_calls.push(ToolCall {
                index,
                id: format!("call-{index}"),
                kind: ToolCallKind::Function,
                function: FunctionCall {
                    name: call.name,
                    arguments: call.arguments,
                },
            });
        }
        tool_calls.sort_by_key(|t| t.index);

        let reasoning_content = if self.reasoning_content.is_empty() {
            None
        } else {
            Some(self.reasoning_content)
        };

        if tool_calls.is_empty() {
            AggregatedMessage {
                content: Some(parsed.content),
                reasoning_content,
                tool_calls: None,
                finish_reason: self.finish_reason,
            }
        } else {
            let finish_reason = match self.finish_reason {
                Some(FinishReason::Stop) | None => Some(FinishReason::ToolCalls),
                other => other,
            };
            AggregatedMessage {
                content: None,
                reasoning_content,
                tool_calls: Some(tool_calls),
                finish_reason,
            }
        }
    }
}

pub struct AggregatedMessage {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: Option<FinishReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_event(json: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: json.to_string(),
            id: None,
            retry: None,
        }
    }

    fn done_event() -> SseEvent {
        data_event("[DONE]")
    }

    fn chunk_text(out: &TransformOutput) -> Option<&str> {
        match out {
            TransformOutput::Chunk(c) => c.choices[0].delta.content.as_deref(),
            _ => None,
        }
    }

    #[test]
    fn first_chunk_carries_assistant_role() {
        let mut t = StreamTransformer::new("id-1", "gpt-4o");
        let out = t.push(&data_event(r#"{"choices":[{"delta":{"content":"hi"}}]}"#));
        let TransformOutput::Chunk(chunk) = &out[0] else {
            panic!("expected chunk")
        };
        assert_eq!(chunk.choices[0].delta.role.as_deref(), Some("assistant"));
    }

    #[test]
    fn non_json_event_is_forwarded_raw() {
        let mut t = StreamTransformer::new("id-1", "m");
        let out = t.push(&data_event(": heartbeat"));
        assert!(matches!(out[0], TransformOutput::Raw(_)));
    }

    #[test]
    fn done_flushes_buffer_then_ends() {
        let mut t = StreamTransformer::new("id-1", "m");
        t.push(&data_event(r#"{"content":"partial"}"#));
        let out = t.push(&done_event());
        assert_eq!(chunk_text(&out[0]), Some("partial"));
        assert!(matches!(out[1], TransformOutput::Done));
    }

    #[test]
    fn tool_call_split_across_three_events_s3() {
        let mut t = StreamTransformer::new("id-1", "m");
        let mut outputs = Vec::new();
        outputs.extend(t.push(&data_event(r#"{"content":"Let me compute. "}"#)));
        outputs.extend(t.push(&data_event(
            r#"{"content":"[function_calls][call:add]{\"a\":1,\"b\":"}"#,
        )));
        outputs.extend(t.push(&data_event(r#"{"content":"2}[/call][/function_calls]"}"#)));

        let content_chunks: Vec<&str> = outputs.iter().filter_map(chunk_text).collect();
        assert_eq!(content_chunks, vec!["Let me compute. "]);

        let tool_chunk = outputs
            .iter()
            .find_map(|o| match o {
                TransformOutput::Chunk(c) => c.choices[0].delta.tool_calls.as_ref(),
                _ => None,
            })
            .expect("a tool call chunk was emitted");
        assert_eq!(tool_chunk[0].function.name, "add");
        assert_eq!(tool_chunk[0].function.arguments, r#"{"a":1,"b":2}"#);
        assert_eq!(tool_chunk[0].index, 0);
    }

    #[test]
    fn giving_up_after_max_buffer_emits_plain_text() {
        let mut t = StreamTransformer::new("id-1", "m");
        let huge = "[function_calls]".to_string() + &"x".repeat(MAX_BUFFER_LEN + 1);
        let out = t.push(&data_event(&format!(r#"{{"content":{}}}"#, serde_json::Value::String(huge.clone()))));
        let emitted: String = out
            .iter()
            .filter_map(chunk_text)
            .collect::<Vec<_>>()
            .join("");
        assert_eq!(emitted, huge);
    }

    #[test]
    fn non_stream_aggregator_concatenates_and_forces_tool_calls_finish_reason() {
        let mut agg = NonStreamAggregator::new();
        agg.push(&serde_json::json!({"choices":[{"delta":{"content":"Let me compute. "}}]}));
        agg.push(&serde_json::json!({"choices":[{"delta":{"content":"[function_calls][call:add]{\"a\":1}[/call][/function_calls]"},"finish_reason":"stop"}]}));
        let message = agg.finish();
        assert!(message.content.is_none());
        let calls = message.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "add");
        assert_eq!(message.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn non_stream_aggregator_keeps_stop_when_no_tool_calls() {
        let mut agg = NonStreamAggregator::new();
        agg.push(&serde_json::json!({"choices":[{"delta":{"content":"hello"}}]}));
        agg.push(&serde_json::json!({"choices":[{"finish_reason":"stop"}]}));
        let message = agg.finish();
        assert_eq!(message.content.as_deref(), Some("hello"));
        assert_eq!(message.finish_reason, Some(FinishReason::Stop));
    }
}
