//! The OpenAI-facing wire protocol: request/response/chunk shapes, the incremental
//! SSE parser, the bracket-marker tool-call parser, and the stream transformer that
//! glues them together (SPEC_FULL.md §4.1, §4.4, §4.4.a, §4.4.b).

pub mod openai;
pub mod sse;
pub mod tool_call;
pub mod transform;

pub use openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, CompletionsRequest, Delta, ErrorBody, ErrorDetail, ErrorKind, FinishReason,
    FunctionCall, FunctionCallDelta, ModelListEntry, ModelListResponse, PromptValue, ToolCall,
    ToolCallDelta, ToolCallKind, Usage,
};
pub use sse::{SseEvent, SseParser};
pub use tool_call::{ParseOutput, ParsedToolCall, parse as parse_tool_calls, parse_xml_tool_use};
pub use transform::{AggregatedMessage, NonStreamAggregator, StreamTransformer, TransformOutput};
