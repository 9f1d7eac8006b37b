//! `ForwardOutcome` (SPEC_FULL.md §4.5, §9): the result of
//! `Provider::forward_chat_completion`. A tagged union rather than a struct
//! with a nullable stream field, per the redesign flag against the original's
//! null/undefined-union style.

use bytes::Bytes;

/// One item off a `ByteStream`: a body chunk, or a transport error observed
/// mid-flight. Distinguishing the two (rather than just dropping the sender)
/// is what lets the forwarder tell a clean upstream EOF apart from a
/// connection reset and inject the in-band error chunk §4.4 requires (S5).
pub type StreamItem = Result<Bytes, String>;

/// A channel of upstream body chunks; the receiving end of whatever the
/// adapter's HTTP client hands back. A clean upstream EOF drops the sender
/// without a final `Err`; a transport failure sends one `Err` then drops it.
pub type ByteStream = tokio::sync::mpsc::Receiver<StreamItem>;

pub enum ForwardOutcome {
    /// The whole response arrived as one body (non-streaming request, or a
    /// vendor that doesn't stream at all). `skip_transform` is true when the
    /// adapter already emits an OpenAI-shaped JSON body and the forwarder
    /// should pass it through unmodified rather than re-aggregating it.
    Buffered {
        body: Bytes,
        skip_transform: bool,
    },
    /// A live byte stream. `skip_transform` is true when the adapter already
    /// emits OpenAI-chunk-shaped SSE and the forwarder should pass bytes
    /// through unmodified rather than routing them through the stream
    /// transformer (§4.4 "Dispatch").
    Stream {
        body: ByteStream,
        skip_transform: bool,
    },
}

pub struct ForwardResult {
    pub outcome: ForwardOutcome,
    /// The upstream HTTP status, kept for diagnostics; a non-2xx status
    /// reaching this far is itself reported as `ProviderError::Upstream` by
    /// the adapter, so this is expected to be a 2xx in practice.
    pub status: u16,
}
