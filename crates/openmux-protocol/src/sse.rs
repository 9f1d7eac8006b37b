//! Incremental Server-Sent-Events parser (SPEC_FULL.md §4.4.a).
//!
//! Line-oriented and chunk-boundary-agnostic (I3): bytes accumulate in a buffer,
//! lines are split on `\n`, and a pending event is dispatched on every blank line.

use bytes::Bytes;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
    retry: Option<String>,
    saw_data_field: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);

            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                self.finish_event(&mut events);
                continue;
            }

            self.consume_field(&line);
        }

        events
    }

    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            self.consume_field(&line);
        }
        self.finish_event(&mut events);
        events
    }

    fn consume_field(&mut self, line: &str) {
        let Some(colon) = line.find(':') else {
            // Lines without a colon are ignored.
            return;
        };
        let field = &line[..colon];
        let mut value = &line[colon + 1..];
        // A leading single space after the colon is stripped (not all whitespace).
        value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => {
                self.event = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "data" => {
                self.data_lines.push(value.to_string());
                self.saw_data_field = true;
            }
            "id" => {
                self.id = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "retry" => {
                self.retry = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => {}
        }
    }

    fn finish_event(&mut self, events: &mut Vec<SseEvent>) {
        // An event with no `data` field is dropped.
        if !self.saw_data_field {
            self.event = None;
            self.id = None;
            self.retry = None;
            self.data_lines.clear();
            return;
        }
        let data = self.data_lines.join("\n");
        events.push(SseEvent {
            event: self.event.take(),
            data,
            id: self.id.take(),
            retry: self.retry.take(),
        });
        self.data_lines.clear();
        self.saw_data_field = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_event_in_one_shot() {
        let mut parser = SseParser::new();
        let events = parser.push_str("event: message\ndata: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn parses_split_across_arbitrary_chunk_boundaries() {
        let whole = "data: a\ndata: b\n\ndata: [DONE]\n\n";
        for split in 0..whole.len() {
            let mut parser = SseParser::new();
            let (first, second) = whole.split_at(split);
            let mut events = parser.push_str(first);
            events.extend(parser.push_str(second));
            events.extend(parser.finish());
            assert_eq!(events.len(), 2, "failed at split {split}");
            assert_eq!(events[0].data, "a\nb");
            assert_eq!(events[1].data, "[DONE]");
        }
    }

    #[test]
    fn event_without_data_field_is_dropped() {
        let mut parser = SseParser::new();
        let events = parser.push_str("event: ping\n\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn only_a_single_leading_space_is_stripped() {
        let mut parser = SseParser::new();
        let events = parser.push_str("data:  leading two spaces\n\n");
        assert_eq!(events[0].data, " leading two spaces");
    }

    #[test]
    fn lines_without_colon_are_ignored() {
        let mut parser = SseParser::new();
        let events = parser.push_str("notafield\ndata: x\n\n");
        assert_eq!(events[0].data, "x");
    }
}
