//! Incremental framing for completion streams
//!
//! Network chunks arrive at arbitrary byte boundaries. The framers here
//! buffer raw bytes until a complete frame is available and only then
//! decode it, so a multi-byte character split across two chunks is never
//! corrupted:
//! - OpenAI style: server-sent events, one `data:` line per event
//! - Ollama style: newline-delimited JSON, one object per line
//!
//! A bad line costs exactly one event; the lines after it decode normally.
//!
//! Every frame decodes to at most one [`StreamEvent`]. Decoding never fails;
//! a frame that cannot be understood becomes [`StreamEvent::Skip`].

use serde_json::Value;

/// Longest unterminated line a framer will hold (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// SSE terminator sent by OpenAI-compatible servers
const SSE_DONE: &str = "[DONE]";

/// One decoded response event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text fragment to append to the transcript
    Fragment(String),
    /// An event carrying no text; iteration continues
    Skip(SkipReason),
    /// The transport failed; nothing follows
    TransportFault(String),
}

/// Why an event produced no fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Not valid JSON, not valid UTF-8, or missing the fragment field
    Malformed,
    /// Well-formed but the fragment was empty
    Empty,
    /// Protocol bookkeeping such as `[DONE]` or a final `done` object
    Control,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Malformed => write!(f, "malformed"),
            SkipReason::Empty => write!(f, "empty"),
            SkipReason::Control => write!(f, "control"),
        }
    }
}

/// Turns raw transport bytes into events
pub trait FrameDecoder {
    /// Feed one network chunk, returning every event it completes
    fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent>;

    /// Flush whatever is left once the transport closes
    fn finish(&mut self) -> Vec<StreamEvent>;
}

/// Splits a byte stream into `\n`-terminated lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every completed line, without its terminator.
    /// A line that is not valid UTF-8 comes back as `Err` with its raw bytes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<std::result::Result<String, Vec<u8>>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8(line).map_err(|e| e.into_bytes()));
        }
        lines
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Return the unterminated remainder, if any
    pub fn flush(&mut self) -> Option<std::result::Result<String, Vec<u8>>> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8(rest).map_err(|e| e.into_bytes()))
    }
}

/// Decode one SSE line from an OpenAI-compatible chat completion stream.
/// Returns `None` for lines that are not events (blank separators,
/// comments, `event:`/`id:` fields).
pub fn decode_openai_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end();
    let payload = line.strip_prefix("data:")?.trim_start();

    if payload == SSE_DONE {
        return Some(StreamEvent::Skip(SkipReason::Control));
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => return Some(StreamEvent::Skip(SkipReason::Malformed)),
    };

    let choice = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let Some(choice) = choice else {
        return Some(StreamEvent::Skip(SkipReason::Malformed));
    };

    match choice.get("delta").map(|d| d.get("content")) {
        Some(Some(Value::String(text))) if !text.is_empty() => Some(StreamEvent::Fragment(text.clone())),
        Some(Some(Value::String(_))) | Some(Some(Value::Null)) | Some(None) => {
            if choice.get("finish_reason").map_or(false, |r| !r.is_null()) {
                Some(StreamEvent::Skip(SkipReason::Control))
            } else {
                Some(StreamEvent::Skip(SkipReason::Empty))
            }
        }
        _ => Some(StreamEvent::Skip(SkipReason::Malformed)),
    }
}

/// Decode one Ollama `/api/generate` response object
pub fn decode_ollama_object(json: &str) -> StreamEvent {
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(_) => return StreamEvent::Skip(SkipReason::Malformed),
    };

    let done = value.get("done").and_then(|d| d.as_bool()).unwrap_or(false);
    match value.get("response") {
        Some(Value::String(text)) if !text.is_empty() => StreamEvent::Fragment(text.clone()),
        Some(Value::String(_)) if done => StreamEvent::Skip(SkipReason::Control),
        Some(Value::String(_)) => StreamEvent::Skip(SkipReason::Empty),
        _ => StreamEvent::Skip(SkipReason::Malformed),
    }
}

fn overflow(limit: usize) -> StreamEvent {
    StreamEvent::TransportFault(format!("Buffer overflow: unterminated line exceeds {} bytes", limit))
}

/// Framer for server-sent events
#[derive(Debug)]
pub struct SseDecoder {
    lines: LineBuffer,
    max_line: usize,
    failed: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Create a framer that gives up on lines longer than `max_line`
    pub fn with_capacity(max_line: usize) -> Self {
        Self {
            lines: LineBuffer::new(),
            max_line,
            failed: false,
        }
    }

    fn decode(line: std::result::Result<String, Vec<u8>>) -> Option<StreamEvent> {
        match line {
            Ok(line) => decode_openai_line(&line),
            Err(_) => Some(StreamEvent::Skip(SkipReason::Malformed)),
        }
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.failed {
            return Vec::new();
        }
        let mut events: Vec<StreamEvent> = self.lines.push(bytes).into_iter().filter_map(Self::decode).collect();
        if self.lines.pending() > self.max_line {
            self.failed = true;
            events.push(overflow(self.max_line));
        }
        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.failed {
            return Vec::new();
        }
        self.lines.flush().and_then(Self::decode).into_iter().collect()
    }
}

/// Framer for newline-delimited JSON objects
#[derive(Debug)]
pub struct NdjsonDecoder {
    lines: LineBuffer,
    max_line: usize,
    failed: bool,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Create a framer that gives up on lines longer than `max_line`
    pub fn with_capacity(max_line: usize) -> Self {
        Self {
            lines: LineBuffer::new(),
            max_line,
            failed: false,
        }
    }

    fn decode(line: std::result::Result<String, Vec<u8>>) -> Option<StreamEvent> {
        match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(decode_ollama_object(line.trim())),
            Err(_) => Some(StreamEvent::Skip(SkipReason::Malformed)),
        }
    }
}

impl Default for NdjsonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for NdjsonDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.failed {
            return Vec::new();
        }
        let mut events: Vec<StreamEvent> = self.lines.push(bytes).into_iter().filter_map(Self::decode).collect();
        if self.lines.pending() > self.max_line {
            self.failed = true;
            events.push(overflow(self.max_line));
        }
        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.failed {
            return Vec::new();
        }
        self.lines.flush().and_then(Self::decode).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str) -> StreamEvent {
        StreamEvent::Fragment(text.to_string())
    }

    #[test]
    fn test_line_buffer_splits_utf8_safely() {
        let mut lines = LineBuffer::new();
        let text = "data: héllo\r\n".as_bytes();
        // split inside the two-byte 'é'
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(lines.push(&text[..split]).is_empty());
        let done = lines.push(&text[split..]);
        let expected: Vec<std::result::Result<String, Vec<u8>>> = vec![Ok("data: héllo".to_string())];
        assert_eq!(done, expected);
        assert!(lines.flush().is_none());
    }

    #[test]
    fn test_decode_openai_fragment() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(decode_openai_line(line), Some(fragment("Hel")));
    }

    #[test]
    fn test_decode_openai_non_events() {
        assert_eq!(decode_openai_line(""), None);
        assert_eq!(decode_openai_line(": keep-alive"), None);
        assert_eq!(decode_openai_line("event: message"), None);
    }

    #[test]
    fn test_decode_openai_skips() {
        assert_eq!(decode_openai_line("data: [DONE]"), Some(StreamEvent::Skip(SkipReason::Control)));
        assert_eq!(decode_openai_line("data: {not json"), Some(StreamEvent::Skip(SkipReason::Malformed)));
        assert_eq!(decode_openai_line(r#"data: {"choices":[]}"#), Some(StreamEvent::Skip(SkipReason::Malformed)));
        assert_eq!(
            decode_openai_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            Some(StreamEvent::Skip(SkipReason::Empty))
        );
        assert_eq!(
            decode_openai_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            Some(StreamEvent::Skip(SkipReason::Control))
        );
        assert_eq!(
            decode_openai_line(r#"data: {"choices":[{"delta":{"content":42}}]}"#),
            Some(StreamEvent::Skip(SkipReason::Malformed))
        );
    }

    #[test]
    fn test_decode_ollama_objects() {
        assert_eq!(decode_ollama_object(r#"{"response":"Hi","done":false}"#), fragment("Hi"));
        assert_eq!(
            decode_ollama_object(r#"{"response":"","done":true,"eval_count":12}"#),
            StreamEvent::Skip(SkipReason::Control)
        );
        assert_eq!(decode_ollama_object(r#"{"response":"","done":false}"#), StreamEvent::Skip(SkipReason::Empty));
        assert_eq!(decode_ollama_object(r#"{"error":"model not found"}"#), StreamEvent::Skip(SkipReason::Malformed));
        assert_eq!(decode_ollama_object("{oops}"), StreamEvent::Skip(SkipReason::Malformed));
    }

    #[test]
    fn test_sse_decoder_across_chunks() {
        let mut decoder = SseDecoder::new();

        let mut events = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\ndata: {\"cho");
        events.extend(decoder.push(b"ices\":[{\"delta\":{\"content\":\"B\"}}]}\n\ndata: [DONE]"));
        events.extend(decoder.finish());

        assert_eq!(
            events,
            vec![fragment("A"), fragment("B"), StreamEvent::Skip(SkipReason::Control)]
        );
    }

    #[test]
    fn test_ndjson_decoder_across_chunks() {
        let mut decoder = NdjsonDecoder::new();

        let mut events = decoder.push(b"{\"response\":\"caf\xC3");
        assert!(events.is_empty());
        events.extend(decoder.push(b"\xA9\",\"done\":false}\n{\"response\":\"!\",\"done\":false}\n"));
        events.extend(decoder.push(b"{\"response\":\"\",\"done\":true}\n"));
        events.extend(decoder.finish());

        assert_eq!(
            events,
            vec![fragment("café"), fragment("!"), StreamEvent::Skip(SkipReason::Control)]
        );
    }

    #[test]
    fn test_ndjson_bad_line_costs_one_event() {
        let mut decoder = NdjsonDecoder::new();

        // Stray brace, then a truncated object, all in one chunk
        let mut events = decoder.push(
            b"}\n{\"response\":\"A\",\"done\":false}\n{\"response\":\"x\"\n\
              {\"response\":\"B\",\"done\":false}\n\n{\"response\":\"\",\"done\":true}\n",
        );
        events.extend(decoder.finish());

        assert_eq!(
            events,
            vec![
                StreamEvent::Skip(SkipReason::Malformed),
                fragment("A"),
                StreamEvent::Skip(SkipReason::Malformed),
                fragment("B"),
                StreamEvent::Skip(SkipReason::Control),
            ]
        );
    }

    #[test]
    fn test_ndjson_invalid_utf8_line_is_skipped() {
        let mut decoder = NdjsonDecoder::new();

        let mut events = decoder.push(b"{\"response\":\"\xFF\"}\n{\"response\":\"ok\"}");
        events.extend(decoder.finish());

        assert_eq!(events, vec![StreamEvent::Skip(SkipReason::Malformed), fragment("ok")]);
    }

    #[test]
    fn test_unterminated_line_overflow_is_fatal() {
        let mut decoder = NdjsonDecoder::with_capacity(100);

        let events = decoder.push(&[b'a'; 150]);
        assert!(matches!(events.as_slice(), [StreamEvent::TransportFault(_)]));
        assert!(decoder.push(b"\n{\"response\":\"late\"}\n").is_empty());
        assert!(decoder.finish().is_empty());

        let mut sse = SseDecoder::with_capacity(100);
        assert!(matches!(sse.push(&[b'a'; 150]).as_slice(), [StreamEvent::TransportFault(_)]));
    }

    #[test]
    fn test_long_lines_within_limit_pass() {
        let mut decoder = NdjsonDecoder::with_capacity(64);
        let text = "y".repeat(40);
        let line = format!("{{\"response\":\"{}\"}}\n", text);

        let mut events = Vec::new();
        for _ in 0..5 {
            events.extend(decoder.push(line.as_bytes()));
        }
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| *e == fragment(&text)));
    }
}
