// ! Message framing
// !
// ! Splits raw byte streams into JSON documents. Stdio uses newline-delimited
// ! JSON; SSE uses `event:`/`data:` blocks terminated by a blank line.

use serde_json::Value;
use tracing::{trace, warn};

/// Newline-delimited JSON framer.
///
/// Bytes after the last `\n` are held back until the next chunk completes the
/// line. Malformed lines are logged and dropped.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every JSON document it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            if let Some(value) = parse_line(&self.buffer[consumed..end]) {
                messages.push(value);
            }
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);

        messages
    }

    /// Parse whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<Value> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

fn parse_line(line: &[u8]) -> Option<Value> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            trace!("Received: {}", text);
            Some(value)
        }
        Err(e) => {
            warn!("Dropping malformed JSON line: {} ({})", text, e);
            None
        }
    }
}

/// A dispatched Server-Sent Event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type; `message` when the server sent no `event:` field
    pub event: String,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Last event id seen on the stream
    pub id: Option<String>,
    /// Retry timing hint from server
    pub retry: Option<u64>,
}

/// Incremental SSE parser
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
    retry: Option<u64>,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            let raw = &self.buffer[consumed..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw).into_owned();
            consumed = end + 1;

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..consumed);

        events
    }

    /// Dispatch a trailing event whose blank line never arrived
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            _ => trace!("Unknown SSE field: {}", field),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");

        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_id.clone(),
            retry: self.retry,
        })
    }
}

/// What an SSE event means to the client
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// Out-of-band announcement of the POST endpoint
    Endpoint {
        endpoint: String,
        session_id: Option<String>,
    },
    /// A JSON-RPC message
    Message(Value),
    /// Nothing to deliver
    Ignored,
}

impl SseEvent {
    /// Interpret the event as an endpoint announcement or a protocol message
    pub fn interpret(&self) -> SseFrame {
        if self.event.eq_ignore_ascii_case("endpoint")
            || self.event.eq_ignore_ascii_case("mcp-endpoint")
        {
            return parse_endpoint(&self.data);
        }

        let data = self.data.trim();
        if data.is_empty() {
            return SseFrame::Ignored;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(value) => SseFrame::Message(value),
            Err(e) => {
                warn!(
                    "Dropping malformed SSE '{}' event data: {} ({})",
                    self.event, data, e
                );
                SseFrame::Ignored
            }
        }
    }
}

fn parse_endpoint(data: &str) -> SseFrame {
    let data = data.trim();
    if data.is_empty() {
        return SseFrame::Ignored;
    }

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(data) {
        let endpoint = object
            .get("endpoint")
            .or_else(|| object.get("url"))
            .and_then(Value::as_str);
        let session_id = object
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string);

        return match endpoint {
            Some(endpoint) => SseFrame::Endpoint {
                endpoint: endpoint.to_string(),
                session_id,
            },
            None => {
                warn!("Endpoint event without an endpoint field: {}", data);
                SseFrame::Ignored
            }
        };
    }

    SseFrame::Endpoint {
        endpoint: data.to_string(),
        session_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_line_is_carried_to_next_chunk() {
        let mut framer = LineFramer::new();

        let first = framer.push(b"{\"id\":1}\n{\"id\"");
        assert_eq!(first, vec![json!({"id": 1})]);
        assert_eq!(framer.pending(), b"{\"id\"");

        let second = framer.push(b":2}\n");
        assert_eq!(second, vec![json!({"id": 2})]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_malformed_and_blank_lines_are_dropped() {
        let mut framer = LineFramer::new();
        let messages = framer.push(b"not json\n\n  \r\n{\"ok\":true}\r\n");
        assert_eq!(messages, vec![json!({"ok": true})]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let mut framer = LineFramer::new();
        let encoded = "{\"text\":\"héllo\"}\n".as_bytes();
        let split = encoded.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(framer.push(&encoded[..split]).is_empty());
        let messages = framer.push(&encoded[split..]);
        assert_eq!(messages, vec![json!({"text": "héllo"})]);
    }

    #[test]
    fn test_finish_parses_unterminated_line() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"{\"last\":1}").is_empty());
        assert_eq!(framer.finish(), Some(json!({"last": 1})));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_sse_multiline_data_joined() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"event: message\nid: 7\ndata: {\"a\":\ndata: 1}\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].data, "{\"a\":\n1}");
        assert_eq!(events[0].interpret(), SseFrame::Message(json!({"a": 1})));
    }

    #[test]
    fn test_sse_event_split_across_chunks_and_comments_skipped() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b": keep-alive\n\ndata: {\"id\"").is_empty());
        let events = framer.push(b":1}\r\n\r\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].interpret(), SseFrame::Message(json!({"id": 1})));
    }

    #[test]
    fn test_endpoint_event_json_and_raw() {
        let mut framer = SseFramer::new();
        let events = framer.push(
            b"event: endpoint\ndata: {\"endpoint\":\"/messages\",\"sessionId\":\"s-1\"}\n\n\
              event: endpoint\ndata: /messages?sessionId=abc\n\n",
        );

        assert_eq!(
            events[0].interpret(),
            SseFrame::Endpoint {
                endpoint: "/messages".to_string(),
                session_id: Some("s-1".to_string()),
            }
        );
        assert_eq!(
            events[1].interpret(),
            SseFrame::Endpoint {
                endpoint: "/messages?sessionId=abc".to_string(),
                session_id: None,
            }
        );
    }

    #[test]
    fn test_sse_finish_dispatches_pending_event() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: {\"id\":3}\n").is_empty());
        let event = framer.finish().unwrap();
        assert_eq!(event.interpret(), SseFrame::Message(json!({"id": 3})));
    }
}
