// ! HTTP plumbing shared by the SSE and streamable HTTP transports
// !
// ! Module builds the reqwest client, converts configured headers, and pumps
// ! `text/event-stream` bodies through the SSE framer.

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::error::{McpError, McpResult};
use crate::transport::framing::{SseEvent, SseFrame, SseFramer};
use crate::transport::traits::{DisconnectReason, EventSender, TransportEvent};

pub const ACCEPT_EVENT_STREAM: &str = "text/event-stream";
pub const ACCEPT_STREAMABLE: &str = "application/json, text/event-stream";

/// Build the HTTP client used for every request of one transport
pub fn build_client(connect_timeout: Duration) -> McpResult<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| McpError::Http(format!("Failed to create HTTP client: {e}")))
}

/// Convert configured headers, rejecting names or values HTTP cannot carry
pub fn header_map(headers: &HashMap<String, String>) -> McpResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = key
            .parse::<HeaderName>()
            .map_err(|e| McpError::InvalidParams(format!("Invalid header name '{key}': {e}")))?;
        let value = value
            .parse::<HeaderValue>()
            .map_err(|e| McpError::InvalidParams(format!("Invalid value for header '{key}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Error for a non-success HTTP status
pub fn status_error(context: &str, status: StatusCode) -> McpError {
    McpError::Http(format!(
        "{context}: {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    ))
}

/// Whether the response carries an event stream
pub fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains(ACCEPT_EVENT_STREAM))
}

/// Read a header as a trimmed, non-empty string
pub fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Forward a JSON body that holds one message or a batch of them.
///
/// Returns the number of messages delivered.
pub fn forward_json_body(body: &str, events: &EventSender) -> usize {
    let body = body.trim();
    if body.is_empty() {
        return 0;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(batch)) => {
            let count = batch.len();
            for message in batch {
                let _ = events.send(TransportEvent::Message(message));
            }
            count
        }
        Ok(message) => {
            let _ = events.send(TransportEvent::Message(message));
            1
        }
        Err(e) => {
            tracing::warn!("Dropping malformed JSON response body: {} ({})", body, e);
            0
        }
    }
}

/// Drive an event-stream body to completion.
///
/// Messages go to `events`; endpoint announcements go to `on_endpoint`.
/// Returns why the stream stopped.
pub async fn pump_event_stream<F>(
    response: Response,
    events: &EventSender,
    mut on_endpoint: F,
) -> DisconnectReason
where
    F: FnMut(String, Option<String>),
{
    let mut framer = SseFramer::new();
    let mut stream = response.bytes_stream();

    let mut deliver = |event: SseEvent| -> bool {
        match event.interpret() {
            SseFrame::Endpoint {
                endpoint,
                session_id,
            } => {
                on_endpoint(endpoint, session_id);
                true
            }
            SseFrame::Message(message) => {
                tracing::trace!("Received: {}", message);
                events.send(TransportEvent::Message(message)).is_ok()
            }
            SseFrame::Ignored => true,
        }
    };

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for event in framer.push(&bytes) {
                    if !deliver(event) {
                        tracing::debug!("Event receiver dropped");
                        return DisconnectReason::Closed;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("SSE stream error: {}", e);
                return DisconnectReason::StreamError(e.to_string());
            }
        }
    }

    if let Some(event) = framer.finish() {
        deliver(event);
    }
    DisconnectReason::StreamEnded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn test_header_map_rejects_invalid_names() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        assert_eq!(header_map(&headers).unwrap().len(), 1);

        headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            header_map(&headers),
            Err(McpError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_forward_batch_body() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let delivered = forward_json_body(r#"[{"id":1,"result":{}},{"id":2,"result":{}}]"#, &tx);
        assert_eq!(delivered, 2);

        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Message(json!({"id": 1, "result": {}}))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Message(json!({"id": 2, "result": {}}))
        );
    }

    #[test]
    fn test_forward_empty_and_garbage_bodies() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(forward_json_body("  ", &tx), 0);
        assert_eq!(forward_json_body("<html>", &tx), 0);
        assert!(rx.try_recv().is_err());
    }
}
