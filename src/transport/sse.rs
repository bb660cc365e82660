// ! Server-Sent Events transport implementation for MCP
// !
// ! Module holds a long-lived GET stream for server-to-client messages and
// ! POSTs client messages to the endpoint the server announces, either in the
// ! `X-MCP-Endpoint` response header or in an `endpoint` event.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use crate::core::error::{McpError, McpResult};
use crate::core::logging::ErrorContext;
use crate::transport::http::{
    ACCEPT_EVENT_STREAM, build_client, forward_json_body, header_str, pump_event_stream,
    status_error,
};
use crate::transport::traits::{
    DisconnectReason, EventReceiver, EventSender, Transport, TransportEvent, TransportKind,
};

/// Response header carrying the POST endpoint
pub const ENDPOINT_HEADER: &str = "X-MCP-Endpoint";
/// Header carrying the session id in both directions
pub const SESSION_HEADER: &str = "X-MCP-Session-ID";

#[derive(Debug, Default)]
struct SseSession {
    endpoint: Option<Url>,
    session_id: Option<String>,
}

/// SSE transport for MCP clients
#[derive(Debug)]
pub struct SseClientTransport {
    client: Client,
    url: Url,
    headers: HeaderMap,
    endpoint_timeout: Duration,
    session: Arc<RwLock<SseSession>>,
    events: Mutex<Option<EventSender>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl SseClientTransport {
    /// Create a new SSE client transport
    ///
    /// # Arguments
    /// * `url` - URL of the event stream
    /// * `headers` - Extra headers sent with every request
    /// * `connect_timeout` - TCP/TLS connect timeout
    pub fn new(url: &str, headers: HeaderMap, connect_timeout: Duration) -> McpResult<Self> {
        Ok(Self {
            client: build_client(connect_timeout)?,
            url: Url::parse(url)?,
            headers,
            endpoint_timeout: Duration::from_secs(10),
            session: Arc::new(RwLock::new(SseSession::default())),
            events: Mutex::new(None),
            reader: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// How long `open` waits for the server to announce its endpoint
    pub fn with_endpoint_timeout(mut self, endpoint_timeout: Duration) -> Self {
        self.endpoint_timeout = endpoint_timeout;
        self
    }

    /// Endpoint client messages are POSTed to, once announced
    pub fn endpoint(&self) -> Option<Url> {
        self.session.read().ok().and_then(|s| s.endpoint.clone())
    }

    /// Session id announced by the server
    pub fn session_id(&self) -> Option<String> {
        self.session.read().ok().and_then(|s| s.session_id.clone())
    }

    fn record_endpoint(
        session: &RwLock<SseSession>,
        base: &Url,
        endpoint: &str,
        session_id: Option<String>,
    ) -> Option<Url> {
        let resolved = match base.join(endpoint) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Ignoring unparseable SSE endpoint '{}': {}", endpoint, e);
                return None;
            }
        };
        tracing::debug!("SSE endpoint announced: {}", resolved);

        if let Ok(mut guard) = session.write() {
            guard.endpoint = Some(resolved.clone());
            if session_id.is_some() {
                guard.session_id = session_id;
            }
        }
        Some(resolved)
    }

    async fn stop_reader(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl Transport for SseClientTransport {
    async fn open(&self) -> McpResult<EventReceiver> {
        self.stop_reader().await;
        if let Ok(mut guard) = self.session.write() {
            *guard = SseSession::default();
        }

        tracing::debug!("Opening SSE stream: {}", self.url);
        let response = self
            .client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, ACCEPT_EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| McpError::connection(format!("SSE connection failed: {e}")))?;

        if !response.status().is_success() {
            return Err(McpError::connection(format!(
                "SSE stream rejected: {}",
                status_error("HTTP error", response.status())
            )));
        }

        let header_session = header_str(&response, SESSION_HEADER);
        let header_endpoint = header_str(&response, ENDPOINT_HEADER).and_then(|endpoint| {
            Self::record_endpoint(&self.session, &self.url, &endpoint, header_session.clone())
        });
        if header_endpoint.is_none() && header_session.is_some() {
            if let Ok(mut guard) = self.session.write() {
                guard.session_id = header_session;
            }
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<Url>();
        self.connected.store(true, Ordering::SeqCst);

        let reader_events = events.clone();
        let session = self.session.clone();
        let base = self.url.clone();
        let connected = self.connected.clone();
        let reader = tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            let reason = pump_event_stream(response, &reader_events, |endpoint, session_id| {
                if let Some(url) = Self::record_endpoint(&session, &base, &endpoint, session_id) {
                    if let Some(tx) = endpoint_tx.take() {
                        let _ = tx.send(url);
                    }
                }
            })
            .await;

            connected.store(false, Ordering::SeqCst);
            tracing::info!("SSE stream closed: {}", reason);
            let _ = reader_events.send(TransportEvent::Closed(reason));
        });
        *self.reader.lock().await = Some(reader);

        if header_endpoint.is_none() {
            match tokio::time::timeout(self.endpoint_timeout, endpoint_rx).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => {
                    self.stop_reader().await;
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(McpError::connection(
                        "SSE stream ended before announcing an endpoint",
                    ));
                }
                Err(_) => {
                    self.stop_reader().await;
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(McpError::connection(format!(
                        "No SSE endpoint announced within {}ms",
                        self.endpoint_timeout.as_millis()
                    )));
                }
            }
        }

        *self.events.lock().await = Some(events);
        Ok(receiver)
    }

    async fn send(&self, frame: &str) -> McpResult<()> {
        let (endpoint, session_id) = {
            let guard = self
                .session
                .read()
                .map_err(|_| McpError::internal("SSE session lock poisoned"))?;
            (guard.endpoint.clone(), guard.session_id.clone())
        };
        let endpoint = endpoint.ok_or_else(|| McpError::transport("SSE endpoint not established"))?;

        tracing::trace!("Sending: {}", frame);

        let mut request = self
            .client
            .post(endpoint.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(frame.to_string());
        if let Some(session_id) = &session_id {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await.map_err(|e| {
            let error = McpError::transport(format!("SSE POST failed: {e}"));
            let mut context = ErrorContext::new("sse_send")
                .with_transport("sse")
                .with_extra("endpoint", endpoint.to_string());
            if let Some(session_id) = &session_id {
                context = context.with_session_id(session_id.clone());
            }
            error.log_with_context(&context);
            error
        })?;

        if !response.status().is_success() {
            return Err(status_error("SSE POST rejected", response.status()));
        }

        // Some servers answer inline instead of on the stream
        match response.text().await {
            Ok(body) if !body.trim().is_empty() => {
                if let Some(events) = self.events.lock().await.as_ref() {
                    forward_json_body(&body, events);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Discarding unreadable inline POST reply: {}", e),
        }

        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        tracing::debug!("Closing SSE transport");
        self.stop_reader().await;
        self.connected.store(false, Ordering::SeqCst);

        if let Some(events) = self.events.lock().await.take() {
            let _ = events.send(TransportEvent::Closed(DisconnectReason::Closed));
        }
        if let Ok(mut guard) = self.session.write() {
            *guard = SseSession::default();
        }
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_info(&self) -> String {
        format!(
            "SSE transport ({}, endpoint: {}, connected: {})",
            self.url,
            self.endpoint()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "pending".to_string()),
            self.is_connected()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(url: &str) -> SseClientTransport {
        SseClientTransport::new(url, HeaderMap::new(), Duration::from_secs(5))
            .unwrap()
            .with_endpoint_timeout(Duration::from_millis(300))
    }

    #[test]
    fn test_relative_endpoint_resolves_against_stream_url() {
        let session = RwLock::new(SseSession::default());
        let base = Url::parse("http://localhost:8080/mcp/sse").unwrap();

        let resolved = SseClientTransport::record_endpoint(
            &session,
            &base,
            "/messages?sessionId=1",
            Some("s-9".to_string()),
        )
        .unwrap();

        assert_eq!(resolved.as_str(), "http://localhost:8080/messages?sessionId=1");
        let guard = session.read().unwrap();
        assert_eq!(guard.session_id.as_deref(), Some("s-9"));
    }

    #[tokio::test]
    async fn test_endpoint_from_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(
                        "event: endpoint\ndata: {\"endpoint\":\"/messages\",\"sessionId\":\"abc\"}\n\n",
                    ),
            )
            .mount(&server)
            .await;

        let transport = transport(&format!("{}/sse", server.uri()));
        let _events = transport.open().await.unwrap();

        assert_eq!(
            transport.endpoint().map(|u| u.path().to_string()).as_deref(),
            Some("/messages")
        );
        assert_eq!(transport.session_id().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_endpoint_from_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .insert_header(ENDPOINT_HEADER, "/rpc")
                    .insert_header(SESSION_HEADER, "hdr-1")
                    .set_body_string(": hello\n\n"),
            )
            .mount(&server)
            .await;

        let transport = transport(&format!("{}/sse", server.uri()));
        let mut events = transport.open().await.unwrap();

        assert_eq!(transport.session_id().as_deref(), Some("hdr-1"));
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Closed(DisconnectReason::StreamEnded))
        );
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_connect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: {\"jsonrpc\":\"2.0\",\"method\":\"x\"}\n\n"),
            )
            .mount(&server)
            .await;

        let transport = transport(&format!("{}/sse", server.uri()));
        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, McpError::Connection(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_truncated_inline_reply_is_discarded() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let frame = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}/sse", listener.local_addr().unwrap())).unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !String::from_utf8_lossy(&request).contains(frame) {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(b"{\"jsonrpc\"").await.unwrap();
        });

        let transport = transport(base.as_str());
        SseClientTransport::record_endpoint(&transport.session, &base, "/messages", None).unwrap();
        let (events, mut receiver) = mpsc::unbounded_channel();
        *transport.events.lock().await = Some(events);

        transport.send(frame).await.unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        let transport = transport("http://127.0.0.1:9/sse");
        let err = transport.send("{}").await.unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }
}
