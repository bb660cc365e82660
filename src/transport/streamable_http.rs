// ! Streamable HTTP transport implementation for MCP
// !
// ! Module POSTs every client message to a single endpoint. The server answers
// ! with a JSON body (one message or a batch), an empty `202 Accepted`, or a
// ! `text/event-stream` body scoped to that one request.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use url::Url;

use crate::core::error::{McpError, McpResult};
use crate::transport::http::{
    ACCEPT_STREAMABLE, build_client, forward_json_body, header_str, is_event_stream,
    pump_event_stream, status_error,
};
use crate::transport::traits::{
    DisconnectReason, EventReceiver, EventSender, Transport, TransportEvent, TransportKind,
};

/// Session header defined by the streamable HTTP transport
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Streamable HTTP transport for MCP clients
#[derive(Debug)]
pub struct StreamableHttpClientTransport {
    client: Client,
    url: Url,
    headers: HeaderMap,
    session_id: Arc<RwLock<Option<String>>>,
    events: Mutex<Option<EventSender>>,
    streams: Mutex<Vec<JoinHandle<()>>>,
    connected: AtomicBool,
}

impl StreamableHttpClientTransport {
    /// Create a new streamable HTTP client transport
    ///
    /// # Arguments
    /// * `url` - The single MCP endpoint
    /// * `headers` - Extra headers sent with every request
    /// * `connect_timeout` - TCP/TLS connect timeout
    pub fn new(url: &str, headers: HeaderMap, connect_timeout: Duration) -> McpResult<Self> {
        Ok(Self {
            client: build_client(connect_timeout)?,
            url: Url::parse(url)?,
            headers,
            session_id: Arc::new(RwLock::new(None)),
            events: Mutex::new(None),
            streams: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        })
    }

    /// Session id assigned by the server, if any
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|s| s.clone())
    }

    /// Check that the endpoint exists before any protocol traffic.
    ///
    /// `OPTIONS` is tried first; servers that do not route it get a `ping`
    /// POST whose reply is discarded.
    async fn validate_endpoint(&self) -> McpResult<()> {
        match self
            .client
            .request(reqwest::Method::OPTIONS, self.url.clone())
            .headers(self.headers.clone())
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Endpoint validated via OPTIONS: {}", self.url);
                return Ok(());
            }
            Ok(response) => {
                tracing::debug!(
                    "OPTIONS returned {}, falling back to POST probe",
                    response.status()
                );
            }
            Err(e) => {
                tracing::debug!("OPTIONS failed ({}), falling back to POST probe", e);
            }
        }

        let probe = json!({"jsonrpc": "2.0", "id": 0, "method": "ping"});
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_STREAMABLE)
            .json(&probe)
            .send()
            .await
            .map_err(|e| McpError::connection(format!("Endpoint validation failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status.is_server_error() {
            return Err(McpError::connection(format!(
                "Endpoint validation failed: {}",
                status_error("HTTP error", status)
            )));
        }
        tracing::debug!("Endpoint validated via POST probe ({}): {}", status, self.url);
        Ok(())
    }

    async fn spawn_stream(&self, response: reqwest::Response, events: EventSender) {
        let stream = tokio::spawn(async move {
            let reason = pump_event_stream(response, &events, |endpoint, _| {
                tracing::debug!("Ignoring endpoint event on streamable HTTP: {}", endpoint);
            })
            .await;
            if let DisconnectReason::StreamError(e) = reason {
                tracing::warn!("Response stream ended with error: {}", e);
            }
        });

        let mut streams = self.streams.lock().await;
        streams.retain(|handle| !handle.is_finished());
        streams.push(stream);
    }
}

#[async_trait]
impl Transport for StreamableHttpClientTransport {
    async fn open(&self) -> McpResult<EventReceiver> {
        self.validate_endpoint().await?;

        if let Ok(mut guard) = self.session_id.write() {
            *guard = None;
        }
        let (events, receiver) = mpsc::unbounded_channel();
        *self.events.lock().await = Some(events);
        self.connected.store(true, Ordering::SeqCst);

        Ok(receiver)
    }

    async fn send(&self, frame: &str) -> McpResult<()> {
        let events = self
            .events
            .lock()
            .await
            .clone()
            .ok_or_else(|| McpError::transport("Transport not connected"))?;

        tracing::trace!("Sending: {}", frame);

        let mut request = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_STREAMABLE)
            .body(frame.to_string());
        if let Some(session_id) = self.session_id() {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await?;

        if let Some(session_id) = header_str(&response, SESSION_HEADER) {
            if let Ok(mut guard) = self.session_id.write() {
                if guard.as_deref() != Some(session_id.as_str()) {
                    tracing::debug!("Streamable HTTP session: {}", session_id);
                    *guard = Some(session_id);
                }
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("HTTP error", status));
        }

        if is_event_stream(&response) {
            self.spawn_stream(response, events).await;
            return Ok(());
        }

        let body = response.text().await?;
        forward_json_body(&body, &events);
        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        tracing::debug!("Closing streamable HTTP transport");
        for stream in self.streams.lock().await.drain(..) {
            stream.abort();
        }
        self.connected.store(false, Ordering::SeqCst);

        let session_id = self.session_id.write().ok().and_then(|mut s| s.take());
        if let Some(session_id) = session_id {
            let terminated = self
                .client
                .delete(self.url.clone())
                .headers(self.headers.clone())
                .header(SESSION_HEADER, &session_id)
                .send()
                .await;
            if let Err(e) = terminated {
                tracing::debug!("Session termination failed: {}", e);
            }
        }

        if let Some(events) = self.events.lock().await.take() {
            let _ = events.send(TransportEvent::Closed(DisconnectReason::Closed));
        }
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_info(&self) -> String {
        format!(
            "Streamable HTTP transport ({}, session: {}, connected: {})",
            self.url,
            self.session_id().unwrap_or_else(|| "none".to_string()),
            self.is_connected()
        )
    }
}
