// ! MCP client implementation
// !
// ! Module provides the client that connects to one MCP server, runs the
// ! `initialize` handshake and capability discovery, correlates requests with
// ! responses, dispatches server notifications as events, and recovers SSE
// ! connections that drop unexpectedly.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::client::config::{ClientConfig, TransportConfig};
use crate::client::correlation::RequestCorrelator;
use crate::client::discovery::{CapabilitySnapshot, collect_pages};
use crate::client::events::{ClientEvent, EventBus};
use crate::client::notifications::{
    Dispatch, ListKind, answer_server_request, dispatch_notification, stderr_event,
};
use crate::client::reconnect::{ReconnectAction, ReconnectState};
use crate::core::error::{McpError, McpResult};
use crate::core::logging::{ErrorContext, ErrorLogger};
use crate::protocol::{messages::*, methods, types::*};
use crate::transport::traits::{
    ConnectionState, DisconnectReason, EventReceiver, Transport, TransportEvent,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a `tools/call`, with application-level failures folded in
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutcome {
    /// False when the server flagged the result with `isError`
    pub success: bool,
    /// Content returned by the tool
    pub content: Vec<ContentBlock>,
    /// Text of the error content when `success` is false
    pub error: Option<String>,
    /// Structured result of the tool call
    pub structured_content: Option<Value>,
    /// Wall-clock time from send to response
    pub duration: Duration,
}

impl ToolCallOutcome {
    pub fn from_result(result: CallToolResult, duration: Duration) -> Self {
        let failed = result.is_error.unwrap_or(false);
        let error = failed.then(|| {
            let text: Vec<&str> = result
                .content
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect();
            if text.is_empty() {
                "Tool execution failed".to_string()
            } else {
                text.join("\n")
            }
        });

        Self {
            success: !failed,
            content: result.content,
            error,
            structured_content: result.structured_content,
            duration,
        }
    }

    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }
}

enum TransportSource {
    Config(TransportConfig),
    Custom(Arc<dyn Transport>),
}

#[derive(Debug, Default)]
struct Session {
    init: Option<InitializeResult>,
    snapshot: CapabilitySnapshot,
}

struct ClientInner {
    source: TransportSource,
    config: ClientConfig,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    correlator: RequestCorrelator,
    session: StdRwLock<Session>,
    reconnect: StdMutex<ReconnectState>,
    reconnect_task: StdMutex<Option<JoinHandle<()>>>,
    event_loop: StdMutex<Option<JoinHandle<()>>>,
    /// Bumped whenever a connection is opened or torn down, so stale
    /// readers can tell their close report is obsolete
    generation: AtomicU64,
    state: watch::Sender<ConnectionState>,
    events: EventBus,
}

/// Main MCP client implementation
///
/// One client drives one server over one transport at a time. All operations
/// take `&self` and may be called concurrently.
pub struct McpClient {
    inner: Arc<ClientInner>,
}

impl McpClient {
    /// Create a client for the server described by `transport`
    pub fn new(transport: TransportConfig, config: ClientConfig) -> Self {
        Self::from_source(TransportSource::Config(transport), config)
    }

    /// Create a client over an already constructed transport
    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self::from_source(TransportSource::Custom(transport), config)
    }

    fn from_source(source: TransportSource, config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let inner = ClientInner {
            source,
            correlator: RequestCorrelator::new(config.request_timeout),
            events: EventBus::new(config.event_capacity),
            config,
            transport: Mutex::new(None),
            session: StdRwLock::new(Session::default()),
            reconnect: StdMutex::new(ReconnectState::new()),
            reconnect_task: StdMutex::new(None),
            event_loop: StdMutex::new(None),
            generation: AtomicU64::new(0),
            state,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the transport, run the handshake and discover tools, resources
    /// and prompts.
    ///
    /// Fails with a connection error if any step fails or the whole sequence
    /// exceeds the configured connect timeout.
    pub async fn connect(&self) -> McpResult<InitializeResult> {
        let inner = &self.inner;
        if !inner.begin_connecting() {
            return Err(McpError::connection("Client is already connected"));
        }
        inner.lock_reconnect().on_connect();

        let transport = match inner.build_transport() {
            Ok(transport) => transport,
            Err(e) => {
                inner.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        *inner.transport.lock().await = Some(transport.clone());

        let context = ErrorContext::new("connect").with_transport(transport.kind().as_str());
        let span = ErrorLogger::create_operation_span("connect", &context);

        let connect_timeout = inner.config.connect_timeout;
        let handshake = inner.establish(transport).instrument(span);
        let result = match tokio::time::timeout(connect_timeout, handshake).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                e.log_with_context(&context);
                inner.abandon_connect().await;
                return Err(e);
            }
            Err(_) => {
                let e = McpError::connection(format!(
                    "Connection timed out after {}ms",
                    connect_timeout.as_millis()
                ));
                e.log_with_context(&context);
                inner.abandon_connect().await;
                return Err(e);
            }
        };

        inner.set_state(ConnectionState::Connected);
        inner.events.emit(ClientEvent::Connected {
            server_info: result.server_info.clone(),
        });
        Ok(result)
    }

    /// Tear the connection down.
    ///
    /// Every pending request fails with the same "disconnected" error before
    /// this returns, and no reconnect will be attempted afterwards.
    pub async fn disconnect(&self) -> McpResult<()> {
        let inner = &self.inner;
        inner.lock_reconnect().mark_intentional();
        if let Some(task) = lock(&inner.reconnect_task).take() {
            task.abort();
        }
        inner.generation.fetch_add(1, Ordering::SeqCst);

        let previous = inner.current_state();
        inner
            .correlator
            .reject_all(McpError::disconnected("Client disconnected"));

        let transport = inner.transport.lock().await.take();
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                tracing::warn!("Error closing transport: {}", e);
            }
        }
        if let Some(event_loop) = lock(&inner.event_loop).take() {
            event_loop.abort();
        }

        inner.clear_session();
        inner.set_state(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            tracing::info!("Disconnected from MCP server");
            inner.events.emit(ClientEvent::Disconnected {
                reason: "client disconnected".to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Send an arbitrary request and await its result
    ///
    /// `timeout` overrides the configured request timeout for this call.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> McpResult<Value> {
        self.ensure_connected()?;
        self.inner.request(method, params, timeout).await
    }

    /// Send a notification; nothing is awaited beyond the write itself
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.ensure_connected()?;
        self.inner.notify(method, params).await
    }

    /// Call a tool on the server
    ///
    /// A result flagged `isError` is returned as an unsuccessful outcome, not
    /// as an `Err`.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, Value>>,
        timeout: Option<Duration>,
    ) -> McpResult<ToolCallOutcome> {
        self.ensure_connected()?;

        let params = CallToolParams {
            name: name.into(),
            arguments,
        };
        let started = Instant::now();
        let value = self
            .inner
            .request(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?), timeout)
            .await?;
        let duration = started.elapsed();

        let result: CallToolResult = serde_json::from_value(value)?;
        let outcome = ToolCallOutcome::from_result(result, duration);
        if let Some(error) = &outcome.error {
            tracing::debug!("Tool '{}' reported an error: {}", params.name, error);
        }
        Ok(outcome)
    }

    /// Read a resource from the server
    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<ReadResourceResult> {
        self.ensure_connected()?;
        let params = ReadResourceParams { uri: uri.into() };
        self.inner.typed_request(methods::RESOURCES_READ, &params).await
    }

    /// Get a prompt from the server
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<GetPromptResult> {
        self.ensure_connected()?;
        let params = GetPromptParams {
            name: name.into(),
            arguments,
        };
        self.inner.typed_request(methods::PROMPTS_GET, &params).await
    }

    /// Check the server is responsive
    pub async fn ping(&self) -> McpResult<()> {
        self.ensure_connected()?;
        self.inner.request(methods::PING, None, None).await?;
        Ok(())
    }

    /// Ask the server to send log messages at `level` and above
    pub async fn set_logging_level(&self, level: LoggingLevel) -> McpResult<()> {
        self.ensure_connected()?;
        let params = SetLoggingLevelParams { level };
        self.inner
            .request(
                methods::LOGGING_SET_LEVEL,
                Some(serde_json::to_value(params)?),
                None,
            )
            .await?;
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Tools discovered on the server
    pub fn tools(&self) -> Arc<Vec<Tool>> {
        self.inner.read_session().snapshot.tools.clone()
    }

    /// Resources discovered on the server
    pub fn resources(&self) -> Arc<Vec<Resource>> {
        self.inner.read_session().snapshot.resources.clone()
    }

    /// Prompts discovered on the server
    pub fn prompts(&self) -> Arc<Vec<Prompt>> {
        self.inner.read_session().snapshot.prompts.clone()
    }

    /// Capabilities the server advertised (available after connect)
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.inner
            .read_session()
            .init
            .as_ref()
            .map(|init| init.capabilities.clone())
    }

    /// Server information (available after connect)
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner
            .read_session()
            .init
            .as_ref()
            .map(|init| init.server_info.clone())
    }

    /// Usage instructions the server sent with its `initialize` result
    pub fn instructions(&self) -> Option<String> {
        self.inner
            .read_session()
            .init
            .as_ref()
            .and_then(|init| init.instructions.clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.current_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Observe connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Requests still awaiting a response
    pub fn pending_request_count(&self) -> usize {
        self.inner.correlator.len()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn ensure_connected(&self) -> McpResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(McpError::NotConnected)
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.inner.lock_reconnect().mark_intentional();
        if let Some(task) = lock(&self.inner.reconnect_task).take() {
            task.abort();
        }
        if let Some(event_loop) = lock(&self.inner.event_loop).take() {
            event_loop.abort();
        }
    }
}

impl ClientInner {
    fn build_transport(&self) -> McpResult<Arc<dyn Transport>> {
        match &self.source {
            TransportSource::Config(config) => config.build_transport(&self.config),
            TransportSource::Custom(transport) => Ok(transport.clone()),
        }
    }

    /// Open the transport, start its event loop, handshake and discover
    async fn establish(self: &Arc<Self>, transport: Arc<dyn Transport>) -> McpResult<InitializeResult> {
        let receiver = transport.open().await?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Opened {} (generation {})", transport.connection_info(), generation);

        let event_loop = tokio::spawn(self.clone().run_event_loop(receiver, generation));
        if let Some(previous) = lock(&self.event_loop).replace(event_loop) {
            previous.abort();
        }

        let init = self.initialize().await?;
        let snapshot = self.discover(&init.capabilities).await?;
        self.write_session().snapshot = snapshot;
        Ok(init)
    }

    async fn initialize(&self) -> McpResult<InitializeResult> {
        let params = InitializeParams::new(
            self.config.client_info.clone(),
            self.config.capabilities.clone(),
        );
        let result: InitializeResult = self.typed_request(methods::INITIALIZE, &params).await?;

        tracing::info!(
            "Connected to {} {} (protocol {})",
            result.server_info.name,
            result.server_info.version,
            result.protocol_version
        );
        self.write_session().init = Some(result.clone());

        self.notify(methods::INITIALIZED, None).await?;
        Ok(result)
    }

    async fn discover(&self, capabilities: &ServerCapabilities) -> McpResult<CapabilitySnapshot> {
        let tools = self.fetch_tools(capabilities.supports_tools()).await?;
        let resources = self.fetch_resources(capabilities.supports_resources()).await?;
        let prompts = self.fetch_prompts(capabilities.supports_prompts()).await?;

        Ok(CapabilitySnapshot {
            tools: Arc::new(tools),
            resources: Arc::new(resources),
            prompts: Arc::new(prompts),
        })
    }

    async fn fetch_tools(&self, enabled: bool) -> McpResult<Vec<Tool>> {
        let pages = collect_pages(enabled, methods::TOOLS_LIST, |cursor| async move {
            let page: ListToolsResult = self.list_page(methods::TOOLS_LIST, cursor).await?;
            Ok((page.tools, page.next_cursor))
        });
        tolerate_protocol_error(methods::TOOLS_LIST, pages.await)
    }

    async fn fetch_resources(&self, enabled: bool) -> McpResult<Vec<Resource>> {
        let pages = collect_pages(enabled, methods::RESOURCES_LIST, |cursor| async move {
            let page: ListResourcesResult =
                self.list_page(methods::RESOURCES_LIST, cursor).await?;
            Ok((page.resources, page.next_cursor))
        });
        tolerate_protocol_error(methods::RESOURCES_LIST, pages.await)
    }

    async fn fetch_prompts(&self, enabled: bool) -> McpResult<Vec<Prompt>> {
        let pages = collect_pages(enabled, methods::PROMPTS_LIST, |cursor| async move {
            let page: ListPromptsResult = self.list_page(methods::PROMPTS_LIST, cursor).await?;
            Ok((page.prompts, page.next_cursor))
        });
        tolerate_protocol_error(methods::PROMPTS_LIST, pages.await)
    }

    async fn list_page<R: DeserializeOwned>(
        &self,
        method: &str,
        cursor: Option<Cursor>,
    ) -> McpResult<R> {
        self.typed_request(method, &PaginatedParams { cursor }).await
    }

    async fn typed_request<P, R>(&self, method: &str, params: &P) -> McpResult<R>
    where
        P: serde::Serialize,
        R: DeserializeOwned,
    {
        let value = self
            .request(method, Some(serde_json::to_value(params)?), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn current_transport(&self) -> McpResult<Arc<dyn Transport>> {
        self.transport
            .lock()
            .await
            .clone()
            .ok_or(McpError::NotConnected)
    }

    /// Correlated request; the deadline covers both the write and the reply
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> McpResult<Value> {
        let transport = self.current_transport().await?;
        let deadline = timeout.unwrap_or(self.correlator.default_timeout());

        let (id, receiver) = self.correlator.register(method);
        // Released on every exit, including the caller dropping this future
        let _pending = self.correlator.guard(id);
        let frame = JsonRpcRequest::new(Value::from(id), method, params)
            .and_then(|request| serde_json::to_string(&request))
            .map_err(McpError::serialization)?;

        let started = Instant::now();
        match tokio::time::timeout(deadline, transport.send(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let context = ErrorContext::new("send_request")
                    .with_transport(transport.kind().as_str())
                    .with_method(method)
                    .with_request_id(id);
                e.log_with_context(&context);
                return Err(e);
            }
            Err(_) => {
                return Err(McpError::timeout(format!(
                    "Request {id} ({method}) timed out after {}ms",
                    deadline.as_millis()
                )));
            }
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        self.correlator.wait(id, method, receiver, remaining).await
    }

    /// Fire-and-forget notification. Write failures only reach the caller on
    /// stdio; HTTP transports log them.
    async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let transport = self.current_transport().await?;
        let notification = JsonRpcNotification::new(method, params)?;
        let frame = serde_json::to_string(&notification)?;

        match transport.send(&frame).await {
            Ok(()) => Ok(()),
            Err(e) if transport.kind().notification_errors_propagate() => Err(e),
            Err(e) => {
                let context = ErrorContext::new("send_notification")
                    .with_transport(transport.kind().as_str())
                    .with_method(method);
                e.log_with_context(&context);
                Ok(())
            }
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    async fn run_event_loop(self: Arc<Self>, mut receiver: EventReceiver, generation: u64) {
        while let Some(event) = receiver.recv().await {
            match event {
                TransportEvent::Message(message) => self.handle_message(message, generation),
                TransportEvent::Log { source, line } => {
                    tracing::debug!(target: "mcp_server_stderr", "{}", line);
                    self.events.emit(stderr_event(source, line));
                }
                TransportEvent::Closed(reason) => {
                    self.handle_closed(generation, reason).await;
                    return;
                }
            }
        }
        self.handle_closed(generation, DisconnectReason::StreamEnded)
            .await;
    }

    fn handle_message(self: &Arc<Self>, message: Value, generation: u64) {
        self.lock_reconnect().on_data_received();

        match JsonRpcMessage::from_value(message) {
            Some(JsonRpcMessage::Response(response)) => {
                self.correlator.complete(response);
            }
            Some(JsonRpcMessage::Notification(notification)) => {
                match dispatch_notification(&notification) {
                    Dispatch::Refresh(kind) => {
                        tokio::spawn(self.clone().refresh_list(kind, generation));
                    }
                    Dispatch::Emit(event) => self.events.emit(event),
                    Dispatch::Ignore => {}
                }
            }
            Some(JsonRpcMessage::Request(request)) => {
                let inner = self.clone();
                tokio::spawn(async move {
                    let reply = answer_server_request(&request);
                    let frame = match serde_json::to_string(&reply) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("Failed to encode reply to {}: {}", request.method, e);
                            return;
                        }
                    };
                    if let Ok(transport) = inner.current_transport().await {
                        if let Err(e) = transport.send(&frame).await {
                            tracing::warn!("Failed to answer server request {}: {}", request.method, e);
                        }
                    }
                });
            }
            None => tracing::debug!("Dropping message that is not JSON-RPC"),
        }
    }

    /// Re-fetch one list after a `list_changed` notification and publish it
    async fn refresh_list(self: Arc<Self>, kind: ListKind, generation: u64) {
        let capabilities = self
            .read_session()
            .init
            .as_ref()
            .map(|init| init.capabilities.clone())
            .unwrap_or_default();

        let outcome = match kind {
            ListKind::Tools => self
                .fetch_tools(capabilities.supports_tools())
                .await
                .map(|tools| {
                    let tools = Arc::new(tools);
                    self.store_if_current(generation, |s| s.tools = tools.clone());
                    ClientEvent::ToolsChanged(tools)
                }),
            ListKind::Resources => self
                .fetch_resources(capabilities.supports_resources())
                .await
                .map(|resources| {
                    let resources = Arc::new(resources);
                    self.store_if_current(generation, |s| s.resources = resources.clone());
                    ClientEvent::ResourcesChanged(resources)
                }),
            ListKind::Prompts => self
                .fetch_prompts(capabilities.supports_prompts())
                .await
                .map(|prompts| {
                    let prompts = Arc::new(prompts);
                    self.store_if_current(generation, |s| s.prompts = prompts.clone());
                    ClientEvent::PromptsChanged(prompts)
                }),
        };

        match outcome {
            Ok(event) if self.generation.load(Ordering::SeqCst) == generation => {
                self.events.emit(event)
            }
            Ok(_) => tracing::debug!("Discarding {} refresh from a previous connection", kind.method()),
            Err(e) => {
                let context = ErrorContext::new("refresh_list").with_method(kind.method());
                e.log_with_context(&context);
            }
        }
    }

    fn store_if_current(&self, generation: u64, update: impl FnOnce(&mut CapabilitySnapshot)) {
        if self.generation.load(Ordering::SeqCst) == generation {
            update(&mut self.write_session().snapshot);
        }
    }

    async fn handle_closed(self: &Arc<Self>, generation: u64, reason: DisconnectReason) {
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Ignoring close of a previous connection: {}", reason);
            return;
        }
        if self.lock_reconnect().is_intentional() {
            return;
        }

        let lost = McpError::disconnected(format!("Connection lost: {reason}"));
        self.correlator.reject_all(lost);

        // Handshakes in flight fail through their rejected requests
        if self.current_state() != ConnectionState::Connected {
            return;
        }
        tracing::warn!("Transport closed unexpectedly: {}", reason);

        let kind = match self.current_transport().await {
            Ok(transport) => transport.kind(),
            Err(_) => return,
        };
        let action = if kind.supports_reconnect() {
            self.lock_reconnect().on_disconnect(&self.config.reconnect)
        } else {
            ReconnectAction::Ignore
        };

        match action {
            ReconnectAction::Schedule { attempt, delay } => {
                self.set_state(ConnectionState::Reconnecting);
                self.events.emit(ClientEvent::Reconnecting { attempt, delay });
                let task = tokio::spawn(self.clone().reconnect_loop(delay));
                if let Some(previous) = lock(&self.reconnect_task).replace(task) {
                    previous.abort();
                }
            }
            ReconnectAction::GiveUp { attempts } => {
                self.report_exhausted(attempts).await;
            }
            ReconnectAction::Ignore => {
                self.teardown(reason.to_string()).await;
            }
        }
    }

    /// Retry until the connection is back, the policy gives up, or the
    /// caller disconnects.
    ///
    /// Boxed because `establish` spawns the event loop that spawns this task;
    /// the recursion needs a nameable `Send` future.
    fn reconnect_loop(self: Arc<Self>, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.retry_until_settled(delay).await })
    }

    async fn retry_until_settled(self: Arc<Self>, mut delay: Duration) {
        let previous = self.read_session().snapshot.clone();

        loop {
            tokio::time::sleep(delay).await;
            let Some(attempt) = self.lock_reconnect().begin_attempt() else {
                return;
            };
            let transport = match self.current_transport().await {
                Ok(transport) => transport,
                Err(_) => return,
            };
            tracing::info!(
                "Reconnect attempt {}/{} to {}",
                attempt + 1,
                self.config.reconnect.max_attempts,
                transport.connection_info()
            );

            match self.establish(transport.clone()).await {
                Ok(init) => {
                    self.lock_reconnect().on_success();
                    self.publish_changes(&previous);
                    self.set_state(ConnectionState::Connected);
                    tracing::info!("Reconnected after {} attempt(s)", attempt + 1);
                    self.events.emit(ClientEvent::Connected {
                        server_info: init.server_info,
                    });
                    return;
                }
                Err(e) => {
                    let context = ErrorContext::new("reconnect")
                        .with_transport(transport.kind().as_str())
                        .with_attempt(attempt);
                    e.log_with_context(&context);

                    self.generation.fetch_add(1, Ordering::SeqCst);
                    self.correlator
                        .reject_all(McpError::disconnected("Reconnect attempt failed"));
                    if let Err(e) = transport.close().await {
                        tracing::debug!("Error closing failed connection: {}", e);
                    }

                    let action = self.lock_reconnect().on_failure(&self.config.reconnect);
                    match action {
                        ReconnectAction::Schedule { attempt, delay: next } => {
                            self.events.emit(ClientEvent::Reconnecting {
                                attempt,
                                delay: next,
                            });
                            delay = next;
                        }
                        ReconnectAction::GiveUp { attempts } => {
                            self.report_exhausted(attempts).await;
                            return;
                        }
                        ReconnectAction::Ignore => return,
                    }
                }
            }
        }
    }

    /// Emit change events for lists whose content differs from `previous`
    fn publish_changes(&self, previous: &CapabilitySnapshot) {
        let current = self.read_session().snapshot.clone();
        let diff = previous.diff(&current);
        if diff.tools {
            self.events.emit(ClientEvent::ToolsChanged(current.tools.clone()));
        }
        if diff.resources {
            self.events
                .emit(ClientEvent::ResourcesChanged(current.resources.clone()));
        }
        if diff.prompts {
            self.events
                .emit(ClientEvent::PromptsChanged(current.prompts.clone()));
        }
    }

    async fn report_exhausted(&self, attempts: u32) {
        let error = McpError::ReconnectExhausted { attempts };
        error.log_with_context(&ErrorContext::new("reconnect").with_transport("sse"));
        self.events.emit(ClientEvent::Error {
            error: error.clone(),
        });
        self.teardown(error.to_string()).await;
    }

    async fn teardown(&self, reason: String) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.correlator
            .reject_all(McpError::disconnected(reason.clone()));
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                tracing::debug!("Error closing transport: {}", e);
            }
        }
        self.clear_session();
        self.set_state(ConnectionState::Disconnected);
        self.events.emit(ClientEvent::Disconnected { reason });
    }

    /// Undo a connect attempt that did not complete
    async fn abandon_connect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.correlator
            .reject_all(McpError::disconnected("Connection attempt abandoned"));
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                tracing::debug!("Error closing transport: {}", e);
            }
        }
        if let Some(event_loop) = lock(&self.event_loop).take() {
            event_loop.abort();
        }
        self.clear_session();
        self.set_state(ConnectionState::Disconnected);
    }

    // ========================================================================
    // State helpers
    // ========================================================================

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move from `Disconnected` to `Connecting` in one step; false if the
    /// client was in any other state
    fn begin_connecting(&self) -> bool {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if claimed {
            tracing::debug!(
                "Connection state: {} -> {}",
                ConnectionState::Disconnected,
                ConnectionState::Connecting
            );
        }
        claimed
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Connection state: {} -> {}", previous, state);
        }
    }

    fn clear_session(&self) {
        *self.write_session() = Session::default();
    }

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_session(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_reconnect(&self) -> std::sync::MutexGuard<'_, ReconnectState> {
        lock(&self.reconnect)
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A server that advertises a capability but rejects its list call should
/// not fail the whole connection
fn tolerate_protocol_error<T>(method: &str, result: McpResult<Vec<T>>) -> McpResult<Vec<T>> {
    match result {
        Err(McpError::Protocol { code, message, .. }) => {
            tracing::warn!("{} failed with {}: {}; treating as empty", method, code, message);
            Ok(Vec::new())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_result_maps_to_failed_outcome() {
        let result: CallToolResult = serde_json::from_value(json!({
            "isError": true,
            "content": [{"type": "text", "text": "boom"}]
        }))
        .unwrap();

        let outcome = ToolCallOutcome::from_result(result, Duration::from_millis(3));
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
        assert_eq!(outcome.duration_ms(), 3);
    }

    #[test]
    fn test_error_text_blocks_are_concatenated() {
        let result = CallToolResult {
            content: vec![
                ContentBlock::text("first"),
                ContentBlock::Image {
                    data: "AAAA".to_string(),
                    mime_type: "image/png".to_string(),
                    annotations: None,
                },
                ContentBlock::text("second"),
            ],
            is_error: Some(true),
            structured_content: None,
        };

        let outcome = ToolCallOutcome::from_result(result, Duration::ZERO);
        assert_eq!(outcome.error.as_deref(), Some("first\nsecond"));
        assert_eq!(outcome.content.len(), 3);
    }

    #[test]
    fn test_success_outcome_has_no_error() {
        let result = CallToolResult {
            content: vec![ContentBlock::text("ok")],
            is_error: None,
            structured_content: Some(json!({"value": 1})),
        };
        let outcome = ToolCallOutcome::from_result(result, Duration::ZERO);
        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.structured_content, Some(json!({"value": 1})));
    }

    #[test]
    fn test_protocol_errors_in_discovery_are_tolerated() {
        let tolerated: McpResult<Vec<Tool>> = tolerate_protocol_error(
            methods::TOOLS_LIST,
            Err(McpError::protocol(-32601, "Method not found", None)),
        );
        assert_eq!(tolerated.unwrap(), Vec::<Tool>::new());

        let fatal: McpResult<Vec<Tool>> =
            tolerate_protocol_error(methods::TOOLS_LIST, Err(McpError::timeout("slow")));
        assert!(fatal.is_err());
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let client = McpClient::new(TransportConfig::sse("http://127.0.0.1:9/sse"), ClientConfig::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(client.ping().await, Err(McpError::NotConnected)));
        assert!(matches!(
            client.call_tool("echo", None, None).await,
            Err(McpError::NotConnected)
        ));
        assert!(client.tools().is_empty());
        assert!(client.server_info().is_none());
    }

    #[tokio::test]
    async fn test_connect_rejected_while_another_is_in_flight() {
        let client = McpClient::new(
            TransportConfig::sse("http://127.0.0.1:9/sse"),
            ClientConfig::default(),
        );
        assert!(client.inner.begin_connecting());
        assert!(!client.inner.begin_connecting());

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, McpError::Connection(_)), "{err:?}");
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_failed_connect_returns_to_disconnected() {
        let client = McpClient::new(
            TransportConfig::stdio("/definitely/not/a/binary", vec![]),
            ClientConfig::default(),
        );
        let mut states = client.subscribe_state();

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, McpError::Connection(_)), "{err:?}");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
        assert_eq!(client.pending_request_count(), 0);
    }
}
