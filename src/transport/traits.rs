// ! Transport layer traits and abstractions
// !
// ! Module defines the contract every client transport fulfils: open a
// ! connection, push outbound frames, and emit inbound messages on a channel
// ! owned by the client.

use crate::core::error::McpResult;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

/// Sender half handed to transport background tasks
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half returned by [`Transport::open`]
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Transport trait for MCP clients
///
/// A transport only moves frames. Correlation, dispatch and reconnection are
/// the client's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection and start the background readers
    ///
    /// # Returns
    /// The channel on which every inbound message, side-channel log line and
    /// the final close reason are delivered
    async fn open(&self) -> McpResult<EventReceiver>;

    /// Send one serialized JSON-RPC message
    ///
    /// # Arguments
    /// * `frame` - A complete JSON document without trailing newline
    async fn send(&self, frame: &str) -> McpResult<()>;

    /// Close the transport connection
    ///
    /// Closing an already closed transport is a no-op.
    async fn close(&self) -> McpResult<()>;

    /// Which of the three transports this is
    fn kind(&self) -> TransportKind;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Get connection information for debugging
    fn connection_info(&self) -> String {
        format!("{} transport", self.kind())
    }
}

/// Transport flavour, used for logging and for deciding reconnect eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
}

impl TransportKind {
    /// Whether an unintended disconnect on this transport may be retried
    pub fn supports_reconnect(&self) -> bool {
        matches!(self, TransportKind::Sse)
    }

    /// Whether a failed notification write must reach the caller
    pub fn notification_errors_propagate(&self) -> bool {
        matches!(self, TransportKind::Stdio)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::StreamableHttp => "streamable-http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by a transport's background tasks
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A decoded inbound JSON document
    Message(Value),
    /// A side-channel log line (stdio stderr)
    Log { source: String, line: String },
    /// The connection is gone; no further events follow
    Closed(DisconnectReason),
}

/// Why a transport stopped delivering messages
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// The child process exited
    ProcessExited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// The inbound stream reached end of file
    StreamEnded,
    /// Reading the inbound stream failed
    StreamError(String),
    /// [`Transport::close`] was called
    Closed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ProcessExited { code, signal } => match (code, signal) {
                (Some(code), _) => write!(f, "process exited with code {code}"),
                (None, Some(signal)) => write!(f, "process terminated by signal {signal}"),
                (None, None) => f.write_str("process exited"),
            },
            DisconnectReason::StreamEnded => f.write_str("stream ended"),
            DisconnectReason::StreamError(message) => write!(f, "stream error: {message}"),
            DisconnectReason::Closed => f.write_str("closed by client"),
        }
    }
}

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session established
    Disconnected,
    /// Transport opening or handshake in flight
    Connecting,
    /// Handshake and discovery complete
    Connected,
    /// Waiting to retry after an unintended SSE disconnect
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}
