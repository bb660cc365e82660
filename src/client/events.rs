// ! Client events
// !
// ! Everything collaborators can observe about a connection is published as a
// ! `ClientEvent` on a broadcast channel.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::core::error::McpError;
use crate::protocol::types::{LoggingLevel, Prompt, Resource, ServerInfo, Tool};

/// Event published by [`McpClient`](crate::client::McpClient)
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake and discovery finished (initially or after a reconnect)
    Connected { server_info: ServerInfo },
    /// The connection is gone and will not be retried
    Disconnected { reason: String },
    /// A connection-level failure, e.g. reconnect exhaustion
    Error { error: McpError },
    /// A reconnect attempt has been scheduled
    Reconnecting { attempt: u32, delay: Duration },
    ToolsChanged(Arc<Vec<Tool>>),
    ResourcesChanged(Arc<Vec<Resource>>),
    PromptsChanged(Arc<Vec<Prompt>>),
    /// The server reported new content for a subscribed resource
    ResourceUpdated { uri: String },
    /// A server log message, or a stderr line from a stdio server
    Log {
        level: LoggingLevel,
        /// Server-side logger name, or `stderr`
        source: Option<String>,
        data: Value,
    },
}

/// Broadcast sender that tolerates having no subscribers
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }
}
