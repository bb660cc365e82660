//! MCP client implementation
//!
//! This module provides the client for the Model Context Protocol together
//! with the pieces it is assembled from: configuration, request correlation,
//! capability discovery, notification dispatch and SSE reconnection.

pub mod config;
pub mod correlation;
pub mod discovery;
pub mod events;
pub mod mcp_client;
pub mod notifications;
pub mod reconnect;

// Re-export the main client type and its configuration
pub use config::{ClientConfig, ReconnectConfig, TransportConfig};
pub use discovery::CapabilitySnapshot;
pub use events::ClientEvent;
pub use mcp_client::{McpClient, ToolCallOutcome};
pub use reconnect::{ReconnectAction, ReconnectPhase, ReconnectState};
