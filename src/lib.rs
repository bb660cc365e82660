// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! # MCP Conduit
//!
//! A client for the [Model Context Protocol (MCP)](https://modelcontextprotocol.io/)
//! that connects to one server over stdio, Server-Sent Events or streamable
//! HTTP, runs the `initialize` handshake, discovers the server's tools,
//! resources and prompts, and keeps that view current as the server changes.
// !
//! ## Features
//!
//! - **Three transports**: child-process stdio, legacy HTTP+SSE, and streamable HTTP
//! - **Request correlation**: concurrent requests with per-call deadlines
//! - **Discovery**: paginated `*/list` aggregation gated by server capabilities
//! - **Live updates**: `list_changed` notifications re-fetch and publish lists
//! - **Reconnection**: exponential backoff for SSE connections that drop
// !
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "stdio")]
//! # {
//! use mcp_conduit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> McpResult<()> {
//!     let transport = TransportConfig::stdio("my-mcp-server", vec!["--verbose".to_string()]);
//!     let client = McpClient::new(transport, ClientConfig::default());
//!
//!     let mut events = client.subscribe();
//!     client.connect().await?;
//!
//!     for tool in client.tools().iter() {
//!         println!("{}: {:?}", tool.name, tool.description);
//!     }
//!
//!     let mut args = HashMap::new();
//!     args.insert("message".to_string(), json!("hello"));
//!     let outcome = client.call_tool("echo", Some(args), None).await?;
//!     println!("success={} content={:?}", outcome.success, outcome.content);
//!
//!     while let Ok(event) = events.try_recv() {
//!         println!("{event:?}");
//!     }
//!
//!     client.disconnect().await
//! }
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`core`]: Error types and structured error logging
//! - [`protocol`]: MCP protocol types and message definitions (2025-06-18)
//! - [`transport`]: Transport implementations (stdio, SSE, streamable HTTP)
//! - [`client`]: The MCP client, its configuration and events

pub mod client;
pub mod core;
pub mod protocol;
pub mod transport;

// Re-export commonly used types for convenience
pub use client::{ClientConfig, ClientEvent, McpClient, ReconnectConfig, ToolCallOutcome, TransportConfig};
pub use core::error::{McpError, McpResult};
#[cfg(feature = "tracing-subscriber")]
pub use core::logging::init_tracing;

/// Prelude module for convenient imports
///
/// Use `use mcp_conduit::prelude::*;` to import everything you need.
pub mod prelude {
    pub use crate::client::{
        ClientConfig, ClientEvent, McpClient, ReconnectConfig, ToolCallOutcome, TransportConfig,
    };
    pub use crate::core::error::{McpError, McpResult};

    // Protocol types and messages
    pub use crate::protocol::messages::*;
    pub use crate::protocol::types::*;

    pub use crate::transport::{ConnectionState, Transport, TransportKind};

    // Essential external types
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::collections::HashMap;
}
