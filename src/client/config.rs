// ! Client configuration
// !
// ! Module defines how a server is reached (`TransportConfig`), the client's
// ! timeouts, and the reconnection policy for SSE connections.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{ClientCapabilities, ClientInfo, Implementation};
use crate::transport::traits::{Transport, TransportKind};

/// How to reach an MCP server.
///
/// Deserializes from `{"type": "stdio" | "sse" | "streamable-http", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// Spawn a child process and speak newline-delimited JSON over its pipes
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Merged over the inherited environment
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    /// Long-lived event stream plus POSTs to a server-announced endpoint
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// POST per message against a single endpoint
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl TransportConfig {
    /// Stdio transport for `command` with `args`
    pub fn stdio<S: Into<String>>(command: S, args: Vec<String>) -> Self {
        Self::Stdio {
            command: command.into(),
            args,
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// SSE transport for the stream at `url`
    pub fn sse<S: Into<String>>(url: S) -> Self {
        Self::Sse {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Streamable HTTP transport for the endpoint at `url`
    pub fn streamable_http<S: Into<String>>(url: S) -> Self {
        Self::StreamableHttp {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Add an HTTP header; ignored for stdio
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Sse { headers, .. } | Self::StreamableHttp { headers, .. } => {
                headers.insert(name.into(), value.into());
            }
            Self::Stdio { .. } => {}
        }
        self
    }

    /// Add an environment variable; ignored for HTTP transports
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Stdio { env, .. } = &mut self {
            env.insert(key.into(), value.into());
        }
        self
    }

    /// Set the working directory; ignored for HTTP transports
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        if let Self::Stdio { cwd, .. } = &mut self {
            *cwd = Some(dir.into());
        }
        self
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Sse { .. } => TransportKind::Sse,
            Self::StreamableHttp { .. } => TransportKind::StreamableHttp,
        }
    }

    /// Instantiate the transport this configuration describes
    pub fn build_transport(&self, config: &ClientConfig) -> McpResult<Arc<dyn Transport>> {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio {
                command,
                args,
                env,
                cwd,
            } => {
                let transport =
                    crate::transport::stdio::StdioClientTransport::new(command.clone(), args.clone())
                        .with_env(env.clone())
                        .with_cwd(cwd.clone())
                        .with_shutdown_grace(config.shutdown_grace);
                Ok(Arc::new(transport))
            }
            #[cfg(feature = "http")]
            Self::Sse { url, headers } => {
                let headers = crate::transport::http::header_map(headers)?;
                let transport =
                    crate::transport::sse::SseClientTransport::new(url, headers, config.connect_timeout)?
                        .with_endpoint_timeout(config.endpoint_timeout);
                Ok(Arc::new(transport))
            }
            #[cfg(feature = "http")]
            Self::StreamableHttp { url, headers } => {
                let headers = crate::transport::http::header_map(headers)?;
                let transport = crate::transport::streamable_http::StreamableHttpClientTransport::new(
                    url,
                    headers,
                    config.connect_timeout,
                )?;
                Ok(Arc::new(transport))
            }
            #[allow(unreachable_patterns)]
            other => Err(McpError::transport(format!(
                "{} transport support is not enabled in this build",
                other.kind()
            ))),
        }
    }
}

/// Reconnection policy for SSE connections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectConfig {
    /// Whether automatic reconnection is enabled
    pub enabled: bool,
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt (milliseconds)
    pub initial_delay_ms: u64,
    /// Cap on any single delay (milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Jitter factor for randomizing delays (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_delay_ms: 1000, // 1 second
            max_delay_ms: 30_000,   // 30 seconds
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Reconnection switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Configuration for the MCP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity announced in `initialize`
    pub client_info: ClientInfo,
    /// Capabilities announced in `initialize`
    pub capabilities: ClientCapabilities,
    /// Default deadline for each request
    pub request_timeout: Duration,
    /// Deadline for the whole connect sequence
    pub connect_timeout: Duration,
    /// How long an SSE connection waits for its endpoint announcement
    pub endpoint_timeout: Duration,
    /// How long a stdio child gets to exit after stdin closes
    pub shutdown_grace: Duration,
    /// SSE reconnection policy
    pub reconnect: ReconnectConfig,
    /// Buffered events per subscriber before it starts lagging
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            capabilities: ClientCapabilities::default(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            endpoint_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_info = Implementation::new(name.into(), version.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_endpoint_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_transport_config_from_json() {
        let stdio: TransportConfig = serde_json::from_value(json!({
            "type": "stdio",
            "command": "npx",
            "args": ["-y", "server-filesystem"],
            "env": {"DEBUG": "1"}
        }))
        .unwrap();
        assert_eq!(
            stdio,
            TransportConfig::stdio("npx", vec!["-y".into(), "server-filesystem".into()])
                .with_env("DEBUG", "1")
        );

        let http: TransportConfig = serde_json::from_value(json!({
            "type": "streamable-http",
            "url": "https://example.com/mcp",
            "headers": {"Authorization": "Bearer x"}
        }))
        .unwrap();
        assert_eq!(http.kind(), TransportKind::StreamableHttp);

        let sse: TransportConfig =
            serde_json::from_value(json!({"type": "sse", "url": "http://localhost/sse"})).unwrap();
        assert_eq!(sse, TransportConfig::sse("http://localhost/sse"));
    }

    #[test]
    fn test_unknown_transport_type_rejected() {
        let result = serde_json::from_value::<TransportConfig>(json!({
            "type": "websocket",
            "url": "ws://localhost"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_reconnect_defaults() {
        let config = ReconnectConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.backoff_multiplier, 2.0);

        let partial: ReconnectConfig =
            serde_json::from_value(json!({"maxAttempts": 2, "initialDelayMs": 10})).unwrap();
        assert_eq!(partial.max_attempts, 2);
        assert_eq!(partial.initial_delay_ms, 10);
        assert_eq!(partial.max_delay_ms, 30_000);
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.client_info.name, "mcp-conduit");
    }

    #[test]
    fn test_invalid_url_fails_build() {
        let err = TransportConfig::sse("not a url")
            .build_transport(&ClientConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, McpError::Url(_)));
    }
}
