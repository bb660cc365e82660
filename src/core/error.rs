// ! Error types for the MCP client
// !
// ! Module defines every error the client can surface, grouped by where the
// ! failure originated: the connect attempt, the wire, the remote server, or
// ! the reconnection machinery.

use serde_json::Value;
use thiserror::Error;

/// The main error type for the MCP client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum McpError {
    /// Fatal to a connect attempt (spawn failure, handshake timeout, endpoint validation)
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON-RPC error payload returned by the server for a specific request
    #[error("Protocol error {code}: {message}")]
    Protocol {
        /// JSON-RPC error code
        code: i32,
        /// Error message from the server
        message: String,
        /// Optional additional data
        data: Option<Value>,
    },

    /// No response arrived before the request deadline
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Stream read/write failures on an established transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// The reconnection state machine gave up
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnect attempts that were made
        attempts: u32,
    },

    /// The connection was torn down while the operation was in flight
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// An operation was issued while no session is established
    #[error("Not connected")]
    NotConnected,

    /// Encoding or decoding JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid parameters supplied by the caller
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Pipe or socket I/O
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed endpoint URL
    #[error("URL error: {0}")]
    Url(String),

    /// HTTP-related errors when using the SSE or streamable HTTP transports
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(String),

    /// Broken client invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

// Foreign errors are flattened to strings so McpError stays Clone
impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        McpError::Url(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            McpError::Timeout(err.to_string())
        } else if err.is_connect() {
            McpError::Connection(err.to_string())
        } else {
            McpError::Http(err.to_string())
        }
    }
}

/// Result of any client operation
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    /// Failure to establish or keep a connection
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection(message.into())
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new disconnected error
    pub fn disconnected<S: Into<String>>(message: S) -> Self {
        Self::Disconnected(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Create a protocol error from a JSON-RPC error object
    pub fn protocol(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn serialization(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }

    /// Whether the connection can be expected to survive this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            McpError::Protocol { .. } => true,
            McpError::Timeout(_) => true,
            McpError::InvalidParams(_) => true,
            McpError::Serialization(_) => true,
            McpError::Transport(_) => false,
            McpError::Connection(_) => false,
            McpError::ReconnectExhausted { .. } => false,
            McpError::Disconnected(_) => false,
            McpError::NotConnected => false,
            McpError::Io(_) => false,
            McpError::Url(_) => false,
            #[cfg(feature = "http")]
            McpError::Http(_) => true,
            McpError::Internal(_) => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            McpError::Connection(_) => "connection",
            McpError::Protocol { .. } => "protocol",
            McpError::Timeout(_) => "timeout",
            McpError::Transport(_) => "transport",
            McpError::ReconnectExhausted { .. } => "reconnect",
            McpError::Disconnected(_) | McpError::NotConnected => "disconnected",
            McpError::Serialization(_) => "serialization",
            McpError::InvalidParams(_) | McpError::Url(_) => "validation",
            McpError::Io(_) => "io",
            #[cfg(feature = "http")]
            McpError::Http(_) => "http",
            McpError::Internal(_) => "internal",
        }
    }
}
