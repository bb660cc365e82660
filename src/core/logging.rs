// ! Structured logging for the MCP client
// !
// ! Errors are logged once, where they are handled, with the connection
// ! context attached as `tracing` fields. The level follows from what the
// ! error means for the connection.

use serde_json::{Map, Value};
use tracing::{Level, span};

use crate::core::error::McpError;

/// Target used for every error record
pub const ERROR_TARGET: &str = "mcp_conduit::errors";

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLogLevel {
    /// Errors that end a connection or a connect attempt
    Error,
    /// Faults the client recovers from on its own
    Warning,
    /// Errors that only concern a single caller
    Info,
    /// Expected noise (late responses, caller-initiated teardown)
    Debug,
}

impl From<&McpError> for ErrorLogLevel {
    fn from(error: &McpError) -> Self {
        match error {
            McpError::Connection(_)
            | McpError::ReconnectExhausted { .. }
            | McpError::Internal(_) => ErrorLogLevel::Error,

            McpError::Transport(_) | McpError::Io(_) | McpError::Timeout(_) => {
                ErrorLogLevel::Warning
            }

            #[cfg(feature = "http")]
            McpError::Http(_) => ErrorLogLevel::Warning,

            McpError::Protocol { .. }
            | McpError::Serialization(_)
            | McpError::InvalidParams(_)
            | McpError::Url(_) => ErrorLogLevel::Info,

            McpError::Disconnected(_) | McpError::NotConnected => ErrorLogLevel::Debug,
        }
    }
}

/// Where an error happened
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Client operation, e.g. `connect` or `send_request`
    pub operation: String,
    /// `stdio`, `sse` or `streamable-http`
    pub transport: Option<String>,
    /// JSON-RPC method involved
    pub method: Option<String>,
    pub request_id: Option<u64>,
    /// Reconnect attempt number (0-based)
    pub attempt: Option<u32>,
    pub session_id: Option<String>,
    /// Anything else worth recording
    pub extra: Map<String, Value>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_request_id(mut self, id: u64) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Extra fields as one JSON object, empty when there are none
    fn extra_fields(&self) -> String {
        if self.extra.is_empty() {
            String::new()
        } else {
            Value::Object(self.extra.clone()).to_string()
        }
    }
}

macro_rules! error_event {
    ($level:expr, $error:expr, $context:expr) => {
        tracing::event!(
            target: ERROR_TARGET,
            $level,
            category = $error.category(),
            recoverable = $error.is_recoverable(),
            operation = $context.operation.as_str(),
            transport = $context.transport.as_deref(),
            method = $context.method.as_deref(),
            request_id = $context.request_id,
            attempt = $context.attempt,
            session_id = $context.session_id.as_deref(),
            extra = %$context.extra_fields(),
            "{} failed: {}",
            $context.operation,
            $error
        )
    };
}

/// Error logging with categorization
pub struct ErrorLogger;

impl ErrorLogger {
    /// Log `error` at the level its category calls for
    pub fn log_error(error: &McpError, context: &ErrorContext) {
        match ErrorLogLevel::from(error) {
            ErrorLogLevel::Error => error_event!(Level::ERROR, error, context),
            ErrorLogLevel::Warning => error_event!(Level::WARN, error, context),
            ErrorLogLevel::Info => error_event!(Level::INFO, error, context),
            ErrorLogLevel::Debug => error_event!(Level::DEBUG, error, context),
        }
    }

    /// Span covering one client operation
    pub fn create_operation_span(operation: &str, context: &ErrorContext) -> tracing::Span {
        span!(
            Level::INFO,
            "mcp_operation",
            operation = operation,
            transport = context.transport.as_deref(),
            method = context.method.as_deref(),
            session_id = context.session_id.as_deref(),
        )
    }
}

impl McpError {
    /// Log this error with structured context
    pub fn log_with_context(&self, context: &ErrorContext) {
        ErrorLogger::log_error(self, context);
    }
}

/// Install a `fmt` subscriber filtered by `filter` (falls back to `RUST_LOG`).
///
/// Returns `false` when a global subscriber was already installed.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing(filter: Option<&str>) -> bool {
    use tracing_subscriber::EnvFilter;

    let env_filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
