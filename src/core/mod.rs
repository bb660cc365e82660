//! Core building blocks shared by every layer of the client
//!
//! Error taxonomy and structured error logging.

pub mod error;
pub mod logging;

pub use error::{McpError, McpResult};
pub use logging::{ErrorContext, ErrorLogLevel, ErrorLogger};
