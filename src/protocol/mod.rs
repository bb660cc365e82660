//! MCP protocol types
//!
//! JSON-RPC 2.0 envelopes, the MCP entities a client discovers, and the
//! method names it speaks.

pub mod messages;
pub mod methods;
pub mod types;

pub use messages::*;
pub use types::*;
