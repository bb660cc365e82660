//! Transport layer implementations
//!
//! Concrete client transports for child-process stdio, Server-Sent Events and
//! streamable HTTP, plus the framers that turn their byte streams into JSON.

pub mod framing;
pub mod traits;

#[cfg(feature = "stdio")]
pub mod stdio;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub mod sse;

#[cfg(feature = "http")]
pub mod streamable_http;

// Re-export commonly used types
pub use framing::{LineFramer, SseEvent, SseFrame, SseFramer};
pub use traits::{
    ConnectionState, DisconnectReason, EventReceiver, EventSender, Transport, TransportEvent,
    TransportKind,
};

#[cfg(feature = "stdio")]
pub use stdio::StdioClientTransport;

#[cfg(feature = "http")]
pub use sse::SseClientTransport;

#[cfg(feature = "http")]
pub use streamable_http::StreamableHttpClientTransport;
