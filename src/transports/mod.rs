//! Built-in transport implementations.
//!
//! Currently this module contains [`StompTransport`], a STOMP-over-WebSocket
//! transport gated behind the `transport-stomp-ws` feature (enabled by
//! default). Custom transports can be plugged in by implementing the
//! [`Transport`](crate::transport::Transport) trait directly.

#[cfg(feature = "transport-stomp-ws")]
pub mod stomp;

#[cfg(feature = "transport-stomp-ws")]
pub use stomp::StompTransport;
