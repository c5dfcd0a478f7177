//! Transport abstraction for the Gridline room protocol.
//!
//! The [`Transport`] trait models a publish/subscribe message bus: the client
//! subscribes to destinations, publishes JSON text bodies to destinations,
//! and receives inbound [`Frame`]s tagged with the destination they arrived
//! on. Message framing, broker handshakes, and per-user destination scoping
//! are the transport's concern (e.g. STOMP frames over WebSocket).
//!
//! # Ordering
//!
//! Implementations must deliver messages on the same subscription in send
//! order (FIFO per destination), and a subscription must be active — i.e.
//! `subscribe` resolved — before any message the client itself triggers can
//! be delivered back on it. The protocol's handshake and room-entry
//! sequencing depend on this.
//!
//! # Connection Setup
//!
//! Connection setup is intentionally NOT part of this trait — different
//! transports have fundamentally different connection parameters. Construct
//! a connected transport externally, then pass it to `GridlineClient::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use gridline_client::error::GridlineError;
//! use gridline_client::transport::{Frame, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn subscribe(&mut self, destination: &str) -> Result<(), GridlineError> {
//!         todo!()
//!     }
//!
//!     async fn unsubscribe(&mut self, destination: &str) -> Result<(), GridlineError> {
//!         todo!()
//!     }
//!
//!     async fn publish(&mut self, destination: &str, body: String) -> Result<(), GridlineError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<Frame, GridlineError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), GridlineError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::GridlineError;

/// One inbound message from the bus: which destination it arrived on, plus
/// the raw text body (JSON for every channel except the session-id reply,
/// which is a bare string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination the message was delivered on.
    pub destination: String,
    /// Raw text body.
    pub body: String,
}

impl Frame {
    /// Convenience constructor.
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            body: body.into(),
        }
    }
}

/// A publish/subscribe message bus for the Gridline room protocol.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic
/// dispatch. However, `GridlineClient::start` accepts `impl Transport`
/// (monomorphized) for the common case.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations (e.g.
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Subscribe to a destination. Once this resolves, every message the
    /// server sends to the destination is delivered via [`recv`](Self::recv).
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::TransportSend`] if the subscription could not
    /// be registered.
    async fn subscribe(&mut self, destination: &str) -> Result<(), GridlineError>;

    /// Cancel a previous subscription. Unsubscribing a destination that is
    /// not subscribed is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::TransportSend`] if the cancellation could not
    /// be sent.
    async fn unsubscribe(&mut self, destination: &str) -> Result<(), GridlineError>;

    /// Publish a text body to a destination.
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::TransportSend`] if the message could not be
    /// sent (e.g. connection broken).
    async fn publish(&mut self, destination: &str, body: String) -> Result<(), GridlineError>;

    /// Receive the next inbound frame.
    ///
    /// Returns:
    /// - `Some(Ok(frame))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<Frame, GridlineError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to the other methods may
    /// return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), GridlineError>;
}
