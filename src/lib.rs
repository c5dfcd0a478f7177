//! # Gridline Client
//!
//! Transport-agnostic Rust client for the Gridline real-time room protocol:
//! identity handshake, lobby directory, room lifecycle, and a two-player
//! grid game synchronized by authoritative server snapshots.
//!
//! This crate provides a high-level async client that communicates with a
//! Gridline server over any message bus offering destination-based pub/sub
//! (STOMP-style semantics).
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any bus
//! - **Wire-compatible** — all protocol types match the server's JSON format exactly
//! - **STOMP built-in** — default `transport-stomp-ws` feature provides [`StompTransport`]
//! - **Event-driven** — receive typed [`GridlineEvent`]s via a channel
//! - **Pure view derivation** — [`view::derive`] turns a snapshot into
//!   renderable facts with no I/O
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), gridline_client::GridlineError> {
//! use gridline_client::{GridlineClient, GridlineConfig, GridlineEvent, StompTransport};
//!
//! let transport = StompTransport::connect("ws://localhost:8080/game").await?;
//! let (client, mut events) = GridlineClient::start(transport, GridlineConfig::new("Ann"))?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GridlineEvent::SessionEstablished { .. } => client.create_room("")?,
//!         GridlineEvent::RoomEntered { state } => println!("in room {}", state.room_id),
//!         GridlineEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod error;
pub mod event;
pub mod protocol;
pub mod sync;
pub mod transport;
pub mod view;

#[cfg(feature = "tokio-runtime")]
pub mod client;

pub mod transports;

// Re-export primary types for ergonomic imports.
pub use directory::Directory;
pub use error::GridlineError;
pub use event::GridlineEvent;
pub use protocol::{ActionMessage, GamePhase, Mark, PlayerRole, RoomEvent, RoomState, RoomSummary};
pub use sync::{ChatLine, GameOutcome, RoomSynchronizer, SyncEffect};
pub use transport::{Frame, Transport};
pub use view::{derive, SlotView, TurnStatus, ViewFacts};

#[cfg(feature = "tokio-runtime")]
pub use client::{GridlineClient, GridlineConfig};

#[cfg(feature = "transport-stomp-ws")]
pub use transports::stomp::StompTransport;
