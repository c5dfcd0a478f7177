//! Typed events emitted by the client to the application.
//!
//! [`GridlineEvent`]s arrive on the bounded channel returned from
//! `GridlineClient::start`, in the order the protocol produced them. A
//! `RoomUpdated` derived from a `GAME_END` message is always delivered
//! before the matching `GameEnded`, so renderers can show the final board
//! before any result dialog.

use crate::protocol::{RoomState, RoomSummary, SessionId};
use crate::sync::{ChatLine, GameOutcome};

/// Events surfaced to the application.
#[derive(Debug, Clone)]
pub enum GridlineEvent {
    /// Synthetic: the transport loop started with a live connection.
    Connected,

    /// The identity handshake completed; protocol actions are now legal.
    SessionEstablished { session_id: SessionId },

    /// A fresh directory snapshot replaced the room list wholesale.
    DirectoryUpdated { rooms: Vec<RoomSummary> },

    /// Entered a room (room-created or room-joined reply). The room
    /// broadcast subscription is already active when this is delivered.
    RoomEntered { state: RoomState },

    /// The room snapshot was replaced by a lifecycle broadcast. Derive view
    /// facts from `state`; never retain references to earlier snapshots.
    RoomUpdated { state: RoomState },

    /// A transcript line was appended (player chat or system notice).
    ChatMessage { line: ChatLine },

    /// The game ended, classified against the local session id. Always
    /// preceded by the `RoomUpdated` carrying the final board.
    GameEnded { outcome: GameOutcome },

    /// The host departed and the room was deleted. Local state has been
    /// reset to the no-room state and a directory refresh was requested.
    /// Semantically distinct from an error.
    ForcedRoomExit { reason: String },

    /// A protocol-level rejection from the server (room full, illegal move,
    /// not your turn, …). Recoverable; local state is untouched.
    ServerError { content: String },

    /// The transport closed. Always the last event on the channel.
    Disconnected { reason: Option<String> },
}
