//! Error types for the Gridline client.
//!
//! Three families, handled differently (see crate docs):
//! connection failures end the session; local validation failures are
//! returned synchronously before any protocol traffic is produced;
//! protocol-level rejections from the server are *not* errors — they arrive
//! as [`GridlineEvent::ServerError`](crate::GridlineEvent::ServerError)
//! notifications and leave local state untouched.

use thiserror::Error;

use crate::protocol::{MAX_CHAT_LEN, MAX_NICKNAME_LEN, MAX_ROOM_NAME_LEN};

/// Errors that can occur when using the Gridline client.
#[derive(Debug, Error)]
pub enum GridlineError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the
    /// client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a protocol action before the session-id handshake finished.
    #[error("session handshake not yet complete")]
    HandshakePending,

    /// Attempted a room operation but the client is not in a room.
    #[error("not in a room")]
    NotInRoom,

    /// Nickname is blank after trimming.
    #[error("nickname must not be blank")]
    EmptyNickname,

    /// Nickname exceeds the protocol limit.
    #[error("nickname is {len} characters, limit is {MAX_NICKNAME_LEN}")]
    NicknameTooLong { len: usize },

    /// Room name exceeds the protocol limit.
    #[error("room name is {len} characters, limit is {MAX_ROOM_NAME_LEN}")]
    RoomNameTooLong { len: usize },

    /// Chat message is blank after trimming.
    #[error("chat message must not be blank")]
    EmptyChatMessage,

    /// Chat message exceeds the protocol limit.
    #[error("chat message is {len} characters, limit is {MAX_CHAT_LEN}")]
    ChatMessageTooLong { len: usize },

    /// Move index outside the 0–8 board range.
    #[error("cell index {index} is out of range")]
    InvalidCellIndex { index: usize },

    /// Attempted a move while no game is in progress.
    #[error("no game in progress")]
    NotPlaying,

    /// Attempted a move when it is the opponent's turn.
    #[error("not your turn")]
    NotYourTurn,

    /// Attempted a move into an occupied cell.
    #[error("cell {index} is already occupied")]
    CellOccupied { index: usize },

    /// Kick attempted without eligibility (not host, alone in the room, or
    /// a game is in progress).
    #[error("kick not allowed in the current room state")]
    KickNotAllowed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Gridline client operations.
pub type Result<T> = std::result::Result<T, GridlineError>;
