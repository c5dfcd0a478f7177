//! Wire-compatible protocol types for the Gridline room protocol.
//!
//! Every type in this module produces identical JSON to the server's DTOs.
//! Field names are camelCase, enum tags are SCREAMING_SNAKE_CASE, and
//! optional fields are omitted entirely when absent (the server serializes
//! with a NON_NULL policy, so `null`s never appear for missing fields —
//! except inside the board array, where `null` marks an empty cell).

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GridlineError, Result};

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque per-connection identity issued by the server during the handshake.
///
/// Attributes turns, chat, readiness and kick targets to "me" vs. "the other
/// player". Never generated client-side and never reused after a disconnect.
pub type SessionId = String;

/// Opaque room identifier, also usable as a shareable join code.
pub type RoomId = String;

// ── Client-side limits ──────────────────────────────────────────────

/// Maximum nickname length accepted before connecting.
pub const MAX_NICKNAME_LEN: usize = 15;

/// Maximum room name length accepted by [`validate_room_name`].
pub const MAX_ROOM_NAME_LEN: usize = 50;

/// Maximum chat message length accepted by [`validate_chat_content`].
pub const MAX_CHAT_LEN: usize = 255;

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

// ── Destinations ────────────────────────────────────────────────────
//
// Logical channel names, matching the server's STOMP destinations. The
// private `/user/queue/*` destinations are scoped per connection by the
// broker; `/topic/room/{id}` is the per-room broadcast channel.

/// Client→server: request the session id (no body).
pub const DEST_REQUEST_SESSION_ID: &str = "/app/requestSessionId";

/// Client→server: request a directory refresh (no body).
pub const DEST_LOBBY_ROOMS: &str = "/app/lobby/rooms";

/// Client→server: create a room ([`CreateRoomRequest`] body).
pub const DEST_ROOM_CREATE: &str = "/app/room/create";

/// Client→server: join a room ([`JoinRoomRequest`] body).
pub const DEST_ROOM_JOIN: &str = "/app/room/join";

/// Server→client (private): session-id reply, raw string body.
pub const QUEUE_SESSION: &str = "/user/queue/session";

/// Server→client (private): protocol-level rejections (`{content}` body).
pub const QUEUE_ERRORS: &str = "/user/queue/errors";

/// Server→client (private): room-created reply ([`RoomState`] body).
pub const QUEUE_ROOM_CREATED: &str = "/user/queue/room/created";

/// Server→client (private): room-joined reply ([`RoomState`] body).
pub const QUEUE_ROOM_JOINED: &str = "/user/queue/room/joined";

/// Server→client (private): directory snapshot (array of [`RoomSummary`]).
pub const QUEUE_LOBBY_ROOMS: &str = "/user/queue/lobby/rooms";

/// Client→server action channel for a specific room.
pub fn room_action_destination(room_id: &str) -> String {
    format!("/app/room/{room_id}")
}

/// Server→client broadcast channel for a specific room.
pub fn room_topic(room_id: &str) -> String {
    format!("/topic/room/{room_id}")
}

// ── Enums ───────────────────────────────────────────────────────────

/// Role of a player inside a room. Exactly one host per room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerRole {
    Host,
    Guest,
}

/// Room-level game phase.
///
/// `Finished` appears only in the `GAME_END` snapshot, while the final board
/// is displayed; the next `READY` round or composition change returns the
/// room to `Waiting`. Everything derived from the snapshot treats `Finished`
/// like `Waiting` — only `Playing` gates turns, moves, and kicks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    #[default]
    Waiting,
    Playing,
    Finished,
}

/// A board mark. Cells are `Option<Mark>`; `None` is an empty cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Mark {
    X,
    O,
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// Tag of a room broadcast or outbound action message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Join,
    Leave,
    Chat,
    Ready,
    Unready,
    Move,
    Kick,
    Error,
    GameStart,
    GameUpdate,
    GameEnd,
}

// ── Structs ─────────────────────────────────────────────────────────

/// A player inside a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub session_id: SessionId,
    pub nickname: String,
    pub role: PlayerRole,
}

/// The in-progress (or just-finished) game attached to a room.
///
/// Exactly one of three shapes holds at any observation: ongoing
/// (`game_over == false`, no winner), decisive (`game_over == true`, winner
/// set to one of the two seats), or draw (`game_over == true`, no winner).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Nine cells in row-major order; `null` on the wire means empty.
    pub board: [Option<Mark>; BOARD_CELLS],
    pub player_x_session_id: SessionId,
    pub player_o_session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_session_id: Option<SessionId>,
    pub game_over: bool,
}

/// Complete authoritative room snapshot.
///
/// The server always sends the full state, never a delta, so reconciliation
/// is "last snapshot wins": the client replaces its copy wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: RoomId,
    pub room_name: String,
    pub host_nickname: String,
    pub players: Vec<Player>,
    #[serde(default)]
    pub ready_player_session_ids: HashSet<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameSnapshot>,
    pub game_state: GamePhase,
}

impl RoomState {
    /// Look up a player by session id.
    pub fn player(&self, session_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.session_id == session_id)
    }

    /// The host player, if present in the snapshot.
    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.role == PlayerRole::Host)
    }

    /// Whether a game is currently in progress.
    pub fn is_playing(&self) -> bool {
        self.game_state == GamePhase::Playing
    }
}

/// One entry in the room directory. Transient: the directory is rebuilt
/// wholesale on every refresh, nothing persists across refreshes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub room_name: String,
    pub host_nickname: String,
    pub player_count: u32,
}

/// Payload of an outbound `MOVE` action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovePayload {
    pub index: usize,
}

// ── Messages ────────────────────────────────────────────────────────

/// A message received on a room's broadcast channel (and, with only
/// `content` populated, on the private error queue).
///
/// The wire shape is a single flat object with a `type` tag and optional
/// fields, so this is a struct rather than a tagged enum. Room-lifecycle
/// kinds carry a full [`RoomState`] snapshot; `CHAT` and `ERROR` do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<PlayerRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_state: Option<RoomState>,
}

/// An outbound action published to the room's action channel.
///
/// Same flat wire shape as [`RoomEvent`]; construct via the associated
/// functions so only the fields the server reads for that kind are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
    pub mv: Option<MovePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kick_target_session_id: Option<SessionId>,
}

impl ActionMessage {
    fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            content: None,
            sender: None,
            mv: None,
            kick_target_session_id: None,
        }
    }

    /// A `MOVE` action claiming the given cell index.
    pub fn make_move(index: usize) -> Self {
        Self {
            mv: Some(MovePayload { index }),
            ..Self::bare(EventKind::Move)
        }
    }

    /// A `READY` or `UNREADY` toggle.
    pub fn ready(ready: bool) -> Self {
        Self::bare(if ready {
            EventKind::Ready
        } else {
            EventKind::Unready
        })
    }

    /// A `CHAT` message. Content is assumed already validated.
    pub fn chat(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            sender: Some(sender.into()),
            ..Self::bare(EventKind::Chat)
        }
    }

    /// A `KICK` targeting the given session.
    pub fn kick(target: SessionId) -> Self {
        Self {
            kick_target_session_id: Some(target),
            ..Self::bare(EventKind::Kick)
        }
    }
}

/// Body of a room-create request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub nickname: String,
    pub room_name: String,
}

/// Body of a room-join request. Identical for a directory-list selection and
/// a manually entered room code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: RoomId,
    pub nickname: String,
}

// ── Validation ──────────────────────────────────────────────────────
//
// Local validation failures are rejected before any protocol traffic is
// produced and surfaced synchronously to the caller.

/// Validate a nickname: non-blank after trimming, at most
/// [`MAX_NICKNAME_LEN`] characters.
pub fn validate_nickname(nickname: &str) -> Result<()> {
    if nickname.trim().is_empty() {
        return Err(GridlineError::EmptyNickname);
    }
    let len = nickname.chars().count();
    if len > MAX_NICKNAME_LEN {
        return Err(GridlineError::NicknameTooLong { len });
    }
    Ok(())
}

/// Validate a room name: at most [`MAX_ROOM_NAME_LEN`] characters.
/// Blank names are valid — they default to a nickname-derived placeholder.
pub fn validate_room_name(room_name: &str) -> Result<()> {
    let len = room_name.chars().count();
    if len > MAX_ROOM_NAME_LEN {
        return Err(GridlineError::RoomNameTooLong { len });
    }
    Ok(())
}

/// Validate chat content: non-blank after trimming, at most
/// [`MAX_CHAT_LEN`] characters.
pub fn validate_chat_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(GridlineError::EmptyChatMessage);
    }
    let len = content.chars().count();
    if len > MAX_CHAT_LEN {
        return Err(GridlineError::ChatMessageTooLong { len });
    }
    Ok(())
}

/// The default room name when the caller leaves it blank, derived from the
/// nickname the way the reference client does.
pub fn default_room_name(nickname: &str) -> String {
    format!("{nickname}님의 방")
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_uses_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&EventKind::GameStart).unwrap(),
            "\"GAME_START\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::GameUpdate).unwrap(),
            "\"GAME_UPDATE\""
        );
        let kind: EventKind = serde_json::from_str("\"GAME_END\"").unwrap();
        assert_eq!(kind, EventKind::GameEnd);
    }

    #[test]
    fn move_action_wire_shape() {
        let json = serde_json::to_string(&ActionMessage::make_move(4)).unwrap();
        assert_eq!(json, r#"{"type":"MOVE","move":{"index":4}}"#);
    }

    #[test]
    fn ready_actions_have_no_extra_fields() {
        assert_eq!(
            serde_json::to_string(&ActionMessage::ready(true)).unwrap(),
            r#"{"type":"READY"}"#
        );
        assert_eq!(
            serde_json::to_string(&ActionMessage::ready(false)).unwrap(),
            r#"{"type":"UNREADY"}"#
        );
    }

    #[test]
    fn kick_action_carries_camel_case_target() {
        let json = serde_json::to_string(&ActionMessage::kick("sess-2".into())).unwrap();
        assert_eq!(json, r#"{"type":"KICK","kickTargetSessionId":"sess-2"}"#);
    }

    #[test]
    fn board_deserializes_nulls_as_empty_cells() {
        let json = r#"{
            "board": ["X", null, "O", null, null, null, null, null, null],
            "playerXSessionId": "a",
            "playerOSessionId": "b",
            "currentPlayerSessionId": "b",
            "gameOver": false
        }"#;
        let game: GameSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(game.board[0], Some(Mark::X));
        assert_eq!(game.board[1], None);
        assert_eq!(game.board[2], Some(Mark::O));
        assert!(game.winner_session_id.is_none());
    }

    #[test]
    fn room_state_parses_server_fixture() {
        // Shape as emitted by the authoritative server.
        let json = r#"{
            "roomId": "r-1",
            "roomName": "Ann님의 방",
            "hostNickname": "Ann",
            "players": [{"sessionId": "s-1", "nickname": "Ann", "role": "HOST"}],
            "readyPlayerSessionIds": [],
            "gameState": "WAITING"
        }"#;
        let state: RoomState = serde_json::from_str(json).unwrap();
        assert_eq!(state.game_state, GamePhase::Waiting);
        assert!(state.game.is_none());
        assert_eq!(state.host().unwrap().nickname, "Ann");
        assert!(state.player("s-1").is_some());
        assert!(state.player("nope").is_none());
    }

    #[test]
    fn nickname_validation() {
        assert!(validate_nickname("Ann").is_ok());
        assert!(matches!(
            validate_nickname("   "),
            Err(GridlineError::EmptyNickname)
        ));
        assert!(matches!(
            validate_nickname(&"x".repeat(16)),
            Err(GridlineError::NicknameTooLong { len: 16 })
        ));
        // Counted in characters, not bytes.
        assert!(validate_nickname(&"한".repeat(15)).is_ok());
    }

    #[test]
    fn room_name_validation_allows_blank() {
        assert!(validate_room_name("").is_ok());
        assert!(validate_room_name(&"y".repeat(50)).is_ok());
        assert!(matches!(
            validate_room_name(&"y".repeat(51)),
            Err(GridlineError::RoomNameTooLong { len: 51 })
        ));
    }

    #[test]
    fn chat_validation() {
        assert!(validate_chat_content("hello").is_ok());
        assert!(matches!(
            validate_chat_content(" \t "),
            Err(GridlineError::EmptyChatMessage)
        ));
        assert!(matches!(
            validate_chat_content(&"z".repeat(256)),
            Err(GridlineError::ChatMessageTooLong { len: 256 })
        ));
    }

    #[test]
    fn default_room_name_is_nickname_derived() {
        assert_eq!(default_room_name("Ann"), "Ann님의 방");
    }

    #[test]
    fn destinations() {
        assert_eq!(room_action_destination("r-9"), "/app/room/r-9");
        assert_eq!(room_topic("r-9"), "/topic/room/r-9");
    }
}
