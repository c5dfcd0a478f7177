#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Gridline Client integration tests.
//!
//! Provides a frame-scripted [`MockBus`] and helper functions for
//! constructing the JSON bodies the server produces.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use gridline_client::protocol::{
    self, EventKind, GamePhase, GameSnapshot, Player, PlayerRole, RoomEvent, RoomState,
    RoomSummary,
};
use gridline_client::{Frame, GridlineError, Mark, Transport};

// ── MockBus ─────────────────────────────────────────────────────────

/// An operation the client performed against the bus, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Subscribe(String),
    Unsubscribe(String),
    Publish(String, String),
}

impl BusOp {
    /// The published body, if this op is a publish to `destination`.
    pub fn publish_body(&self, destination: &str) -> Option<&str> {
        match self {
            BusOp::Publish(dest, body) if dest == destination => Some(body),
            _ => None,
        }
    }
}

/// A scripted pub/sub bus for integration testing.
///
/// Scripted inbound frames are consumed in order by `recv()`; an explicit
/// `None` entry simulates a clean server-side close. Every subscribe,
/// unsubscribe, and publish the client performs is recorded in `ops`.
pub struct MockBus {
    incoming: VecDeque<Option<Result<Frame, GridlineError>>>,
    pub ops: Arc<StdMutex<Vec<BusOp>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockBus {
    /// Create a new mock bus with the given scripted inbound frames.
    ///
    /// Returns the bus plus shared handles for inspecting recorded
    /// operations and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<Frame, GridlineError>>>,
    ) -> (Self, Arc<StdMutex<Vec<BusOp>>>, Arc<AtomicBool>) {
        let ops = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let bus = Self {
            incoming: VecDeque::from(incoming),
            ops: Arc::clone(&ops),
            closed: Arc::clone(&closed),
        };
        (bus, ops, closed)
    }
}

#[async_trait]
impl Transport for MockBus {
    async fn subscribe(&mut self, destination: &str) -> Result<(), GridlineError> {
        self.ops
            .lock()
            .unwrap()
            .push(BusOp::Subscribe(destination.to_string()));
        Ok(())
    }

    async fn unsubscribe(&mut self, destination: &str) -> Result<(), GridlineError> {
        self.ops
            .lock()
            .unwrap()
            .push(BusOp::Unsubscribe(destination.to_string()));
        Ok(())
    }

    async fn publish(&mut self, destination: &str, body: String) -> Result<(), GridlineError> {
        self.ops
            .lock()
            .unwrap()
            .push(BusOp::Publish(destination.to_string(), body));
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, GridlineError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted frames — hang forever so the transport loop
            // stays alive until shutdown is called.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), GridlineError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Frame and fixture helpers ───────────────────────────────────────

/// The raw-string session-id reply on the private session queue.
pub fn session_frame(session_id: &str) -> Frame {
    Frame::new(protocol::QUEUE_SESSION, session_id)
}

/// A player record for a fixture snapshot.
pub fn player(session_id: &str, nickname: &str, role: PlayerRole) -> Player {
    Player {
        session_id: session_id.into(),
        nickname: nickname.into(),
        role,
    }
}

/// A waiting-phase room snapshot.
pub fn waiting_room(room_id: &str, players: Vec<Player>) -> RoomState {
    let host_nickname = players
        .iter()
        .find(|p| p.role == PlayerRole::Host)
        .map(|p| p.nickname.clone())
        .unwrap_or_default();
    RoomState {
        room_id: room_id.into(),
        room_name: format!("{host_nickname}님의 방"),
        host_nickname,
        players,
        ready_player_session_ids: Default::default(),
        game: None,
        game_state: GamePhase::Waiting,
    }
}

/// A playing-phase room snapshot with the given board and turn holder.
pub fn playing_room(
    room_id: &str,
    players: Vec<Player>,
    board: [Option<Mark>; 9],
    current: &str,
) -> RoomState {
    let x = players[0].session_id.clone();
    let o = players[1].session_id.clone();
    let mut state = waiting_room(room_id, players);
    state.game_state = GamePhase::Playing;
    state.game = Some(GameSnapshot {
        board,
        player_x_session_id: x,
        player_o_session_id: o,
        current_player_session_id: Some(current.into()),
        winner_session_id: None,
        game_over: false,
    });
    state
}

/// A finished-phase snapshot as carried by a `GAME_END` broadcast.
pub fn finished_room(
    room_id: &str,
    players: Vec<Player>,
    board: [Option<Mark>; 9],
    winner: Option<&str>,
) -> RoomState {
    let x = players[0].session_id.clone();
    let o = players[1].session_id.clone();
    let mut state = waiting_room(room_id, players);
    state.game_state = GamePhase::Finished;
    state.game = Some(GameSnapshot {
        board,
        player_x_session_id: x,
        player_o_session_id: o,
        current_player_session_id: None,
        winner_session_id: winner.map(Into::into),
        game_over: true,
    });
    state
}

/// A private-queue frame carrying a room snapshot (create or join reply).
pub fn room_reply_frame(queue: &str, state: &RoomState) -> Frame {
    Frame::new(queue, serde_json::to_string(state).unwrap())
}

/// A room-topic broadcast frame.
pub fn broadcast_frame(room_id: &str, event: &RoomEvent) -> Frame {
    Frame::new(
        protocol::room_topic(room_id),
        serde_json::to_string(event).unwrap(),
    )
}

/// A directory reply frame on the private lobby queue.
pub fn directory_frame(rooms: &[RoomSummary]) -> Frame {
    Frame::new(
        protocol::QUEUE_LOBBY_ROOMS,
        serde_json::to_string(rooms).unwrap(),
    )
}

/// A broadcast event with a system notice and a fresh snapshot.
pub fn snapshot_event(kind: EventKind, notice: &str, state: RoomState) -> RoomEvent {
    RoomEvent {
        kind,
        sender: Some("SYSTEM".into()),
        content: Some(notice.into()),
        sender_role: None,
        room_state: Some(state),
    }
}

/// A player chat broadcast (no snapshot).
pub fn chat_event(sender: &str, role: PlayerRole, content: &str) -> RoomEvent {
    RoomEvent {
        kind: EventKind::Chat,
        sender: Some(sender.into()),
        content: Some(content.into()),
        sender_role: Some(role),
        room_state: None,
    }
}

/// The host-departure `LEAVE` broadcast: a notice with no snapshot, which is
/// exactly what makes it a forced exit for the remaining player.
pub fn host_left_event(notice: &str) -> RoomEvent {
    RoomEvent {
        kind: EventKind::Leave,
        sender: Some("SYSTEM".into()),
        content: Some(notice.into()),
        sender_role: None,
        room_state: None,
    }
}

/// An `ERROR` message body as delivered on the private error queue.
pub fn error_body(content: &str) -> String {
    serde_json::to_string(&RoomEvent {
        kind: EventKind::Error,
        sender: None,
        content: Some(content.into()),
        sender_role: None,
        room_state: None,
    })
    .unwrap()
}
