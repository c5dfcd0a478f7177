//! Room synchronizer: the client-side source of truth for "current room".
//!
//! [`RoomSynchronizer`] consumes typed [`RoomEvent`]s from the room broadcast
//! channel and reconciles them into a consistent local [`RoomState`]. The
//! protocol sends full snapshots, never deltas, so reconciliation is "last
//! snapshot wins": every lifecycle message replaces the state wholesale.
//!
//! The synchronizer performs no I/O. [`RoomSynchronizer::apply`] returns a
//! sequence of [`SyncEffect`]s describing what changed and what the embedding
//! client must surface; effect order matters — a `StateReplaced` always
//! precedes the `GameEnded` derived from the same message, so downstream
//! rendering reflects the final board before any result notification.

use std::fmt;

use tracing::debug;

use crate::protocol::{EventKind, PlayerRole, RoomEvent, RoomState, SessionId};

/// Upper bound on retained chat lines; older lines are discarded.
const CHAT_LOG_CAPACITY: usize = 512;

/// Outcome of a finished game, classified against the local session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    /// The winner is the local player.
    Win,
    /// A winner is set and it is not the local player.
    Loss,
    /// The game ran to completion with no winner.
    Draw,
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameOutcome::Win => write!(f, "win"),
            GameOutcome::Loss => write!(f, "loss"),
            GameOutcome::Draw => write!(f, "draw"),
        }
    }
}

/// One line of the in-room transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    /// A server-authored notice (joins, leaves, game results, …).
    System(String),
    /// A player chat message.
    Player {
        sender: String,
        role: PlayerRole,
        content: String,
    },
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatLine::System(content) => write!(f, "* {content}"),
            ChatLine::Player {
                sender,
                role,
                content,
            } => {
                let role = match role {
                    PlayerRole::Host => "host",
                    PlayerRole::Guest => "guest",
                };
                write!(f, "[{role}]{sender}: {content}")
            }
        }
    }
}

/// What a single applied [`RoomEvent`] changed, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEffect {
    /// The room snapshot was replaced wholesale.
    StateReplaced,
    /// A line was appended to the transcript.
    ChatAppended(ChatLine),
    /// The game ended; classified against the local session id. Always
    /// emitted after the `StateReplaced` for the same message.
    GameEnded(GameOutcome),
    /// The host departed and the room no longer exists. The synchronizer has
    /// already reset to the no-room state; the client must tear down the
    /// room subscription and return to the directory.
    ForcedExit(String),
    /// The server rejected an action; local state is untouched.
    ServerError(String),
}

/// Client-side room state machine: `NoRoom → InRoom(Waiting ⇄ Playing) → …`.
///
/// Exactly one of these exists per client, owned by the transport loop; all
/// other components read derived facts, never the raw snapshot.
#[derive(Debug)]
pub struct RoomSynchronizer {
    session_id: SessionId,
    room: Option<RoomState>,
    /// Optimistic ready toggle. A transient display hint only — the
    /// canonical readiness set is whatever the latest snapshot says.
    local_ready: bool,
    chat: Vec<ChatLine>,
}

impl RoomSynchronizer {
    /// Create a synchronizer in the no-room state for the given local identity.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            room: None,
            local_ready: false,
            chat: Vec::new(),
        }
    }

    /// The local session id used for turn/result attribution.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current room snapshot, if in a room.
    pub fn room(&self) -> Option<&RoomState> {
        self.room.as_ref()
    }

    /// Current optimistic ready hint.
    pub fn local_ready(&self) -> bool {
        self.local_ready
    }

    /// Flip the optimistic ready hint and return the new value.
    pub fn toggle_local_ready(&mut self) -> bool {
        self.local_ready = !self.local_ready;
        self.local_ready
    }

    /// Retained transcript, oldest first.
    pub fn chat_log(&self) -> &[ChatLine] {
        &self.chat
    }

    /// Enter a room (room-created or room-joined reply). Replaces whatever
    /// room was current; the caller re-points the broadcast subscription.
    pub fn enter_room(&mut self, state: RoomState) {
        debug!(room_id = %state.room_id, "entering room");
        self.room = Some(state);
        self.local_ready = false;
        self.chat.clear();
    }

    /// Reset to the no-room state (voluntary leave or forced exit).
    pub fn reset(&mut self) {
        debug!("resetting to no-room state");
        self.room = None;
        self.local_ready = false;
        self.chat.clear();
    }

    /// Apply one inbound broadcast message and report what changed.
    ///
    /// Idempotent with respect to derived views: applying the same lifecycle
    /// message twice yields the same snapshot both times.
    pub fn apply(&mut self, event: RoomEvent) -> Vec<SyncEffect> {
        let mut effects = Vec::new();
        match event.kind {
            EventKind::Join
            | EventKind::Ready
            | EventKind::Unready
            | EventKind::GameStart
            | EventKind::GameUpdate => {
                if let Some(content) = event.content {
                    effects.push(self.push_chat(ChatLine::System(content)));
                }
                if let Some(state) = event.room_state {
                    self.replace(state, false);
                    effects.push(SyncEffect::StateReplaced);
                }
            }
            EventKind::Leave | EventKind::Kick => {
                // A LEAVE with no snapshot means the room itself is gone:
                // the server deletes the room when the host departs and
                // broadcasts the notice without a roomState.
                if event.kind == EventKind::Leave && event.room_state.is_none() {
                    let reason = event
                        .content
                        .unwrap_or_else(|| "the host left the room".to_string());
                    self.reset();
                    effects.push(SyncEffect::ForcedExit(reason));
                    return effects;
                }
                if let Some(content) = event.content {
                    effects.push(self.push_chat(ChatLine::System(content)));
                }
                if let Some(state) = event.room_state {
                    // Room composition changed; readiness is meaningless
                    // until re-signalled, for every remaining client.
                    self.replace(state, true);
                    self.local_ready = false;
                    effects.push(SyncEffect::StateReplaced);
                }
            }
            EventKind::GameEnd => {
                let outcome = event
                    .room_state
                    .as_ref()
                    .and_then(|s| s.game.as_ref())
                    .and_then(|game| match &game.winner_session_id {
                        Some(winner) if *winner == self.session_id => Some(GameOutcome::Win),
                        Some(_) => Some(GameOutcome::Loss),
                        // A missing winner is a draw only for a completed
                        // game. An aborted match (opponent disconnected
                        // mid-game) arrives with gameOver=false and no
                        // winner; the notice carries the result.
                        None if game.game_over => Some(GameOutcome::Draw),
                        None => None,
                    });
                if let Some(content) = event.content {
                    effects.push(self.push_chat(ChatLine::System(content)));
                }
                if let Some(state) = event.room_state {
                    self.replace(state, false);
                    effects.push(SyncEffect::StateReplaced);
                }
                // Result strictly after the replacement is observable.
                if let Some(outcome) = outcome {
                    self.local_ready = false;
                    effects.push(SyncEffect::GameEnded(outcome));
                }
            }
            EventKind::Chat => {
                let line = ChatLine::Player {
                    sender: event.sender.unwrap_or_default(),
                    role: event.sender_role.unwrap_or(PlayerRole::Guest),
                    content: event.content.unwrap_or_default(),
                };
                effects.push(self.push_chat(line));
            }
            EventKind::Error => {
                effects.push(SyncEffect::ServerError(event.content.unwrap_or_default()));
            }
            // MOVE is an outbound-only kind; the server answers with
            // GAME_UPDATE broadcasts. Ignore if ever echoed.
            EventKind::Move => {
                debug!("ignoring inbound MOVE message");
            }
        }
        effects
    }

    /// Replace the snapshot wholesale. `clear_ready` empties the readiness
    /// set in the local view regardless of the snapshot's own content.
    fn replace(&mut self, mut state: RoomState, clear_ready: bool) {
        if clear_ready {
            state.ready_player_session_ids.clear();
        }
        debug!(
            room_id = %state.room_id,
            phase = ?state.game_state,
            players = state.players.len(),
            "snapshot replaced"
        );
        self.room = Some(state);
    }

    fn push_chat(&mut self, line: ChatLine) -> SyncEffect {
        if self.chat.len() == CHAT_LOG_CAPACITY {
            self.chat.remove(0);
        }
        self.chat.push(line.clone());
        SyncEffect::ChatAppended(line)
    }
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
    use crate::protocol::{GamePhase, GameSnapshot, Player, BOARD_CELLS};

    fn player(id: &str, nickname: &str, role: PlayerRole) -> Player {
        Player {
            session_id: id.into(),
            nickname: nickname.into(),
            role,
        }
    }

    fn waiting_room(players: Vec<Player>) -> RoomState {
        RoomState {
            room_id: "r-1".into(),
            room_name: "test room".into(),
            host_nickname: "Ann".into(),
            players,
            ready_player_session_ids: Default::default(),
            game: None,
            game_state: GamePhase::Waiting,
        }
    }

    fn playing_room(current: &str, winner: Option<&str>, game_over: bool) -> RoomState {
        let mut room = waiting_room(vec![
            player("s-1", "Ann", PlayerRole::Host),
            player("s-2", "Ben", PlayerRole::Guest),
        ]);
        room.game_state = GamePhase::Playing;
        room.game = Some(GameSnapshot {
            board: [None; BOARD_CELLS],
            player_x_session_id: "s-1".into(),
            player_o_session_id: "s-2".into(),
            current_player_session_id: Some(current.into()),
            winner_session_id: winner.map(Into::into),
            game_over,
        });
        room
    }

    fn lifecycle(kind: EventKind, content: Option<&str>, state: Option<RoomState>) -> RoomEvent {
        RoomEvent {
            kind,
            sender: None,
            content: content.map(Into::into),
            sender_role: None,
            room_state: state,
        }
    }

    #[test]
    fn join_replaces_snapshot_and_appends_notice() {
        let mut sync = RoomSynchronizer::new("s-1".into());
        sync.enter_room(waiting_room(vec![player("s-1", "Ann", PlayerRole::Host)]));

        let two = waiting_room(vec![
            player("s-1", "Ann", PlayerRole::Host),
            player("s-2", "Ben", PlayerRole::Guest),
        ]);
        let effects = sync.apply(lifecycle(EventKind::Join, Some("Ben joined"), Some(two)));

        assert_eq!(
            effects,
            vec![
                SyncEffect::ChatAppended(ChatLine::System("Ben joined".into())),
                SyncEffect::StateReplaced,
            ]
        );
        assert_eq!(sync.room().unwrap().players.len(), 2);
        assert_eq!(sync.chat_log().len(), 1);
    }

    #[test]
    fn applying_same_message_twice_is_idempotent_for_state() {
        let mut sync = RoomSynchronizer::new("s-1".into());
        let state = playing_room("s-1", None, false);

        sync.apply(lifecycle(EventKind::GameUpdate, None, Some(state.clone())));
        let first = sync.room().cloned();
        sync.apply(lifecycle(EventKind::GameUpdate, None, Some(state)));
        assert_eq!(sync.room().cloned(), first);
    }

    #[test]
    fn leave_clears_readiness_regardless_of_snapshot_content() {
        let mut sync = RoomSynchronizer::new("s-1".into());
        sync.toggle_local_ready();
        assert!(sync.local_ready());

        let mut state = waiting_room(vec![player("s-1", "Ann", PlayerRole::Host)]);
        // Snapshot claims someone is still ready; the local view must not.
        state.ready_player_session_ids.insert("s-1".into());

        let effects = sync.apply(lifecycle(EventKind::Leave, Some("Ben left"), Some(state)));
        assert!(effects.contains(&SyncEffect::StateReplaced));
        assert!(!sync.local_ready());
        assert!(sync.room().unwrap().ready_player_session_ids.is_empty());
    }

    #[test]
    fn kick_clears_readiness_too() {
        let mut sync = RoomSynchronizer::new("s-1".into());
        sync.toggle_local_ready();

        let mut state = waiting_room(vec![player("s-1", "Ann", PlayerRole::Host)]);
        state.ready_player_session_ids.insert("s-2".into());

        sync.apply(lifecycle(EventKind::Kick, Some("Ben was kicked"), Some(state)));
        assert!(!sync.local_ready());
        assert!(sync.room().unwrap().ready_player_session_ids.is_empty());
    }

    #[test]
    fn leave_without_snapshot_forces_room_exit() {
        let mut sync = RoomSynchronizer::new("s-2".into());
        sync.enter_room(waiting_room(vec![
            player("s-1", "Ann", PlayerRole::Host),
            player("s-2", "Ben", PlayerRole::Guest),
        ]));

        let effects = sync.apply(lifecycle(EventKind::Leave, Some("host left"), None));
        assert_eq!(effects, vec![SyncEffect::ForcedExit("host left".into())]);
        assert!(sync.room().is_none());
        assert!(sync.chat_log().is_empty());
    }

    #[test]
    fn game_end_win_loss_draw_classification() {
        // Win: winner == local id.
        let mut sync = RoomSynchronizer::new("s-1".into());
        let effects = sync.apply(lifecycle(
            EventKind::GameEnd,
            None,
            Some(playing_room("s-1", Some("s-1"), true)),
        ));
        assert_eq!(
            effects,
            vec![
                SyncEffect::StateReplaced,
                SyncEffect::GameEnded(GameOutcome::Win)
            ]
        );

        // Loss: winner set but not the local id.
        let mut sync = RoomSynchronizer::new("s-2".into());
        let effects = sync.apply(lifecycle(
            EventKind::GameEnd,
            None,
            Some(playing_room("s-1", Some("s-1"), true)),
        ));
        assert!(effects.contains(&SyncEffect::GameEnded(GameOutcome::Loss)));

        // Draw: game over with no winner.
        let mut sync = RoomSynchronizer::new("s-1".into());
        let effects = sync.apply(lifecycle(
            EventKind::GameEnd,
            None,
            Some(playing_room("s-1", None, true)),
        ));
        assert!(effects.contains(&SyncEffect::GameEnded(GameOutcome::Draw)));
    }

    #[test]
    fn aborted_game_end_without_winner_is_not_a_draw() {
        // Opponent disconnected mid-match: the server broadcasts GAME_END
        // with no winner and gameOver=false, and the notice carries the
        // result. No classification applies.
        let mut sync = RoomSynchronizer::new("s-1".into());
        let effects = sync.apply(lifecycle(
            EventKind::GameEnd,
            Some("상대방이 나가서 승리했습니다!"),
            Some(playing_room("s-2", None, false)),
        ));
        assert!(effects.contains(&SyncEffect::StateReplaced));
        assert!(effects.contains(&SyncEffect::ChatAppended(ChatLine::System(
            "상대방이 나가서 승리했습니다!".into()
        ))));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, SyncEffect::GameEnded(_))));
    }

    #[test]
    fn game_end_emits_state_before_result() {
        let mut sync = RoomSynchronizer::new("s-1".into());
        let effects = sync.apply(lifecycle(
            EventKind::GameEnd,
            Some("game over"),
            Some(playing_room("s-1", Some("s-1"), true)),
        ));
        let replaced = effects
            .iter()
            .position(|e| *e == SyncEffect::StateReplaced)
            .unwrap();
        let ended = effects
            .iter()
            .position(|e| matches!(e, SyncEffect::GameEnded(_)))
            .unwrap();
        assert!(replaced < ended);
    }

    #[test]
    fn chat_does_not_touch_state() {
        let mut sync = RoomSynchronizer::new("s-1".into());
        sync.enter_room(waiting_room(vec![player("s-1", "Ann", PlayerRole::Host)]));
        let before = sync.room().cloned();

        let effects = sync.apply(RoomEvent {
            kind: EventKind::Chat,
            sender: Some("Ben".into()),
            content: Some("hi!".into()),
            sender_role: Some(PlayerRole::Guest),
            room_state: None,
        });

        assert_eq!(
            effects,
            vec![SyncEffect::ChatAppended(ChatLine::Player {
                sender: "Ben".into(),
                role: PlayerRole::Guest,
                content: "hi!".into(),
            })]
        );
        assert_eq!(sync.room().cloned(), before);
    }

    #[test]
    fn error_surfaces_content_without_state_change() {
        let mut sync = RoomSynchronizer::new("s-1".into());
        sync.enter_room(waiting_room(vec![player("s-1", "Ann", PlayerRole::Host)]));
        let before = sync.room().cloned();

        let effects = sync.apply(lifecycle(EventKind::Error, Some("room is full"), None));
        assert_eq!(effects, vec![SyncEffect::ServerError("room is full".into())]);
        assert_eq!(sync.room().cloned(), before);
    }

    #[test]
    fn chat_line_formatting() {
        let line = ChatLine::Player {
            sender: "Ann".into(),
            role: PlayerRole::Host,
            content: "gl hf".into(),
        };
        assert_eq!(line.to_string(), "[host]Ann: gl hf");
        assert_eq!(ChatLine::System("Ben joined".into()).to_string(), "* Ben joined");
    }

    #[test]
    fn chat_log_is_bounded() {
        let mut sync = RoomSynchronizer::new("s-1".into());
        for i in 0..(CHAT_LOG_CAPACITY + 10) {
            sync.apply(RoomEvent {
                kind: EventKind::Chat,
                sender: Some("Ann".into()),
                content: Some(format!("msg {i}")),
                sender_role: Some(PlayerRole::Host),
                room_state: None,
            });
        }
        assert_eq!(sync.chat_log().len(), CHAT_LOG_CAPACITY);
        // Oldest lines were discarded.
        match sync.chat_log().first().unwrap() {
            ChatLine::Player { content, .. } => assert_eq!(content, "msg 10"),
            other => panic!("unexpected line: {other:?}"),
        }
    }
}
