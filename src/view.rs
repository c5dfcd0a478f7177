//! Pure derivation of UI-affecting facts from a room snapshot.
//!
//! [`derive`] is a pure function of `(RoomState, local SessionId)`: no side
//! effects, callable any number of times, always consistent with the latest
//! snapshot. Renderers consume [`ViewFacts`] and never read the raw snapshot,
//! so there is a single place where turn ownership, move legality, slot
//! labelling, and kick eligibility are decided.
//!
//! Everything here is advisory — the remote peer re-validates every action
//! and a client must tolerate an `ERROR` reply to a move it thought was
//! legal (a just-arrived `GAME_UPDATE` can race a queued click).

use crate::protocol::{PlayerRole, RoomState, SessionId, BOARD_CELLS};

/// Which seat a slot denotes in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLabel {
    /// First participant while waiting (the host when resolvable).
    Participant1,
    /// Second participant while waiting.
    Participant2,
    /// The X seat while playing. Fixed labelling, independent of join order.
    PlayerX,
    /// The O seat while playing.
    PlayerO,
}

impl SlotLabel {
    /// Short label text for rendering.
    pub fn text(self) -> &'static str {
        match self {
            SlotLabel::Participant1 => "Participant 1",
            SlotLabel::Participant2 => "Participant 2",
            SlotLabel::PlayerX => "Player X",
            SlotLabel::PlayerO => "Player O",
        }
    }
}

/// The player occupying a slot, annotated against the local identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOccupant {
    pub session_id: SessionId,
    pub nickname: String,
    pub role: PlayerRole,
    /// Session id matches the local identity.
    pub is_me: bool,
    /// Session id is in the snapshot's readiness set.
    pub is_ready: bool,
}

/// One of the two player slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub label: SlotLabel,
    pub occupant: Option<SlotOccupant>,
}

impl SlotView {
    /// Annotated display name: `nickname (host|guest)[ (me)][ (ready)]`, or
    /// a placeholder when the slot is empty.
    pub fn display_name(&self) -> String {
        match &self.occupant {
            None => "waiting...".to_string(),
            Some(p) => {
                let mut name = p.nickname.clone();
                name.push_str(match p.role {
                    PlayerRole::Host => " (host)",
                    PlayerRole::Guest => " (guest)",
                });
                if p.is_me {
                    name.push_str(" (me)");
                }
                if p.is_ready {
                    name.push_str(" (ready)");
                }
                name
            }
        }
    }
}

/// Whose turn it is, from the local player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Playing and the current player is the local player.
    MyTurn,
    /// Playing and the current player is the opponent.
    OpponentTurn,
    /// No game in progress; turn text is blank.
    NotPlaying,
}

/// UI-affecting facts derived from one snapshot. See [`derive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewFacts {
    pub slots: [SlotView; 2],
    pub turn: TurnStatus,
    /// Cell indices the local player may claim right now. Exactly the empty
    /// indices when playing and it is the local player's turn, else empty.
    pub clickable_cells: Vec<usize>,
    /// The ready button is enabled only while not playing with both players
    /// present.
    pub ready_button_enabled: bool,
    /// The local player may kick: host, more than one player, no game in
    /// progress (kicking mid-game would corrupt the two fixed seats).
    pub kick_eligible: bool,
    /// The other occupied slot that is not the local player, when eligible.
    pub kick_target: Option<SessionId>,
}

/// Derive all view facts from a snapshot and the local identity.
pub fn derive(room: &RoomState, local: &SessionId) -> ViewFacts {
    let occupant = |player: Option<&crate::protocol::Player>| {
        player.map(|p| SlotOccupant {
            session_id: p.session_id.clone(),
            nickname: p.nickname.clone(),
            role: p.role,
            is_me: p.session_id == *local,
            is_ready: room.ready_player_session_ids.contains(&p.session_id),
        })
    };

    let playing = room.is_playing();

    let slots = match (&room.game, playing) {
        (Some(game), true) => [
            SlotView {
                label: SlotLabel::PlayerX,
                occupant: occupant(room.player(&game.player_x_session_id)),
            },
            SlotView {
                label: SlotLabel::PlayerO,
                occupant: occupant(room.player(&game.player_o_session_id)),
            },
        ],
        _ => {
            let first = room.host().or_else(|| room.players.first());
            let second = first.and_then(|f| {
                room.players.iter().find(|p| p.session_id != f.session_id)
            });
            [
                SlotView {
                    label: SlotLabel::Participant1,
                    occupant: occupant(first),
                },
                SlotView {
                    label: SlotLabel::Participant2,
                    occupant: occupant(second),
                },
            ]
        }
    };

    let my_turn = playing
        && room
            .game
            .as_ref()
            .and_then(|g| g.current_player_session_id.as_deref())
            == Some(local.as_str());

    let turn = if !playing {
        TurnStatus::NotPlaying
    } else if my_turn {
        TurnStatus::MyTurn
    } else {
        TurnStatus::OpponentTurn
    };

    let clickable_cells = match (&room.game, my_turn) {
        (Some(game), true) => (0..BOARD_CELLS)
            .filter(|&i| game.board.get(i).copied().flatten().is_none())
            .collect(),
        _ => Vec::new(),
    };

    let local_is_host = room
        .player(local)
        .is_some_and(|p| p.role == PlayerRole::Host);
    let kick_eligible = local_is_host && room.players.len() > 1 && !playing;
    let kick_target = if kick_eligible {
        room.players
            .iter()
            .find(|p| p.session_id != *local)
            .map(|p| p.session_id.clone())
    } else {
        None
    };

    ViewFacts {
        slots,
        turn,
        clickable_cells,
        ready_button_enabled: !playing && room.players.len() >= 2,
        kick_eligible,
        kick_target,
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
    use crate::protocol::{GamePhase, GameSnapshot, Mark, Player};

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
            room_name: "test".into(),
            host_nickname: "Ann".into(),
            players,
            ready_player_session_ids: Default::default(),
            game: None,
            game_state: GamePhase::Waiting,
        }
    }

    fn playing_room(board: [Option<Mark>; 9], current: &str) -> RoomState {
        let mut room = waiting_room(vec![
            player("s-1", "Ann", PlayerRole::Host),
            player("s-2", "Ben", PlayerRole::Guest),
        ]);
        room.game_state = GamePhase::Playing;
        room.game = Some(GameSnapshot {
            board,
            player_x_session_id: "s-1".into(),
            player_o_session_id: "s-2".into(),
            current_player_session_id: Some(current.into()),
            winner_session_id: None,
            game_over: false,
        });
        room
    }

    #[test]
    fn waiting_slots_host_first_with_placeholder() {
        let room = waiting_room(vec![player("s-1", "Ann", PlayerRole::Host)]);
        let facts = derive(&room, &"s-1".to_string());

        assert_eq!(facts.slots[0].label, SlotLabel::Participant1);
        assert_eq!(facts.slots[0].display_name(), "Ann (host) (me)");
        assert_eq!(facts.slots[1].display_name(), "waiting...");
        assert_eq!(facts.turn, TurnStatus::NotPlaying);
        // Only one player present.
        assert!(!facts.ready_button_enabled);
        assert!(!facts.kick_eligible);
    }

    #[test]
    fn waiting_slots_put_host_first_even_when_listed_second() {
        let room = waiting_room(vec![
            player("s-2", "Ben", PlayerRole::Guest),
            player("s-1", "Ann", PlayerRole::Host),
        ]);
        let facts = derive(&room, &"s-2".to_string());
        assert_eq!(
            facts.slots[0].occupant.as_ref().unwrap().nickname,
            "Ann"
        );
        assert_eq!(facts.slots[1].display_name(), "Ben (guest) (me)");
        assert!(facts.ready_button_enabled);
    }

    #[test]
    fn ready_annotation_follows_snapshot_set() {
        let mut room = waiting_room(vec![
            player("s-1", "Ann", PlayerRole::Host),
            player("s-2", "Ben", PlayerRole::Guest),
        ]);
        room.ready_player_session_ids.insert("s-2".into());
        let facts = derive(&room, &"s-1".to_string());
        assert_eq!(facts.slots[1].display_name(), "Ben (guest) (ready)");
        assert!(!facts.slots[0].occupant.as_ref().unwrap().is_ready);
    }

    #[test]
    fn playing_slots_use_fixed_x_o_labels() {
        // O listed first in players; slots must still be X then O.
        let mut room = waiting_room(vec![
            player("s-2", "Ben", PlayerRole::Guest),
            player("s-1", "Ann", PlayerRole::Host),
        ]);
        room.game_state = GamePhase::Playing;
        room.game = Some(GameSnapshot {
            board: [None; 9],
            player_x_session_id: "s-1".into(),
            player_o_session_id: "s-2".into(),
            current_player_session_id: Some("s-1".into()),
            winner_session_id: None,
            game_over: false,
        });

        let facts = derive(&room, &"s-2".to_string());
        assert_eq!(facts.slots[0].label, SlotLabel::PlayerX);
        assert_eq!(facts.slots[0].occupant.as_ref().unwrap().nickname, "Ann");
        assert_eq!(facts.slots[1].label, SlotLabel::PlayerO);
        assert_eq!(facts.slots[1].display_name(), "Ben (guest) (me)");
    }

    #[test]
    fn my_turn_yields_exactly_the_empty_cells() {
        let mut board = [None; 9];
        board[0] = Some(Mark::X);
        board[4] = Some(Mark::O);
        let room = playing_room(board, "s-1");

        let facts = derive(&room, &"s-1".to_string());
        assert_eq!(facts.turn, TurnStatus::MyTurn);
        assert_eq!(facts.clickable_cells, vec![1, 2, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn opponent_turn_yields_no_clickable_cells() {
        let room = playing_room([None; 9], "s-1");
        let facts = derive(&room, &"s-2".to_string());
        assert_eq!(facts.turn, TurnStatus::OpponentTurn);
        assert!(facts.clickable_cells.is_empty());
    }

    #[test]
    fn ready_button_disabled_while_playing() {
        let room = playing_room([None; 9], "s-1");
        assert!(!derive(&room, &"s-1".to_string()).ready_button_enabled);
    }

    #[test]
    fn kick_eligibility_requires_host_company_and_no_game() {
        let two = waiting_room(vec![
            player("s-1", "Ann", PlayerRole::Host),
            player("s-2", "Ben", PlayerRole::Guest),
        ]);

        // Host with company, waiting: eligible, target is the other player.
        let facts = derive(&two, &"s-1".to_string());
        assert!(facts.kick_eligible);
        assert_eq!(facts.kick_target.as_deref(), Some("s-2"));

        // Guest: never eligible.
        let facts = derive(&two, &"s-2".to_string());
        assert!(!facts.kick_eligible);
        assert!(facts.kick_target.is_none());

        // Host alone: not eligible.
        let alone = waiting_room(vec![player("s-1", "Ann", PlayerRole::Host)]);
        assert!(!derive(&alone, &"s-1".to_string()).kick_eligible);

        // Mid-game: not eligible.
        let playing = playing_room([None; 9], "s-1");
        assert!(!derive(&playing, &"s-1".to_string()).kick_eligible);
    }

    #[test]
    fn finished_phase_behaves_like_waiting() {
        let mut room = playing_room([Some(Mark::X); 9], "s-1");
        room.game_state = GamePhase::Finished;
        let facts = derive(&room, &"s-1".to_string());
        assert_eq!(facts.turn, TurnStatus::NotPlaying);
        assert!(facts.clickable_cells.is_empty());
        // Both players still present, so readiness can be re-signalled.
        assert!(facts.ready_button_enabled);
        assert_eq!(facts.slots[0].label, SlotLabel::Participant1);
    }

    #[test]
    fn slot_label_text() {
        assert_eq!(SlotLabel::PlayerX.text(), "Player X");
        assert_eq!(SlotLabel::Participant2.text(), "Participant 2");
    }
}
