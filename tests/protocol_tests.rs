#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests against literal JSON captured from the server, making
//! sure field names, enum tags, and optional-field omission stay compatible.

use gridline_client::protocol::{
    ActionMessage, CreateRoomRequest, EventKind, GamePhase, JoinRoomRequest, PlayerRole,
    RoomEvent, RoomState, RoomSummary,
};
use gridline_client::Mark;
use serde_json::{json, Value};

// ── Outbound requests ───────────────────────────────────────────────

#[test]
fn create_room_request_uses_camel_case() {
    let req = CreateRoomRequest {
        nickname: "Ann".into(),
        room_name: "Ann님의 방".into(),
    };
    let value: Value = serde_json::to_value(&req).unwrap();
    assert_eq!(
        value,
        json!({"nickname": "Ann", "roomName": "Ann님의 방"})
    );
}

#[test]
fn join_room_request_uses_camel_case() {
    let req = JoinRoomRequest {
        room_id: "r-1".into(),
        nickname: "Ben".into(),
    };
    let value: Value = serde_json::to_value(&req).unwrap();
    assert_eq!(value, json!({"roomId": "r-1", "nickname": "Ben"}));
}

#[test]
fn move_action_nests_index_under_move_key() {
    let value: Value = serde_json::to_value(ActionMessage::make_move(4)).unwrap();
    assert_eq!(value, json!({"type": "MOVE", "move": {"index": 4}}));
}

#[test]
fn ready_and_unready_actions_are_bare_tags() {
    let ready: Value = serde_json::to_value(ActionMessage::ready(true)).unwrap();
    assert_eq!(ready, json!({"type": "READY"}));
    let unready: Value = serde_json::to_value(ActionMessage::ready(false)).unwrap();
    assert_eq!(unready, json!({"type": "UNREADY"}));
}

#[test]
fn chat_action_carries_content_and_sender() {
    let value: Value =
        serde_json::to_value(ActionMessage::chat("hello", "Ann")).unwrap();
    assert_eq!(
        value,
        json!({"type": "CHAT", "content": "hello", "sender": "Ann"})
    );
}

#[test]
fn kick_action_names_the_target_session() {
    let value: Value = serde_json::to_value(ActionMessage::kick("s-2".into())).unwrap();
    assert_eq!(
        value,
        json!({"type": "KICK", "kickTargetSessionId": "s-2"})
    );
}

// ── Inbound snapshots and broadcasts ────────────────────────────────

#[test]
fn room_state_parses_server_shape() {
    let raw = r#"{
        "roomId": "4f2b7c1e",
        "roomName": "Ann님의 방",
        "hostNickname": "Ann",
        "players": [
            {"sessionId": "s-1", "nickname": "Ann", "role": "HOST"},
            {"sessionId": "s-2", "nickname": "Ben", "role": "GUEST"}
        ],
        "readyPlayerSessionIds": ["s-1"],
        "gameState": "WAITING"
    }"#;
    let state: RoomState = serde_json::from_str(raw).unwrap();
    assert_eq!(state.room_id, "4f2b7c1e");
    assert_eq!(state.host_nickname, "Ann");
    assert_eq!(state.players[1].role, PlayerRole::Guest);
    assert!(state.ready_player_session_ids.contains("s-1"));
    assert_eq!(state.game_state, GamePhase::Waiting);
    assert!(state.game.is_none());
}

#[test]
fn playing_snapshot_parses_board_with_nulls() {
    let raw = r#"{
        "roomId": "r-1",
        "roomName": "room",
        "hostNickname": "Ann",
        "players": [
            {"sessionId": "s-1", "nickname": "Ann", "role": "HOST"},
            {"sessionId": "s-2", "nickname": "Ben", "role": "GUEST"}
        ],
        "readyPlayerSessionIds": [],
        "gameState": "PLAYING",
        "game": {
            "board": ["X", null, "O", null, "X", null, null, null, null],
            "playerXSessionId": "s-1",
            "playerOSessionId": "s-2",
            "currentPlayerSessionId": "s-2",
            "winnerSessionId": null,
            "gameOver": false
        }
    }"#;
    let state: RoomState = serde_json::from_str(raw).unwrap();
    let game = state.game.unwrap();
    assert_eq!(game.board[0], Some(Mark::X));
    assert_eq!(game.board[1], None);
    assert_eq!(game.board[2], Some(Mark::O));
    assert_eq!(game.current_player_session_id.as_deref(), Some("s-2"));
    assert!(!game.game_over);
}

#[test]
fn game_end_broadcast_carries_finished_phase() {
    let raw = r#"{
        "type": "GAME_END",
        "content": "게임이 종료되었습니다.",
        "roomState": {
            "roomId": "r-1",
            "roomName": "room",
            "hostNickname": "Ann",
            "players": [
                {"sessionId": "s-1", "nickname": "Ann", "role": "HOST"},
                {"sessionId": "s-2", "nickname": "Ben", "role": "GUEST"}
            ],
            "readyPlayerSessionIds": [],
            "gameState": "FINISHED",
            "game": {
                "board": ["X", "X", "X", "O", "O", null, null, null, null],
                "playerXSessionId": "s-1",
                "playerOSessionId": "s-2",
                "currentPlayerSessionId": null,
                "winnerSessionId": "s-1",
                "gameOver": true
            }
        }
    }"#;
    let event: RoomEvent = serde_json::from_str(raw).unwrap();
    assert_eq!(event.kind, EventKind::GameEnd);
    let state = event.room_state.unwrap();
    assert_eq!(state.game_state, GamePhase::Finished);
    let game = state.game.unwrap();
    assert!(game.game_over);
    assert_eq!(game.winner_session_id.as_deref(), Some("s-1"));
}

#[test]
fn host_departure_leave_has_no_room_state() {
    let raw = r#"{"type": "LEAVE", "sender": "SYSTEM", "content": "방장이 나가서 방이 사라졌습니다."}"#;
    let event: RoomEvent = serde_json::from_str(raw).unwrap();
    assert_eq!(event.kind, EventKind::Leave);
    assert!(event.room_state.is_none());
}

#[test]
fn chat_broadcast_parses_sender_role() {
    let raw = r#"{"type": "CHAT", "sender": "Ben", "senderRole": "GUEST", "content": "gg"}"#;
    let event: RoomEvent = serde_json::from_str(raw).unwrap();
    assert_eq!(event.kind, EventKind::Chat);
    assert_eq!(event.sender_role, Some(PlayerRole::Guest));
    assert!(event.room_state.is_none());
}

#[test]
fn error_message_parses_content_only() {
    let raw = r#"{"type": "ERROR", "content": "방이 가득 찼습니다."}"#;
    let event: RoomEvent = serde_json::from_str(raw).unwrap();
    assert_eq!(event.kind, EventKind::Error);
    assert_eq!(event.content.as_deref(), Some("방이 가득 찼습니다."));
}

#[test]
fn directory_reply_parses_list_of_summaries() {
    let raw = r#"[
        {"roomId": "r-1", "roomName": "Ann님의 방", "hostNickname": "Ann", "playerCount": 1},
        {"roomId": "r-2", "roomName": "friendly match", "hostNickname": "Cho", "playerCount": 2}
    ]"#;
    let rooms: Vec<RoomSummary> = serde_json::from_str(raw).unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].player_count, 1);
    assert_eq!(rooms[1].room_name, "friendly match");
}

#[test]
fn unknown_event_kind_is_rejected() {
    let raw = r#"{"type": "TELEPORT"}"#;
    assert!(serde_json::from_str::<RoomEvent>(raw).is_err());
}
