#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end scenarios against a scripted bus: handshake, directory,
//! full match flow, host departure, and kick handling.

mod common;

use common::*;
use gridline_client::protocol::{self, EventKind, GamePhase, PlayerRole, RoomSummary};
use gridline_client::sync::GameOutcome;
use gridline_client::{GridlineClient, GridlineConfig, GridlineEvent, Mark};
use std::time::Duration;

/// Collect events until the predicate matches, returning everything seen
/// (including the matching event).
async fn collect_until(
    events: &mut tokio::sync::mpsc::Receiver<GridlineEvent>,
    mut done: impl FnMut(&GridlineEvent) -> bool,
) -> Vec<GridlineEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed unexpectedly");
        let stop = done(&event);
        seen.push(event);
        if stop {
            return seen;
        }
    }
}

// ── Session and directory ───────────────────────────────────────────

#[tokio::test]
async fn handshake_then_directory_snapshot() {
    let rooms = vec![RoomSummary {
        room_id: "r-1".into(),
        room_name: "Ann님의 방".into(),
        host_nickname: "Ann".into(),
        player_count: 1,
    }];
    let (bus, ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-9"))),
        Some(Ok(directory_frame(&rooms))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ben")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::DirectoryUpdated { .. })
    })
    .await;

    // Connected precedes SessionEstablished precedes DirectoryUpdated.
    let connected = seen
        .iter()
        .position(|e| matches!(e, GridlineEvent::Connected))
        .unwrap();
    let session = seen
        .iter()
        .position(|e| matches!(e, GridlineEvent::SessionEstablished { .. }))
        .unwrap();
    assert!(connected < session);
    assert!(session < seen.len() - 1);

    match seen.last().unwrap() {
        GridlineEvent::DirectoryUpdated { rooms } => {
            assert_eq!(rooms.len(), 1);
            assert_eq!(rooms[0].host_nickname, "Ann");
        }
        other => panic!("expected DirectoryUpdated, got {other:?}"),
    }

    // The session queue subscription happened before the id request left.
    {
        let ops = ops.lock().unwrap();
        let sub = ops
            .iter()
            .position(|op| *op == BusOp::Subscribe(protocol::QUEUE_SESSION.into()))
            .unwrap();
        let req = ops
            .iter()
            .position(|op| op.publish_body(protocol::DEST_REQUEST_SESSION_ID).is_some())
            .unwrap();
        assert!(sub < req);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn empty_directory_is_a_valid_snapshot() {
    let (bus, _ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-9"))),
        Some(Ok(directory_frame(&[]))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ben")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::DirectoryUpdated { .. })
    })
    .await;
    match seen.last().unwrap() {
        GridlineEvent::DirectoryUpdated { rooms } => assert!(rooms.is_empty()),
        other => panic!("expected DirectoryUpdated, got {other:?}"),
    }

    client.shutdown().await;
}

// ── Full match flow ─────────────────────────────────────────────────

/// Ben (guest, plays O) joins Ann's room, both ready up, the game runs, and
/// Ben wins. Verifies the event ordering contract end to end: every snapshot
/// broadcast surfaces as `RoomUpdated`, and `GameEnded` arrives only after
/// the `RoomUpdated` carrying the final board.
#[tokio::test]
async fn full_match_flow_from_join_to_victory() {
    let two = || {
        vec![
            player("s-1", "Ann", PlayerRole::Host),
            player("s-2", "Ben", PlayerRole::Guest),
        ]
    };

    let mut ready_state = waiting_room("r-1", two());
    ready_state.ready_player_session_ids.insert("s-1".into());
    ready_state.ready_player_session_ids.insert("s-2".into());

    let x = Some(Mark::X);
    let o = Some(Mark::O);
    let final_board = [o, x, x, None, o, None, None, None, o];
    let finished = finished_room("r-1", two(), final_board, Some("s-2"));

    let (bus, _ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-2"))),
        Some(Ok(room_reply_frame(
            protocol::QUEUE_ROOM_JOINED,
            &waiting_room("r-1", two()),
        ))),
        Some(Ok(broadcast_frame(
            "r-1",
            &snapshot_event(EventKind::Ready, "all players ready", ready_state),
        ))),
        Some(Ok(broadcast_frame(
            "r-1",
            &snapshot_event(
                EventKind::GameStart,
                "game started",
                playing_room("r-1", two(), [None; 9], "s-1"),
            ),
        ))),
        Some(Ok(broadcast_frame(
            "r-1",
            &snapshot_event(
                EventKind::GameUpdate,
                "",
                playing_room("r-1", two(), [None, x, None, None, None, None, None, None, None], "s-2"),
            ),
        ))),
        Some(Ok(broadcast_frame(
            "r-1",
            &snapshot_event(EventKind::GameEnd, "game over", finished.clone()),
        ))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ben")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::GameEnded { .. })
    })
    .await;

    // Ben won.
    match seen.last().unwrap() {
        GridlineEvent::GameEnded { outcome } => assert_eq!(*outcome, GameOutcome::Win),
        other => panic!("expected GameEnded, got {other:?}"),
    }

    // Snapshot progression: entered, then readiness, start, update, end.
    let updates: Vec<GamePhase> = seen
        .iter()
        .filter_map(|e| match e {
            GridlineEvent::RoomUpdated { state } => Some(state.game_state),
            _ => None,
        })
        .collect();
    assert_eq!(
        updates,
        vec![
            GamePhase::Waiting,
            GamePhase::Playing,
            GamePhase::Playing,
            GamePhase::Finished
        ]
    );

    // The final board is observable before the result event.
    let final_update = seen
        .iter()
        .rposition(|e| matches!(e, GridlineEvent::RoomUpdated { .. }))
        .unwrap();
    let ended = seen
        .iter()
        .position(|e| matches!(e, GridlineEvent::GameEnded { .. }))
        .unwrap();
    assert!(final_update < ended);
    match &seen[final_update] {
        GridlineEvent::RoomUpdated { state } => {
            let game = state.game.as_ref().unwrap();
            assert!(game.game_over);
            assert_eq!(game.winner_session_id.as_deref(), Some("s-2"));
        }
        other => panic!("expected RoomUpdated, got {other:?}"),
    }

    // Handle mirrors the final snapshot.
    assert_eq!(
        client.current_room().unwrap().game_state,
        GamePhase::Finished
    );

    client.shutdown().await;
}

#[tokio::test]
async fn draw_is_classified_when_game_over_without_winner() {
    let two = vec![
        player("s-1", "Ann", PlayerRole::Host),
        player("s-2", "Ben", PlayerRole::Guest),
    ];
    let x = Some(Mark::X);
    let o = Some(Mark::O);
    let full_board = [x, o, x, x, o, o, o, x, x];
    let drawn = finished_room("r-1", two.clone(), full_board, None);

    let (bus, _ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-1"))),
        Some(Ok(room_reply_frame(
            protocol::QUEUE_ROOM_CREATED,
            &waiting_room("r-1", two),
        ))),
        Some(Ok(broadcast_frame(
            "r-1",
            &snapshot_event(EventKind::GameEnd, "game over", drawn),
        ))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ann")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::GameEnded { .. })
    })
    .await;
    match seen.last().unwrap() {
        GridlineEvent::GameEnded { outcome } => assert_eq!(*outcome, GameOutcome::Draw),
        other => panic!("expected GameEnded, got {other:?}"),
    }

    client.shutdown().await;
}

// ── Chat ────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_broadcast_surfaces_without_snapshot_change() {
    let (bus, _ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-1"))),
        Some(Ok(room_reply_frame(
            protocol::QUEUE_ROOM_CREATED,
            &waiting_room("r-1", vec![player("s-1", "Ann", PlayerRole::Host)]),
        ))),
        Some(Ok(broadcast_frame(
            "r-1",
            &chat_event("Ben", PlayerRole::Guest, "hello!"),
        ))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ann")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::ChatMessage { .. })
    })
    .await;
    match seen.last().unwrap() {
        GridlineEvent::ChatMessage { line } => {
            assert_eq!(line.to_string(), "[guest]Ben: hello!");
        }
        other => panic!("expected ChatMessage, got {other:?}"),
    }
    // Chat never produced a RoomUpdated.
    assert!(!seen
        .iter()
        .any(|e| matches!(e, GridlineEvent::RoomUpdated { .. })));

    client.shutdown().await;
}

// ── Host departure and kick ─────────────────────────────────────────

#[tokio::test]
async fn host_departure_returns_guest_to_directory() {
    let (bus, ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-2"))),
        Some(Ok(room_reply_frame(
            protocol::QUEUE_ROOM_JOINED,
            &waiting_room(
                "r-1",
                vec![
                    player("s-1", "Ann", PlayerRole::Host),
                    player("s-2", "Ben", PlayerRole::Guest),
                ],
            ),
        ))),
        Some(Ok(broadcast_frame("r-1", &host_left_event("the host left")))),
        // The refresh issued by the forced exit gets its reply.
        Some(Ok(directory_frame(&[]))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ben")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::ForcedRoomExit { .. })
    })
    .await;
    match seen.last().unwrap() {
        GridlineEvent::ForcedRoomExit { reason } => assert_eq!(reason, "the host left"),
        other => panic!("expected ForcedRoomExit, got {other:?}"),
    }
    assert!(client.current_room_id().is_none());

    // A fresh directory snapshot follows.
    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::DirectoryUpdated { .. })
    })
    .await;
    assert!(matches!(
        seen.last().unwrap(),
        GridlineEvent::DirectoryUpdated { .. }
    ));

    {
        let ops = ops.lock().unwrap();
        assert!(ops.contains(&BusOp::Unsubscribe("/topic/room/r-1".into())));
        let refreshes = ops
            .iter()
            .filter(|op| op.publish_body(protocol::DEST_LOBBY_ROOMS).is_some())
            .count();
        assert_eq!(refreshes, 2);
    }

    client.shutdown().await;
}

/// The guest's departure (voluntary or kicked) reaches the host as a snapshot
/// replacement, not a forced exit — and readiness resets for the host.
#[tokio::test]
async fn guest_kick_resets_readiness_for_host() {
    let mut solo_after_kick = waiting_room("r-1", vec![player("s-1", "Ann", PlayerRole::Host)]);
    // Stale readiness in the broadcast snapshot must not survive locally.
    solo_after_kick.ready_player_session_ids.insert("s-1".into());

    let kick = snapshot_event(EventKind::Kick, "Ben was kicked by the host", solo_after_kick);

    let (bus, _ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-1"))),
        Some(Ok(room_reply_frame(
            protocol::QUEUE_ROOM_CREATED,
            &waiting_room(
                "r-1",
                vec![
                    player("s-1", "Ann", PlayerRole::Host),
                    player("s-2", "Ben", PlayerRole::Guest),
                ],
            ),
        ))),
        Some(Ok(broadcast_frame("r-1", &kick))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ann")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::RoomUpdated { .. })
    })
    .await;
    match seen.last().unwrap() {
        GridlineEvent::RoomUpdated { state } => {
            assert_eq!(state.players.len(), 1);
            assert!(state.ready_player_session_ids.is_empty());
        }
        other => panic!("expected RoomUpdated, got {other:?}"),
    }
    assert!(!seen
        .iter()
        .any(|e| matches!(e, GridlineEvent::ForcedRoomExit { .. })));
    assert!(!client.is_ready_hint());

    client.shutdown().await;
}

// ── Server errors ───────────────────────────────────────────────────

#[tokio::test]
async fn private_error_queue_surfaces_server_error() {
    let (bus, _ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-1"))),
        Some(Ok(gridline_client::Frame::new(
            protocol::QUEUE_ERRORS,
            error_body("room is full"),
        ))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ann")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::ServerError { .. })
    })
    .await;
    match seen.last().unwrap() {
        GridlineEvent::ServerError { content } => assert_eq!(content, "room is full"),
        other => panic!("expected ServerError, got {other:?}"),
    }
    // Errors are recoverable; the client is still connected.
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn malformed_broadcast_is_skipped_not_fatal() {
    let (bus, _ops, _closed) = MockBus::new(vec![
        Some(Ok(session_frame("s-1"))),
        Some(Ok(room_reply_frame(
            protocol::QUEUE_ROOM_CREATED,
            &waiting_room("r-1", vec![player("s-1", "Ann", PlayerRole::Host)]),
        ))),
        Some(Ok(gridline_client::Frame::new(
            protocol::room_topic("r-1"),
            "not json at all",
        ))),
        Some(Ok(broadcast_frame(
            "r-1",
            &chat_event("Ben", PlayerRole::Guest, "still alive"),
        ))),
    ]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ann")).unwrap();

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::ChatMessage { .. })
    })
    .await;
    match seen.last().unwrap() {
        GridlineEvent::ChatMessage { line } => {
            assert_eq!(line.to_string(), "[guest]Ben: still alive");
        }
        other => panic!("expected ChatMessage, got {other:?}"),
    }

    client.shutdown().await;
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_closes_bus_and_delivers_disconnected() {
    let (bus, _ops, closed) = MockBus::new(vec![Some(Ok(session_frame("s-1")))]);
    let (mut client, mut events) =
        GridlineClient::start(bus, GridlineConfig::new("Ann")).unwrap();

    let _ = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::SessionEstablished { .. })
    })
    .await;

    client.shutdown().await;
    assert!(closed.load(std::sync::atomic::Ordering::Relaxed));

    let seen = collect_until(&mut events, |e| {
        matches!(e, GridlineEvent::Disconnected { .. })
    })
    .await;
    assert!(matches!(
        seen.last().unwrap(),
        GridlineEvent::Disconnected { .. }
    ));
    // Channel ends after Disconnected.
    assert!(events.recv().await.is_none());
}
