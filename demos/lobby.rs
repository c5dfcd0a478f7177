//! # Lobby Demo
//!
//! Demonstrates a complete Gridline client lifecycle:
//!
//! 1. Connect to a game server via STOMP over WebSocket
//! 2. Complete the session-id handshake
//! 3. Browse the room directory and create a room
//! 4. React to room events (joins, readiness, moves, chat, game end)
//! 5. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a Gridline server on localhost:8080, then:
//! cargo run --example lobby
//!
//! # Override the server URL or nickname:
//! GRIDLINE_URL=ws://my-server:8080/game GRIDLINE_NICKNAME=Ann cargo run --example lobby
//! ```

use gridline_client::{
    GridlineClient, GridlineConfig, GridlineEvent, StompTransport, TurnStatus,
};

/// Default server URL when `GRIDLINE_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080/game";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("GRIDLINE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let nickname =
        std::env::var("GRIDLINE_NICKNAME").unwrap_or_else(|_| "RustPlayer".to_string());
    tracing::info!("Connecting to {url} as {nickname}");

    // ── Connect ─────────────────────────────────────────────────────
    // Establish the STOMP session, then start the client. This spawns a
    // background task that drives the transport and emits events.
    let transport = StompTransport::connect(&url).await?;
    let config = GridlineConfig::new(&nickname);
    let (mut client, mut event_rx) = GridlineClient::start(transport, config)?;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            // Branch 1: Incoming event from the server (or transport layer).
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    // ── Synthetic: transport connected ───────────────
                    GridlineEvent::Connected => {
                        tracing::info!("Transport connected, awaiting session id…");
                    }

                    // ── Handshake complete ───────────────────────────
                    GridlineEvent::SessionEstablished { session_id } => {
                        tracing::info!("Session established: {session_id}");
                        // The first directory snapshot is already on its way.
                    }

                    // ── Directory ────────────────────────────────────
                    GridlineEvent::DirectoryUpdated { rooms } => {
                        tracing::info!("{} room(s) open", rooms.len());
                        for room in &rooms {
                            tracing::info!(
                                "  [{}] {} (host: {}, {}/2)",
                                room.room_id, room.room_name,
                                room.host_nickname, room.player_count
                            );
                        }

                        // Join the first open room, or host one ourselves.
                        if client.current_room_id().is_none() {
                            match rooms.iter().find(|r| r.player_count < 2) {
                                Some(room) => {
                                    client.join_room(room.room_id.clone())?;
                                    tracing::info!("Joining {}", room.room_name);
                                }
                                None => {
                                    // Blank name gets the nickname-derived default.
                                    client.create_room("")?;
                                    tracing::info!("No open rooms, creating one");
                                }
                            }
                        }
                    }

                    // ── Room lifecycle ───────────────────────────────
                    GridlineEvent::RoomEntered { state } => {
                        tracing::info!(
                            "Entered room {} ({} player(s) present)",
                            state.room_name,
                            state.players.len()
                        );
                        client.toggle_ready()?;
                        tracing::info!("Ready!");
                    }

                    GridlineEvent::RoomUpdated { state } => {
                        let local = client.session_id().unwrap_or_default();
                        let facts = gridline_client::derive(&state, &local);
                        for slot in &facts.slots {
                            tracing::info!("  {}: {}", slot.label.text(), slot.display_name());
                        }

                        // Play the first legal cell whenever it is our turn.
                        if facts.turn == TurnStatus::MyTurn {
                            if let Some(&cell) = facts.clickable_cells.first() {
                                client.make_move(cell)?;
                                tracing::info!("Played cell {cell}");
                            }
                        }
                    }

                    GridlineEvent::ChatMessage { line } => {
                        tracing::info!("{line}");
                    }

                    GridlineEvent::GameEnded { outcome } => {
                        tracing::info!("Game over: {outcome}");
                        // Queue up for a rematch.
                        client.toggle_ready()?;
                    }

                    GridlineEvent::ForcedRoomExit { reason } => {
                        tracing::warn!("Back to the lobby: {reason}");
                        // A fresh directory snapshot follows automatically.
                    }

                    // ── Errors from the server ───────────────────────
                    GridlineEvent::ServerError { content } => {
                        tracing::error!("Server error: {content}");
                    }

                    // ── Disconnect ───────────────────────────────────
                    GridlineEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                        break;
                    }
                }
            }

            // Branch 2: Ctrl+C — shut down gracefully.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}
