//! Async client for the Gridline room protocol.
//!
//! [`GridlineClient`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<GridlineEvent>`]) returned
//! from [`GridlineClient::start`].
//!
//! The loop owns the [`RoomSynchronizer`] — the single mutation site for room
//! state. The handle only reads a mirrored snapshot (for synchronous local
//! validation of moves and kicks) and queues commands.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = connect_somehow().await;
//! let config = GridlineConfig::new("Ann");
//! let (client, mut events) = GridlineClient::start(transport, config)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GridlineEvent::SessionEstablished { .. } => client.create_room("")?,
//!         GridlineEvent::RoomEntered { state } => { /* render */ }
//!         GridlineEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::directory::Directory;
use crate::error::{GridlineError, Result};
use crate::event::GridlineEvent;
use crate::protocol::{
    self, ActionMessage, CreateRoomRequest, JoinRoomRequest, RoomId, RoomState, RoomSummary,
    SessionId,
};
use crate::sync::{RoomSynchronizer, SyncEffect};
use crate::transport::{Frame, Transport};
use crate::view::{self, TurnStatus};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`GridlineClient`] connection.
///
/// The only required field is the nickname; all others have sensible
/// defaults. The nickname is validated when the client starts.
///
/// # Example
///
/// ```
/// use gridline_client::client::GridlineConfig;
/// use std::time::Duration;
///
/// let config = GridlineConfig::new("Ann")
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.nickname, "Ann");
/// ```
#[derive(Debug, Clone)]
pub struct GridlineConfig {
    /// Display name sent with create/join requests and chat messages.
    /// Must be non-blank and at most 15 characters.
    pub nickname: String,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server messages, events
    /// are dropped (with a warning logged) to avoid blocking the transport
    /// loop. The `Disconnected` event is always delivered regardless of
    /// capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`GridlineClient::shutdown`] is called, the background transport
    /// loop is given this much time to close the transport and emit a final
    /// `Disconnected` event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl GridlineConfig {
    /// Create a new configuration with the given nickname and default values.
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Commands from the handle to the transport loop. Validation happened in
/// the handle; the loop only resolves snapshot-dependent details (current
/// room id, kick target, ready direction) at send time.
#[derive(Debug)]
enum Command {
    RefreshDirectory,
    CreateRoom { room_name: String },
    JoinRoom { room_id: RoomId },
    Move { index: usize },
    ToggleReady,
    Chat { content: String },
    Kick,
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the transport loop.
///
/// The mutexes guard snapshot reads only; they are never held across an
/// `.await`, so `std::sync` is sufficient and keeps the handle methods
/// synchronous.
struct ClientShared {
    connected: AtomicBool,
    session_ready: AtomicBool,
    /// Optimistic ready hint, mirrored from the synchronizer.
    local_ready: AtomicBool,
    session_id: StdMutex<Option<SessionId>>,
    room: StdMutex<Option<RoomState>>,
    directory: StdMutex<Directory>,
}

impl ClientShared {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            session_ready: AtomicBool::new(false),
            local_ready: AtomicBool::new(false),
            session_id: StdMutex::new(None),
            room: StdMutex::new(None),
            directory: StdMutex::new(Directory::new()),
        }
    }

    fn session_id(&self) -> Option<SessionId> {
        self.session_id.lock().ok().and_then(|g| g.clone())
    }

    fn room(&self) -> Option<RoomState> {
        self.room.lock().ok().and_then(|g| g.clone())
    }

    fn set_room(&self, room: Option<RoomState>) {
        if let Ok(mut guard) = self.room.lock() {
            *guard = room;
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the Gridline room protocol.
///
/// Created via [`GridlineClient::start`], which spawns a background transport
/// loop and returns this handle together with an event receiver.
///
/// All action methods validate locally, then queue a [`Command`] to the
/// transport loop. They return once the command is queued (no round-trip
/// await); protocol-level rejections arrive later as
/// [`GridlineEvent::ServerError`].
pub struct GridlineClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<ClientShared>,
    nickname: String,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl GridlineClient {
    /// Start the client transport loop and return a handle plus event
    /// receiver.
    ///
    /// The loop immediately performs the identity handshake: it subscribes
    /// to the private session channel *before* publishing the session-id
    /// request, then — only once the id arrives — subscribes the remaining
    /// private channels and issues the first directory refresh.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the configured nickname is blank or
    /// longer than 15 characters. No task is spawned in that case.
    pub fn start(
        transport: impl Transport,
        config: GridlineConfig,
    ) -> Result<(Self, mpsc::Receiver<GridlineEvent>)> {
        protocol::validate_nickname(&config.nickname)?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<GridlineEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientShared::new());

        let driver = TransportLoop {
            transport,
            event_tx,
            shared: Arc::clone(&state),
            nickname: config.nickname.clone(),
            handshake: Handshake::AwaitingSession,
            room_topic: None,
        };
        let task = tokio::spawn(driver.run(cmd_rx, shutdown_rx));

        let client = Self {
            cmd_tx,
            state,
            nickname: config.nickname,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        Ok((client, event_rx))
    }

    // ── Directory operations ────────────────────────────────────────

    /// Request a fresh directory snapshot.
    ///
    /// Idempotent and safe to call repeatedly. There is no correlation id on
    /// the wire: if several refreshes are in flight, the replies are
    /// indistinguishable — each simply replaces the directory wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::NotConnected`] or
    /// [`GridlineError::HandshakePending`]; no traffic is produced either way.
    pub fn refresh_directory(&self) -> Result<()> {
        self.send(Command::RefreshDirectory)
    }

    /// Create a room. A blank name defaults to a nickname-derived
    /// placeholder; success arrives asynchronously as
    /// [`GridlineEvent::RoomEntered`].
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::RoomNameTooLong`] (rejected locally, not
    /// sent) or a connection-state error.
    pub fn create_room(&self, room_name: &str) -> Result<()> {
        let room_name = room_name.trim();
        protocol::validate_room_name(room_name)?;
        let room_name = if room_name.is_empty() {
            protocol::default_room_name(&self.nickname)
        } else {
            room_name.to_string()
        };
        self.send(Command::CreateRoom { room_name })
    }

    /// Join a room by id — a directory-list selection and a manually entered
    /// room code use the identical request. The server is the sole authority
    /// on capacity; an over-capacity join is rejected with a
    /// [`GridlineEvent::ServerError`].
    ///
    /// # Errors
    ///
    /// Returns a connection-state error if not connected or mid-handshake.
    pub fn join_room(&self, room_id: impl Into<RoomId>) -> Result<()> {
        self.send(Command::JoinRoom {
            room_id: room_id.into(),
        })
    }

    // ── Room actions ────────────────────────────────────────────────

    /// Claim a board cell.
    ///
    /// Gated by the same legality derivation the view uses; the remote peer
    /// re-validates and is authoritative, so an `ERROR` reply to a move that
    /// looked legal here (stale view racing a `GAME_UPDATE`) must be
    /// tolerated.
    ///
    /// # Errors
    ///
    /// [`GridlineError::InvalidCellIndex`], [`GridlineError::NotInRoom`],
    /// [`GridlineError::NotPlaying`], [`GridlineError::NotYourTurn`],
    /// [`GridlineError::CellOccupied`], or a connection-state error.
    pub fn make_move(&self, index: usize) -> Result<()> {
        if index >= protocol::BOARD_CELLS {
            return Err(GridlineError::InvalidCellIndex { index });
        }
        self.check_ready_for_commands()?;

        let room = self.state.room().ok_or(GridlineError::NotInRoom)?;
        let local = self.state.session_id().ok_or(GridlineError::HandshakePending)?;
        let facts = view::derive(&room, &local);
        match facts.turn {
            TurnStatus::NotPlaying => return Err(GridlineError::NotPlaying),
            TurnStatus::OpponentTurn => return Err(GridlineError::NotYourTurn),
            TurnStatus::MyTurn => {}
        }
        if !facts.clickable_cells.contains(&index) {
            return Err(GridlineError::CellOccupied { index });
        }

        self.send(Command::Move { index })
    }

    /// Flip the ready toggle.
    ///
    /// The local flip is optimistic — a transient display hint readable via
    /// [`is_ready_hint`](Self::is_ready_hint) — and the canonical readiness
    /// set is whatever the next snapshot says. A toggle attempted while
    /// disconnected is silently dropped (returns `Ok`, no traffic).
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::NotInRoom`] outside a room or
    /// [`GridlineError::HandshakePending`] mid-handshake.
    pub fn toggle_ready(&self) -> Result<()> {
        if !self.is_connected() {
            debug!("ready toggle while disconnected, dropping");
            return Ok(());
        }
        if !self.state.session_ready.load(Ordering::Acquire) {
            return Err(GridlineError::HandshakePending);
        }
        if self.state.room().is_none() {
            return Err(GridlineError::NotInRoom);
        }
        self.cmd_tx
            .send(Command::ToggleReady)
            .map_err(|_| GridlineError::NotConnected)
    }

    /// Send a chat message to the room.
    ///
    /// # Errors
    ///
    /// [`GridlineError::EmptyChatMessage`] / [`GridlineError::ChatMessageTooLong`]
    /// (rejected locally, never sent), [`GridlineError::NotInRoom`], or a
    /// connection-state error.
    pub fn send_chat(&self, content: &str) -> Result<()> {
        protocol::validate_chat_content(content)?;
        self.check_ready_for_commands()?;
        if self.state.room().is_none() {
            return Err(GridlineError::NotInRoom);
        }
        self.send(Command::Chat {
            content: content.to_string(),
        })
    }

    /// Kick the other player. Only constructible when the local player is
    /// the host, the room has company, and no game is in progress; the
    /// target is "the other occupied slot that is not me".
    ///
    /// # Errors
    ///
    /// [`GridlineError::KickNotAllowed`], [`GridlineError::NotInRoom`], or a
    /// connection-state error.
    pub fn kick_opponent(&self) -> Result<()> {
        self.check_ready_for_commands()?;
        let room = self.state.room().ok_or(GridlineError::NotInRoom)?;
        let local = self.state.session_id().ok_or(GridlineError::HandshakePending)?;
        if !view::derive(&room, &local).kick_eligible {
            return Err(GridlineError::KickNotAllowed);
        }
        self.send(Command::Kick)
    }

    /// Leave the current room.
    ///
    /// Leaving always disconnects the transport session entirely; re-entry
    /// goes through a fresh connect and the full identity handshake. This is
    /// the protocol's deliberate simplification — there is no lighter-weight
    /// leave message.
    pub async fn leave_room(&mut self) {
        debug!("leave requested, disconnecting transport session");
        self.shutdown().await;
    }

    /// Shut down the client, closing the transport and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield a final
    /// `Disconnected` followed by `None` once the transport loop exits.
    pub async fn shutdown(&mut self) {
        debug!("GridlineClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the transport loop with a timeout. If it doesn't exit in
        // time, abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
        self.state.session_ready.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` once the identity handshake has completed.
    pub fn is_session_established(&self) -> bool {
        self.state.session_ready.load(Ordering::Acquire)
    }

    /// The session id assigned by the server, once established.
    pub fn session_id(&self) -> Option<SessionId> {
        self.state.session_id()
    }

    /// The current room id, if in a room.
    pub fn current_room_id(&self) -> Option<RoomId> {
        self.state.room().map(|r| r.room_id)
    }

    /// A clone of the current room snapshot, if in a room.
    pub fn current_room(&self) -> Option<RoomState> {
        self.state.room()
    }

    /// The latest directory snapshot.
    ///
    /// `None` until the first snapshot arrives — distinct from
    /// `Some(vec![])`, which means "loaded and no rooms are open".
    pub fn directory(&self) -> Option<Vec<RoomSummary>> {
        self.state
            .directory
            .lock()
            .ok()
            .and_then(|dir| dir.rooms().map(<[RoomSummary]>::to_vec))
    }

    /// The optimistic ready hint (button label state). Overwritten by every
    /// authoritative snapshot; never a source of truth.
    pub fn is_ready_hint(&self) -> bool {
        self.state.local_ready.load(Ordering::Acquire)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn check_ready_for_commands(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(GridlineError::NotConnected);
        }
        if !self.state.session_ready.load(Ordering::Acquire) {
            return Err(GridlineError::HandshakePending);
        }
        Ok(())
    }

    /// Queue a command to the transport loop.
    fn send(&self, cmd: Command) -> Result<()> {
        self.check_ready_for_commands()?;
        self.cmd_tx
            .send(cmd)
            .map_err(|_| GridlineError::NotConnected)
    }
}

impl std::fmt::Debug for GridlineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridlineClient")
            .field("connected", &self.is_connected())
            .field("session_established", &self.is_session_established())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for GridlineClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the transport loop future to be dropped immediately. The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending it
        // would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Identity handshake phase: no protocol action is legal until the private
/// session channel has produced the server-assigned id.
enum Handshake {
    AwaitingSession,
    Ready(RoomSynchronizer),
}

/// Background transport loop. Owns the transport, the synchronizer, and the
/// directory; multiplexes commands, shutdown, and inbound frames via
/// `tokio::select!`.
///
/// Exits when:
/// - The command channel closes (client handle dropped or shutdown called)
/// - The transport returns `None` (server closed connection)
/// - A transport error occurs
struct TransportLoop<T: Transport> {
    transport: T,
    event_tx: mpsc::Sender<GridlineEvent>,
    shared: Arc<ClientShared>,
    nickname: String,
    handshake: Handshake,
    /// Active room broadcast subscription, at most one at a time.
    room_topic: Option<String>,
}

impl<T: Transport> TransportLoop<T> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) {
        debug!("transport loop started");

        emit_event(&self.event_tx, GridlineEvent::Connected).await;

        // Handshake phase 1: the private reply channel must exist before
        // the request is published, or the reply can race the subscription.
        if let Err(e) = self.begin_handshake().await {
            error!("handshake setup failed: {e}");
            self.disconnect(Some(format!("handshake setup failed: {e}")))
                .await;
            return;
        }

        loop {
            tokio::select! {
                // Branch 1: outgoing command from the client handle
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if let Err(e) = self.handle_command(cmd).await {
                                error!("transport send error: {e}");
                                self.disconnect(Some(format!("transport send error: {e}"))).await;
                                break;
                            }
                        }
                        // Command channel closed — client handle dropped.
                        None => {
                            debug!("command channel closed, shutting down transport loop");
                            let _ = self.transport.close().await;
                            self.disconnect(Some("client shut down".into())).await;
                            break;
                        }
                    }
                }

                // Branch 2: shutdown signal
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    let _ = self.transport.close().await;
                    self.disconnect(Some("client shut down".into())).await;
                    break;
                }

                // Branch 3: incoming frame from the bus
                incoming = self.transport.recv() => {
                    match incoming {
                        Some(Ok(frame)) => {
                            if let Err(e) = self.route(frame).await {
                                error!("transport send error: {e}");
                                self.disconnect(Some(format!("transport send error: {e}"))).await;
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!("transport receive error: {e}");
                            self.disconnect(Some(format!("transport receive error: {e}"))).await;
                            break;
                        }
                        // Transport closed cleanly.
                        None => {
                            debug!("transport closed by server");
                            self.disconnect(None).await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("transport loop exited");
    }

    /// Subscribe the private session channel, then request the session id.
    async fn begin_handshake(&mut self) -> Result<()> {
        self.transport.subscribe(protocol::QUEUE_SESSION).await?;
        self.transport
            .publish(protocol::DEST_REQUEST_SESSION_ID, String::new())
            .await
    }

    /// Handshake phase 2: the id arrived — the remaining private channels
    /// may now be subscribed and the first directory refresh issued.
    async fn complete_handshake(&mut self, session_id: SessionId) -> Result<()> {
        debug!(session_id = %session_id, "session established");

        self.transport.subscribe(protocol::QUEUE_ERRORS).await?;
        self.transport.subscribe(protocol::QUEUE_ROOM_CREATED).await?;
        self.transport.subscribe(protocol::QUEUE_ROOM_JOINED).await?;
        self.transport.subscribe(protocol::QUEUE_LOBBY_ROOMS).await?;
        self.transport
            .publish(protocol::DEST_LOBBY_ROOMS, String::new())
            .await?;

        if let Ok(mut guard) = self.shared.session_id.lock() {
            *guard = Some(session_id.clone());
        }
        self.shared.session_ready.store(true, Ordering::Release);
        self.handshake = Handshake::Ready(RoomSynchronizer::new(session_id.clone()));

        emit_event(
            &self.event_tx,
            GridlineEvent::SessionEstablished { session_id },
        )
        .await;
        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<()> {
        // The handle refuses to queue commands before the handshake, so a
        // command in the awaiting phase is a logic error; drop it.
        let Handshake::Ready(sync) = &mut self.handshake else {
            warn!("dropping command issued before handshake completed: {cmd:?}");
            return Ok(());
        };

        match cmd {
            Command::RefreshDirectory => {
                self.transport
                    .publish(protocol::DEST_LOBBY_ROOMS, String::new())
                    .await
            }
            Command::CreateRoom { room_name } => {
                let body = serde_json::to_string(&CreateRoomRequest {
                    nickname: self.nickname.clone(),
                    room_name,
                })?;
                self.transport.publish(protocol::DEST_ROOM_CREATE, body).await
            }
            Command::JoinRoom { room_id } => {
                let body = serde_json::to_string(&JoinRoomRequest {
                    room_id,
                    nickname: self.nickname.clone(),
                })?;
                self.transport.publish(protocol::DEST_ROOM_JOIN, body).await
            }
            Command::Move { index } => {
                let Some(room_id) = sync.room().map(|r| r.room_id.clone()) else {
                    warn!("dropping move: not in a room");
                    return Ok(());
                };
                let body = serde_json::to_string(&ActionMessage::make_move(index))?;
                self.transport
                    .publish(&protocol::room_action_destination(&room_id), body)
                    .await
            }
            Command::ToggleReady => {
                let Some(room_id) = sync.room().map(|r| r.room_id.clone()) else {
                    warn!("dropping ready toggle: not in a room");
                    return Ok(());
                };
                // Optimistic flip; the next snapshot is authoritative.
                let ready = sync.toggle_local_ready();
                self.shared.local_ready.store(ready, Ordering::Release);
                let body = serde_json::to_string(&ActionMessage::ready(ready))?;
                self.transport
                    .publish(&protocol::room_action_destination(&room_id), body)
                    .await
            }
            Command::Chat { content } => {
                let Some(room_id) = sync.room().map(|r| r.room_id.clone()) else {
                    warn!("dropping chat: not in a room");
                    return Ok(());
                };
                let body =
                    serde_json::to_string(&ActionMessage::chat(content, self.nickname.clone()))?;
                self.transport
                    .publish(&protocol::room_action_destination(&room_id), body)
                    .await
            }
            Command::Kick => {
                // Re-resolve the target at send time: the snapshot may have
                // changed since the handle checked eligibility.
                let target = sync.room().and_then(|room| {
                    view::derive(room, &sync.session_id().to_string()).kick_target
                });
                let Some(room_id) = sync.room().map(|r| r.room_id.clone()) else {
                    warn!("dropping kick: not in a room");
                    return Ok(());
                };
                let Some(target) = target else {
                    warn!("dropping kick: no eligible target");
                    return Ok(());
                };
                let body = serde_json::to_string(&ActionMessage::kick(target))?;
                self.transport
                    .publish(&protocol::room_action_destination(&room_id), body)
                    .await
            }
        }
    }

    /// Route an inbound frame by destination.
    async fn route(&mut self, frame: Frame) -> Result<()> {
        match frame.destination.as_str() {
            protocol::QUEUE_SESSION => {
                // Raw string body, not JSON.
                self.complete_handshake(frame.body).await?;
            }
            protocol::QUEUE_ERRORS => match serde_json::from_str::<protocol::RoomEvent>(&frame.body)
            {
                Ok(event) => {
                    let content = event.content.unwrap_or_default();
                    emit_event(&self.event_tx, GridlineEvent::ServerError { content }).await;
                }
                Err(e) => warn!("bad error-queue body: {e} — raw: {}", frame.body),
            },
            protocol::QUEUE_ROOM_CREATED | protocol::QUEUE_ROOM_JOINED => {
                match serde_json::from_str::<RoomState>(&frame.body) {
                    Ok(state) => self.enter_room(state).await?,
                    Err(e) => warn!("bad room reply body: {e} — raw: {}", frame.body),
                }
            }
            protocol::QUEUE_LOBBY_ROOMS => {
                match serde_json::from_str::<Vec<RoomSummary>>(&frame.body) {
                    Ok(rooms) => {
                        if let Ok(mut dir) = self.shared.directory.lock() {
                            dir.replace(rooms.clone());
                        }
                        emit_event(&self.event_tx, GridlineEvent::DirectoryUpdated { rooms })
                            .await;
                    }
                    Err(e) => warn!("bad directory body: {e} — raw: {}", frame.body),
                }
            }
            dest if Some(dest) == self.room_topic.as_deref() => {
                match serde_json::from_str::<protocol::RoomEvent>(&frame.body) {
                    Ok(event) => self.apply_room_event(event).await?,
                    Err(e) => warn!("bad room broadcast body: {e} — raw: {}", frame.body),
                }
            }
            other => {
                warn!("frame on unexpected destination {other}, skipping");
            }
        }
        Ok(())
    }

    /// Enter a room: re-point the single broadcast subscription, seed the
    /// synchronizer, then announce. The subscription is active before the
    /// event is emitted, so nothing the application sends in reaction can
    /// outrun it.
    async fn enter_room(&mut self, state: RoomState) -> Result<()> {
        let Handshake::Ready(sync) = &mut self.handshake else {
            warn!("room reply before handshake completed, skipping");
            return Ok(());
        };

        if let Some(previous) = self.room_topic.take() {
            self.transport.unsubscribe(&previous).await?;
        }
        let topic = protocol::room_topic(&state.room_id);
        self.transport.subscribe(&topic).await?;
        self.room_topic = Some(topic);

        sync.enter_room(state.clone());
        self.shared.set_room(Some(state.clone()));
        self.shared.local_ready.store(false, Ordering::Release);

        emit_event(&self.event_tx, GridlineEvent::RoomEntered { state }).await;
        Ok(())
    }

    /// Apply a room broadcast through the synchronizer and surface the
    /// resulting effects in order.
    async fn apply_room_event(&mut self, event: protocol::RoomEvent) -> Result<()> {
        let Handshake::Ready(sync) = &mut self.handshake else {
            return Ok(());
        };

        let effects = sync.apply(event);
        let snapshot = sync.room().cloned();
        let local_ready = sync.local_ready();
        self.shared.set_room(snapshot.clone());
        self.shared.local_ready.store(local_ready, Ordering::Release);

        for effect in effects {
            match effect {
                SyncEffect::StateReplaced => {
                    if let Some(state) = snapshot.clone() {
                        emit_event(&self.event_tx, GridlineEvent::RoomUpdated { state }).await;
                    }
                }
                SyncEffect::ChatAppended(line) => {
                    emit_event(&self.event_tx, GridlineEvent::ChatMessage { line }).await;
                }
                SyncEffect::GameEnded(outcome) => {
                    emit_event(&self.event_tx, GridlineEvent::GameEnded { outcome }).await;
                }
                SyncEffect::ForcedExit(reason) => {
                    // The room is gone: drop its subscription and fall back
                    // to the directory, exactly like a voluntary reset.
                    if let Some(topic) = self.room_topic.take() {
                        self.transport.unsubscribe(&topic).await?;
                    }
                    self.shared.set_room(None);
                    self.shared.local_ready.store(false, Ordering::Release);
                    self.transport
                        .publish(protocol::DEST_LOBBY_ROOMS, String::new())
                        .await?;
                    emit_event(&self.event_tx, GridlineEvent::ForcedRoomExit { reason }).await;
                }
                SyncEffect::ServerError(content) => {
                    emit_event(&self.event_tx, GridlineEvent::ServerError { content }).await;
                }
            }
        }
        Ok(())
    }

    /// Mark disconnected and deliver the final `Disconnected` event.
    async fn disconnect(&mut self, reason: Option<String>) {
        self.shared.connected.store(false, Ordering::Release);
        self.shared.session_ready.store(false, Ordering::Release);
        if let Ok(mut dir) = self.shared.directory.lock() {
            dir.clear();
        }
        // Blocking send instead of try_send: Disconnected is always the last
        // event on the channel and must never be silently dropped.
        let event = GridlineEvent::Disconnected { reason };
        if self.event_tx.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the transport loop.
async fn emit_event(event_tx: &mpsc::Sender<GridlineEvent>, event: GridlineEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
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
    use crate::protocol::{EventKind, GamePhase, GameSnapshot, Player, PlayerRole, RoomEvent};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    // ── Mock transport ──────────────────────────────────────────────

    /// Records every subscribe/unsubscribe/publish in order and replays
    /// scripted inbound frames.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Subscribe(String),
        Unsubscribe(String),
        Publish(String, String),
    }

    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<Frame, GridlineError>>>,
        ops: Arc<StdMutex<Vec<Op>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<Frame, GridlineError>>>,
        ) -> (Self, Arc<StdMutex<Vec<Op>>>, Arc<AtomicBool>) {
            let ops = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                ops: Arc::clone(&ops),
                closed: Arc::clone(&closed),
            };
            (transport, ops, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn subscribe(&mut self, destination: &str) -> std::result::Result<(), GridlineError> {
            self.ops
                .lock()
                .unwrap()
                .push(Op::Subscribe(destination.to_string()));
            Ok(())
        }

        async fn unsubscribe(
            &mut self,
            destination: &str,
        ) -> std::result::Result<(), GridlineError> {
            self.ops
                .lock()
                .unwrap()
                .push(Op::Unsubscribe(destination.to_string()));
            Ok(())
        }

        async fn publish(
            &mut self,
            destination: &str,
            body: String,
        ) -> std::result::Result<(), GridlineError> {
            self.ops
                .lock()
                .unwrap()
                .push(Op::Publish(destination.to_string(), body));
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<Frame, GridlineError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted frame or error.
                item
            } else {
                // All scripted frames delivered — hang forever so the loop
                // stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), GridlineError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn session_frame(id: &str) -> Frame {
        Frame::new(protocol::QUEUE_SESSION, id)
    }

    fn waiting_room_json(room_id: &str, players: &[(&str, &str, PlayerRole)]) -> String {
        let state = RoomState {
            room_id: room_id.into(),
            room_name: "test room".into(),
            host_nickname: "Ann".into(),
            players: players
                .iter()
                .map(|(id, nickname, role)| Player {
                    session_id: (*id).into(),
                    nickname: (*nickname).into(),
                    role: *role,
                })
                .collect(),
            ready_player_session_ids: Default::default(),
            game: None,
            game_state: GamePhase::Waiting,
        };
        serde_json::to_string(&state).unwrap()
    }

    fn room_created_frame(room_id: &str) -> Frame {
        Frame::new(
            protocol::QUEUE_ROOM_CREATED,
            waiting_room_json(room_id, &[("s-1", "Ann", PlayerRole::Host)]),
        )
    }

    fn broadcast_frame(room_id: &str, event: &RoomEvent) -> Frame {
        Frame::new(
            protocol::room_topic(room_id),
            serde_json::to_string(event).unwrap(),
        )
    }

    async fn drain_until_session(events: &mut mpsc::Receiver<GridlineEvent>) {
        loop {
            match events.recv().await.unwrap() {
                GridlineEvent::SessionEstablished { .. } => break,
                _ => continue,
            }
        }
    }

    // ── Handshake ───────────────────────────────────────────────────

    #[tokio::test]
    async fn session_subscription_precedes_session_request() {
        let (transport, ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;

        {
            let ops = ops.lock().unwrap();
            let sub = ops
                .iter()
                .position(|op| *op == Op::Subscribe(protocol::QUEUE_SESSION.into()))
                .unwrap();
            let req = ops
                .iter()
                .position(|op| {
                    matches!(op, Op::Publish(dest, _) if dest == protocol::DEST_REQUEST_SESSION_ID)
                })
                .unwrap();
            assert!(sub < req, "subscribe must precede the id request");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn handshake_completion_subscribes_then_refreshes() {
        let (transport, ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        assert!(client.is_session_established());
        assert_eq!(client.session_id().as_deref(), Some("s-1"));

        {
            let ops = ops.lock().unwrap();
            // All four post-handshake subscriptions precede the first
            // directory refresh.
            let refresh = ops
                .iter()
                .position(|op| {
                    matches!(op, Op::Publish(dest, _) if dest == protocol::DEST_LOBBY_ROOMS)
                })
                .unwrap();
            for queue in [
                protocol::QUEUE_ERRORS,
                protocol::QUEUE_ROOM_CREATED,
                protocol::QUEUE_ROOM_JOINED,
                protocol::QUEUE_LOBBY_ROOMS,
            ] {
                let sub = ops
                    .iter()
                    .position(|op| *op == Op::Subscribe(queue.into()))
                    .unwrap();
                assert!(sub < refresh, "{queue} must be subscribed before refresh");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn actions_before_handshake_are_rejected() {
        let (transport, _ops, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        // Connected arrives but no session yet.
        let first = events.recv().await.unwrap();
        assert!(matches!(first, GridlineEvent::Connected));
        assert!(client.directory().is_none());

        assert!(matches!(
            client.refresh_directory(),
            Err(GridlineError::HandshakePending)
        ));
        assert!(matches!(
            client.create_room("a room"),
            Err(GridlineError::HandshakePending)
        ));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_nickname_fails_start() {
        let (transport, _ops, _closed) = MockTransport::new(vec![]);
        let result = GridlineClient::start(transport, GridlineConfig::new("  "));
        assert!(matches!(result, Err(GridlineError::EmptyNickname)));
    }

    // ── Directory ───────────────────────────────────────────────────

    #[tokio::test]
    async fn directory_update_is_surfaced() {
        let rooms = vec![RoomSummary {
            room_id: "r-1".into(),
            room_name: "open room".into(),
            host_nickname: "Ben".into(),
            player_count: 1,
        }];
        let (transport, _ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(Frame::new(
                protocol::QUEUE_LOBBY_ROOMS,
                serde_json::to_string(&rooms).unwrap(),
            ))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let event = events.recv().await.unwrap();
        match event {
            GridlineEvent::DirectoryUpdated { rooms } => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].room_id, "r-1");
            }
            other => panic!("expected DirectoryUpdated, got {other:?}"),
        }
        // The handle mirrors the snapshot.
        assert_eq!(client.directory().unwrap().len(), 1);

        client.shutdown().await;
        // Stale directory is not served after disconnect.
        assert!(client.directory().is_none());
    }

    // ── Room entry ──────────────────────────────────────────────────

    #[tokio::test]
    async fn room_created_subscribes_topic_and_emits_entered() {
        let (transport, ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(room_created_frame("r-1"))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let event = events.recv().await.unwrap();
        match event {
            GridlineEvent::RoomEntered { state } => assert_eq!(state.room_id, "r-1"),
            other => panic!("expected RoomEntered, got {other:?}"),
        }
        assert_eq!(client.current_room_id().as_deref(), Some("r-1"));
        assert!(ops
            .lock()
            .unwrap()
            .contains(&Op::Subscribe("/topic/room/r-1".into())));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn switching_rooms_unsubscribes_previous_topic() {
        let (transport, ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(room_created_frame("r-1"))),
            Some(Ok(Frame::new(
                protocol::QUEUE_ROOM_JOINED,
                waiting_room_json("r-2", &[("s-1", "Ann", PlayerRole::Guest)]),
            ))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered r-1
        let _ = events.recv().await; // RoomEntered r-2

        {
            let ops = ops.lock().unwrap();
            let unsub = ops
                .iter()
                .position(|op| *op == Op::Unsubscribe("/topic/room/r-1".into()))
                .unwrap();
            let sub2 = ops
                .iter()
                .position(|op| *op == Op::Subscribe("/topic/room/r-2".into()))
                .unwrap();
            assert!(unsub < sub2, "old topic must be dropped before the new one");
        }
        assert_eq!(client.current_room_id().as_deref(), Some("r-2"));

        client.shutdown().await;
    }

    // ── Actions ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_room_defaults_blank_name() {
        let (transport, ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        client.create_room("   ").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let ops = ops.lock().unwrap();
            let body = ops
                .iter()
                .find_map(|op| match op {
                    Op::Publish(dest, body) if dest == protocol::DEST_ROOM_CREATE => Some(body),
                    _ => None,
                })
                .unwrap();
            let req: CreateRoomRequest = serde_json::from_str(body).unwrap();
            assert_eq!(req.room_name, "Ann님의 방");
            assert_eq!(req.nickname, "Ann");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn oversized_room_name_is_rejected_without_traffic() {
        let (transport, ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let result = client.create_room(&"x".repeat(51));
        assert!(matches!(result, Err(GridlineError::RoomNameTooLong { .. })));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!ops
            .lock()
            .unwrap()
            .iter()
            .any(|op| matches!(op, Op::Publish(dest, _) if dest == protocol::DEST_ROOM_CREATE)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_room_sends_identical_shape_for_code_entry() {
        let (transport, ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        client.join_room("r-77").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let ops = ops.lock().unwrap();
            let body = ops
                .iter()
                .find_map(|op| match op {
                    Op::Publish(dest, body) if dest == protocol::DEST_ROOM_JOIN => Some(body),
                    _ => None,
                })
                .unwrap();
            let req: JoinRoomRequest = serde_json::from_str(body).unwrap();
            assert_eq!(req.room_id, "r-77");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn move_is_gated_by_local_legality() {
        // Two players, playing, opponent's turn.
        let mut state: RoomState = serde_json::from_str(&waiting_room_json(
            "r-1",
            &[
                ("s-1", "Ann", PlayerRole::Host),
                ("s-2", "Ben", PlayerRole::Guest),
            ],
        ))
        .unwrap();
        state.game_state = GamePhase::Playing;
        state.game = Some(GameSnapshot {
            board: [None; 9],
            player_x_session_id: "s-1".into(),
            player_o_session_id: "s-2".into(),
            current_player_session_id: Some("s-2".into()),
            winner_session_id: None,
            game_over: false,
        });

        let (transport, ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(Frame::new(
                protocol::QUEUE_ROOM_CREATED,
                serde_json::to_string(&state).unwrap(),
            ))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered

        assert!(matches!(
            client.make_move(4),
            Err(GridlineError::NotYourTurn)
        ));
        assert!(matches!(
            client.make_move(9),
            Err(GridlineError::InvalidCellIndex { index: 9 })
        ));
        assert!(!ops
            .lock()
            .unwrap()
            .iter()
            .any(|op| matches!(op, Op::Publish(dest, _) if dest == "/app/room/r-1")));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn legal_move_publishes_to_room_action_channel() {
        let mut state: RoomState = serde_json::from_str(&waiting_room_json(
            "r-1",
            &[
                ("s-1", "Ann", PlayerRole::Host),
                ("s-2", "Ben", PlayerRole::Guest),
            ],
        ))
        .unwrap();
        state.game_state = GamePhase::Playing;
        state.game = Some(GameSnapshot {
            board: [None; 9],
            player_x_session_id: "s-1".into(),
            player_o_session_id: "s-2".into(),
            current_player_session_id: Some("s-1".into()),
            winner_session_id: None,
            game_over: false,
        });

        let (transport, ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(Frame::new(
                protocol::QUEUE_ROOM_CREATED,
                serde_json::to_string(&state).unwrap(),
            ))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered

        client.make_move(4).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let ops = ops.lock().unwrap();
            let body = ops
                .iter()
                .find_map(|op| match op {
                    Op::Publish(dest, body) if dest == "/app/room/r-1" => Some(body),
                    _ => None,
                })
                .unwrap();
            let action: ActionMessage = serde_json::from_str(body).unwrap();
            assert_eq!(action.kind, EventKind::Move);
            assert_eq!(action.mv.unwrap().index, 4);
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn ready_toggle_alternates_ready_and_unready() {
        let (transport, ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(room_created_frame("r-1"))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered

        client.toggle_ready().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.is_ready_hint());
        client.toggle_ready().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!client.is_ready_hint());

        {
            let ops = ops.lock().unwrap();
            let kinds: Vec<EventKind> = ops
                .iter()
                .filter_map(|op| match op {
                    Op::Publish(dest, body) if dest == "/app/room/r-1" => {
                        serde_json::from_str::<ActionMessage>(body).ok().map(|a| a.kind)
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(kinds, vec![EventKind::Ready, EventKind::Unready]);
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn ready_toggle_while_disconnected_is_silently_dropped() {
        let (transport, _ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        client.shutdown().await;

        // Dropped, not an error.
        assert!(client.toggle_ready().is_ok());
    }

    #[tokio::test]
    async fn chat_validation_rejects_before_send() {
        let (transport, _ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(room_created_frame("r-1"))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered

        assert!(matches!(
            client.send_chat("  "),
            Err(GridlineError::EmptyChatMessage)
        ));
        assert!(matches!(
            client.send_chat(&"x".repeat(256)),
            Err(GridlineError::ChatMessageTooLong { len: 256 })
        ));
        assert!(client.send_chat("hello").is_ok());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn kick_requires_eligibility() {
        // Host alone: not eligible.
        let (transport, _ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(room_created_frame("r-1"))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered
        assert!(matches!(
            client.kick_opponent(),
            Err(GridlineError::KickNotAllowed)
        ));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn eligible_kick_targets_the_other_player() {
        let (transport, ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(Frame::new(
                protocol::QUEUE_ROOM_CREATED,
                waiting_room_json(
                    "r-1",
                    &[
                        ("s-1", "Ann", PlayerRole::Host),
                        ("s-2", "Ben", PlayerRole::Guest),
                    ],
                ),
            ))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered

        client.kick_opponent().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let ops = ops.lock().unwrap();
            let body = ops
                .iter()
                .find_map(|op| match op {
                    Op::Publish(dest, body) if dest == "/app/room/r-1" => Some(body),
                    _ => None,
                })
                .unwrap();
            let action: ActionMessage = serde_json::from_str(body).unwrap();
            assert_eq!(action.kind, EventKind::Kick);
            assert_eq!(action.kick_target_session_id.as_deref(), Some("s-2"));
        }

        client.shutdown().await;
    }

    // ── Broadcast handling ──────────────────────────────────────────

    #[tokio::test]
    async fn forced_exit_unsubscribes_and_requests_directory() {
        let leave = RoomEvent {
            kind: EventKind::Leave,
            sender: Some("SYSTEM".into()),
            content: Some("the host left the room".into()),
            sender_role: None,
            room_state: None,
        };
        let (transport, ops, _closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-2"))),
            Some(Ok(room_created_frame("r-1"))),
            Some(Ok(broadcast_frame("r-1", &leave))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ben")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered
        let event = events.recv().await.unwrap();
        match event {
            GridlineEvent::ForcedRoomExit { reason } => {
                assert_eq!(reason, "the host left the room");
            }
            other => panic!("expected ForcedRoomExit, got {other:?}"),
        }
        assert!(client.current_room_id().is_none());

        {
            let ops = ops.lock().unwrap();
            assert!(ops.contains(&Op::Unsubscribe("/topic/room/r-1".into())));
            // Two refreshes: the post-handshake one plus the forced-exit one.
            let refreshes = ops
                .iter()
                .filter(|op| {
                    matches!(op, Op::Publish(dest, _) if dest == protocol::DEST_LOBBY_ROOMS)
                })
                .count();
            assert_eq!(refreshes, 2);
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnected_is_emitted_on_transport_error() {
        let (transport, _ops, _closed) = MockTransport::new(vec![Some(Err(
            GridlineError::TransportReceive("boom".into()),
        ))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        match event {
            GridlineEvent::Disconnected { reason } => {
                assert!(reason.unwrap().contains("boom"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(!client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnected_on_clean_transport_close() {
        let (transport, _ops, _closed) =
            MockTransport::new(vec![Some(Ok(session_frame("s-1"))), None]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlineEvent::Disconnected { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_transport_and_rejects_commands() {
        let (transport, _ops, closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        client.shutdown().await;

        assert!(closed.load(Ordering::Relaxed));
        assert!(matches!(
            client.refresh_directory(),
            Err(GridlineError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn leave_room_disconnects_entirely() {
        let (transport, _ops, closed) = MockTransport::new(vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(room_created_frame("r-1"))),
        ]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let _ = events.recv().await; // RoomEntered

        client.leave_room().await;
        assert!(!client.is_connected());
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn config_defaults_and_builders() {
        let config = GridlineConfig::new("Ann");
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));

        let config = GridlineConfig::new("Ann")
            .with_event_channel_capacity(0)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        let first = events.recv().await.unwrap();
        assert!(
            matches!(first, GridlineEvent::Connected),
            "expected Connected as first event, got {first:?}"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _ops, _closed) = MockTransport::new(vec![Some(Ok(session_frame("s-1")))]);
        let (mut client, mut events) =
            GridlineClient::start(transport, GridlineConfig::new("Ann")).unwrap();

        drain_until_session(&mut events).await;
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("GridlineClient"));
        assert!(debug_str.contains("connected"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn event_channel_backpressure_does_not_block() {
        // More chat broadcasts than the event channel can hold.
        let mut incoming = vec![
            Some(Ok(session_frame("s-1"))),
            Some(Ok(room_created_frame("r-1"))),
        ];
        let chat = RoomEvent {
            kind: EventKind::Chat,
            sender: Some("Ben".into()),
            content: Some("spam".into()),
            sender_role: Some(PlayerRole::Guest),
            room_state: None,
        };
        for _ in 0..20 {
            incoming.push(Some(Ok(broadcast_frame("r-1", &chat))));
        }
        incoming.push(None);

        let (transport, _ops, _closed) = MockTransport::new(incoming);
        let config = GridlineConfig::new("Ann").with_event_channel_capacity(1);
        let (mut client, mut events) = GridlineClient::start(transport, config).unwrap();

        // Let the channel fill up and events get dropped.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        while let Some(_event) = events.recv().await {
            count += 1;
        }
        // At minimum Connected (first try_send) and Disconnected (always
        // delivered via blocking send); the rest may be dropped.
        assert!(count >= 2, "expected at least 2 events, got {count}");
        assert!(count < 23, "expected backpressure to drop events, got {count}");

        client.shutdown().await;
    }
}
