//! STOMP 1.2 over WebSocket transport using `tokio-tungstenite`.
//!
//! This module provides [`StompTransport`], a [`Transport`] implementation
//! that speaks a minimal STOMP 1.2 dialect over a WebSocket connection. Both
//! `ws://` and `wss://` URLs are supported — TLS is handled transparently via
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! The dialect covers exactly what the room protocol needs: `CONNECT` /
//! `CONNECTED` on setup, `SUBSCRIBE` / `UNSUBSCRIBE` with client-generated
//! ids, `SEND` with `content-length`, inbound `MESSAGE` frames, and
//! `DISCONNECT` on close. Heart-beats are negotiated off (`heart-beat:0,0`);
//! receipts and transactions are not used.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-stomp-ws` feature is
//! enabled (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), gridline_client::GridlineError> {
//! use gridline_client::{StompTransport, Transport};
//!
//! let mut transport = StompTransport::connect("ws://localhost:8080/game").await?;
//! transport.subscribe("/user/queue/session").await?;
//! transport.publish("/app/requestSessionId", String::new()).await?;
//!
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("{}: {}", frame.destination, frame.body);
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use uuid::Uuid;

use crate::error::GridlineError;
use crate::transport::{Frame, Transport};

/// Type alias for the underlying WebSocket stream.
///
/// Made public so that callers can construct a [`StompTransport`] from an
/// existing stream via [`StompTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ── STOMP frame codec ───────────────────────────────────────────────

/// A raw STOMP frame: command line, header lines, NUL-terminated body.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StompFrame {
    command: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl StompFrame {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn body(mut self, body: String) -> Self {
        self.body = body;
        self
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the wire form: `COMMAND\nheaders\n\nbody\0`.
    fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(&escape_header(name));
            out.push(':');
            out.push_str(&escape_header(value));
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse a frame from its wire form.
    fn parse(raw: &str) -> Result<Self, GridlineError> {
        let raw = raw.strip_suffix('\0').unwrap_or(raw);
        // The blank line ending the headers may be LF or CRLF delimited;
        // split at whichever comes first so a body containing the other
        // sequence is left intact.
        let lf = raw.find("\n\n").map(|idx| (idx, 2));
        let crlf = raw.find("\r\n\r\n").map(|idx| (idx, 4));
        let split = match (lf, crlf) {
            (Some(l), Some(c)) => Some(if c.0 < l.0 { c } else { l }),
            (l, c) => l.or(c),
        };
        let (head, body) = split
            .and_then(|(idx, sep)| Some((raw.get(..idx)?, raw.get(idx + sep..)?)))
            .ok_or_else(|| GridlineError::TransportReceive("malformed STOMP frame".into()))?;

        let mut lines = head.lines();
        let command = lines
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GridlineError::TransportReceive("empty STOMP command".into()))?
            .trim_end_matches('\r')
            .to_string();

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                GridlineError::TransportReceive(format!("malformed STOMP header: {line}"))
            })?;
            // Repeated headers: first occurrence wins per STOMP 1.2, which
            // `header_value` already implements by scanning front-to-back.
            headers.push((unescape_header(name), unescape_header(value)));
        }

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

/// STOMP 1.2 header escaping: backslash, newline, carriage return, colon.
fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            // Unknown escape: keep it verbatim rather than drop bytes.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Derive the `host` header for `CONNECT` from a WebSocket URL.
fn host_from_url(url: &str) -> String {
    let rest = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority
        .split(':')
        .next()
        .unwrap_or(authority)
        .to_string()
}

// ── Transport ───────────────────────────────────────────────────────

/// A [`Transport`] implementation backed by STOMP 1.2 over WebSocket.
///
/// Subscription ids are generated client-side (UUID v4) and tracked in a
/// destination-to-id map so that [`unsubscribe`](Transport::unsubscribe) can
/// reference the original `SUBSCRIBE`.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe. Dropping the future
/// returned by `recv` before it completes will not consume or lose any
/// frames, making it safe to use inside `tokio::select!`.
#[derive(Debug)]
pub struct StompTransport {
    stream: WsStream,
    subscriptions: HashMap<String, String>,
    closed: bool,
}

impl StompTransport {
    /// Establish a WebSocket connection to the given URL and perform the
    /// STOMP `CONNECT` / `CONNECTED` handshake.
    ///
    /// Supports both `ws://` and `wss://` schemes. TLS is handled
    /// automatically by `tokio-tungstenite` via
    /// [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::Io`] if the URL is invalid or the connection
    /// cannot be established, or [`GridlineError::TransportReceive`] if the
    /// broker rejects the STOMP handshake.
    pub async fn connect(url: &str) -> Result<Self, GridlineError> {
        tracing::debug!(url = %url, "connecting to STOMP endpoint");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            GridlineError::Io(std::io::Error::new(kind, e))
        })?;

        let mut transport = Self {
            stream,
            subscriptions: HashMap::new(),
            closed: false,
        };
        transport.stomp_handshake(&host_from_url(url)).await?;

        tracing::info!(url = %url, "STOMP session established");
        Ok(transport)
    }

    /// Establish a connection with a timeout.
    ///
    /// Behaves identically to [`connect`](Self::connect) but fails with
    /// [`GridlineError::Timeout`] if the connection (including the STOMP
    /// handshake) is not established within the given duration.
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::Timeout`] if the deadline elapses, or any
    /// error that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, GridlineError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| GridlineError::Timeout)?
    }

    /// Create a [`StompTransport`] from an already-established WebSocket
    /// stream, performing the STOMP handshake on it.
    ///
    /// This is useful when you need custom TLS configuration, proxy headers,
    /// or any other connection setup that [`connect`](Self::connect) does not
    /// expose.
    ///
    /// # Errors
    ///
    /// Returns [`GridlineError::TransportReceive`] if the broker rejects the
    /// STOMP handshake.
    pub async fn from_stream(stream: WsStream, host: &str) -> Result<Self, GridlineError> {
        let mut transport = Self {
            stream,
            subscriptions: HashMap::new(),
            closed: false,
        };
        transport.stomp_handshake(host).await?;
        Ok(transport)
    }

    async fn stomp_handshake(&mut self, host: &str) -> Result<(), GridlineError> {
        let connect = StompFrame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        self.send_frame(&connect).await?;

        match self.next_frame().await {
            Some(Ok(frame)) if frame.command == "CONNECTED" => Ok(()),
            Some(Ok(frame)) => Err(GridlineError::TransportReceive(format!(
                "expected CONNECTED, got {}: {}",
                frame.command, frame.body
            ))),
            Some(Err(e)) => Err(e),
            None => Err(GridlineError::TransportClosed),
        }
    }

    async fn send_frame(&mut self, frame: &StompFrame) -> Result<(), GridlineError> {
        if self.closed {
            return Err(GridlineError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.serialize().into()))
            .await
            .map_err(|e| GridlineError::TransportSend(e.to_string()))
    }

    /// Read the next STOMP frame from the stream, skipping WebSocket control
    /// messages and bare heart-beat newlines.
    async fn next_frame(&mut self) -> Option<Result<StompFrame, GridlineError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(GridlineError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => {
                    // A lone EOL is a heart-beat, not a frame.
                    if text.trim_matches(['\n', '\r', '\0']).is_empty() {
                        tracing::debug!("received STOMP heart-beat");
                        continue;
                    }
                    return Some(StompFrame::parse(&text));
                }
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) => {
                    // tungstenite auto-queues a Pong reply; no manual response needed.
                    tracing::debug!("received WebSocket ping");
                }
                Message::Pong(_) => {
                    tracing::debug!("received WebSocket pong (ignored)");
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for exhaustiveness.
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }
}

#[async_trait]
impl Transport for StompTransport {
    async fn subscribe(&mut self, destination: &str) -> Result<(), GridlineError> {
        let id = Uuid::new_v4().to_string();
        let frame = StompFrame::new("SUBSCRIBE")
            .header("id", &id)
            .header("destination", destination);
        self.send_frame(&frame).await?;
        self.subscriptions.insert(destination.to_string(), id);
        Ok(())
    }

    async fn unsubscribe(&mut self, destination: &str) -> Result<(), GridlineError> {
        let Some(id) = self.subscriptions.remove(destination) else {
            tracing::warn!(destination = %destination, "unsubscribe without active subscription");
            return Ok(());
        };
        let frame = StompFrame::new("UNSUBSCRIBE").header("id", &id);
        self.send_frame(&frame).await
    }

    async fn publish(&mut self, destination: &str, body: String) -> Result<(), GridlineError> {
        let frame = StompFrame::new("SEND")
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", &body.len().to_string())
            .body(body);
        self.send_frame(&frame).await
    }

    async fn recv(&mut self) -> Option<Result<Frame, GridlineError>> {
        loop {
            let frame = match self.next_frame().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e)),
            };

            match frame.command.as_str() {
                "MESSAGE" => {
                    // Owned copy: the header borrow must end before the
                    // body is moved out of the frame.
                    let Some(destination) = frame.header_value("destination").map(str::to_string)
                    else {
                        tracing::warn!("MESSAGE frame without destination header, skipping");
                        continue;
                    };
                    return Some(Ok(Frame::new(destination, frame.body)));
                }
                "ERROR" => {
                    let detail = frame
                        .header_value("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| frame.body.clone());
                    return Some(Err(GridlineError::TransportReceive(format!(
                        "broker error: {detail}"
                    ))));
                }
                "RECEIPT" => {
                    tracing::debug!("received STOMP receipt (ignored)");
                }
                other => {
                    tracing::warn!(command = %other, "unexpected STOMP frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), GridlineError> {
        if self.closed {
            return Ok(());
        }
        let disconnect = StompFrame::new("DISCONNECT");
        if let Err(e) = self.send_frame(&disconnect).await {
            tracing::debug!("DISCONNECT frame not delivered: {e}");
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| GridlineError::TransportSend(e.to_string()))
    }
}

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

    // ── Codec ───────────────────────────────────────────────────────

    #[test]
    fn serialize_produces_nul_terminated_frame() {
        let frame = StompFrame::new("SEND")
            .header("destination", "/app/lobby/rooms")
            .body("{}".into());
        assert_eq!(
            frame.serialize(),
            "SEND\ndestination:/app/lobby/rooms\n\n{}\0"
        );
    }

    #[test]
    fn parse_round_trips_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/room/r-1\nsubscription:sub-0\n\n{\"type\":\"CHAT\"}\0";
        let frame = StompFrame::parse(raw).unwrap();
        assert_eq!(frame.command, "MESSAGE");
        assert_eq!(frame.header_value("destination"), Some("/topic/room/r-1"));
        assert_eq!(frame.body, "{\"type\":\"CHAT\"}");
    }

    #[test]
    fn parse_tolerates_carriage_returns() {
        let raw = "CONNECTED\r\nversion:1.2\r\n\r\n\0";
        let frame = StompFrame::parse(raw).unwrap();
        assert_eq!(frame.command, "CONNECTED");
        assert_eq!(frame.header_value("version"), Some("1.2"));
    }

    #[test]
    fn parse_splits_crlf_frame_with_body() {
        let raw = "MESSAGE\r\ndestination:/topic/room/r-1\r\n\r\n{\"type\":\"CHAT\"}\0";
        let frame = StompFrame::parse(raw).unwrap();
        assert_eq!(frame.command, "MESSAGE");
        assert_eq!(frame.header_value("destination"), Some("/topic/room/r-1"));
        assert_eq!(frame.body, "{\"type\":\"CHAT\"}");
    }

    #[test]
    fn lf_frame_body_may_contain_crlf_blank_line() {
        let raw = "MESSAGE\ndestination:/x\n\nline1\r\n\r\nline2\0";
        let frame = StompFrame::parse(raw).unwrap();
        assert_eq!(frame.body, "line1\r\n\r\nline2");
    }

    #[test]
    fn parse_rejects_frame_without_blank_line() {
        assert!(StompFrame::parse("MESSAGE\ndestination:/x\0").is_err());
    }

    #[test]
    fn parse_rejects_header_without_colon() {
        assert!(StompFrame::parse("MESSAGE\nnocolon\n\nbody\0").is_err());
    }

    #[test]
    fn first_header_occurrence_wins() {
        let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frame = StompFrame::parse(raw).unwrap();
        assert_eq!(frame.header_value("foo"), Some("first"));
    }

    #[test]
    fn header_escaping_round_trips() {
        for value in ["plain", "colon:here", "back\\slash", "multi\nline", "cr\rhere"] {
            assert_eq!(unescape_header(&escape_header(value)), value);
        }
    }

    #[test]
    fn unknown_escape_is_kept_verbatim() {
        assert_eq!(unescape_header("a\\qb"), "a\\qb");
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_from_url("ws://localhost:8080/game"), "localhost");
        assert_eq!(host_from_url("wss://game.example.com/ws"), "game.example.com");
        assert_eq!(host_from_url("ws://127.0.0.1:9000"), "127.0.0.1");
    }

    // ── Transport basics ────────────────────────────────────────────

    #[test]
    fn stomp_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<StompTransport>();
    }

    #[test]
    fn stomp_transport_is_debug() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<StompTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let result = StompTransport::connect("not-a-valid-url").await;
        let err = result.unwrap_err();
        assert!(matches!(err, GridlineError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = StompTransport::connect("ws://127.0.0.1:1").await;
        let err = result.unwrap_err();
        assert!(matches!(err, GridlineError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Accept the TCP connection but never answer the WebSocket upgrade,
        // so connect can only finish by timing out.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await
        });

        let result = StompTransport::connect_with_timeout(
            &format!("ws://{addr}"),
            std::time::Duration::from_millis(50),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, GridlineError::Timeout));
    }

    // ── Mock-broker helpers ─────────────────────────────────────────

    use tokio::net::TcpListener;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Start a local WebSocket server that answers the STOMP handshake and
    /// then runs `handler` on the connection.
    async fn start_mock_broker<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            // CONNECT / CONNECTED handshake.
            let msg = ws.next().await.unwrap().unwrap();
            let connect = StompFrame::parse(msg.to_text().unwrap()).unwrap();
            assert_eq!(connect.command, "CONNECT");
            assert_eq!(connect.header_value("accept-version"), Some("1.2"));
            let connected = StompFrame::new("CONNECTED").header("version", "1.2");
            ws.send(Message::Text(connected.serialize().into()))
                .await
                .unwrap();

            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    fn message_frame(destination: &str, body: &str) -> Message {
        let frame = StompFrame::new("MESSAGE")
            .header("destination", destination)
            .header("subscription", "sub-0")
            .body(body.to_string());
        Message::Text(frame.serialize().into())
    }

    // ── Mock-broker tests ───────────────────────────────────────────

    #[tokio::test]
    async fn recv_yields_message_frames() {
        let url = start_mock_broker(|mut ws| async move {
            ws.send(message_frame("/user/queue/session", "session-1"))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame.destination, "/user/queue/session");
        assert_eq!(frame.body, "session-1");

        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_handles_crlf_delimited_broker() {
        let url = start_mock_broker(|mut ws| async move {
            ws.send(Message::Text(
                "MESSAGE\r\ndestination:/user/queue/session\r\n\r\nsession-7\0".into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame.destination, "/user/queue/session");
        assert_eq!(frame.body, "session-7");
    }

    #[tokio::test]
    async fn recv_skips_heartbeats_and_receipts() {
        let url = start_mock_broker(|mut ws| async move {
            ws.send(Message::Text("\n".into())).await.unwrap();
            let receipt = StompFrame::new("RECEIPT").header("receipt-id", "r-0");
            ws.send(Message::Text(receipt.serialize().into()))
                .await
                .unwrap();
            ws.send(message_frame("/topic/room/r-1", "{\"type\":\"CHAT\"}"))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame.destination, "/topic/room/r-1");
    }

    #[tokio::test]
    async fn broker_error_frame_becomes_receive_error() {
        let url = start_mock_broker(|mut ws| async move {
            let error = StompFrame::new("ERROR").header("message", "bad destination");
            ws.send(Message::Text(error.serialize().into()))
                .await
                .unwrap();
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        let err = transport.recv().await.unwrap().unwrap_err();
        match err {
            GridlineError::TransportReceive(detail) => {
                assert!(detail.contains("bad destination"));
            }
            other => panic!("expected TransportReceive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_reuses_id() {
        let url = start_mock_broker(|mut ws| async move {
            let sub = StompFrame::parse(ws.next().await.unwrap().unwrap().to_text().unwrap())
                .unwrap();
            assert_eq!(sub.command, "SUBSCRIBE");
            assert_eq!(sub.header_value("destination"), Some("/topic/room/r-1"));
            let sub_id = sub.header_value("id").unwrap().to_string();

            let unsub = StompFrame::parse(ws.next().await.unwrap().unwrap().to_text().unwrap())
                .unwrap();
            assert_eq!(unsub.command, "UNSUBSCRIBE");
            assert_eq!(unsub.header_value("id"), Some(sub_id.as_str()));

            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        transport.subscribe("/topic/room/r-1").await.unwrap();
        transport.unsubscribe("/topic/room/r-1").await.unwrap();

        // Wait for the server's assertions to run.
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_without_subscription_is_a_no_op() {
        let url = start_mock_broker(|mut ws| async move {
            // No UNSUBSCRIBE should ever arrive; the next frame is SEND.
            let frame = StompFrame::parse(ws.next().await.unwrap().unwrap().to_text().unwrap())
                .unwrap();
            assert_eq!(frame.command, "SEND");
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        transport.unsubscribe("/topic/room/ghost").await.unwrap();
        transport
            .publish("/app/lobby/rooms", String::new())
            .await
            .unwrap();

        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_sets_content_headers() {
        let url = start_mock_broker(|mut ws| async move {
            let send = StompFrame::parse(ws.next().await.unwrap().unwrap().to_text().unwrap())
                .unwrap();
            assert_eq!(send.command, "SEND");
            assert_eq!(send.header_value("destination"), Some("/app/room/join"));
            assert_eq!(send.header_value("content-type"), Some("application/json"));
            assert_eq!(
                send.header_value("content-length"),
                Some(send.body.len().to_string().as_str())
            );
            assert_eq!(send.body, "{\"roomId\":\"r-1\",\"nickname\":\"Ann\"}");
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        transport
            .publish(
                "/app/room/join",
                "{\"roomId\":\"r-1\",\"nickname\":\"Ann\"}".into(),
            )
            .await
            .unwrap();

        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_sends_disconnect() {
        let url = start_mock_broker(|mut ws| async move {
            let frame = StompFrame::parse(ws.next().await.unwrap().unwrap().to_text().unwrap())
                .unwrap();
            assert_eq!(frame.command, "DISCONNECT");
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Second close must also succeed.
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn publish_after_close_returns_transport_closed() {
        let url = start_mock_broker(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = StompTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        let err = transport
            .publish("/app/lobby/rooms", String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GridlineError::TransportClosed));
    }

    #[tokio::test]
    async fn handshake_rejection_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = ws.next().await; // CONNECT
            let error = StompFrame::new("ERROR").header("message", "auth required");
            ws.send(Message::Text(error.serialize().into()))
                .await
                .unwrap();
        });

        let result = StompTransport::connect(&format!("ws://{addr}")).await;
        assert!(matches!(
            result,
            Err(GridlineError::TransportReceive(_))
        ));
    }

    #[tokio::test]
    async fn from_stream_performs_handshake() {
        let url = start_mock_broker(|mut ws| async move {
            ws.send(message_frame("/user/queue/session", "s-9"))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = StompTransport::from_stream(ws_stream, "localhost")
            .await
            .unwrap();

        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame.body, "s-9");
    }
}
