//! WebSocket connection over `tungstenite`.
//!
//! `connect()` performs the blocking opening handshake on the caller's
//! thread, then hands the socket to a dedicated reader thread. The reader
//! holds the socket lock only for one read attempt at a time (20 ms read
//! timeout), so `send()` and `close()` from other threads interleave with
//! it. Ping/pong is answered inside `read()`, independent of the engine.
//!
//! ```text
//!  connect() ── handshake ──▶ spawn "ws-reader"
//!                                  │ on_open
//!                                  ▼
//!                    ┌──▶ lock ─ read() ─ unlock ──┐
//!                    │  Text/Binary ─▶ on_message  │
//!                    │  Close frame ─▶ remember    │
//!                    └─────── WouldBlock ◀─────────┘
//!                                  │ closed / error / deadline
//!                                  ▼
//!                         on_close(code, reason)   (exactly once)
//! ```

use std::borrow::Cow;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, Connection, ConnectionListener, ConnectionState, Connector,
    Payload, truncate_close_reason,
};
use crate::error::ConnectionError;

/// Read timeout of the reader loop; bounds how long a writer waits for the lock.
pub const READ_POLL: Duration = Duration::from_millis(20);

/// Default for how long a close handshake may stay unanswered before the
/// socket is dropped.
pub const CLOSE_DEADLINE: Duration = Duration::from_secs(5);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

// ───────────────────────────────────────────────────────────────
// Connector
// ───────────────────────────────────────────────────────────────

/// Creates WebSocket handles for one endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    token: Option<String>,
    close_deadline: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            close_deadline: CLOSE_DEADLINE,
        }
    }

    /// Send `Authorization: Bearer <token>` on the upgrade request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Override [`CLOSE_DEADLINE`].
    #[must_use]
    pub fn with_close_deadline(mut self, deadline: Duration) -> Self {
        self.close_deadline = deadline;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn create(&self, listener: Arc<dyn ConnectionListener>) -> Arc<dyn Connection> {
        Arc::new(WebSocketConnection {
            url: self.url.clone(),
            token: self.token.clone(),
            shared: Arc::new(Shared {
                listener,
                state: Mutex::new(ConnectionState::Created),
                attempted: AtomicBool::new(false),
                socket: Mutex::new(None),
                closing_since: Mutex::new(None),
                close_deadline: self.close_deadline,
                close_emitted: AtomicBool::new(false),
            }),
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Connection handle
// ───────────────────────────────────────────────────────────────

struct Shared {
    listener: Arc<dyn ConnectionListener>,
    state: Mutex<ConnectionState>,
    attempted: AtomicBool,
    socket: Mutex<Option<Socket>>,
    /// Set when a close handshake starts, from either side.
    closing_since: Mutex<Option<Instant>>,
    close_deadline: Duration,
    close_emitted: AtomicBool,
}

impl Shared {
    fn emit_close(&self, code: u16, reason: String) {
        if self.close_emitted.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("ws: closed {} '{}'", code, reason);
        self.listener.on_close(code, reason);
    }

    fn mark_closing(&self) {
        let mut since = self.closing_since.lock();
        if since.is_none() {
            *since = Some(Instant::now());
        }
    }

    fn close_overdue(&self) -> bool {
        self.closing_since
            .lock()
            .is_some_and(|since| since.elapsed() >= self.close_deadline)
    }
}

/// One single-use WebSocket client connection.
pub struct WebSocketConnection {
    url: String,
    token: Option<String>,
    shared: Arc<Shared>,
}

impl WebSocketConnection {
    /// Report a failed open: `error`, then `close(1006)`.
    fn fail_open(&self, err: ConnectionError) -> ConnectionError {
        *self.shared.state.lock() = ConnectionState::Closed;
        self.shared.listener.on_error(err.to_string());
        self.shared.emit_close(CLOSE_ABNORMAL, String::new());
        err
    }

    fn handshake(&self) -> Result<Socket, ConnectionError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidEndpoint(e.to_string()))?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ConnectionError::InvalidEndpoint(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, response) = tungstenite::connect(request)
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
        debug!("ws: {} upgraded ({})", self.url, response.status());

        set_read_timeout(&socket, READ_POLL)
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        Ok(socket)
    }
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        #[cfg(feature = "tls")]
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

impl Connection for WebSocketConnection {
    fn connect(&self) -> Result<(), ConnectionError> {
        {
            let state = self.shared.state.lock();
            if *state != ConnectionState::Created || self.shared.attempted.swap(true, Ordering::AcqRel)
            {
                return Err(ConnectionError::InvalidState(*state));
            }
        }

        info!("ws: connecting to {}", self.url);
        let socket = self.handshake().map_err(|e| self.fail_open(e))?;
        *self.shared.socket.lock() = Some(socket);
        *self.shared.state.lock() = ConnectionState::Open;

        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("ws-reader".into())
            .spawn(move || run_reader(&shared))
            .map_err(|e| {
                self.shared.socket.lock().take();
                self.fail_open(ConnectionError::Transport(e.to_string()))
            })?;
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        {
            let mut state = self.shared.state.lock();
            if *state != ConnectionState::Open {
                return;
            }
            *state = ConnectionState::Closing;
        }
        self.shared.mark_closing();

        let reason = truncate_close_reason(reason);
        debug!("ws: closing {} '{}'", code, reason);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.as_str().to_owned()),
        };
        if let Some(socket) = self.shared.socket.lock().as_mut() {
            match socket.close(Some(frame)) {
                Ok(()) => {}
                // Flushed by the reader's next read().
                Err(tungstenite::Error::Io(e)) if is_timeout(e.kind()) => {}
                Err(e) => debug!("ws: close frame not sent: {}", e),
            }
        }
    }

    fn send(&self, payload: Payload) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Open {
            return Err(ConnectionError::NotOpen);
        }
        let message = match payload {
            Payload::Text(text) => Message::Text(text),
            Payload::Binary(bytes) => Message::Binary(bytes),
        };
        let mut guard = self.shared.socket.lock();
        let socket = guard.as_mut().ok_or(ConnectionError::NotOpen)?;
        socket
            .send(message)
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }
}

// ───────────────────────────────────────────────────────────────
// Reader loop
// ───────────────────────────────────────────────────────────────

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn run_reader(shared: &Shared) {
    shared.listener.on_open();

    let mut received_close: Option<(u16, String)> = None;
    loop {
        if shared.close_overdue() {
            warn!(
                "ws: close handshake unanswered after {:?}, dropping socket",
                shared.close_deadline
            );
            break;
        }

        let result = {
            let mut guard = shared.socket.lock();
            match guard.as_mut() {
                Some(socket) => socket.read(),
                None => break,
            }
        };

        match result {
            Ok(Message::Text(text)) => shared.listener.on_message(Payload::Text(text)),
            Ok(Message::Binary(bytes)) => shared.listener.on_message(Payload::Binary(bytes)),
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame.map_or((CLOSE_NO_STATUS, String::new()), |f| {
                    (u16::from(f.code), f.reason.into_owned())
                });
                debug!("ws: close frame {} '{}'", code, reason);
                received_close = Some((code, reason));
                *shared.state.lock() = ConnectionState::Closing;
                shared.mark_closing();
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e)) if is_timeout(e.kind()) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(e) => {
                if received_close.is_none() {
                    shared.listener.on_error(e.to_string());
                }
                break;
            }
        }
    }

    *shared.state.lock() = ConnectionState::Closed;
    shared.socket.lock().take();
    let (code, reason) = received_close.unwrap_or((CLOSE_ABNORMAL, String::new()));
    shared.emit_close(code, reason);
}
