//! Message-oriented connection abstraction.
//!
//! One capability surface serves both endpoints: the control-plane
//! connection owned by the engine and the device connection owned by a
//! handler. Each handle owns one transport and reports lifecycle and
//! traffic to a [`ConnectionListener`] from its own reader context.
//!
//! ```text
//!   Connector::create(listener) ──▶ Connection handle
//!
//!   Created ──connect()──▶ Open ──close()──▶ Closing ──▶ Closed
//!                            └──── remote close / error ─────┘
//!
//!   reader thread ──▶ on_open / on_message / on_error / on_close
//! ```
//!
//! Concrete implementations:
//! - [`websocket`]: tungstenite over TCP (optionally TLS)
//! - [`memory`]: in-process, with a scriptable peer for tests

pub mod memory;
pub mod websocket;

use std::sync::Arc;

use crate::error::ConnectionError;

// ───────────────────────────────────────────────────────────────
// Close codes
// ───────────────────────────────────────────────────────────────

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame (remote unreachable).
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Control frames carry at most 125 payload bytes, two of which are the code.
pub const MAX_CLOSE_REASON: usize = 123;

const TRUNCATION_MARKER: &str = "...";

/// Fit a close reason into a control frame.
///
/// Reasons longer than [`MAX_CLOSE_REASON`] bytes are cut on a UTF-8
/// boundary and suffixed with `...`; the result never exceeds the limit.
pub fn truncate_close_reason(reason: &str) -> heapless::String<MAX_CLOSE_REASON> {
    let mut out = heapless::String::new();
    if reason.len() <= MAX_CLOSE_REASON {
        let _ = out.push_str(reason);
        return out;
    }

    let mut cut = MAX_CLOSE_REASON - TRUNCATION_MARKER.len();
    while !reason.is_char_boundary(cut) {
        cut -= 1;
    }
    let _ = out.push_str(&reason[..cut]);
    let _ = out.push_str(TRUNCATION_MARKER);
    out
}

// ───────────────────────────────────────────────────────────────
// Payload and state
// ───────────────────────────────────────────────────────────────

/// One transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text content, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Binary(_) => None,
        }
    }
}

/// Lifecycle of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Open,
    Closing,
    Closed,
}

// ───────────────────────────────────────────────────────────────
// Capability traits
// ───────────────────────────────────────────────────────────────

/// Receives lifecycle and traffic events from a connection's reader.
///
/// Implementations must return quickly: they run on the reader context
/// and should only hand work off (e.g. to a task queue).
pub trait ConnectionListener: Send + Sync {
    fn on_open(&self);
    /// Emitted exactly once per handle.
    fn on_close(&self, code: u16, reason: String);
    fn on_message(&self, payload: Payload);
    fn on_error(&self, info: String);
}

/// A single-use handle owning one transport.
pub trait Connection: Send + Sync {
    /// Open the transport. Only valid from [`ConnectionState::Created`].
    ///
    /// Failures are also reported to the listener as `error` followed by
    /// `close(1006)`.
    fn connect(&self) -> Result<(), ConnectionError>;

    /// Begin a close handshake. No-op unless open.
    fn close(&self, code: u16, reason: &str);

    /// Send one message. Only valid while open.
    fn send(&self, payload: Payload) -> Result<(), ConnectionError>;

    fn state(&self) -> ConnectionState;
}

/// Factory producing a fresh handle bound to a listener.
pub trait Connector: Send + Sync {
    fn create(&self, listener: Arc<dyn ConnectionListener>) -> Arc<dyn Connection>;
}
