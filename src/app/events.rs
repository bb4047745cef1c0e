//! Outbound engine events.
//!
//! The [`Engine`](crate::engine::Engine) emits these through the
//! [`EventSink`](super::ports::EventSink) port.

use crate::fsm::{AdapterState, Violation};
use crate::protocol::EnvelopeKind;

/// Structured events emitted by the protocol engine.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// A new session is connecting to the control plane.
    Connecting { session: u64 },

    /// The state machine moved between states.
    StateChanged { from: AdapterState, to: AdapterState },

    /// An envelope was handed to the control connection.
    EnvelopeSent(EnvelopeKind),

    /// An envelope arrived from the control plane.
    EnvelopeReceived(EnvelopeKind),

    /// A trigger had no row for the current state.
    ProtocolViolation(Violation),

    /// The control connection closed.
    ConnectionClosed { code: u16, reason: String },

    /// A session ended and a new one is starting.
    Reconnecting { session: u64 },

    /// `Engine::shutdown()` completed.
    Shutdown,
}
