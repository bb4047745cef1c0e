//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each engine event through the `log`
//! facade. Whatever logger the binary installs decides where it ends up.

use log::{debug, info, warn};

use crate::app::events::AdapterEvent;
use crate::app::ports::EventSink;
use crate::connection::CLOSE_ABNORMAL;

/// Adapter that logs every [`AdapterEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AdapterEvent) {
        match event {
            AdapterEvent::Connecting { session } => {
                info!("SESSION | #{} connecting", session);
            }
            AdapterEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AdapterEvent::EnvelopeSent(kind) => {
                debug!("SEND | {:?}", kind);
            }
            AdapterEvent::EnvelopeReceived(kind) => {
                debug!("RECV | {:?}", kind);
            }
            AdapterEvent::ProtocolViolation(v) => {
                warn!("VIOLATION | {}", v);
            }
            AdapterEvent::ConnectionClosed { code, reason } if *code == CLOSE_ABNORMAL => {
                warn!("CLOSE | abnormal ({}) '{}'", code, reason);
            }
            AdapterEvent::ConnectionClosed { code, reason } => {
                info!("CLOSE | {} '{}'", code, reason);
            }
            AdapterEvent::Reconnecting { session } => {
                info!("SESSION | #{} ended, reconnecting", session);
            }
            AdapterEvent::Shutdown => {
                info!("SHUTDOWN | adapter stopped");
            }
        }
    }
}
