//! Callback handle given to a [`Handler`](crate::app::ports::Handler).

use std::fmt;
use std::sync::Weak;

use log::debug;

use super::{Event, Inner};
use crate::protocol::{Label, LabelMessage};

/// Lets a handler report back to the engine.
///
/// Bound to the session in which the handler was started: after a
/// reconnect, calls on an old handle are dropped. Every call only queues
/// work and returns immediately.
#[derive(Clone)]
pub struct AdapterHandle {
    inner: Weak<Inner>,
    session: u64,
}

impl AdapterHandle {
    pub(super) fn new(inner: Weak<Inner>, session: u64) -> Self {
        Self { inner, session }
    }

    /// Session this handle belongs to.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// The SUT is ready for stimuli (after start or reset).
    pub fn send_ready(&self) {
        self.route(Event::HandlerReady);
    }

    /// The SUT produced `label`. `physical` is the raw message it was
    /// decoded from; `timestamp_ns` is when it was observed.
    pub fn send_response(&self, label: Label, physical: Option<Vec<u8>>, timestamp_ns: u64) {
        let label = Label {
            physical_label: physical.or(label.physical_label),
            ..label
        };
        self.route(Event::HandlerResponse(LabelMessage {
            label,
            timestamp_ns,
            correlation_id: None,
        }));
    }

    /// Report a SUT failure; the engine answers with an Error envelope and
    /// closes the session.
    pub fn send_error(&self, message: impl Into<String>) {
        self.route(Event::SendError(message.into()));
    }

    fn route(&self, event: Event) {
        match self.inner.upgrade() {
            Some(inner) => inner.submit(self.session, event),
            None => debug!("adapter: engine dropped, callback ignored"),
        }
    }
}

impl fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
