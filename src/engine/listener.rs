//! Control-connection listener: decodes in the reader context and hands
//! everything else to the inbound queue.

use std::sync::Weak;

use log::warn;

use super::{Event, Inner};
use crate::connection::{ConnectionListener, Payload};
use crate::protocol::codec;

pub(super) struct ControlListener {
    inner: Weak<Inner>,
    session: u64,
}

impl ControlListener {
    pub(super) fn new(inner: Weak<Inner>, session: u64) -> Self {
        Self { inner, session }
    }

    fn forward(&self, event: Event) {
        if let Some(inner) = self.inner.upgrade() {
            inner.submit(self.session, event);
        }
    }
}

impl ConnectionListener for ControlListener {
    fn on_open(&self) {
        self.forward(Event::Opened);
    }

    fn on_close(&self, code: u16, reason: String) {
        self.forward(Event::Closed { code, reason });
    }

    fn on_message(&self, payload: Payload) {
        let event = match codec::decode(&payload) {
            Ok(envelope) => Event::Received(envelope),
            Err(e) => {
                warn!("engine: undecodable message ({} bytes): {}", payload.len(), e);
                Event::Malformed(e.to_string())
            }
        };
        self.forward(event);
    }

    fn on_error(&self, info: String) {
        warn!("engine: control transport error: {}", info);
        self.forward(Event::TransportError(info));
    }
}
