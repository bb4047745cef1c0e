//! In-process connection with a scriptable remote peer.
//!
//! Nothing is serialized onto a socket: sent payloads are recorded in the
//! handle's outbox and the [`MemoryPeer`] plays the remote side, injecting
//! messages, errors and closes into the listener. The calling thread of a
//! peer method acts as the handle's reader context.
//!
//! Meant for tests and local experiments. The peer keeps only the most
//! recent [`RETAINED`] handles; older ones are still counted.
//!
//! ```text
//!  MemoryConnector::pair() ──▶ (connector, peer)
//!
//!  engine ──send()──▶ outbox ──▶ peer.latest().sent()
//!  peer.latest().deliver(payload) ──▶ listener.on_message()
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::Mutex;

use super::{
    CLOSE_ABNORMAL, Connection, ConnectionListener, ConnectionState, Connector, Payload,
    truncate_close_reason,
};
use crate::error::ConnectionError;

const POLL: Duration = Duration::from_millis(2);

/// Handles a [`MemoryPeer`] keeps reachable.
pub const RETAINED: usize = 64;

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL);
    }
}

// ───────────────────────────────────────────────────────────────
// Hub shared by connector and peer
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Hub {
    handles: Mutex<Handles>,
    refuse: AtomicBool,
}

#[derive(Default)]
struct Handles {
    recent: VecDeque<Arc<MemoryConnection>>,
    created: usize,
}

impl Handles {
    fn push(&mut self, conn: Arc<MemoryConnection>) {
        self.created += 1;
        self.recent.push_back(conn);
        if self.recent.len() > RETAINED {
            self.recent.pop_front();
        }
    }

    fn get(&self, index: usize) -> Option<Arc<MemoryConnection>> {
        let first = self.created - self.recent.len();
        index
            .checked_sub(first)
            .and_then(|i| self.recent.get(i))
            .cloned()
    }
}

/// [`Connector`] handing out in-process connections.
#[derive(Clone)]
pub struct MemoryConnector {
    hub: Arc<Hub>,
}

/// Remote side of every connection a [`MemoryConnector`] creates.
#[derive(Clone)]
pub struct MemoryPeer {
    hub: Arc<Hub>,
}

impl MemoryConnector {
    pub fn pair() -> (Self, MemoryPeer) {
        let hub = Arc::new(Hub::default());
        (
            Self {
                hub: Arc::clone(&hub),
            },
            MemoryPeer { hub },
        )
    }
}

impl Connector for MemoryConnector {
    fn create(&self, listener: Arc<dyn ConnectionListener>) -> Arc<dyn Connection> {
        let conn = Arc::new(MemoryConnection {
            listener,
            state: Mutex::new(ConnectionState::Created),
            outbox: Mutex::new(Vec::new()),
            close_emitted: AtomicBool::new(false),
            local_close: Mutex::new(None),
            refuse: self.hub.refuse.load(Ordering::Acquire),
        });
        self.hub.handles.lock().push(Arc::clone(&conn));
        conn
    }
}

impl MemoryPeer {
    /// Make subsequent `connect()` calls fail as if the remote were down.
    pub fn refuse_connections(&self, refuse: bool) {
        self.hub.refuse.store(refuse, Ordering::Release);
    }

    /// Handles created so far (one per `Connector::create`).
    pub fn connection_count(&self) -> usize {
        self.hub.handles.lock().created
    }

    /// Handle number `index` in creation order, unless it has aged out.
    pub fn connection(&self, index: usize) -> Option<Arc<MemoryConnection>> {
        self.hub.handles.lock().get(index)
    }

    pub fn latest(&self) -> Option<Arc<MemoryConnection>> {
        self.hub.handles.lock().recent.back().cloned()
    }

    pub fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.connection_count() >= count)
    }
}

// ───────────────────────────────────────────────────────────────
// MemoryConnection
// ───────────────────────────────────────────────────────────────

/// One in-process connection handle.
pub struct MemoryConnection {
    listener: Arc<dyn ConnectionListener>,
    state: Mutex<ConnectionState>,
    outbox: Mutex<Vec<Payload>>,
    close_emitted: AtomicBool,
    local_close: Mutex<Option<(u16, String)>>,
    refuse: bool,
}

impl MemoryConnection {
    /// Everything sent through this handle, in order.
    pub fn sent(&self) -> Vec<Payload> {
        self.outbox.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.outbox.lock().len()
    }

    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.sent_count() >= count)
    }

    /// Code and reason of a locally initiated close, if any.
    pub fn closed_with(&self) -> Option<(u16, String)> {
        self.local_close.lock().clone()
    }

    /// Remote sends a message.
    pub fn deliver(&self, payload: Payload) {
        if self.state() == ConnectionState::Open {
            self.listener.on_message(payload);
        }
    }

    /// Remote reports a transport error.
    pub fn remote_error(&self, info: &str) {
        self.listener.on_error(info.to_owned());
    }

    /// Remote closes (or the link drops, with `code` 1006).
    pub fn remote_close(&self, code: u16, reason: &str) {
        *self.state.lock() = ConnectionState::Closed;
        self.emit_close(code, reason.to_owned());
    }

    fn emit_close(&self, code: u16, reason: String) {
        if !self.close_emitted.swap(true, Ordering::AcqRel) {
            self.listener.on_close(code, reason);
        }
    }
}

impl Connection for MemoryConnection {
    fn connect(&self) -> Result<(), ConnectionError> {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Created {
                return Err(ConnectionError::InvalidState(*state));
            }
            *state = if self.refuse {
                ConnectionState::Closed
            } else {
                ConnectionState::Open
            };
        }

        if self.refuse {
            self.listener.on_error("connection refused".into());
            self.emit_close(CLOSE_ABNORMAL, String::new());
            return Err(ConnectionError::Handshake("connection refused".into()));
        }
        self.listener.on_open();
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Open {
                return;
            }
            *state = ConnectionState::Closing;
        }
        let reason = truncate_close_reason(reason).as_str().to_owned();
        debug!("memory: close {} '{}'", code, reason);
        *self.local_close.lock() = Some((code, reason.clone()));

        // The peer echoes the close frame immediately.
        *self.state.lock() = ConnectionState::Closed;
        self.emit_close(code, reason);
    }

    fn send(&self, payload: Payload) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Open {
            return Err(ConnectionError::NotOpen);
        }
        self.outbox.lock().push(payload);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}
