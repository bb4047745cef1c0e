//! Protocol engine: drives one adapter session by session.
//!
//! ```text
//!  control reader ──decode──▶ ┌──────────────┐   Handler
//!  handler callbacks ───────▶ │ inbound FIFO │──▶ step(state, trigger)
//!  Engine::start/send_error ─▶ └──────────────┘        │ action
//!                                                      ▼
//!                             ┌───────────────┐   ┌──────────┐
//!  control connection ◀─send──│ outbound FIFO │◀──│ envelope │
//!                             └───────────────┘   └──────────┘
//! ```
//!
//! A *session* is one control connection plus its two queues. Every event
//! is tagged with the session it belongs to; once a session ends its
//! queues are drained and closed, and anything still addressed to it is
//! dropped. [`AdapterState`] is only written from the inbound worker.

mod handle;
mod listener;

pub use handle::AdapterHandle;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::adapters::log_sink::LogEventSink;
use crate::app::events::AdapterEvent;
use crate::app::ports::{EventSink, Handler};
use crate::connection::{CLOSE_GOING_AWAY, CLOSE_NORMAL, Connection, Connector};
use crate::error::Result;
use crate::fsm::{self, Action, AdapterState, Step, Trigger, Violation};
use crate::protocol::{Announcement, Configuration, Envelope, LabelMessage, codec, now_ns};
use crate::queue::TaskQueue;

use listener::ControlListener;

// ───────────────────────────────────────────────────────────────
// Events fed to the inbound queue
// ───────────────────────────────────────────────────────────────

/// An input to the state machine together with its payload.
enum Event {
    Start,
    Opened,
    Closed { code: u16, reason: String },
    TransportError(String),
    Received(Envelope),
    Malformed(String),
    HandlerReady,
    HandlerResponse(LabelMessage),
    SendError(String),
}

impl Event {
    fn trigger(&self) -> Trigger {
        match self {
            Self::Start => Trigger::Start,
            Self::Opened => Trigger::Opened,
            Self::Closed { .. } => Trigger::Closed,
            Self::TransportError(_) => Trigger::TransportError,
            Self::Received(envelope) => match envelope {
                Envelope::Announcement(_) => Trigger::AnnouncementReceived,
                Envelope::Configuration(_) => Trigger::Configuration,
                Envelope::Label(_) => Trigger::Label,
                Envelope::Reset => Trigger::Reset,
                Envelope::Ready => Trigger::ReadyReceived,
                Envelope::Error { .. } => Trigger::ErrorReceived,
            },
            Self::Malformed(_) => Trigger::Malformed,
            Self::HandlerReady => Trigger::HandlerReady,
            Self::HandlerResponse(_) => Trigger::HandlerResponse,
            Self::SendError(_) => Trigger::SendError,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Session {
    id: u64,
    inbound: Arc<TaskQueue>,
    outbound: Arc<TaskQueue>,
    /// Set by `OpenControl`, the first task of the session.
    connection: Option<Arc<dyn Connection>>,
}

// ───────────────────────────────────────────────────────────────
// Engine
// ───────────────────────────────────────────────────────────────

struct Inner {
    name: String,
    connector: Box<dyn Connector>,
    handler: Mutex<Box<dyn Handler>>,
    sink: Mutex<Box<dyn EventSink>>,
    state: Mutex<AdapterState>,
    session: Mutex<Option<Session>>,
    next_session: AtomicU64,
    running: AtomicBool,
    reconnect_delay: Duration,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    name: String,
    connector: Box<dyn Connector>,
    handler: Box<dyn Handler>,
    sink: Box<dyn EventSink>,
    reconnect_delay: Duration,
}

impl EngineBuilder {
    /// Where engine events go. Defaults to [`LogEventSink`].
    #[must_use]
    pub fn sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Fixed pause before each reconnect. Defaults to zero.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            inner: Arc::new(Inner {
                name: self.name,
                connector: self.connector,
                handler: Mutex::new(self.handler),
                sink: Mutex::new(self.sink),
                state: Mutex::new(AdapterState::Disconnected),
                session: Mutex::new(None),
                next_session: AtomicU64::new(0),
                running: AtomicBool::new(false),
                reconnect_delay: self.reconnect_delay,
            }),
        }
    }
}

/// The protocol engine of one adapter.
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn builder(
        name: impl Into<String>,
        connector: impl Connector + 'static,
        handler: impl Handler + 'static,
    ) -> EngineBuilder {
        EngineBuilder {
            name: name.into(),
            connector: Box::new(connector),
            handler: Box::new(handler),
            sink: Box::new(LogEventSink::new()),
            reconnect_delay: Duration::ZERO,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> AdapterState {
        *self.inner.state.lock()
    }

    /// Id of the live session, if one exists.
    pub fn session_id(&self) -> Option<u64> {
        self.inner.session.lock().as_ref().map(|s| s.id)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Connect to the control plane. Reconnects automatically until
    /// [`shutdown`](Self::shutdown).
    pub fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            warn!("engine: '{}' already started", self.inner.name);
            return Ok(());
        }
        info!("engine: starting adapter '{}'", self.inner.name);
        self.inner.begin_session().inspect_err(|_| {
            self.inner.running.store(false, Ordering::Release);
        })
    }

    /// Report a failure to the control plane and close the session.
    pub fn send_error(&self, message: impl Into<String>) {
        if let Some(id) = self.session_id() {
            self.inner.submit(id, Event::SendError(message.into()));
        } else {
            debug!("engine: send_error without a session dropped");
        }
    }

    /// Stop reconnecting, flush pending envelopes, close with 1001 and
    /// stop the handler.
    pub fn shutdown(&self) {
        // `running` flips under the slot lock so no session is installed
        // after this point.
        let session = {
            let mut slot = self.inner.session.lock();
            if !self.inner.running.swap(false, Ordering::AcqRel) {
                return;
            }
            slot.take()
        };
        info!("engine: shutting down '{}'", self.inner.name);

        if let Some(session) = session {
            session.inbound.drain();
            session.outbound.stop();
            if let Some(connection) = &session.connection {
                connection.close(CLOSE_GOING_AWAY, "adapter shutting down");
            }
            session.inbound.stop();
        }
        self.inner.handler.lock().stop();
        self.inner.set_state(AdapterState::Disconnected);
        self.inner.emit(AdapterEvent::Shutdown);
    }
}

// ───────────────────────────────────────────────────────────────
// Inbound processing
// ───────────────────────────────────────────────────────────────

impl Inner {
    fn emit(&self, event: AdapterEvent) {
        self.sink.lock().emit(&event);
    }

    fn set_state(&self, to: AdapterState) {
        let from = std::mem::replace(&mut *self.state.lock(), to);
        if from != to {
            self.emit(AdapterEvent::StateChanged { from, to });
        }
    }

    fn current(&self, id: u64) -> Option<Session> {
        self.session.lock().as_ref().filter(|s| s.id == id).cloned()
    }

    /// Queue `event` on the inbound FIFO of session `id`.
    fn submit(self: &Arc<Self>, id: u64, event: Event) {
        let Some(session) = self.current(id) else {
            debug!("engine: {:?} for stale session {} dropped", event.trigger(), id);
            return;
        };
        let inner = Arc::clone(self);
        if let Err(e) = session.inbound.submit(move || inner.dispatch(id, event)) {
            debug!("engine: session {} inbound: {}", id, e);
        }
    }

    /// Install and start a fresh session. No-op once shut down or while
    /// another session is live.
    fn begin_session(self: &Arc<Self>) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Ok(());
        }
        let id = self.next_session.fetch_add(1, Ordering::AcqRel) + 1;
        let session = Session {
            id,
            inbound: Arc::new(TaskQueue::new(format!("inbound-{id}"))?),
            outbound: Arc::new(TaskQueue::new(format!("outbound-{id}"))?),
            connection: None,
        };
        {
            let mut slot = self.session.lock();
            if !self.running.load(Ordering::Acquire) {
                debug!("engine: session {} abandoned, engine stopped", id);
                return Ok(());
            }
            if let Some(live) = slot.as_ref() {
                debug!("engine: session {} abandoned, session {} is live", id, live.id);
                return Ok(());
            }
            *slot = Some(session);
        }
        self.emit(AdapterEvent::Connecting { session: id });
        self.submit(id, Event::Start);
        Ok(())
    }

    /// Runs on the inbound worker.
    fn dispatch(self: &Arc<Self>, id: u64, event: Event) {
        let Some(session) = self.current(id) else {
            debug!("engine: {:?} for stale session {} dropped", event.trigger(), id);
            return;
        };
        if let Event::Received(envelope) = &event {
            self.emit(AdapterEvent::EnvelopeReceived(envelope.kind()));
        }

        let state = *self.state.lock();
        match fsm::step(state, event.trigger()) {
            Ok(step) => self.perform(&session, step, event),
            Err(violation) => self.on_violation(&session, violation, event),
        }
    }

    fn perform(self: &Arc<Self>, session: &Session, step: Step, event: Event) {
        match (step.action, event) {
            (Action::OpenControl, _) => self.open_control(session),
            (Action::Announce, _) => self.announce(session),
            (Action::Configure, Event::Received(Envelope::Configuration(cfg))) => {
                self.configure(session, cfg);
            }
            (Action::EmitReady, _) => {
                self.send(session, Envelope::Ready);
                self.set_state(step.next);
            }
            (Action::Stimulate, Event::Received(Envelope::Label(msg))) => {
                self.stimulate(session, msg);
            }
            (Action::ResetHandler, _) => {
                if let Err(e) = self.handler.lock().reset() {
                    self.fail(session, format!("reset failed: {e}"));
                }
            }
            (Action::EmitResponse, Event::HandlerResponse(msg)) => {
                self.send(session, Envelope::Label(msg));
            }
            (Action::Reconnect, Event::Closed { code, reason }) => {
                self.reconnect(session, code, reason);
            }
            (Action::CloseControl, Event::Received(Envelope::Error { message })) => {
                warn!("engine: control plane reported error: {}", message);
                self.set_state(step.next);
                self.close_after_pending(session, CLOSE_NORMAL, "error received".into());
            }
            (Action::SendError, Event::SendError(message) | Event::TransportError(message)) => {
                self.fail(session, message);
            }
            (action, event) => {
                error!("engine: {:?} has no payload for {:?}", action, event.trigger());
            }
        }
    }

    fn on_violation(self: &Arc<Self>, session: &Session, violation: Violation, event: Event) {
        self.emit(AdapterEvent::ProtocolViolation(violation));
        if violation.state.is_quiescent() {
            debug!("engine: ignoring {:?} while {}", violation.trigger, violation.state);
            return;
        }
        let message = match event {
            Event::Malformed(detail) => format!("{violation}: {detail}"),
            _ => violation.to_string(),
        };
        self.fail(session, message);
    }

    // ── Actions ───────────────────────────────────────────────

    fn open_control(self: &Arc<Self>, session: &Session) {
        let listener = Arc::new(ControlListener::new(Arc::downgrade(self), session.id));
        let connection = self.connector.create(listener);
        {
            let mut current = self.session.lock();
            match current.as_mut() {
                Some(s) if s.id == session.id => s.connection = Some(Arc::clone(&connection)),
                _ => return,
            }
        }
        // Failures also arrive as error + close(1006) through the listener.
        if let Err(e) = connection.connect() {
            warn!("engine: session {} connect failed: {}", session.id, e);
        }
    }

    fn announce(self: &Arc<Self>, session: &Session) {
        self.set_state(AdapterState::Connected);
        let announcement = {
            let handler = self.handler.lock();
            Announcement {
                name: self.name.clone(),
                labels: handler.supported_labels(),
                configuration: handler.configuration(),
            }
        };
        info!(
            "engine: announcing '{}' with {} label(s)",
            announcement.name,
            announcement.labels.len()
        );
        self.send(session, Envelope::Announcement(announcement));
        self.set_state(AdapterState::Announced);
    }

    fn configure(self: &Arc<Self>, session: &Session, configuration: Configuration) {
        self.set_state(AdapterState::Configured);
        let adapter = AdapterHandle::new(Arc::downgrade(self), session.id);
        let result = {
            let mut handler = self.handler.lock();
            handler.set_configuration(configuration);
            handler.start(adapter)
        };
        if let Err(e) = result {
            self.fail(session, format!("handler start failed: {e}"));
        }
    }

    fn stimulate(self: &Arc<Self>, session: &Session, msg: LabelMessage) {
        let result = self.handler.lock().stimulate(&msg.label);
        match result {
            Ok(physical) => {
                let LabelMessage {
                    mut label,
                    correlation_id,
                    ..
                } = msg;
                if physical.is_some() {
                    label.physical_label = physical;
                }
                let echo = LabelMessage {
                    label,
                    timestamp_ns: now_ns(),
                    correlation_id,
                };
                self.send(session, Envelope::Label(echo));
            }
            Err(e) => self.fail(session, format!("stimulus '{}' failed: {e}", msg.label.name)),
        }
    }

    fn reconnect(self: &Arc<Self>, session: &Session, code: u16, reason: String) {
        self.emit(AdapterEvent::ConnectionClosed { code, reason });

        self.handler.lock().stop();
        self.set_state(AdapterState::Disconnected);
        {
            let mut current = self.session.lock();
            if current.as_ref().is_some_and(|s| s.id == session.id) {
                *current = None;
            }
        }
        session.inbound.drain();
        session.outbound.drain();

        if !self.running.load(Ordering::Acquire) {
            return;
        }
        self.emit(AdapterEvent::Reconnecting {
            session: session.id,
        });
        if !self.reconnect_delay.is_zero() {
            thread::sleep(self.reconnect_delay);
        }
        // `running` is checked again under the slot lock.
        if let Err(e) = self.begin_session() {
            error!("engine: cannot start a new session: {}", e);
        }
    }

    /// Send an Error envelope, then close normally once it is out.
    fn fail(self: &Arc<Self>, session: &Session, message: String) {
        warn!("engine: failing session {}: {}", session.id, message);
        self.set_state(AdapterState::Error);
        self.send(session, Envelope::error(message.clone()));
        self.close_after_pending(session, CLOSE_NORMAL, message);
    }

    // ── Outbound ──────────────────────────────────────────────

    fn send(self: &Arc<Self>, session: &Session, envelope: Envelope) {
        let Some(connection) = session.connection.clone() else {
            warn!("engine: no control connection for {:?}", envelope.kind());
            return;
        };
        let inner = Arc::clone(self);
        let kind = envelope.kind();
        let queued = session.outbound.submit(move || {
            let payload = match codec::encode(&envelope) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("engine: cannot encode {:?}: {}", kind, e);
                    return;
                }
            };
            match connection.send(payload) {
                Ok(()) => inner.emit(AdapterEvent::EnvelopeSent(kind)),
                Err(e) => warn!("engine: {:?} not sent: {}", kind, e),
            }
        });
        if let Err(e) = queued {
            debug!("engine: {:?} not queued: {}", kind, e);
        }
    }

    fn close_after_pending(&self, session: &Session, code: u16, reason: String) {
        let Some(connection) = session.connection.clone() else {
            return;
        };
        if let Err(e) = session
            .outbound
            .submit(move || connection.close(code, &reason))
        {
            debug!("engine: close not queued: {}", e);
        }
    }
}
