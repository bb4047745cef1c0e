//! Table-driven protocol state machine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  TRANSITIONS                                               │
//! │  ┌──────────────┬─────────────────┬─────────────┬────────┐ │
//! │  │ from         │ trigger         │ action      │ next   │ │
//! │  ├──────────────┼─────────────────┼─────────────┼────────┤ │
//! │  │ Disconnected │ Opened          │ Announce    │ Annc.  │ │
//! │  │ Announced    │ Configuration   │ Configure   │ Conf.  │ │
//! │  │ Ready        │ Label           │ Stimulate   │ Ready  │ │
//! │  │ *            │ Closed          │ Reconnect   │ Disc.  │ │
//! │  │ ...          │ ...             │ ...         │ ...    │ │
//! │  └──────────────┴─────────────────┴─────────────┴────────┘ │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`step`] is a pure lookup: it never touches a connection or a handler.
//! The engine feeds it one trigger at a time from the inbound worker and
//! performs the returned [`Action`]. A pair with no row is a [`Violation`].

pub mod states;

use core::fmt;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Protocol state of one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AdapterState {
    Disconnected = 0,
    /// Transient: only observable inside the task that handles `Opened`.
    Connected = 1,
    Announced = 2,
    Configured = 3,
    Ready = 4,
    Error = 5,
}

impl AdapterState {
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Disconnected,
        Self::Connected,
        Self::Announced,
        Self::Configured,
        Self::Ready,
        Self::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::Announced => "Announced",
            Self::Configured => "Configured",
            Self::Ready => "Ready",
            Self::Error => "Error",
        }
    }

    /// Violations in these states are logged only, never answered.
    pub fn is_quiescent(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// Position on the happy path; `None` for `Error`.
    pub fn progress(self) -> Option<u8> {
        match self {
            Self::Error => None,
            other => Some(other as u8),
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Triggers and actions
// ---------------------------------------------------------------------------

/// Everything that can drive the machine. Payloads travel separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// `Engine::start()` or an automatic reconnect.
    Start,
    /// Control connection opened.
    Opened,
    /// Control connection closed (any code).
    Closed,
    /// Control connection reported a transport error.
    TransportError,
    /// Inbound Configuration envelope.
    Configuration,
    /// Inbound Label envelope.
    Label,
    /// Inbound Reset envelope.
    Reset,
    /// Inbound Error envelope.
    ErrorReceived,
    /// Inbound Announcement envelope (adapter-to-plane only).
    AnnouncementReceived,
    /// Inbound Ready envelope (adapter-to-plane only).
    ReadyReceived,
    /// Inbound payload that does not decode.
    Malformed,
    /// Handler called `send_ready`.
    HandlerReady,
    /// Handler called `send_response`.
    HandlerResponse,
    /// Handler or engine called `send_error`.
    SendError,
}

/// Work the engine performs for a matched row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Create a control connection and connect it.
    OpenControl,
    /// Pass through `Connected`, send the Announcement.
    Announce,
    /// Hand the configuration to the handler and start it.
    Configure,
    /// Send a Ready envelope.
    EmitReady,
    /// Stimulate the handler, echo the label.
    Stimulate,
    /// Reset the handler.
    ResetHandler,
    /// Send the handler's response label.
    EmitResponse,
    /// Stop the handler, drain the queues, start again.
    Reconnect,
    /// Close the control connection normally.
    CloseControl,
    /// Send an Error envelope, then close normally.
    SendError,
}

/// A matched row: what to do and where to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub next: AdapterState,
}

/// A (state, trigger) pair with no row in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub state: AdapterState,
    pub trigger: Trigger,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected {:?} in state {}", self.trigger, self.state)
    }
}

impl std::error::Error for Violation {}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Look up the row for `(state, trigger)`. First match wins.
pub fn step(state: AdapterState, trigger: Trigger) -> Result<Step, Violation> {
    states::TRANSITIONS
        .iter()
        .find(|row| row.trigger == trigger && row.from.matches(state))
        .map(|row| Step {
            action: row.action,
            next: row.next,
        })
        .ok_or(Violation { state, trigger })
}
