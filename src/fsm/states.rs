//! The transition table.
//!
//! ```text
//!  DISCONNECTED ──[Opened]──▶ (CONNECTED) ──▶ ANNOUNCED
//!       ▲                                         │
//!       │                                 [Configuration]
//!       │                                         ▼
//!       │                                    CONFIGURED
//!       │                                         │
//!       │                                  [HandlerReady]
//!       │                                         ▼
//!       │                 Label / Reset / ─▶   READY ◀─┐
//!       │                 HandlerReady /          └────┘
//!       │                 HandlerResponse
//!       │
//!  any ─┴─[Closed]──▶ DISCONNECTED (reconnect)
//!  any connected ──[ErrorReceived / SendError / TransportError]──▶ ERROR
//! ```
//!
//! Rows are searched in order; the first match wins.

use super::{Action, AdapterState, Trigger};
use AdapterState::{Announced, Configured, Disconnected, Ready};

/// Which states a row applies to.
#[derive(Debug, Clone, Copy)]
pub enum Origin {
    Only(AdapterState),
    Any,
    /// Every state except `Disconnected`.
    Connected,
}

impl Origin {
    pub fn matches(self, state: AdapterState) -> bool {
        match self {
            Self::Only(s) => s == state,
            Self::Any => true,
            Self::Connected => state != AdapterState::Disconnected,
        }
    }
}

/// One row of the table.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: Origin,
    pub trigger: Trigger,
    pub action: Action,
    pub next: AdapterState,
}

const fn row(from: Origin, trigger: Trigger, action: Action, next: AdapterState) -> Transition {
    Transition {
        from,
        trigger,
        action,
        next,
    }
}

pub static TRANSITIONS: &[Transition] = &[
    // ── Lifecycle ─────────────────────────────────────────────
    row(Origin::Only(Disconnected), Trigger::Start, Action::OpenControl, Disconnected),
    row(Origin::Only(Disconnected), Trigger::Opened, Action::Announce, Announced),
    row(Origin::Any, Trigger::Closed, Action::Reconnect, Disconnected),
    // ── Happy path ────────────────────────────────────────────
    row(Origin::Only(Announced), Trigger::Configuration, Action::Configure, Configured),
    row(Origin::Only(Configured), Trigger::HandlerReady, Action::EmitReady, Ready),
    // ── Ready loop ────────────────────────────────────────────
    row(Origin::Only(Ready), Trigger::HandlerReady, Action::EmitReady, Ready),
    row(Origin::Only(Ready), Trigger::Label, Action::Stimulate, Ready),
    row(Origin::Only(Ready), Trigger::Reset, Action::ResetHandler, Ready),
    row(Origin::Only(Ready), Trigger::HandlerResponse, Action::EmitResponse, Ready),
    // ── Failure ───────────────────────────────────────────────
    row(Origin::Connected, Trigger::ErrorReceived, Action::CloseControl, AdapterState::Error),
    row(Origin::Connected, Trigger::SendError, Action::SendError, AdapterState::Error),
    row(Origin::Connected, Trigger::TransportError, Action::SendError, AdapterState::Error),
];
