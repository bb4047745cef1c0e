//! Port traits: the boundary between the protocol engine and the outside world.
//!
//! ```text
//!   SUT handler ──▶ Handler ──▶ Engine ──▶ EventSink ──▶ log / observer
//! ```
//!
//! A [`Handler`] owns the SUT side: it translates labels to the SUT's own
//! vocabulary and reports observations back through the
//! [`AdapterHandle`](crate::engine::AdapterHandle) it receives in
//! [`Handler::start`]. The engine consumes it as a trait object, so the
//! protocol core never knows which SUT it is talking to.
//!
//! ## Threading
//!
//! Every `Handler` method is called from the engine's inbound worker, one
//! at a time. Callbacks on the `AdapterHandle` may come from any thread
//! (typically the handler's device reader) and never block.

use crate::engine::AdapterHandle;
use crate::error::HandlerError;
use crate::protocol::{Configuration, Label};

// ───────────────────────────────────────────────────────────────
// Handler port (SUT-specific translation)
// ───────────────────────────────────────────────────────────────

/// SUT-specific half of an adapter.
pub trait Handler: Send {
    /// Configuration the handler accepts, with its defaults.
    /// Published in the Announcement.
    fn configuration(&self) -> Configuration;

    /// Values chosen by the control plane. Called right before [`start`](Self::start).
    fn set_configuration(&mut self, configuration: Configuration);

    /// Stimuli and responses this handler understands.
    fn supported_labels(&self) -> Vec<Label>;

    /// Connect to the SUT. Call `adapter.send_ready()` once it is usable.
    fn start(&mut self, adapter: AdapterHandle) -> Result<(), HandlerError>;

    /// Disconnect from the SUT. Must be safe to call when not started.
    fn stop(&mut self);

    /// Bring the SUT back to its initial state. Call `send_ready()` again
    /// when done.
    fn reset(&mut self) -> Result<(), HandlerError>;

    /// Inject a stimulus. Returns the physical (SUT-level) bytes sent, if any.
    fn stimulate(&mut self, label: &Label) -> Result<Option<Vec<u8>>, HandlerError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (engine → logging / observation)
// ───────────────────────────────────────────────────────────────

/// The engine emits structured [`AdapterEvent`](super::events::AdapterEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink: Send {
    fn emit(&mut self, event: &super::events::AdapterEvent);
}
