//! testbridge: protocol adapter between a test-orchestration control
//! plane and a system under test.
//!
//! ```text
//!  control plane ◀──ws──▶ Engine ◀──Handler──▶ SUT handler ◀──ws──▶ SUT
//! ```
//!
//! The [`engine`] owns the protocol state machine ([`fsm`]) and two
//! ordered task queues ([`queue`]); everything SUT-specific sits behind
//! the [`app::ports::Handler`] trait.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod fsm;
pub mod protocol;
pub mod queue;

pub use engine::{AdapterHandle, Engine, EngineBuilder};
pub use error::{Error, Result};
