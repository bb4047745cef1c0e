//! Application boundary of the adapter.
//!
//! The protocol engine talks to the SUT and to observers only through the
//! **port traits** in [`ports`]; what it reports goes out as [`events`].

pub mod events;
pub mod ports;
