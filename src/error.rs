//! Unified error types for the adapter.
//!
//! A single [`Error`] enum that every subsystem converts into, keeping the
//! engine's failure handling uniform: whatever goes wrong ends up as a
//! human-readable message in an Error envelope.

use thiserror::Error;

use crate::connection::ConnectionState;

// ---------------------------------------------------------------------------
// Top-level adapter error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Error)]
pub enum Error {
    /// A task could not be queued.
    #[error("queue: {0}")]
    Queue(#[from] QueueError),
    /// A connection operation failed.
    #[error("connection: {0}")]
    Connection(#[from] ConnectionError),
    /// An envelope could not be encoded or decoded.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// The SUT-specific handler reported a failure.
    #[error("handler: {0}")]
    Handler(#[from] HandlerError),
    /// Configuration is invalid or could not be loaded.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// A worker thread could not be spawned.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Queue errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was drained or stopped; it accepts no more tasks.
    #[error("queue closed")]
    Closed,
    /// The bounded channel is full.
    #[error("queue full")]
    Full,
}

// ---------------------------------------------------------------------------
// Connection errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `connect()` on a handle that already left `Created`.
    #[error("cannot connect from state {0:?}")]
    InvalidState(ConnectionState),
    /// `send()` while the connection is not open.
    #[error("connection not open")]
    NotOpen,
    /// The endpoint URL or upgrade request is malformed.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// The opening handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// Transport-level I/O failure.
    #[error("transport: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Binary payload is not UTF-8.
    #[error("binary payload is not UTF-8")]
    NotUtf8,
}

// ---------------------------------------------------------------------------
// Handler errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler has no live SUT connection.
    #[error("SUT not connected")]
    NotConnected,
    /// A label could not be translated to or from the SUT vocabulary.
    #[error("unsupported label: {0}")]
    UnsupportedLabel(String),
    /// A configuration item the handler needs is missing or mistyped.
    #[error("bad configuration item '{0}'")]
    BadConfiguration(&'static str),
    /// Failure talking to the SUT.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation. Names the field and the rule.
    #[error("validation failed: {0}")]
    ValidationFailed(&'static str),
    /// Config file could not be read.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON for [`AdapterConfig`](crate::config::AdapterConfig).
    #[error("parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
