//! Control-plane protocol: envelope model and codec.
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌──────────────────┐
//! │ Connection │──▶│  Codec   │──▶│ Engine (inbound) │
//! │ (payload)  │   │ (decode) │   └──────────────────┘
//! └────────────┘   └──────────┘            │
//!       ▲          ┌──────────┐            ▼
//!       └──────────│  Codec   │◀── Engine (outbound)
//!                  │ (encode) │
//!                  └──────────┘
//! ```

pub mod codec;
pub mod envelope;

pub use envelope::{
    Announcement, ConfigItem, Configuration, Envelope, EnvelopeKind, Label, LabelMessage,
    LabelType, Parameter, Value, now_ns,
};
