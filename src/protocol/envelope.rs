//! Envelope and label model exchanged with the control plane.
//!
//! ```text
//!  Envelope ─┬─ Announcement { name, labels[], configuration }
//!            ├─ Configuration { items[] }
//!            ├─ Label { label, timestamp_ns, correlation_id? }
//!            ├─ Reset
//!            ├─ Ready
//!            └─ Error { message }
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ───────────────────────────────────────────────────────────────
// Typed values
// ───────────────────────────────────────────────────────────────

/// A typed parameter or configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Integer(i64),
    String(String),
    Boolean(bool),
    Decimal(f64),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Labels
// ───────────────────────────────────────────────────────────────

/// Direction of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelType {
    Stimulus,
    Response,
}

/// A named, typed parameter of a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A named stimulus or response event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(rename = "type")]
    pub label_type: LabelType,
    pub name: String,
    pub channel: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Raw SUT-level representation, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_label: Option<Vec<u8>>,
}

impl Label {
    pub fn stimulus(name: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::new(LabelType::Stimulus, name, channel)
    }

    pub fn response(name: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::new(LabelType::Response, name, channel)
    }

    fn new(label_type: LabelType, name: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            label_type,
            name: name.into(),
            channel: channel.into(),
            parameters: Vec::new(),
            physical_label: None,
        }
    }

    /// Builder-style parameter append.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Label envelope payload: the label plus observation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMessage {
    pub label: Label,
    /// Nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    /// Links a control-plane stimulus to its echoed confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// One configuration item published by the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub key: String,
    #[serde(default)]
    pub description: String,
    pub value: Value,
}

/// Ordered set of configuration items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub items: Vec<ConfigItem>,
}

impl Configuration {
    /// Builder-style item append.
    #[must_use]
    pub fn with_item(
        mut self,
        key: impl Into<String>,
        description: impl Into<String>,
        value: Value,
    ) -> Self {
        self.items.push(ConfigItem {
            key: key.into(),
            description: description.into(),
            value,
        });
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items.iter().find(|i| i.key == key).map(|i| &i.value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_integer)
    }
}

// ───────────────────────────────────────────────────────────────
// Envelope
// ───────────────────────────────────────────────────────────────

/// Announcement sent once per session, right after the connection opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub name: String,
    pub labels: Vec<Label>,
    pub configuration: Configuration,
}

/// Structured message exchanged with the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    Announcement(Announcement),
    Configuration(Configuration),
    Label(LabelMessage),
    Reset,
    Ready,
    Error { message: String },
}

/// Discriminant of an [`Envelope`], for logging and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Announcement,
    Configuration,
    Label,
    Reset,
    Ready,
    Error,
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Announcement(_) => EnvelopeKind::Announcement,
            Self::Configuration(_) => EnvelopeKind::Configuration,
            Self::Label(_) => EnvelopeKind::Label,
            Self::Reset => EnvelopeKind::Reset,
            Self::Ready => EnvelopeKind::Ready,
            Self::Error { .. } => EnvelopeKind::Error,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
