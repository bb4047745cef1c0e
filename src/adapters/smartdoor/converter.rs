//! Label ↔ device text converter.
//!
//! The door speaks colon-separated upper-case commands:
//!
//! ```text
//!  Label::stimulus("lock").passcode=1234   ──▶  "LOCK:1234"
//!  "INCORRECT_PASSCODE"                    ──▶  Label::response("incorrect_passcode")
//! ```
//!
//! Arguments are matched positionally against the parameters declared in
//! the label catalogue, and parsed according to the declared value type.

use core::fmt::Write;

use crate::error::HandlerError;
use crate::protocol::{Label, LabelType, Value};

const SEPARATOR: char = ':';

/// Render a label as a device command.
pub fn label_to_wire(label: &Label) -> String {
    let mut wire = label.name.to_ascii_uppercase();
    for parameter in &label.parameters {
        let _ = write!(wire, "{SEPARATOR}{}", parameter.value);
    }
    wire
}

/// Parse a device message into a label of `label_type` from `catalogue`.
pub fn wire_to_label(
    text: &str,
    catalogue: &[Label],
    label_type: LabelType,
) -> Result<Label, HandlerError> {
    let unsupported = || HandlerError::UnsupportedLabel(text.to_owned());

    let mut parts = text.trim().split(SEPARATOR);
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    let template = find(catalogue, &name, label_type).ok_or_else(unsupported)?;
    if args.len() != template.parameters.len() {
        return Err(unsupported());
    }

    let mut label = template.clone();
    for (parameter, raw) in label.parameters.iter_mut().zip(args) {
        parameter.value = parse_as(&parameter.value, raw).ok_or_else(unsupported)?;
    }
    Ok(label)
}

/// Catalogue entry by name and direction.
pub fn find<'a>(catalogue: &'a [Label], name: &str, label_type: LabelType) -> Option<&'a Label> {
    catalogue
        .iter()
        .find(|l| l.label_type == label_type && l.name == name)
}

/// Parse `raw` into the same variant as `template`.
fn parse_as(template: &Value, raw: &str) -> Option<Value> {
    match template {
        Value::Integer(_) => raw.parse().ok().map(Value::Integer),
        Value::String(_) => Some(Value::String(raw.to_owned())),
        Value::Boolean(_) => raw.parse().ok().map(Value::Boolean),
        Value::Decimal(_) => raw.parse().ok().map(Value::Decimal),
    }
}
