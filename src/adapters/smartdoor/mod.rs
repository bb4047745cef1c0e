//! Smart-door handler: drives a door-lock SUT over a device connection.
//!
//! ```text
//!  engine ── stimulate(lock{1234}) ──▶ "LOCK:1234" ──▶ door
//!  engine ◀── send_response(locked) ◀── "LOCKED" ◀──── door
//!
//!  device open ──▶ "RESET" ──▶ door ──▶ "RESET_PERFORMED" ──▶ send_ready()
//! ```
//!
//! The device connection is created from the `url` configuration item on
//! every `start()`. A device close or transport error while started is
//! reported to the engine once, as `send_error`.

pub mod converter;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::app::ports::Handler;
use crate::connection::websocket::WebSocketConnector;
use crate::connection::{CLOSE_NORMAL, Connection, ConnectionListener, Connector, Payload};
use crate::engine::AdapterHandle;
use crate::error::HandlerError;
use crate::protocol::{Configuration, Label, LabelType, Value, now_ns};

/// Channel every smart-door label lives on.
pub const CHANNEL: &str = "door";

/// Default SUT endpoint.
pub const DEFAULT_URL: &str = "ws://localhost:3001";

const RESET_COMMAND: &str = "RESET";
const RESET_PERFORMED: &str = "RESET_PERFORMED";

/// Every label the door understands or produces.
pub fn catalogue() -> Vec<Label> {
    let passcode = || Value::Integer(0);
    vec![
        Label::stimulus("open", CHANNEL),
        Label::stimulus("close", CHANNEL),
        Label::stimulus("lock", CHANNEL).with_parameter("passcode", passcode()),
        Label::stimulus("unlock", CHANNEL).with_parameter("passcode", passcode()),
        Label::stimulus("reset", CHANNEL),
        Label::response("opened", CHANNEL),
        Label::response("closed", CHANNEL),
        Label::response("locked", CHANNEL),
        Label::response("unlocked", CHANNEL),
        Label::response("invalid_command", CHANNEL),
        Label::response("invalid_passcode", CHANNEL),
        Label::response("incorrect_passcode", CHANNEL),
        Label::response("shutdown", CHANNEL),
    ]
}

/// Builds a device connector for a URL.
pub type ConnectorFactory = Box<dyn Fn(&str) -> Box<dyn Connector> + Send>;

struct Device {
    connection: Arc<dyn Connection>,
    armed: Arc<AtomicBool>,
}

/// [`Handler`] for the smart door.
pub struct SmartDoorHandler {
    connect_to: ConnectorFactory,
    configuration: Configuration,
    catalogue: Arc<Vec<Label>>,
    device: Option<Device>,
}

impl SmartDoorHandler {
    /// Handler that reaches the door over WebSocket.
    pub fn new() -> Self {
        Self::with_connector(|url: &str| -> Box<dyn Connector> {
            Box::new(WebSocketConnector::new(url))
        })
    }

    /// Handler using a custom device connector.
    pub fn with_connector(
        connect_to: impl Fn(&str) -> Box<dyn Connector> + Send + 'static,
    ) -> Self {
        Self {
            connect_to: Box::new(connect_to),
            configuration: default_configuration(),
            catalogue: Arc::new(catalogue()),
            device: None,
        }
    }

    fn send_to_device(&self, text: String) -> Result<(), HandlerError> {
        let device = self.device.as_ref().ok_or(HandlerError::NotConnected)?;
        debug!("smartdoor: -> {}", text);
        device.connection.send(Payload::Text(text))?;
        Ok(())
    }
}

impl Default for SmartDoorHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn default_configuration() -> Configuration {
    Configuration::default().with_item(
        "url",
        "WebSocket URL of the smart door",
        Value::String(DEFAULT_URL.into()),
    )
}

impl Handler for SmartDoorHandler {
    fn configuration(&self) -> Configuration {
        self.configuration.clone()
    }

    fn set_configuration(&mut self, configuration: Configuration) {
        self.configuration = configuration;
    }

    fn supported_labels(&self) -> Vec<Label> {
        self.catalogue.as_ref().clone()
    }

    fn start(&mut self, adapter: AdapterHandle) -> Result<(), HandlerError> {
        self.stop();
        let url = self
            .configuration
            .get_str("url")
            .ok_or(HandlerError::BadConfiguration("url"))?
            .to_owned();
        info!("smartdoor: connecting to {}", url);

        let armed = Arc::new(AtomicBool::new(true));
        let link = Arc::new(Mutex::new(None));
        let listener = Arc::new(DeviceListener {
            adapter,
            armed: Arc::clone(&armed),
            link: Arc::clone(&link),
            catalogue: Arc::clone(&self.catalogue),
        });
        let connection = (self.connect_to)(&url).create(listener);
        *link.lock() = Some(Arc::downgrade(&connection));
        self.device = Some(Device {
            connection: Arc::clone(&connection),
            armed,
        });

        // A failed connect is reported by the listener as send_error.
        if let Err(e) = connection.connect() {
            warn!("smartdoor: device connect failed: {}", e);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(device) = self.device.take() {
            device.armed.store(false, Ordering::Release);
            device.connection.close(CLOSE_NORMAL, "adapter stopping");
            info!("smartdoor: stopped");
        }
    }

    fn reset(&mut self) -> Result<(), HandlerError> {
        self.send_to_device(RESET_COMMAND.into())
    }

    fn stimulate(&mut self, label: &Label) -> Result<Option<Vec<u8>>, HandlerError> {
        if converter::find(&self.catalogue, &label.name, LabelType::Stimulus).is_none() {
            return Err(HandlerError::UnsupportedLabel(label.name.clone()));
        }
        let wire = converter::label_to_wire(label);
        self.send_to_device(wire.clone())?;
        Ok(Some(wire.into_bytes()))
    }
}

// ───────────────────────────────────────────────────────────────
// Device listener
// ───────────────────────────────────────────────────────────────

struct DeviceListener {
    adapter: AdapterHandle,
    /// Cleared by `stop()`; a disarmed listener reports nothing.
    armed: Arc<AtomicBool>,
    link: Arc<Mutex<Option<Weak<dyn Connection>>>>,
    catalogue: Arc<Vec<Label>>,
}

impl DeviceListener {
    /// Report a device failure once.
    fn fail(&self, message: String) {
        if self.armed.swap(false, Ordering::AcqRel) {
            self.adapter.send_error(message);
        }
    }
}

impl ConnectionListener for DeviceListener {
    fn on_open(&self) {
        info!("smartdoor: device connected, resetting");
        let connection = self.link.lock().as_ref().and_then(Weak::upgrade);
        match connection {
            Some(connection) => {
                if let Err(e) = connection.send(Payload::Text(RESET_COMMAND.into())) {
                    self.fail(format!("device reset failed: {e}"));
                }
            }
            None => self.fail("device connection gone".into()),
        }
    }

    fn on_close(&self, code: u16, reason: String) {
        self.fail(format!("device closed ({code}) {reason}"));
    }

    fn on_message(&self, payload: Payload) {
        let Some(text) = payload.as_text() else {
            warn!("smartdoor: ignoring binary message ({} bytes)", payload.len());
            return;
        };
        debug!("smartdoor: <- {}", text);
        if text.trim() == RESET_PERFORMED {
            self.adapter.send_ready();
            return;
        }
        match converter::wire_to_label(text, &self.catalogue, LabelType::Response) {
            Ok(label) => {
                self.adapter
                    .send_response(label, Some(text.as_bytes().to_vec()), now_ns());
            }
            Err(e) => warn!("smartdoor: {}", e),
        }
    }

    fn on_error(&self, info: String) {
        self.fail(format!("device error: {info}"));
    }
}
