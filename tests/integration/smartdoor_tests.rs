//! Smart-door handler driven end to end: in-memory control plane on one
//! side, in-memory door on the other.

use std::sync::Arc;

use testbridge::Engine;
use testbridge::adapters::smartdoor::{CHANNEL, SmartDoorHandler};
use testbridge::connection::memory::{MemoryConnection, MemoryConnector, MemoryPeer, wait_until};
use testbridge::connection::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connector, Payload};
use testbridge::fsm::AdapterState;
use testbridge::protocol::codec;
use testbridge::protocol::{Configuration, Envelope, Label, LabelMessage, LabelType, Value};

use crate::mock_adapter::{RecordingSink, WAIT, labels};

struct DoorRig {
    engine: Engine,
    control: MemoryPeer,
    door: MemoryPeer,
}

impl DoorRig {
    fn new() -> Self {
        let (control_connector, control) = MemoryConnector::pair();
        let (door_connector, door) = MemoryConnector::pair();
        let handler = SmartDoorHandler::with_connector(move |_url: &str| -> Box<dyn Connector> {
            Box::new(door_connector.clone())
        });
        let engine = Engine::builder("smartdoor", control_connector, handler)
            .sink(RecordingSink::default())
            .build();
        Self {
            engine,
            control,
            door,
        }
    }

    fn plane(&self) -> Arc<MemoryConnection> {
        assert!(self.control.wait_for_connections(1, WAIT));
        self.control.latest().unwrap()
    }

    fn sent(&self) -> Vec<Envelope> {
        self.plane()
            .sent()
            .iter()
            .map(|p| codec::decode(p).unwrap())
            .collect()
    }

    fn wait_sent(&self, count: usize) -> Vec<Envelope> {
        assert!(self.plane().wait_for_sent(count, WAIT), "got {:?}", self.sent());
        self.sent()
    }

    fn deliver(&self, envelope: &Envelope) {
        self.plane().deliver(codec::encode(envelope).unwrap());
    }

    fn device(&self) -> Arc<MemoryConnection> {
        assert!(self.door.wait_for_connections(1, WAIT));
        self.door.latest().unwrap()
    }

    fn device_texts(&self) -> Vec<String> {
        self.device()
            .sent()
            .into_iter()
            .filter_map(|p| p.as_text().map(str::to_owned))
            .collect()
    }

    /// Announce, configure with `url`, complete the device reset.
    fn ready(&self) {
        self.engine.start().unwrap();
        self.wait_sent(1);
        assert!(wait_until(WAIT, || self.engine.state() == AdapterState::Announced));
        let cfg = Configuration::default().with_item("url", "", Value::String("ws://door:3001".into()));
        self.deliver(&Envelope::Configuration(cfg));

        assert!(self.device().wait_for_sent(1, WAIT));
        assert_eq!(self.device_texts(), vec!["RESET"]);
        self.device().deliver(Payload::Text("RESET_PERFORMED".into()));
        assert!(wait_until(WAIT, || self.engine.state() == AdapterState::Ready));
    }
}

impl Drop for DoorRig {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

#[test]
fn announcement_carries_catalogue_and_default_url() {
    let rig = DoorRig::new();
    rig.engine.start().unwrap();
    let sent = rig.wait_sent(1);
    let Envelope::Announcement(a) = &sent[0] else {
        panic!("expected announcement");
    };
    assert_eq!(a.labels.len(), 13);
    assert_eq!(a.configuration.get_str("url"), Some("ws://localhost:3001"));
}

#[test]
fn device_reset_completes_the_handshake() {
    let rig = DoorRig::new();
    rig.ready();
    let sent = rig.wait_sent(2);
    assert_eq!(sent[1], Envelope::Ready);
}

#[test]
fn lock_stimulus_reaches_door_and_response_comes_back() {
    let rig = DoorRig::new();
    rig.ready();

    let lock = Label::stimulus("lock", CHANNEL).with_parameter("passcode", Value::Integer(1234));
    rig.deliver(&Envelope::Label(LabelMessage {
        label: lock,
        timestamp_ns: 0,
        correlation_id: Some("c1".into()),
    }));

    assert!(rig.device().wait_for_sent(2, WAIT));
    assert_eq!(rig.device_texts()[1], "LOCK:1234");

    let echoed = labels(&rig.wait_sent(3));
    assert_eq!(echoed[0].label.name, "lock");
    assert_eq!(echoed[0].label.parameter("passcode"), Some(&Value::Integer(1234)));
    assert_eq!(echoed[0].label.physical_label.as_deref(), Some(&b"LOCK:1234"[..]));
    assert_eq!(echoed[0].correlation_id.as_deref(), Some("c1"));

    rig.device().deliver(Payload::Text("LOCKED".into()));
    let echoed = labels(&rig.wait_sent(4));
    assert_eq!(echoed[1].label.label_type, LabelType::Response);
    assert_eq!(echoed[1].label.name, "locked");
    assert_eq!(echoed[1].label.physical_label.as_deref(), Some(&b"LOCKED"[..]));
    assert!(echoed[1].timestamp_ns > 0);
}

#[test]
fn unknown_device_message_is_ignored() {
    let rig = DoorRig::new();
    rig.ready();
    rig.device().deliver(Payload::Text("EXPLODED".into()));
    rig.device().deliver(Payload::Text("OPENED".into()));
    let echoed = labels(&rig.wait_sent(3));
    assert_eq!(echoed.len(), 1);
    assert_eq!(echoed[0].label.name, "opened");
}

#[test]
fn reset_envelope_resets_the_door() {
    let rig = DoorRig::new();
    rig.ready();
    rig.deliver(&Envelope::Reset);
    assert!(rig.device().wait_for_sent(2, WAIT));
    assert_eq!(rig.device_texts()[1], "RESET");
    rig.device().deliver(Payload::Text("RESET_PERFORMED".into()));
    let sent = rig.wait_sent(3);
    assert_eq!(sent[2], Envelope::Ready);
}

#[test]
fn device_loss_is_reported_as_error() {
    let rig = DoorRig::new();
    rig.ready();
    let plane = rig.plane();
    rig.device().remote_close(CLOSE_ABNORMAL, "");

    assert!(plane.wait_for_sent(3, WAIT));
    let sent: Vec<_> = plane.sent().iter().map(|p| codec::decode(p).unwrap()).collect();
    assert!(matches!(&sent[2], Envelope::Error { message } if message.contains("device closed (1006)")));
    assert!(wait_until(WAIT, || plane.closed_with().is_some()));
    assert_eq!(plane.closed_with().unwrap().0, CLOSE_NORMAL);
}

#[test]
fn refused_device_is_reported_as_error() {
    let rig = DoorRig::new();
    rig.door.refuse_connections(true);
    rig.engine.start().unwrap();
    rig.wait_sent(1);
    assert!(wait_until(WAIT, || rig.engine.state() == AdapterState::Announced));
    rig.deliver(&Envelope::Configuration(Configuration::default().with_item(
        "url",
        "",
        Value::String("ws://nowhere:1".into()),
    )));

    let sent = rig.wait_sent(2);
    assert!(matches!(&sent[1], Envelope::Error { message } if message.contains("device error")));
}

#[test]
fn missing_url_item_fails_start() {
    let rig = DoorRig::new();
    rig.engine.start().unwrap();
    rig.wait_sent(1);
    assert!(wait_until(WAIT, || rig.engine.state() == AdapterState::Announced));
    rig.deliver(&Envelope::Configuration(Configuration::default()));

    let sent = rig.wait_sent(2);
    assert!(matches!(&sent[1], Envelope::Error { message } if message.contains("'url'")));
    assert_eq!(rig.door.connection_count(), 0);
}
