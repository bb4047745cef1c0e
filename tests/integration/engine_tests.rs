//! Engine scenarios against the in-memory control plane.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use testbridge::app::events::AdapterEvent;
use testbridge::connection::memory::wait_until;
use testbridge::connection::{CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NORMAL};
use testbridge::fsm::{AdapterState, Trigger};
use testbridge::protocol::{Configuration, Envelope, Label, LabelType, Value};

use crate::mock_adapter::{HandlerCall, Harness, WAIT, labels, stimulus};

const SETTLE: Duration = Duration::from_millis(100);

// ── Announce / configure ──────────────────────────────────────

#[test]
fn announcement_is_first_envelope() {
    let h = Harness::new();
    h.engine.start().unwrap();
    let sent = h.wait_sent(0, 1);
    let Envelope::Announcement(a) = &sent[0] else {
        panic!("expected announcement, got {:?}", sent[0]);
    };
    assert_eq!(a.name, "mock-door");
    assert_eq!(a.labels.len(), 2);
    assert_eq!(a.configuration.get_int("speed"), Some(1));
    assert!(h.wait_state(AdapterState::Announced));
}

#[test]
fn connected_is_passed_through_before_announced() {
    let h = Harness::new();
    h.engine.start().unwrap();
    let transitions = || -> Vec<_> {
        h.events()
            .into_iter()
            .filter_map(|e| match e {
                AdapterEvent::StateChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    };
    assert!(wait_until(WAIT, || transitions().len() >= 2));
    let transitions = transitions();
    assert_eq!(
        transitions,
        vec![
            (AdapterState::Disconnected, AdapterState::Connected),
            (AdapterState::Connected, AdapterState::Announced),
        ]
    );
}

#[test]
fn configuration_starts_handler_and_ready_follows() {
    let h = Harness::new();
    h.engine.start().unwrap();
    h.wait_sent(0, 1);
    assert!(h.wait_state(AdapterState::Announced));

    let cfg = Configuration::default().with_item("speed", "", Value::Integer(3));
    h.deliver(0, &Envelope::Configuration(cfg.clone()));
    assert!(h.wait_state(AdapterState::Ready));

    let sent = h.wait_sent(0, 2);
    assert_eq!(sent[1], Envelope::Ready);
    let calls = h.handler.calls();
    let configured = calls.iter().position(|c| *c == HandlerCall::SetConfiguration(cfg.clone()));
    let started = calls.iter().position(|c| *c == HandlerCall::Start);
    assert!(configured.unwrap() < started.unwrap());
}

#[test]
fn failing_handler_start_answers_with_error() {
    let h = Harness::new();
    h.handler.fail_start.store(true, Ordering::SeqCst);
    h.engine.start().unwrap();
    h.wait_sent(0, 1);
    assert!(h.wait_state(AdapterState::Announced));
    h.deliver(0, &Envelope::Configuration(Configuration::default()));

    let sent = h.wait_sent(0, 2);
    assert!(matches!(&sent[1], Envelope::Error { message } if message.contains("handler start failed")));
    assert!(wait_until(WAIT, || h.control(0).closed_with().is_some()));
    assert_eq!(h.control(0).closed_with().map(|c| c.0), Some(CLOSE_NORMAL));
}

// ── Ready loop ────────────────────────────────────────────────

#[test]
fn stimulus_is_echoed_once_with_correlation_and_timestamp() {
    let h = Harness::new();
    h.ready();
    h.deliver(0, &stimulus("open", "c1"));

    let sent = h.wait_sent(0, 3);
    thread::sleep(SETTLE);
    let echoed = labels(&h.sent(0));
    assert_eq!(echoed.len(), 1, "exactly one label envelope, got {sent:?}");
    let echo = &echoed[0];
    assert_eq!(echo.label.label_type, LabelType::Stimulus);
    assert_eq!(echo.label.name, "open");
    assert_eq!(echo.correlation_id.as_deref(), Some("c1"));
    assert!(echo.timestamp_ns > 0);
    assert_eq!(echo.label.physical_label.as_deref(), Some(&b"OPEN"[..]));
    assert_eq!(h.handler.stimuli().len(), 1);
}

#[test]
fn stimuli_are_processed_and_echoed_in_order() {
    let h = Harness::new();
    h.ready();
    for i in 0..50 {
        h.deliver(0, &stimulus("open", &format!("c{i}")));
    }
    h.wait_sent(0, 52);

    let ids: Vec<_> = labels(&h.sent(0))
        .into_iter()
        .map(|m| m.correlation_id.unwrap())
        .collect();
    let expected: Vec<_> = (0..50).map(|i| format!("c{i}")).collect();
    assert_eq!(ids, expected);
    assert_eq!(h.handler.stimuli().len(), 50);
}

#[test]
fn echo_precedes_response_produced_during_stimulate() {
    let h = Harness::new();
    h.handler.respond_on_stimulate.store(true, Ordering::SeqCst);
    h.ready();
    h.deliver(0, &stimulus("open", "c7"));

    let echoed = labels(&h.wait_sent(0, 4));
    assert_eq!(echoed[0].label.label_type, LabelType::Stimulus);
    assert_eq!(echoed[0].correlation_id.as_deref(), Some("c7"));
    assert_eq!(echoed[1].label.label_type, LabelType::Response);
    assert_eq!(echoed[1].label.name, "opened");
}

#[test]
fn handler_response_is_sent_as_label() {
    let h = Harness::new();
    h.ready();
    let adapter = h.handler.adapter().unwrap();
    adapter.send_response(Label::response("opened", "door"), Some(b"OPENED".to_vec()), 42);

    let echoed = labels(&h.wait_sent(0, 3));
    assert_eq!(echoed[0].label.name, "opened");
    assert_eq!(echoed[0].timestamp_ns, 42);
    assert_eq!(echoed[0].label.physical_label.as_deref(), Some(&b"OPENED"[..]));
    assert_eq!(echoed[0].correlation_id, None);
}

#[test]
fn reset_calls_handler_and_ready_is_resent() {
    let h = Harness::new();
    h.ready();
    h.deliver(0, &Envelope::Reset);
    let sent = h.wait_sent(0, 3);
    assert_eq!(sent[2], Envelope::Ready);
    assert_eq!(h.handler.count(|c| *c == HandlerCall::Reset), 1);
    assert_eq!(h.engine.state(), AdapterState::Ready);
}

// ── Violations and errors ─────────────────────────────────────

#[test]
fn label_before_configuration_is_a_violation() {
    let h = Harness::new();
    h.engine.start().unwrap();
    h.wait_sent(0, 1);
    assert!(h.wait_state(AdapterState::Announced));
    h.deliver(0, &stimulus("open", "early"));

    let sent = h.wait_sent(0, 2);
    assert!(matches!(&sent[1], Envelope::Error { message } if message.contains("Label")));
    assert!(h.handler.stimuli().is_empty());
    assert!(wait_until(WAIT, || h.control(0).closed_with().is_some()));
    assert_eq!(h.control(0).closed_with().map(|c| c.0), Some(CLOSE_NORMAL));
    assert!(h.events().iter().any(|e| matches!(
        e,
        AdapterEvent::ProtocolViolation(v) if v.trigger == Trigger::Label && v.state == AdapterState::Announced
    )));
}

#[test]
fn second_configuration_in_ready_is_rejected() {
    let h = Harness::new();
    h.ready();
    h.deliver(0, &Envelope::Configuration(Configuration::default()));
    let sent = h.wait_sent(0, 3);
    assert!(matches!(sent[2], Envelope::Error { .. }));
    assert_eq!(h.handler.count(|c| *c == HandlerCall::Start), 1);
}

#[test]
fn malformed_message_is_answered_with_error() {
    let h = Harness::new();
    h.ready();
    h.control(0).deliver(testbridge::connection::Payload::Text("{not json".into()));
    let sent = h.wait_sent(0, 3);
    assert!(matches!(&sent[2], Envelope::Error { message } if message.contains("Malformed")));
}

#[test]
fn error_from_control_plane_closes_normally() {
    let h = Harness::new();
    h.ready();
    h.deliver(0, &Envelope::error("plane gave up"));
    assert!(wait_until(WAIT, || h.control(0).closed_with().is_some()));
    assert_eq!(h.control(0).closed_with().unwrap().0, CLOSE_NORMAL);
    // No Error envelope goes back for a received error.
    assert!(!h.sent(0).iter().any(|e| matches!(e, Envelope::Error { .. })));
}

#[test]
fn engine_send_error_emits_error_then_closes() {
    let h = Harness::new();
    h.ready();
    h.engine.send_error("sut on fire");
    let sent = h.wait_sent(0, 3);
    assert_eq!(sent[2], Envelope::error("sut on fire"));
    assert!(wait_until(WAIT, || h.control(0).closed_with().is_some()));
    assert_eq!(h.control(0).closed_with(), Some((CLOSE_NORMAL, "sut on fire".into())));
}

#[test]
fn transport_error_is_converted_to_send_error() {
    let h = Harness::new();
    h.ready();
    h.control(0).remote_error("broken pipe");
    let sent = h.wait_sent(0, 3);
    assert_eq!(sent[2], Envelope::error("broken pipe"));
}

// ── Reconnection ──────────────────────────────────────────────

#[test]
fn abnormal_close_stops_handler_once_and_reconnects_once() {
    let h = Harness::new();
    h.ready();
    h.control(0).remote_close(CLOSE_ABNORMAL, "");

    assert!(h.peer.wait_for_connections(2, WAIT));
    h.wait_sent(1, 1);
    thread::sleep(SETTLE);

    assert_eq!(h.handler.stops(), 1);
    assert_eq!(h.peer.connection_count(), 2);
    assert!(h.events().iter().any(|e| *e
        == AdapterEvent::StateChanged {
            from: AdapterState::Ready,
            to: AdapterState::Disconnected,
        }));
    assert!(h.events().contains(&AdapterEvent::ConnectionClosed {
        code: CLOSE_ABNORMAL,
        reason: String::new(),
    }));
    assert_eq!(h.engine.state(), AdapterState::Announced);
}

#[test]
fn new_session_must_be_configured_again() {
    let h = Harness::new();
    h.ready();
    let old_adapter = h.handler.adapter().unwrap();
    h.control(0).remote_close(CLOSE_NORMAL, "bye");

    h.wait_sent(1, 1);
    assert!(h.wait_state(AdapterState::Announced));

    // A callback from the previous session is dropped.
    old_adapter.send_ready();
    thread::sleep(SETTLE);
    assert_eq!(h.engine.state(), AdapterState::Announced);
    assert_eq!(h.sent(1).len(), 1);

    h.ready_on(1);
    h.deliver(1, &stimulus("open", "after-reconnect"));
    let echoed = labels(&h.wait_sent(1, 3));
    assert_eq!(echoed[0].correlation_id.as_deref(), Some("after-reconnect"));
}

#[test]
fn refused_connections_are_retried_until_accepted() {
    let h = Harness::with_delay(Duration::from_millis(10));
    h.peer.refuse_connections(true);
    h.engine.start().unwrap();
    assert!(h.peer.wait_for_connections(3, WAIT));
    assert_eq!(h.engine.state(), AdapterState::Disconnected);
    // Transport errors while disconnected are only logged.
    assert!(h.peer.latest().unwrap().sent().is_empty());

    h.peer.refuse_connections(false);
    assert!(h.wait_state(AdapterState::Announced));
}

// ── Shutdown ──────────────────────────────────────────────────

#[test]
fn shutdown_closes_going_away_and_stops_reconnecting() {
    let h = Harness::new();
    h.ready();
    h.engine.shutdown();

    assert_eq!(h.control(0).closed_with().map(|c| c.0), Some(CLOSE_GOING_AWAY));
    assert_eq!(h.engine.state(), AdapterState::Disconnected);
    assert!(!h.engine.is_running());
    assert_eq!(h.handler.stops(), 1);
    thread::sleep(SETTLE);
    assert_eq!(h.peer.connection_count(), 1);
    assert!(h.events().contains(&AdapterEvent::Shutdown));
}

#[test]
fn shutdown_during_reconnect_delay_stays_down() {
    let h = Harness::with_delay(Duration::from_millis(300));
    h.ready();
    h.control(0).remote_close(CLOSE_ABNORMAL, "");
    assert!(h.wait_state(AdapterState::Disconnected));
    thread::sleep(Duration::from_millis(100));

    h.engine.shutdown();
    thread::sleep(Duration::from_millis(600));

    assert_eq!(h.peer.connection_count(), 1, "engine reconnected after shutdown");
    assert_eq!(h.engine.session_id(), None);
    assert_eq!(h.engine.state(), AdapterState::Disconnected);
    assert!(!h.engine.is_running());
}

#[test]
fn restart_during_reconnect_delay_opens_one_session() {
    let h = Harness::with_delay(Duration::from_millis(300));
    h.ready();
    h.control(0).remote_close(CLOSE_ABNORMAL, "");
    assert!(h.wait_state(AdapterState::Disconnected));
    thread::sleep(Duration::from_millis(100));

    h.engine.shutdown();
    h.engine.start().unwrap();
    h.ready_on(1);
    // Let the pending reconnect wake up; it must not open a second session.
    thread::sleep(Duration::from_millis(600));

    assert_eq!(h.peer.connection_count(), 2);
    assert_eq!(h.engine.state(), AdapterState::Ready);
    assert!(h.control(1).closed_with().is_none());
}

#[test]
fn start_twice_is_a_no_op() {
    let h = Harness::new();
    h.engine.start().unwrap();
    h.engine.start().unwrap();
    h.wait_sent(0, 1);
    thread::sleep(SETTLE);
    assert_eq!(h.peer.connection_count(), 1);
}
