// Transport behaviour shared by every implementation, driven through the
// boxed trait object the communicator holds.

use cep_rpc_transport::{pair, EventFrame, Packet, SocketPacket, Transport, TransportError};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

// ============================================================================
// IN-MEMORY PAIR THROUGH THE TRAIT OBJECT
// ============================================================================

#[test]
fn test_boxed_memory_transport() {
    let (transport, peer) = pair();
    let mut transport: Box<dyn Transport> = Box::new(transport);

    transport.emit("set_commands", json!("[]")).unwrap();
    assert_eq!(
        peer.recv_timeout(Duration::from_millis(100)),
        Some(EventFrame::new("set_commands", json!("[]")))
    );

    let replier = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        peer.emit("run_tests", Value::Null);
        peer
    });

    let started = Instant::now();
    let frames = transport.pump(Duration::from_secs(2)).unwrap();
    assert_eq!(frames, vec![EventFrame::new("run_tests", Value::Null)]);
    assert!(started.elapsed() < Duration::from_secs(2));

    let peer = replier.join().unwrap();
    peer.disconnect();
    assert!(!transport.is_connected());
    assert!(matches!(
        transport.ping(Duration::from_millis(5)),
        Err(TransportError::ConnectionClosed)
    ));
}

#[test]
fn test_dropped_peer_closes_transport() {
    let (mut transport, peer) = pair();
    drop(peer);

    assert!(matches!(
        transport.emit("set_state", json!("{}")),
        Err(TransportError::ConnectionClosed)
    ));
}

// ============================================================================
// SOCKET.IO FRAMING
// ============================================================================

proptest! {
    #[test]
    fn prop_event_packets_decode_to_same_frame(
        name in "[a-z_]{1,24}",
        payload in prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[ -~]{0,40}".prop_map(Value::from),
        ],
    ) {
        let frame = EventFrame::new(name, payload);
        let text = Packet::event(frame.clone()).encode().unwrap();
        prop_assert!(text.starts_with("42["));
        prop_assert_eq!(Packet::decode(&text).unwrap(), Packet::event(frame));
    }

    #[test]
    fn prop_decode_never_panics(text in "\\PC{0,64}") {
        let _ = Packet::decode(&text);
    }
}

#[test]
fn test_server_refusal_is_error_packet() {
    assert_eq!(
        Packet::decode(r#"44{"message":"Not authorized"}"#).unwrap(),
        Packet::Message(SocketPacket::Error(json!({"message": "Not authorized"})))
    );
}
