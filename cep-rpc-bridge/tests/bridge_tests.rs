use cep_rpc_bridge::{
    init_test_logging, Bridge, BridgeArena, BridgeConfig, BridgeError, BridgeEvent,
    CommandProperties, ConnectionState, ContextDisplay, ContextThumbnail, HeartbeatMonitor,
    LogLevel, LogMessage,
};
use cep_rpc_core::channel;
use cep_rpc_testkit::{FakeRemote, HostModel};
use crossbeam_channel::Receiver;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const IDENTIFIER: &str = "tk-photoshopcc";

fn fast_config() -> BridgeConfig {
    BridgeConfig {
        heartbeat_timeout: Duration::from_millis(20),
        response_timeout: Duration::from_secs(2),
        ..BridgeConfig::default()
    }
}

fn connect(config: BridgeConfig) -> (Bridge, FakeRemote) {
    init_test_logging();
    let (transport, remote) = FakeRemote::with_host(HostModel::photoshop());
    let bridge = Bridge::connect(IDENTIFIER, transport, config).unwrap();
    (bridge, remote)
}

fn drain(events: &Receiver<BridgeEvent>) -> Vec<BridgeEvent> {
    events.try_iter().collect()
}

fn disconnects(events: &[BridgeEvent]) -> usize {
    events
        .iter()
        .filter(|event| **event == BridgeEvent::Disconnected)
        .count()
}

/// Payloads of one-way events arrive as JSON text.
fn payload(data: &Value) -> Value {
    serde_json::from_str(data.as_str().unwrap()).unwrap()
}

#[test]
fn test_connect_reaches_ready_with_global_scope() {
    let (bridge, _remote) = connect(fast_config());

    assert_eq!(bridge.state(), ConnectionState::Ready);
    assert_eq!(bridge.identifier(), IDENTIFIER);
    assert!(bridge.last_heartbeat().is_none());

    let app = bridge.resolve("app").unwrap().expect_remote("app").unwrap();
    assert_eq!(app.get("name").unwrap(), json!("Adobe Photoshop"));
    assert_eq!(bridge.resolve("hostVersion").unwrap(), json!("2020"));
}

#[test]
fn test_inbound_events_become_signals() {
    let (bridge, remote) = connect(fast_config());
    let events = bridge.subscribe();

    remote.emit_event(
        channel::LOGGING,
        json!(r#"{"level": "warn", "message": "Panel is slow"}"#),
    );
    remote.emit_event(channel::COMMAND, json!("7"));
    remote.emit_event(channel::RUN_TESTS, Value::Null);
    remote.emit_event(channel::STATE_REQUESTED, Value::Null);
    remote.emit_event(
        channel::ACTIVE_DOCUMENT_CHANGED,
        json!(r#"{"active_document_path": "/projects/shot_010.psd"}"#),
    );
    remote.emit_event(
        channel::ACTIVE_DOCUMENT_CHANGED,
        json!(r#"{"active_document_path": ""}"#),
    );
    bridge.wait(Duration::from_millis(100)).unwrap();

    assert_eq!(
        drain(&events),
        vec![
            BridgeEvent::Log(LogMessage {
                level: LogLevel::Warn,
                message: "Panel is slow".into(),
            }),
            BridgeEvent::CommandTriggered(7),
            BridgeEvent::RunTests,
            BridgeEvent::StateRequested,
            BridgeEvent::ActiveDocumentChanged(Some(PathBuf::from("/projects/shot_010.psd"))),
            BridgeEvent::ActiveDocumentChanged(None),
        ]
    );
}

#[test]
fn test_every_subscriber_sees_each_event() {
    let (bridge, remote) = connect(fast_config());
    let first = bridge.subscribe();
    let second = bridge.subscribe();

    remote.emit_event(channel::RUN_TESTS, Value::Null);
    bridge.wait(Duration::from_millis(50)).unwrap();

    assert_eq!(drain(&first), vec![BridgeEvent::RunTests]);
    assert_eq!(drain(&second), vec![BridgeEvent::RunTests]);
}

#[test]
fn test_malformed_events_are_dropped() {
    let (bridge, remote) = connect(fast_config());
    let events = bridge.subscribe();

    remote.emit_event(channel::LOGGING, json!("not json at all"));
    remote.emit_event(channel::LOGGING, json!({"level": "shout", "message": "x"}));
    remote.emit_event(channel::COMMAND, json!("\"publish\""));
    remote.emit_event(channel::RUN_TESTS, Value::Null);
    bridge.wait(Duration::from_millis(100)).unwrap();

    assert_eq!(drain(&events), vec![BridgeEvent::RunTests]);
    assert_eq!(bridge.state(), ConnectionState::Ready);

    // The pump keeps serving RPC afterwards.
    assert_eq!(
        bridge.communicator().eval("app.documents.length").unwrap(),
        json!(1)
    );
}

#[test]
fn test_send_state_carries_context_and_commands() {
    let (bridge, remote) = connect(fast_config());
    let publish = bridge.commands().register(
        "Publish...",
        CommandProperties {
            icon: Some("/icons/publish.png".into()),
            description: Some("Publish the active document".into()),
        },
        || Ok(()),
    );

    bridge
        .send_state(ContextDisplay::new("Project Foo, Shot 010"))
        .unwrap();

    let frame = remote
        .wait_for_event(channel::SET_STATE, Duration::from_secs(2))
        .unwrap();
    assert_eq!(
        payload(&frame.data),
        json!({
            "context": {"display": "Project Foo, Shot 010"},
            "commands": [{
                "id": publish,
                "display_name": "Publish...",
                "icon_path": "/icons/publish.png",
                "description": "Publish the active document",
            }],
        })
    );
    // One-way notifications never go through the RPC envelope.
    assert_eq!(remote.request_count(), 1);
}

#[test]
fn test_outbound_notifications() {
    let (bridge, remote) = connect(fast_config());
    bridge
        .commands()
        .register("Load", CommandProperties::default(), || Ok(()));

    bridge.send_commands().unwrap();
    bridge
        .send_context_display(&ContextDisplay::new("Shot 020"))
        .unwrap();
    bridge
        .send_context_thumbnail(&ContextThumbnail {
            thumb_path: "/tmp/thumb.png".into(),
        })
        .unwrap();
    bridge.context_about_to_change().unwrap();

    let commands = remote
        .wait_for_event(channel::SET_COMMANDS, Duration::from_secs(2))
        .unwrap();
    assert_eq!(payload(&commands.data)[0]["display_name"], json!("Load"));

    let display = remote
        .wait_for_event(channel::SET_CONTEXT_DISPLAY, Duration::from_secs(2))
        .unwrap();
    assert_eq!(payload(&display.data), json!({"display": "Shot 020"}));

    let thumbnail = remote
        .wait_for_event(channel::SET_CONTEXT_THUMBNAIL, Duration::from_secs(2))
        .unwrap();
    assert_eq!(payload(&thumbnail.data), json!({"thumb_path": "/tmp/thumb.png"}));

    let about = remote
        .wait_for_event(channel::CONTEXT_ABOUT_TO_CHANGE, Duration::from_secs(2))
        .unwrap();
    assert_eq!(about.data, Value::Null);
}

#[test]
fn test_command_round_trip() {
    let (bridge, remote) = connect(fast_config());
    let events = bridge.subscribe();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let id = bridge
        .commands()
        .register("Snapshot", CommandProperties::default(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    remote.emit_event(channel::COMMAND, json!(id.to_string()));
    bridge.wait(Duration::from_millis(50)).unwrap();

    let triggered: Vec<i64> = drain(&events)
        .into_iter()
        .filter_map(|event| match event {
            BridgeEvent::CommandTriggered(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(triggered, vec![id]);

    bridge.run_command(triggered[0]).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(bridge.run_command(id + 100).is_err());
}

#[test]
fn test_heartbeat_success_records_time() {
    let (bridge, remote) = connect(fast_config());

    assert_eq!(bridge.heartbeat(), ConnectionState::Ready);
    assert!(bridge.last_heartbeat().is_some());
    assert_eq!(remote.ping_count(), 1);
}

#[test]
fn test_heartbeat_drains_queued_events() {
    let (bridge, remote) = connect(fast_config());
    let events = bridge.subscribe();

    remote.emit_event(channel::STATE_REQUESTED, Value::Null);
    bridge.heartbeat();

    assert_eq!(drain(&events), vec![BridgeEvent::StateRequested]);
}

#[test]
fn test_tolerance_two_disconnects_once_after_three_failures() {
    let config = BridgeConfig {
        heartbeat_tolerance: 2,
        ..fast_config()
    };
    let (bridge, remote) = connect(config);
    let events = bridge.subscribe();
    remote.set_responsive(false);

    assert_eq!(bridge.heartbeat(), ConnectionState::Degraded);
    assert_eq!(bridge.heartbeat(), ConnectionState::Degraded);
    assert!(disconnects(&drain(&events)) == 0);

    assert_eq!(bridge.heartbeat(), ConnectionState::Disconnected);
    assert_eq!(bridge.heartbeat(), ConnectionState::Disconnected);

    assert_eq!(disconnects(&drain(&events)), 1);
    assert_eq!(remote.ping_count(), 3);
}

#[test]
fn test_degraded_bridge_recovers() {
    let (bridge, remote) = connect(fast_config());

    remote.set_responsive(false);
    assert_eq!(bridge.heartbeat(), ConnectionState::Degraded);

    remote.set_responsive(true);
    assert_eq!(bridge.heartbeat(), ConnectionState::Ready);

    // The failure count started over.
    remote.set_responsive(false);
    assert_eq!(bridge.heartbeat(), ConnectionState::Degraded);
    assert_eq!(bridge.heartbeat(), ConnectionState::Degraded);
}

#[test]
fn test_ping_is_bounded_by_heartbeat_timeout() {
    let (bridge, remote) = connect(fast_config());
    remote.set_responsive(false);

    let started = Instant::now();
    let err = bridge.ping().unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_peer_disconnect_signals_once() {
    let (bridge, remote) = connect(fast_config());
    let events = bridge.subscribe();

    remote.disconnect();
    assert_eq!(bridge.heartbeat(), ConnectionState::Disconnected);
    assert_eq!(bridge.heartbeat(), ConnectionState::Disconnected);
    assert!(bridge.wait(Duration::from_millis(10)).is_err());

    assert_eq!(disconnects(&drain(&events)), 1);
}

#[test]
fn test_disconnected_bridge_refuses_work() {
    let (bridge, remote) = connect(fast_config());
    remote.disconnect();
    bridge.heartbeat();

    let err = bridge.send_state(ContextDisplay::default()).unwrap_err();
    assert!(matches!(err, BridgeError::Disconnected(ref id) if id == IDENTIFIER));
    assert!(bridge.resolve("app").unwrap_err().is_disconnected());
    assert!(bridge.ping().unwrap_err().is_disconnected());
}

#[test]
fn test_close_signals_disconnect() {
    let (bridge, _remote) = connect(fast_config());
    let events = bridge.subscribe();

    bridge.close().unwrap();
    assert!(bridge.is_disconnected());
    assert_eq!(drain(&events), vec![BridgeEvent::Disconnected]);
}

#[test]
fn test_wait_is_capped_by_response_timeout() {
    let config = BridgeConfig {
        response_timeout: Duration::from_millis(200),
        ..fast_config()
    };
    let (bridge, _remote) = connect(config);

    let started = Instant::now();
    let err = bridge.wait(Duration::from_secs(5)).unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(1));

    // Bounded waits are fine and leave the connection alone.
    bridge.wait(Duration::from_millis(10)).unwrap();
    assert_eq!(bridge.state(), ConnectionState::Ready);
}

#[test]
fn test_unanswered_call_times_out() {
    let config = BridgeConfig {
        response_timeout: Duration::from_millis(300),
        ..fast_config()
    };
    let (bridge, remote) = connect(config);
    let app = bridge.resolve("app").unwrap().expect_remote("app").unwrap();
    remote.set_silent(true);

    let started = Instant::now();
    let err = app.get("version").unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_millis(300) + Duration::from_millis(250));
}

#[test]
fn test_monitor_detects_dead_panel() {
    let config = BridgeConfig {
        heartbeat_tolerance: 1,
        ..fast_config()
    };
    let (bridge, remote) = connect(config);
    let events = bridge.subscribe();
    remote.set_responsive(false);

    let monitor = HeartbeatMonitor::start(bridge.clone(), Duration::from_millis(5)).unwrap();
    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event, BridgeEvent::Disconnected);

    assert_eq!(monitor.stop(), Some(ConnectionState::Disconnected));
    assert_eq!(remote.ping_count(), 2);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_monitor_pumps_events() {
    let config = BridgeConfig {
        heartbeat_interval: Duration::from_millis(5),
        ..fast_config()
    };
    let (bridge, remote) = connect(config);
    let events = bridge.subscribe();
    let monitor = HeartbeatMonitor::for_bridge(&bridge).unwrap();
    assert!(monitor.is_running());

    remote.emit_event(channel::RUN_TESTS, Value::Null);
    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        BridgeEvent::RunTests
    );

    assert_eq!(monitor.stop(), Some(ConnectionState::Ready));
    assert!(remote.ping_count() >= 1);
}

#[test]
fn test_arena_reuses_bridge_per_identifier() {
    init_test_logging();
    let arena = BridgeArena::new();
    let connects = AtomicUsize::new(0);
    let mut remotes = Vec::new();

    let mut open = |id: &str| {
        connects.fetch_add(1, Ordering::SeqCst);
        let (transport, remote) = FakeRemote::with_host(HostModel::photoshop());
        remotes.push(remote);
        Bridge::connect(id, transport, fast_config())
    };

    let first = arena.get_or_create("photoshop", &mut open).unwrap();
    let again = arena.get_or_create("photoshop", &mut open).unwrap();
    let other = arena.get_or_create("aftereffects", &mut open).unwrap();

    assert_eq!(connects.load(Ordering::SeqCst), 2);
    assert_eq!(again.identifier(), "photoshop");
    assert_eq!(other.identifier(), "aftereffects");
    assert_eq!(arena.len(), 2);

    // Both handles drive the same connection.
    let events = again.subscribe();
    first.close().unwrap();
    assert!(again.is_disconnected());
    assert_eq!(drain(&events), vec![BridgeEvent::Disconnected]);

    assert!(arena.remove("photoshop").is_some());
    assert!(arena.lookup("photoshop").is_none());
    assert_eq!(arena.identifiers(), vec!["aftereffects".to_string()]);
}

#[test]
fn test_arena_failed_connect_leaves_no_entry() {
    let arena = BridgeArena::new();
    let result = arena.get_or_create("premiere", |id| {
        Err(BridgeError::Disconnected(id.to_string()))
    });
    assert!(result.is_err());
    assert!(arena.is_empty());
}
