//! CEP bridge host
//!
//! Connects to the panel named by `SHOTGUN_ADOBE_HOST`/`SHOTGUN_ADOBE_PORT`,
//! publishes a small command menu and serves panel events until the panel
//! goes away, at which point the process exits cleanly. Logs land in
//! `SHOTGUN_ADOBE_LOG_DIR`, named after the identifier given as the first
//! argument.

use anyhow::{Context, Result};
use cep_rpc_bridge::{
    init_logging, Bridge, BridgeArena, BridgeConfig, BridgeEvent, CommandProperties,
    ContextDisplay, HeartbeatMonitor, LogSettings,
};
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_IDENTIFIER: &str = "tk-adobecc";

fn main() -> Result<()> {
    let identifier = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_IDENTIFIER.to_string());
    let config = BridgeConfig::from_env();
    init_logging(&LogSettings::for_bridge(&config, &identifier))?;

    info!(%identifier, host = %config.host, port = ?config.port, "Starting CEP bridge");

    let arena = BridgeArena::new();
    let bridge = arena
        .get_or_create(&identifier, |id| Bridge::connect_socketio(id, config))
        .context("Failed to connect to the panel")?;

    register_commands(&bridge);
    let events = bridge.subscribe();
    let _monitor = HeartbeatMonitor::for_bridge(&bridge).context("Failed to start heartbeat")?;

    let mut context = ContextDisplay::new(identifier.clone());
    if let Err(e) = bridge.send_state(context.clone()) {
        warn!(error = %e, "Unable to send initial state");
    }
    if bridge.is_disconnected() {
        info!(%identifier, "Panel disconnected during startup");
        return Ok(());
    }

    for event in events.iter() {
        match event {
            BridgeEvent::Log(_) => {}
            BridgeEvent::CommandTriggered(id) => {
                if let Err(e) = bridge.run_command(id) {
                    error!(id, error = %e, "Command failed");
                }
            }
            BridgeEvent::StateRequested => {
                if let Err(e) = bridge.send_state(context.clone()) {
                    warn!(error = %e, "Unable to send state");
                }
            }
            BridgeEvent::RunTests => run_smoke_test(&bridge),
            BridgeEvent::ActiveDocumentChanged(path) => {
                info!(?path, "Active document changed");
                let display = match &path {
                    Some(path) => format!("{} ({})", identifier, path.display()),
                    None => identifier.clone(),
                };
                context = ContextDisplay::new(display);
                let sent = bridge
                    .context_about_to_change()
                    .and_then(|()| bridge.send_context_display(&context));
                if let Err(e) = sent {
                    warn!(error = %e, "Unable to update context display");
                }
            }
            BridgeEvent::Disconnected => {
                info!(%identifier, "Panel disconnected, shutting down");
                break;
            }
        }
    }

    arena.clear();
    Ok(())
}

fn register_commands(bridge: &Bridge) {
    let communicator = bridge.communicator().clone();
    bridge.commands().register(
        "List Globals",
        CommandProperties {
            icon: None,
            description: Some("Log the names bound in the panel's global scope".into()),
        },
        move || {
            let names: Vec<&str> = communicator.global_scope().names().collect();
            info!(?names, "Panel globals");
            Ok(())
        },
    );

    // Callbacks hold the communicator rather than the bridge, which owns them.
    let communicator = bridge.communicator().clone();
    bridge.commands().register(
        "Report Active Document",
        CommandProperties {
            icon: None,
            description: Some("Log the name of the document open in the host app".into()),
        },
        move || {
            let app = communicator.resolve("app")?.expect_remote("app")?;
            let document = app
                .get("activeDocument")?
                .expect_remote("app.activeDocument")?;
            let name = document.get("name")?;
            info!(name = ?name.as_json(), "Active document");
            Ok(())
        },
    );
}

fn run_smoke_test(bridge: &Bridge) {
    let started = std::time::Instant::now();
    match bridge.communicator().eval("1 + 1") {
        Ok(value) if value == serde_json::json!(2) => {
            info!(elapsed = ?started.elapsed(), "Smoke test passed")
        }
        Ok(value) => warn!(?value, "Smoke test returned an unexpected value"),
        Err(e) => error!(error = %e, "Smoke test failed"),
    }
    if let Err(e) = bridge.wait(Duration::from_millis(10)) {
        warn!(error = %e, "Unable to drain events after smoke test");
    }
}
