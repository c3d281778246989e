//! Parla voice session engine process entry point.
//!
//! Communicates with the host UI via JSON-line IPC on stdin/stdout.
//! Initializes logging and configuration, spawns the session engine, and
//! shuttles commands in and events out until told to stop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use parla_core::config::{self, LiveConfig};
use parla_core::ipc::bridge::{emit_event, spawn_stdin_reader};
use parla_core::ipc::{HostCommand, HostEvent};
use parla_core::session::engine::{EngineCommand, SessionEngine};
use parla_core::transport::gemini::GeminiConnector;

#[tokio::main]
async fn main() {
    // Logging goes to stderr; stdout carries the IPC protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    emit_event(&HostEvent::Starting {});

    let live_config = config::read_live_config();
    info!(?live_config, "Configuration loaded");

    let api_key = match config::api_key_from_env() {
        Some(key) => key,
        None => {
            warn!(
                "{} is not set; connect attempts will fail until it is provided",
                config::API_KEY_ENV
            );
            String::new()
        }
    };

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let connector = Arc::new(GeminiConnector::new(api_key));
    let (engine, engine_tx) = SessionEngine::new(live_config, connector, ui_tx);
    let engine_task = tokio::spawn(engine.run());

    let mut cmd_rx = spawn_stdin_reader();

    emit_event(&HostEvent::Ready {});
    info!("Voice session engine ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => {
                        if !handle_command(command, &engine_tx) {
                            break;
                        }
                    }
                    None => {
                        // stdin closed; parent process gone.
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            Some(event) = ui_rx.recv() => {
                emit_event(&event.into());
            }
        }
    }

    let _ = engine_tx.send(EngineCommand::Shutdown);
    let _ = engine_task.await;

    info!("Voice session engine shutting down");
}

/// Handle a single host command. Returns `false` if the main loop should
/// exit.
fn handle_command(
    cmd: HostCommand,
    engine_tx: &mpsc::UnboundedSender<EngineCommand>,
) -> bool {
    match cmd {
        HostCommand::Connect {} => {
            let _ = engine_tx.send(EngineCommand::Connect);
        }
        HostCommand::Disconnect {} => {
            let _ = engine_tx.send(EngineCommand::Disconnect);
        }
        HostCommand::SetConfig { config } => {
            let _ = engine_tx.send(EngineCommand::SetConfig(LiveConfig {
                language: config.language,
                voice: config.voice,
            }));
        }
        HostCommand::Ping {} => {
            emit_event(&HostEvent::Pong {});
        }
        HostCommand::Stop {} => {
            emit_event(&HostEvent::Stopping {});
            return false;
        }
    }
    true
}
