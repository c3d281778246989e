//! Session runtime.
//!
//! Owns everything with a lifetime: the cpal capture stream, the rodio
//! output thread, the transport handle, and the timer tasks. Executes the
//! [`Action`]s decided by [`SessionCore`] and funnels every event source
//! into the core's single queue. One engine per process; one live session
//! at a time, rebuilt from scratch on every connect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Action, EngineError, EngineEvent, SessionCore, SessionState, UiEvent};
use crate::audio::capture::{spawn_framer, start_capture};
use crate::audio::output::OutputHandle;
use crate::audio::ring_buffer::capture_ring;
use crate::audio::LevelMeter;
use crate::config::LiveConfig;
use crate::languages;
use crate::playback::{WallClock, SPEAKING_GAP_DEBOUNCE};
use crate::transport::{gemini, LiveTransport, SessionConfig, TransportConnector};

/// How long a session may sit in `Connecting` after the websocket opens
/// before the missing setup acknowledgment fails the connect.
const SETUP_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Host commands, delivered from the IPC bridge.
#[derive(Debug)]
pub enum EngineCommand {
    Connect,
    Disconnect,
    /// Replace the session config; applies to the next connect.
    SetConfig(LiveConfig),
    Shutdown,
}

/// Wrapper to make `cpal::Stream` Send.
///
/// The stream is only kept alive here and dropped on teardown; its audio
/// callback runs on cpal's own thread.
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: we never touch the stream after creation, we only drop it.
unsafe impl Send for SendStream {}

/// Everything owned by one live session. Dropping it releases the capture
/// device and shuts the output thread down.
struct ActiveSession {
    transport: Box<dyn LiveTransport>,
    _capture_stream: SendStream,
    framer: JoinHandle<()>,
    forwarder: JoinHandle<()>,
    output: OutputHandle,
}

/// The engine task: consumes commands and engine events, executes actions.
pub struct SessionEngine {
    core: SessionCore<WallClock>,
    config: LiveConfig,
    connector: Arc<dyn TransportConnector>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    meter: LevelMeter,
    active: Option<ActiveSession>,
}

impl SessionEngine {
    pub fn new(
        config: LiveConfig,
        connector: Arc<dyn TransportConnector>,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> (Self, mpsc::UnboundedSender<EngineCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = Self {
            core: SessionCore::new(WallClock::new()),
            config,
            connector,
            events_tx,
            events_rx,
            cmd_rx,
            ui_tx,
            meter: LevelMeter::new(),
            active: None,
        };
        (engine, cmd_tx)
    }

    /// Run until a `Shutdown` command (or the command channel closing).
    pub async fn run(mut self) {
        let meter_task = spawn_meter_task(self.meter.clone(), self.ui_tx.clone());

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(EngineCommand::Connect) => self.connect().await,
                    Some(EngineCommand::Disconnect) => self.disconnect(),
                    Some(EngineCommand::SetConfig(config)) => {
                        info!(language = %config.language, voice = %config.voice, "Session config updated");
                        self.config = config;
                    }
                    Some(EngineCommand::Shutdown) | None => {
                        self.disconnect();
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => {
                    let actions = self.core.handle(event);
                    self.execute(actions);
                }
            }
        }

        meter_task.abort();
        debug!("Session engine exiting");
    }

    async fn connect(&mut self) {
        if !self.core.begin_connect() {
            return;
        }
        self.send_ui(UiEvent::ConnectionState(SessionState::Connecting));

        match self.open_session().await {
            Ok(active) => {
                // State flips to Connected when the transport acknowledges;
                // the deadline event is inert once that happened.
                self.active = Some(active);
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(SETUP_ACK_TIMEOUT).await;
                    let _ = tx.send(EngineEvent::HandshakeDeadline);
                });
            }
            Err(error) => {
                let actions = self.core.connect_failed(&error);
                self.execute(actions);
            }
        }
    }

    /// Acquire devices and the transport, in order. Any failure releases
    /// whatever was already acquired.
    async fn open_session(&mut self) -> Result<ActiveSession, EngineError> {
        let output = OutputHandle::open()?;

        let (producer, consumer) = capture_ring();
        let wakeup = Arc::new(Notify::new());
        let capture_stream = SendStream(start_capture(producer, wakeup.clone(), None)?);

        let capture_events = self.events_tx.clone();
        let framer = spawn_framer(consumer, wakeup, self.meter.clone(), move |block| {
            let _ = capture_events.send(EngineEvent::Capture(block));
        });

        let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();
        let transport_events = self.events_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                if transport_events.send(EngineEvent::Transport(event)).is_err() {
                    break;
                }
            }
        });

        let transport = match self.connector.open(self.session_config(), transport_tx).await {
            Ok(transport) => transport,
            Err(e) => {
                framer.abort();
                forwarder.abort();
                return Err(e);
            }
        };

        info!("Live session opened, waiting for setup acknowledgment");

        Ok(ActiveSession {
            transport,
            _capture_stream: capture_stream,
            framer,
            forwarder,
            output,
        })
    }

    /// Safe from any state, any number of times.
    fn disconnect(&mut self) {
        self.teardown();
        let actions = self.core.finish_disconnect();
        self.execute(actions);
    }

    /// Release transport and devices in strict order: transport close
    /// (best effort), capture stopped and detached, playback stopped and
    /// cleared, device contexts dropped. Never raises.
    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            active.transport.close();
            active.framer.abort();
            active.forwarder.abort();
            active.output.stop_speech();
            // Dropping releases the capture stream and shuts the output
            // thread down.
        }
        self.meter.clear();
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::SendAudio(packet) => {
                    if let Some(active) = &self.active {
                        active.transport.send(&packet);
                    }
                }
                Action::PlayAudio {
                    samples,
                    sample_rate,
                    level,
                } => {
                    self.meter.set(level);
                    if let Some(active) = &self.active {
                        active.output.append(samples, sample_rate);
                    }
                }
                Action::ArmEndTimer { id, at } => {
                    let delay = at.saturating_sub(self.core.clock_now());
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(EngineEvent::PlaybackEnded(id));
                    });
                }
                Action::ArmGapTimer { epoch } => {
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(SPEAKING_GAP_DEBOUNCE).await;
                        let _ = tx.send(EngineEvent::SpeakingGap { epoch });
                    });
                }
                Action::StopPlayback => {
                    self.meter.clear();
                    if let Some(active) = &self.active {
                        active.output.stop_speech();
                    }
                }
                Action::PlayChime => {
                    if let Some(active) = &self.active {
                        active.output.chime();
                    }
                }
                Action::Teardown => self.teardown(),
                Action::Emit(event) => {
                    if matches!(event, UiEvent::Speaking(false)) {
                        self.meter.clear();
                    }
                    self.send_ui(event);
                }
            }
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: gemini::MODEL_NAME.to_string(),
            voice_id: languages::voice_or_default(&self.config.voice).to_string(),
            system_prompt: languages::system_prompt_for(&self.config.language).to_string(),
            enable_input_transcription: true,
            enable_output_transcription: true,
        }
    }

    fn send_ui(&self, event: UiEvent) {
        let _ = self.ui_tx.send(event);
    }
}

/// Low-priority volume meter: samples the shared level cell at a visual
/// refresh cadence and reports changes. Cosmetic; intentionally only
/// loosely synchronized with playback.
fn spawn_meter_task(
    meter: LevelMeter,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(33));
        let mut last = 0u8;
        loop {
            interval.tick().await;
            let level = meter.get();
            if level != last {
                last = level;
                if ui_tx.send(UiEvent::Volume(level)).is_err() {
                    break;
                }
            }
        }
    })
}
