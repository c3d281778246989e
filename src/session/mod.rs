//! Session state machine.
//!
//! Two externally-driven callback sources, the fixed-cadence capture
//! pipeline and the asynchronous remote transport, interleave without any
//! ordering guarantee between them. [`SessionCore`] serializes them: every
//! event goes through one queue and is processed fully before the next, so
//! no event ever observes a half-updated cursor, buffer set, or transcript.
//! The core itself performs no I/O; it returns [`Action`]s for the runtime
//! in [`engine`] to execute.

pub mod engine;

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::audio::capture::CaptureBlock;
use crate::audio::OUTPUT_SAMPLE_RATE;
use crate::pcm::{self, EncodedPacket};
use crate::playback::{OutputClock, PlaybackScheduler};
use crate::transcript::{Message, Role, TranscriptAssembler};
use crate::transport::{ServerEvent, TransportEvent};
use crate::turn::TurnTracker;

/// Engine error taxonomy. Every variant surfaces upward only as the `Error`
/// connection state plus a message event; `Decode` is fail-soft and never
/// reaches the host at all.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("audio device unavailable: {0}")]
    DeviceAcquisition(String),
    #[error("live session handshake failed: {0}")]
    Handshake(String),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Decode(#[from] pcm::DecodeError),
}

/// Authoritative connection status. Only the session core mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Everything the engine's event loop consumes, in arrival order.
#[derive(Debug)]
pub enum EngineEvent {
    /// A framed, encoded capture block.
    Capture(CaptureBlock),
    /// Anything the remote transport produced.
    Transport(TransportEvent),
    /// A scheduled buffer finished sounding.
    PlaybackEnded(u64),
    /// The 200 ms speaking-gap debounce elapsed.
    SpeakingGap { epoch: u64 },
    /// The setup-acknowledgment deadline elapsed. Inert unless the session
    /// is still waiting for the remote ack.
    HandshakeDeadline,
}

/// Observable state changes pushed up to the host UI.
#[derive(Debug, Clone)]
pub enum UiEvent {
    ConnectionState(SessionState),
    Message(Message),
    Speaking(bool),
    Volume(u8),
    Chime,
    Error(String),
}

/// Side effects the runtime executes on behalf of the core.
#[derive(Debug)]
pub enum Action {
    /// Forward a capture packet to the transport (fire-and-forget).
    SendAudio(EncodedPacket),
    /// Queue decoded samples on the output sink.
    PlayAudio {
        samples: Vec<f32>,
        sample_rate: u32,
        /// Meter level of this buffer, 0..=255.
        level: u8,
    },
    /// Arm a timer that feeds `PlaybackEnded(id)` back at clock time `at`.
    ArmEndTimer { id: u64, at: Duration },
    /// Arm the 200 ms gap debounce carrying `epoch`.
    ArmGapTimer { epoch: u64 },
    /// Stop and discard all queued speech output.
    StopPlayback,
    /// Sound the confirmation chime.
    PlayChime,
    /// Release devices and transport; the core state is already final.
    Teardown,
    /// Push an observable change to the host.
    Emit(UiEvent),
}

/// The single-consumer session state machine.
pub struct SessionCore<C: OutputClock> {
    state: SessionState,
    scheduler: PlaybackScheduler<C>,
    turn: TurnTracker,
    transcript: TranscriptAssembler,
    messages: Vec<Message>,
}

impl<C: OutputClock> SessionCore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: SessionState::Disconnected,
            scheduler: PlaybackScheduler::new(clock),
            turn: TurnTracker::new(),
            transcript: TranscriptAssembler::new(),
            messages: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_assistant_speaking(&self) -> bool {
        self.turn.is_assistant_speaking()
    }

    pub fn active_buffer_count(&self) -> usize {
        self.scheduler.active_count()
    }

    pub fn playback_cursor(&self) -> Duration {
        self.scheduler.cursor()
    }

    pub fn clock_now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Committed transcript, append-only for the life of the session.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Guarded entry into `Connecting`. Returns false (and changes nothing)
    /// while a session is already connecting or connected. On success all
    /// transient state is reset and the transcript log cleared.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            SessionState::Connecting | SessionState::Connected => {
                debug!(state = ?self.state, "connect ignored, session already live");
                false
            }
            SessionState::Disconnected | SessionState::Error => {
                self.reset_transient();
                self.messages.clear();
                self.state = SessionState::Connecting;
                true
            }
        }
    }

    /// A connect step failed; the runtime tears down after this.
    pub fn connect_failed(&mut self, error: &EngineError) -> Vec<Action> {
        warn!(%error, "Session setup failed");
        self.state = SessionState::Error;
        self.reset_transient();
        vec![
            Action::StopPlayback,
            Action::Teardown,
            Action::Emit(UiEvent::Error(error.to_string())),
            Action::Emit(UiEvent::ConnectionState(self.state)),
        ]
    }

    /// Explicit disconnect completed; always lands in `Disconnected`
    /// regardless of the starting state, any number of times.
    pub fn finish_disconnect(&mut self) -> Vec<Action> {
        self.reset_transient();
        self.state = SessionState::Disconnected;
        vec![Action::Emit(UiEvent::ConnectionState(self.state))]
    }

    /// Process one event fully. The caller guarantees events arrive one at
    /// a time, in order.
    pub fn handle(&mut self, event: EngineEvent) -> Vec<Action> {
        match event {
            EngineEvent::Capture(block) => self.on_capture(block),
            EngineEvent::Transport(event) => self.on_transport(event),
            EngineEvent::PlaybackEnded(id) => self.on_playback_ended(id),
            EngineEvent::SpeakingGap { epoch } => self.on_speaking_gap(epoch),
            EngineEvent::HandshakeDeadline => self.on_handshake_deadline(),
        }
    }

    fn on_capture(&mut self, block: CaptureBlock) -> Vec<Action> {
        // Capture keeps running through interruptions, but packets only
        // flow once the transport acknowledged the session.
        if self.state != SessionState::Connected {
            return Vec::new();
        }
        if block.voiced {
            self.turn.note_user_speech();
        }
        vec![Action::SendAudio(block.packet)]
    }

    fn on_transport(&mut self, event: TransportEvent) -> Vec<Action> {
        match event {
            TransportEvent::Open => {
                if self.state == SessionState::Connecting {
                    self.state = SessionState::Connected;
                    vec![Action::Emit(UiEvent::ConnectionState(self.state))]
                } else {
                    debug!(state = ?self.state, "transport open ignored");
                    Vec::new()
                }
            }
            TransportEvent::Message(event) => self.on_server_event(event),
            TransportEvent::Closed => {
                if self.state == SessionState::Disconnected {
                    return Vec::new();
                }
                self.state = SessionState::Disconnected;
                self.reset_transient();
                vec![
                    Action::StopPlayback,
                    Action::Teardown,
                    Action::Emit(UiEvent::Speaking(false)),
                    Action::Emit(UiEvent::ConnectionState(self.state)),
                ]
            }
            TransportEvent::Error(message) => {
                let error = EngineError::Transport(message);
                warn!(%error, "Transport error, tearing session down");
                self.state = SessionState::Error;
                self.reset_transient();
                vec![
                    Action::StopPlayback,
                    Action::Teardown,
                    Action::Emit(UiEvent::Speaking(false)),
                    Action::Emit(UiEvent::Error(error.to_string())),
                    Action::Emit(UiEvent::ConnectionState(self.state)),
                ]
            }
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(chunk) = &event.audio_chunk {
            match pcm::decode(chunk, OUTPUT_SAMPLE_RATE, 1) {
                Ok(buffer) => {
                    let outcome = self.turn.on_response_chunk();
                    if outcome.play_chime {
                        actions.push(Action::PlayChime);
                        actions.push(Action::Emit(UiEvent::Chime));
                    }
                    if outcome.became_speaking {
                        actions.push(Action::Emit(UiEvent::Speaking(true)));
                    }
                    let scheduled = self.scheduler.schedule(&buffer);
                    actions.push(Action::PlayAudio {
                        level: buffer.level(),
                        sample_rate: buffer.sample_rate,
                        samples: buffer.samples,
                    });
                    actions.push(Action::ArmEndTimer {
                        id: scheduled.id,
                        at: scheduled.end,
                    });
                }
                // Malformed packet: drop it and keep the session alive.
                Err(e) => {
                    let error = EngineError::from(e);
                    warn!(%error, "Dropping malformed audio packet");
                }
            }
        }

        if event.interrupted {
            self.scheduler.clear();
            actions.push(Action::StopPlayback);
            if self.turn.on_interrupted() {
                actions.push(Action::Emit(UiEvent::Speaking(false)));
            }
        }

        if let Some(delta) = &event.input_transcription_delta {
            self.transcript.append(Role::User, delta);
        }
        if let Some(delta) = &event.output_transcription_delta {
            self.transcript.append(Role::Model, delta);
        }

        if event.turn_complete {
            if self.turn.on_turn_complete(self.scheduler.is_idle()) {
                actions.push(Action::Emit(UiEvent::Speaking(false)));
            }
            for message in self.transcript.flush_turn() {
                self.messages.push(message.clone());
                actions.push(Action::Emit(UiEvent::Message(message)));
            }
        }

        actions
    }

    fn on_playback_ended(&mut self, id: u64) -> Vec<Action> {
        match self.scheduler.on_playback_ended(id) {
            Some(epoch) => vec![Action::ArmGapTimer { epoch }],
            None => Vec::new(),
        }
    }

    /// The websocket opened but the remote never acknowledged the setup.
    /// A server that accepts the socket and goes silent must not hold the
    /// devices forever.
    fn on_handshake_deadline(&mut self) -> Vec<Action> {
        if self.state != SessionState::Connecting {
            return Vec::new();
        }
        self.connect_failed(&EngineError::Handshake(
            "setup acknowledgment timed out".into(),
        ))
    }

    fn on_speaking_gap(&mut self, epoch: u64) -> Vec<Action> {
        if self.scheduler.gap_elapsed(epoch) && self.turn.on_playback_idle() {
            vec![Action::Emit(UiEvent::Speaking(false))]
        } else {
            Vec::new()
        }
    }

    /// Cursor to zero, latch cleared, speaker buffers emptied.
    fn reset_transient(&mut self) {
        self.scheduler.clear();
        self.turn.reset();
        self.transcript.reset();
    }
}
