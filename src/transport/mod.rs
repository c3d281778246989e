//! Remote live-session transport.
//!
//! The engine consumes the transport purely through this contract: open a
//! session with a config, stream encoded audio packets at it, receive a
//! stream of typed events back. The production implementation is the Gemini
//! Live websocket client in [`gemini`]; tests substitute an in-memory mock.

pub mod gemini;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::pcm::EncodedPacket;
use crate::session::EngineError;

/// One decoded server message, reduced to the fields the engine consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerEvent {
    /// Base64 PCM chunk of synthesized speech.
    pub audio_chunk: Option<String>,
    /// Partial transcription of what the user said.
    pub input_transcription_delta: Option<String>,
    /// Partial transcription of what the model is saying.
    pub output_transcription_delta: Option<String>,
    /// The model finished its turn.
    pub turn_complete: bool,
    /// The user barged in over the model's speech.
    pub interrupted: bool,
}

/// Inbound transport callbacks, delivered as events on a channel.
#[derive(Debug)]
pub enum TransportEvent {
    /// The remote side acknowledged the session setup.
    Open,
    Message(ServerEvent),
    Closed,
    Error(String),
}

/// Session configuration handed to `open`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub voice_id: String,
    pub system_prompt: String,
    pub enable_input_transcription: bool,
    pub enable_output_transcription: bool,
}

/// A live transport handle. At most one exists per session.
pub trait LiveTransport: Send {
    /// Fire-and-forget streaming input; never blocks the caller.
    fn send(&self, packet: &EncodedPacket);

    /// Idempotent, best-effort close.
    fn close(&self);
}

/// Opens transports. A trait so the engine can run against a mock.
pub trait TransportConnector: Send + Sync {
    /// Open a session. Events flow into `events` until the transport closes
    /// or errors; the returned handle is the send path.
    fn open(
        &self,
        config: SessionConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn LiveTransport>, EngineError>> + Send + '_>>;
}
