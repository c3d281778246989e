//! Parla: real-time duplex voice session engine.
//!
//! Streams microphone audio to a remote conversational speech model and
//! plays the model's synthesized replies back gaplessly, while assembling
//! streamed transcription into discrete messages and tracking turn
//! boundaries, interruption, and connection state. The binary exposes the
//! engine to a host UI over JSON-line IPC on stdin/stdout.

pub mod audio;
pub mod config;
pub mod ipc;
pub mod languages;
pub mod pcm;
pub mod playback;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod turn;
