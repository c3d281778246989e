//! Audio output via rodio.
//!
//! A dedicated blocking thread owns the `OutputStream` and two sinks: one
//! queue for model speech (appends play back-to-back, which is what makes
//! scheduled buffers gapless) and one for the confirmation chime so it can
//! sound over speech. The engine talks to the thread through a command
//! channel; interruption empties the speech queue immediately.

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{chime, OUTPUT_SAMPLE_RATE};
use crate::session::EngineError;

#[derive(Debug)]
enum OutputCmd {
    /// Queue a decoded buffer on the speech sink.
    Append { samples: Vec<f32>, sample_rate: u32 },
    /// Play the confirmation chime on its own sink.
    Chime,
    /// Stop and discard everything queued on the speech sink.
    StopSpeech,
    /// Tear the output thread down.
    Shutdown,
}

/// Handle to the output thread. Dropping it shuts the thread down.
pub struct OutputHandle {
    tx: mpsc::UnboundedSender<OutputCmd>,
}

impl OutputHandle {
    /// Open the default output device on a fresh thread.
    ///
    /// Blocks until the device is acquired so that a missing or busy output
    /// device fails `connect` up front instead of at first playback.
    pub fn open() -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || run_output_thread(rx, ready_tx))
            .map_err(|e| EngineError::DeviceAcquisition(format!("spawn output thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(msg)) => Err(EngineError::DeviceAcquisition(msg)),
            Err(_) => Err(EngineError::DeviceAcquisition(
                "output thread exited before reporting readiness".into(),
            )),
        }
    }

    pub fn append(&self, samples: Vec<f32>, sample_rate: u32) {
        let _ = self.tx.send(OutputCmd::Append {
            samples,
            sample_rate,
        });
    }

    pub fn chime(&self) {
        let _ = self.tx.send(OutputCmd::Chime);
    }

    /// Discard all queued and sounding speech immediately.
    pub fn stop_speech(&self) {
        let _ = self.tx.send(OutputCmd::StopSpeech);
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(OutputCmd::Shutdown);
    }
}

fn run_output_thread(
    mut rx: mpsc::UnboundedReceiver<OutputCmd>,
    ready: std::sync::mpsc::Sender<Result<(), String>>,
) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(format!("no audio output device available: {e}")));
            return;
        }
    };
    let speech = match Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            let _ = ready.send(Err(format!("create speech sink: {e}")));
            return;
        }
    };
    let chime_sink = match Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            let _ = ready.send(Err(format!("create chime sink: {e}")));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    info!("Audio output ready");

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            OutputCmd::Append {
                samples,
                sample_rate,
            } => {
                speech.append(SamplesBuffer::new(1, sample_rate, samples));
            }
            OutputCmd::Chime => {
                chime_sink.append(SamplesBuffer::new(1, OUTPUT_SAMPLE_RATE, chime::render()));
            }
            OutputCmd::StopSpeech => {
                speech.stop();
                // stop() leaves the sink paused on some rodio versions.
                speech.play();
            }
            OutputCmd::Shutdown => break,
        }
    }

    debug!("Audio output thread exiting");
}
