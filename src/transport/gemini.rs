//! Gemini Live websocket client.
//!
//! Speaks the `BidiGenerateContent` protocol: one websocket per session, a
//! JSON setup message up front, then `realtimeInput` audio frames out and
//! `serverContent` messages in. A writer task drains an unbounded command
//! channel (so `send` never blocks) and a reader task parses inbound frames
//! into [`TransportEvent`]s.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use super::{LiveTransport, ServerEvent, SessionConfig, TransportConnector, TransportEvent};
use crate::pcm::EncodedPacket;
use crate::session::EngineError;

/// Native-audio live model used by the tutor sessions.
pub const MODEL_NAME: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

const ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Give up on the websocket upgrade after this long.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands for the writer task.
enum WriterCmd {
    Frame(String),
    Close,
}

/// Connector holding the API key.
pub struct GeminiConnector {
    api_key: String,
}

impl GeminiConnector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl TransportConnector for GeminiConnector {
    fn open(
        &self,
        config: SessionConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn LiveTransport>, EngineError>> + Send + '_>>
    {
        let url = format!("{ENDPOINT}?key={}", self.api_key);
        Box::pin(async move {
            let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&url))
                .await
                .map_err(|_| EngineError::Handshake("websocket connect timed out".into()))?
                .map_err(|e| EngineError::Handshake(format!("websocket connect: {e}")))?;

            let (mut ws_tx, mut ws_rx) = ws.split();

            let setup = setup_message(&config).to_string();
            ws_tx
                .send(WsMessage::Text(setup))
                .await
                .map_err(|e| EngineError::Handshake(format!("send setup: {e}")))?;

            debug!(model = %config.model, voice = %config.voice_id, "Live session setup sent");

            // Writer task: drain outbound frames.
            let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<WriterCmd>();
            tokio::spawn(async move {
                while let Some(cmd) = cmd_rx.recv().await {
                    match cmd {
                        WriterCmd::Frame(frame) => {
                            if ws_tx.send(WsMessage::Text(frame)).await.is_err() {
                                // Reader will report the failure.
                                break;
                            }
                        }
                        WriterCmd::Close => {
                            let _ = ws_tx.send(WsMessage::Close(None)).await;
                            break;
                        }
                    }
                }
            });

            // Reader task: parse inbound frames into transport events.
            tokio::spawn(async move {
                while let Some(item) = ws_rx.next().await {
                    match item {
                        Ok(WsMessage::Text(text)) => {
                            forward_server_message(&text, &events);
                        }
                        Ok(WsMessage::Binary(bytes)) => {
                            // The Live API delivers JSON in binary frames too.
                            match std::str::from_utf8(&bytes) {
                                Ok(text) => forward_server_message(text, &events),
                                Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            let _ = events.send(TransportEvent::Closed);
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = events.send(TransportEvent::Error(e.to_string()));
                            return;
                        }
                    }
                }
                let _ = events.send(TransportEvent::Closed);
            });

            Ok(Box::new(GeminiLiveTransport { cmd_tx }) as Box<dyn LiveTransport>)
        })
    }
}

/// Send path for one live session.
struct GeminiLiveTransport {
    cmd_tx: mpsc::UnboundedSender<WriterCmd>,
}

impl LiveTransport for GeminiLiveTransport {
    fn send(&self, packet: &EncodedPacket) {
        let frame = realtime_input_message(packet).to_string();
        let _ = self.cmd_tx.send(WriterCmd::Frame(frame));
    }

    fn close(&self) {
        let _ = self.cmd_tx.send(WriterCmd::Close);
    }
}

fn forward_server_message(text: &str, events: &mpsc::UnboundedSender<TransportEvent>) {
    match parse_server_message(text) {
        Some(event) => {
            let _ = events.send(event);
        }
        None => debug!("Ignoring unrecognized server message"),
    }
}

/// Session setup frame: audio-only responses, prebuilt voice, system
/// instruction, transcription for both directions.
fn setup_message(config: &SessionConfig) -> Value {
    let mut setup = json!({
        "model": format!("models/{}", config.model),
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": config.voice_id }
                }
            }
        },
        "systemInstruction": {
            "parts": [{ "text": config.system_prompt }]
        }
    });
    if config.enable_input_transcription {
        setup["inputAudioTranscription"] = json!({});
    }
    if config.enable_output_transcription {
        setup["outputAudioTranscription"] = json!({});
    }
    json!({ "setup": setup })
}

/// Streaming microphone frame.
fn realtime_input_message(packet: &EncodedPacket) -> Value {
    json!({
        "realtimeInput": {
            "audio": {
                "data": packet.data,
                "mimeType": packet.mime_type
            }
        }
    })
}

/// Reduce a raw server frame to the event the engine consumes. Returns
/// `None` for frames the engine has no use for.
fn parse_server_message(text: &str) -> Option<TransportEvent> {
    let value: Value = serde_json::from_str(text).ok()?;

    if value.get("setupComplete").is_some() {
        return Some(TransportEvent::Open);
    }

    let content = value.get("serverContent")?;
    let event = ServerEvent {
        audio_chunk: content
            .pointer("/modelTurn/parts/0/inlineData/data")
            .and_then(Value::as_str)
            .map(String::from),
        input_transcription_delta: content
            .pointer("/inputTranscription/text")
            .and_then(Value::as_str)
            .map(String::from),
        output_transcription_delta: content
            .pointer("/outputTranscription/text")
            .and_then(Value::as_str)
            .map(String::from),
        turn_complete: content
            .get("turnComplete")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        interrupted: content
            .get("interrupted")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };
    Some(TransportEvent::Message(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SessionConfig {
        SessionConfig {
            model: MODEL_NAME.to_string(),
            voice_id: "Kore".to_string(),
            system_prompt: "You are a helpful English tutor.".to_string(),
            enable_input_transcription: true,
            enable_output_transcription: true,
        }
    }

    #[test]
    fn setup_message_shape() {
        let setup = setup_message(&test_config());
        assert_eq!(
            setup.pointer("/setup/model").unwrap(),
            &json!(format!("models/{MODEL_NAME}"))
        );
        assert_eq!(
            setup.pointer("/setup/generationConfig/responseModalities").unwrap(),
            &json!(["AUDIO"])
        );
        assert_eq!(
            setup
                .pointer("/setup/generationConfig/speechConfig/voiceConfig/prebuiltVoiceConfig/voiceName")
                .unwrap(),
            &json!("Kore")
        );
        assert!(setup.pointer("/setup/inputAudioTranscription").is_some());
        assert!(setup.pointer("/setup/outputAudioTranscription").is_some());
    }

    #[test]
    fn setup_message_omits_disabled_transcription() {
        let mut config = test_config();
        config.enable_input_transcription = false;
        let setup = setup_message(&config);
        assert!(setup.pointer("/setup/inputAudioTranscription").is_none());
        assert!(setup.pointer("/setup/outputAudioTranscription").is_some());
    }

    #[test]
    fn realtime_input_carries_mime_tag() {
        let packet = crate::pcm::encode(&[0.0; 16]);
        let frame = realtime_input_message(&packet);
        assert_eq!(
            frame.pointer("/realtimeInput/audio/mimeType").unwrap(),
            &json!("audio/pcm;rate=16000")
        );
        assert!(frame.pointer("/realtimeInput/audio/data").is_some());
    }

    #[test]
    fn parse_setup_complete_is_open() {
        assert!(matches!(
            parse_server_message(r#"{"setupComplete": {}}"#),
            Some(TransportEvent::Open)
        ));
    }

    #[test]
    fn parse_server_content_fields() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": { "parts": [{ "inlineData": { "data": "AAAA", "mimeType": "audio/pcm;rate=24000" } }] },
                "inputTranscription": { "text": "hola" },
                "outputTranscription": { "text": "bonjour" },
                "turnComplete": true
            }
        }"#;
        match parse_server_message(raw) {
            Some(TransportEvent::Message(ev)) => {
                assert_eq!(ev.audio_chunk.as_deref(), Some("AAAA"));
                assert_eq!(ev.input_transcription_delta.as_deref(), Some("hola"));
                assert_eq!(ev.output_transcription_delta.as_deref(), Some("bonjour"));
                assert!(ev.turn_complete);
                assert!(!ev.interrupted);
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[test]
    fn parse_interrupted_flag() {
        let raw = r#"{"serverContent": {"interrupted": true}}"#;
        match parse_server_message(raw) {
            Some(TransportEvent::Message(ev)) => {
                assert!(ev.interrupted);
                assert_eq!(ev, ServerEvent { interrupted: true, ..Default::default() });
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[test]
    fn parse_ignores_unrelated_frames() {
        assert!(parse_server_message(r#"{"usageMetadata": {}}"#).is_none());
        assert!(parse_server_message("not json").is_none());
    }
}
