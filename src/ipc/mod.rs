//! IPC protocol types for communication with the host UI.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (engine -> host).
//! Commands use `{"command": "<name>", ...}` format (host -> engine).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::config::LiveConfig;
use crate::session::{SessionState, UiEvent};
use crate::transcript::Message;

// ---------------------------------------------------------------------------
// Events: engine -> host (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the host via stdout as JSON lines.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HostEvent {
    Starting {},
    Ready {},
    ConnectionState { state: SessionState },
    Message(Message),
    Speaking { active: bool },
    Volume { level: u8 },
    Chime {},
    Error { message: String },
    Pong {},
    Stopping {},
}

impl From<UiEvent> for HostEvent {
    fn from(event: UiEvent) -> Self {
        match event {
            UiEvent::ConnectionState(state) => Self::ConnectionState { state },
            UiEvent::Message(message) => Self::Message(message),
            UiEvent::Speaking(active) => Self::Speaking { active },
            UiEvent::Volume(level) => Self::Volume { level },
            UiEvent::Chime => Self::Chime {},
            UiEvent::Error(message) => Self::Error { message },
        }
    }
}

// ---------------------------------------------------------------------------
// Commands: host -> engine (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the host via stdin as JSON lines.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum HostCommand {
    Connect {},
    Disconnect {},
    SetConfig {
        #[serde(flatten)]
        config: LiveConfig,
    },
    Ping {},
    Stop {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag_and_data() {
        let json = serde_json::to_string(&HostEvent::ConnectionState {
            state: SessionState::Connecting,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"connection_state","data":{"state":"connecting"}}"#);
    }

    #[test]
    fn speaking_event_shape() {
        let json = serde_json::to_string(&HostEvent::Speaking { active: true }).unwrap();
        assert_eq!(json, r#"{"event":"speaking","data":{"active":true}}"#);
    }

    #[test]
    fn chime_event_shape() {
        let json = serde_json::to_string(&HostEvent::from(UiEvent::Chime)).unwrap();
        assert_eq!(json, r#"{"event":"chime","data":{}}"#);
    }

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: HostCommand = serde_json::from_str(r#"{"command": "connect"}"#).unwrap();
        assert!(matches!(cmd, HostCommand::Connect {}));

        let cmd: HostCommand =
            serde_json::from_str(r#"{"command": "set_config", "language": "German", "voice": "Puck"}"#)
                .unwrap();
        match cmd {
            HostCommand::SetConfig { config } => {
                assert_eq!(config.language, "German");
                assert_eq!(config.voice, "Puck");
            }
            other => panic!("expected set_config, got {other:?}"),
        }
    }
}
