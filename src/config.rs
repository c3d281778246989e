//! Session configuration.
//!
//! `parla_config.json` (written by the host UI's settings panel) selects
//! the practice language and voice; the API key comes from the
//! environment and is never persisted.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::languages;

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Live session settings chosen in the host UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_voice")]
    pub voice: String,
}

fn default_language() -> String {
    "English".to_string()
}

fn default_voice() -> String {
    languages::DEFAULT_VOICE.to_string()
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            voice: default_voice(),
        }
    }
}

/// Read the live config, falling back to defaults when the file is missing
/// or unparseable.
pub fn read_live_config() -> LiveConfig {
    read_json_file(&config_path()).unwrap_or_default()
}

/// Path to parla_config.json in the platform config directory.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parla")
        .join("parla_config.json")
}

/// API key from the environment, if set.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
