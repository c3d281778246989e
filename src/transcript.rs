//! Transcript assembly.
//!
//! The live API streams partial transcription text for both sides of the
//! conversation. Deltas are concatenated verbatim per speaker and committed
//! as discrete messages when the model signals the end of a turn.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

/// One committed transcript entry.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only text accumulator for one speaker.
///
/// Non-empty only between a turn's first delta and its flush.
#[derive(Debug, Default)]
struct SpeakerBuffer {
    text: String,
}

impl SpeakerBuffer {
    fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Take the accumulated text as a message, or `None` if the buffer holds
    /// nothing but whitespace. The emitted text keeps its whitespace as
    /// accumulated; only the emptiness check trims.
    fn flush(&mut self, role: Role) -> Option<Message> {
        if self.text.trim().is_empty() {
            self.text.clear();
            return None;
        }
        Some(Message {
            id: Uuid::new_v4(),
            role,
            text: std::mem::take(&mut self.text),
            timestamp: Utc::now(),
        })
    }
}

/// Accumulates streamed transcription deltas and flushes them into messages
/// at turn boundaries. One buffer per speaker; buffers never carry over
/// across turns.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    user: SpeakerBuffer,
    model: SpeakerBuffer,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transcription delta verbatim, in arrival order.
    pub fn append(&mut self, role: Role, delta: &str) {
        match role {
            Role::User => self.user.append(delta),
            Role::Model => self.model.append(delta),
        }
    }

    /// Commit the current turn: at most one message per speaker (user first),
    /// then both buffers are empty. Exactly-once per turn-complete signal.
    pub fn flush_turn(&mut self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(msg) = self.user.flush(Role::User) {
            messages.push(msg);
        }
        if let Some(msg) = self.model.flush(Role::Model) {
            messages.push(msg);
        }
        messages
    }

    /// Drop any partial text, e.g. on teardown.
    pub fn reset(&mut self) {
        self.user.text.clear();
        self.model.text.clear();
    }

    #[cfg(test)]
    fn pending(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user.text,
            Role::Model => &self.model.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_concatenate_and_flush_exactly_once() {
        let mut assembler = TranscriptAssembler::new();
        assembler.append(Role::Model, "Hola");
        assembler.append(Role::Model, " ");
        assembler.append(Role::Model, "amigo");

        let messages = assembler.flush_turn();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Model);
        assert_eq!(messages[0].text, "Hola amigo");
        assert!(assembler.pending(Role::Model).is_empty());

        // A second turn-complete with nothing accumulated emits nothing.
        assert!(assembler.flush_turn().is_empty());
    }

    #[test]
    fn both_speakers_flush_user_first() {
        let mut assembler = TranscriptAssembler::new();
        assembler.append(Role::Model, "Bonjour !");
        assembler.append(Role::User, "Salut");

        let messages = assembler.flush_turn();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Model);
        assert!(messages[0].timestamp <= messages[1].timestamp);
    }

    #[test]
    fn whitespace_only_buffer_is_dropped() {
        let mut assembler = TranscriptAssembler::new();
        assembler.append(Role::User, "  \n\t ");
        assert!(assembler.flush_turn().is_empty());
        assert!(assembler.pending(Role::User).is_empty());
    }

    #[test]
    fn surrounding_whitespace_is_preserved_in_emitted_text() {
        let mut assembler = TranscriptAssembler::new();
        assembler.append(Role::User, "  hello ");
        let messages = assembler.flush_turn();
        assert_eq!(messages[0].text, "  hello ");
    }

    #[test]
    fn reset_drops_partial_text() {
        let mut assembler = TranscriptAssembler::new();
        assembler.append(Role::Model, "half a sen");
        assembler.reset();
        assert!(assembler.flush_turn().is_empty());
    }
}
