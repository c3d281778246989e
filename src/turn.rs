//! Conversational turn tracking.
//!
//! A deliberately small state machine: the remote model is authoritative for
//! turn-taking, so the engine only tracks whether the assistant is audibly
//! speaking, plus a sticky "the user has spoken" latch used to play a single
//! confirmation chime when the model starts answering.

/// Coarse speaking state derived from playback activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AssistantSpeaking,
}

/// Outcome of feeding a response audio chunk into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Play the confirmation chime (first chunk after the user spoke).
    pub play_chime: bool,
    /// The speaking indicator turned on with this chunk.
    pub became_speaking: bool,
}

/// Tracks the assistant-speaking indicator and the user-spoke latch.
///
/// The latch is edge-triggered by capture energy and cleared only here,
/// never by silence.
#[derive(Debug)]
pub struct TurnTracker {
    state: TurnState,
    user_spoke: bool,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self {
            state: TurnState::Idle,
            user_spoke: false,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_assistant_speaking(&self) -> bool {
        self.state == TurnState::AssistantSpeaking
    }

    #[cfg(test)]
    pub fn user_spoke(&self) -> bool {
        self.user_spoke
    }

    /// Capture saw a block with speech energy. Latched until the next
    /// assistant response begins.
    pub fn note_user_speech(&mut self) {
        self.user_spoke = true;
    }

    /// A response audio chunk was scheduled. The first chunk after the user
    /// spoke consumes the latch and requests one chime for the turn.
    pub fn on_response_chunk(&mut self) -> ChunkOutcome {
        let became_speaking = self.state == TurnState::Idle;
        self.state = TurnState::AssistantSpeaking;
        let play_chime = self.user_spoke;
        self.user_spoke = false;
        ChunkOutcome {
            play_chime,
            became_speaking,
        }
    }

    /// The playback gap debounce elapsed with nothing left sounding.
    /// Returns true if the indicator turned off.
    pub fn on_playback_idle(&mut self) -> bool {
        if self.state == TurnState::AssistantSpeaking {
            self.state = TurnState::Idle;
            true
        } else {
            false
        }
    }

    /// The model reported the user barged in. Immediate, no debounce.
    /// Returns true if the indicator turned off.
    pub fn on_interrupted(&mut self) -> bool {
        self.on_playback_idle()
    }

    /// Turn-complete failsafe: normally the playback debounce already ended
    /// the speaking state, but if nothing is sounding force idle now.
    /// Returns true if the indicator turned off.
    pub fn on_turn_complete(&mut self, active_buffers_empty: bool) -> bool {
        if active_buffers_empty {
            self.on_playback_idle()
        } else {
            false
        }
    }

    /// Teardown: back to initial values.
    pub fn reset(&mut self) {
        self.state = TurnState::Idle;
        self.user_spoke = false;
    }
}

impl Default for TurnTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chime_plays_once_per_turn() {
        let mut turn = TurnTracker::new();
        turn.note_user_speech();

        let first = turn.on_response_chunk();
        assert!(first.play_chime);
        assert!(first.became_speaking);
        assert_eq!(turn.state(), TurnState::AssistantSpeaking);

        // Second chunk of the same response: no retrigger.
        let second = turn.on_response_chunk();
        assert!(!second.play_chime);
        assert!(!second.became_speaking);
    }

    #[test]
    fn no_chime_without_user_speech() {
        let mut turn = TurnTracker::new();
        assert!(!turn.on_response_chunk().play_chime);
    }

    #[test]
    fn latch_survives_silence_until_next_response() {
        let mut turn = TurnTracker::new();
        turn.note_user_speech();
        // Silence never clears the latch; only the response chunk does.
        assert!(turn.user_spoke());
        assert!(turn.on_response_chunk().play_chime);
        assert!(!turn.user_spoke());
    }

    #[test]
    fn interruption_forces_idle() {
        let mut turn = TurnTracker::new();
        turn.on_response_chunk();
        assert!(turn.on_interrupted());
        assert_eq!(turn.state(), TurnState::Idle);
        // Already idle: no transition reported.
        assert!(!turn.on_interrupted());
    }

    #[test]
    fn turn_complete_failsafe_only_when_nothing_sounding() {
        let mut turn = TurnTracker::new();
        turn.on_response_chunk();
        assert!(!turn.on_turn_complete(false));
        assert_eq!(turn.state(), TurnState::AssistantSpeaking);
        assert!(turn.on_turn_complete(true));
        assert_eq!(turn.state(), TurnState::Idle);
    }
}
