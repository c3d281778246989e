//! Static language and voice tables.
//!
//! The host UI picks a language and a voice; these tables map the language
//! to the tutor system prompt sent in the session setup. Not computed by
//! the engine, just looked up.

/// One supported practice language.
pub struct LanguageProfile {
    pub name: &'static str,
    pub system_prompt: &'static str,
}

pub const DEFAULT_PROMPT: &str = "You are a helpful language tutor.";

pub const LANGUAGES: &[LanguageProfile] = &[
    LanguageProfile {
        name: "English",
        system_prompt: "You are a helpful English tutor. Speak clearly and correct my mistakes gently.",
    },
    LanguageProfile {
        name: "Spanish",
        system_prompt: "You are a native Spanish tutor. Converse in Spanish, help me with vocabulary and grammar.",
    },
    LanguageProfile {
        name: "French",
        system_prompt: "You are a Parisian French tutor. Help me practice my pronunciation and conversational skills.",
    },
    LanguageProfile {
        name: "German",
        system_prompt: "You are a friendly German tutor. Speak standard German and explain complex grammar simply.",
    },
    LanguageProfile {
        name: "Japanese",
        system_prompt: "You are a Japanese language partner. Speak polite Japanese (Desu/Masu) and help me practice daily conversation.",
    },
    LanguageProfile {
        name: "Mandarin Chinese",
        system_prompt: "You are a Mandarin Chinese tutor. Help me with tones and phrasing.",
    },
    LanguageProfile {
        name: "Italian",
        system_prompt: "You are an enthusiastic Italian tutor. Converse about food, culture, and daily life.",
    },
    LanguageProfile {
        name: "Korean",
        system_prompt: "You are a Korean language buddy. Help me practice both formal and informal speech patterns.",
    },
];

/// Prebuilt voices offered by the live API.
pub const VOICES: &[&str] = &["Kore", "Puck", "Charon", "Fenrir", "Zephyr"];

pub const DEFAULT_VOICE: &str = "Kore";

/// Canonical voice name for a configured value, falling back to the
/// default for anything not in [`VOICES`]. The live API rejects setups
/// naming an unknown voice, so bad config degrades instead of failing the
/// connect.
pub fn voice_or_default(voice: &str) -> &'static str {
    VOICES
        .iter()
        .find(|v| v.eq_ignore_ascii_case(voice))
        .copied()
        .unwrap_or(DEFAULT_VOICE)
}

/// System prompt for a language, falling back to the generic tutor prompt
/// for unknown names.
pub fn system_prompt_for(language: &str) -> &'static str {
    LANGUAGES
        .iter()
        .find(|profile| profile.name.eq_ignore_ascii_case(language))
        .map(|profile| profile.system_prompt)
        .unwrap_or(DEFAULT_PROMPT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_language_resolves_case_insensitively() {
        assert!(system_prompt_for("spanish").contains("Spanish tutor"));
    }

    #[test]
    fn unknown_language_falls_back() {
        assert_eq!(system_prompt_for("Klingon"), DEFAULT_PROMPT);
    }

    #[test]
    fn voice_resolves_to_canonical_name() {
        assert_eq!(voice_or_default("puck"), "Puck");
        assert_eq!(voice_or_default("Zephyr"), "Zephyr");
    }

    #[test]
    fn unknown_voice_falls_back() {
        assert_eq!(voice_or_default("HAL9000"), DEFAULT_VOICE);
        assert_eq!(voice_or_default(""), DEFAULT_VOICE);
    }
}
