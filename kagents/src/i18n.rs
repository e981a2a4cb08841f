//! Backend-owned localized messages.
//!
//! ```rust
//! use kagents::i18n::{self, Language, keys};
//!
//! assert_eq!(Language::from_code("DE"), Some(Language::De));
//! assert!(!i18n::text(Language::De, keys::FALLBACK_ERROR).is_empty());
//! ```

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    En,
    De,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::De];

    /// Used whenever detection is inconclusive.
    pub const BASELINE: Language = Language::En;

    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::De => "de",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "de" => Some(Self::De),
            _ => None,
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

pub mod keys {
    pub const FALLBACK_ERROR: &str = "fallback_error";
    pub const FALLBACK_EMPTY: &str = "fallback_empty";
    pub const CRISIS_BANNER: &str = "crisis_banner";
    pub const LABEL_COMPASS: &str = "label_compass";
    pub const LABEL_FINANCING: &str = "label_financing";
    pub const LABEL_STUDY_CHOICE: &str = "label_study_choice";
    pub const LABEL_ACADEMIC_BASICS: &str = "label_academic_basics";
    pub const LABEL_ROLE_MODELS: &str = "label_role_models";
    pub const LABEL_CRISIS: &str = "label_crisis";
}

pub type Table = &'static [(&'static str, &'static str)];

const EN: Table = &[
    (
        keys::FALLBACK_ERROR,
        "Sorry, I'm having a temporary issue right now. Please try again in a moment.",
    ),
    (
        keys::FALLBACK_EMPTY,
        "I couldn't put an answer together just now. Could you ask again, maybe in other words?",
    ),
    (
        keys::CRISIS_BANNER,
        "I notice you may be going through a difficult time. Here are immediate resources:",
    ),
    (keys::LABEL_COMPASS, "KODA Compass"),
    (keys::LABEL_FINANCING, "Finance Advisor"),
    (keys::LABEL_STUDY_CHOICE, "Study Advisor"),
    (keys::LABEL_ACADEMIC_BASICS, "Academic Coach"),
    (keys::LABEL_ROLE_MODELS, "Role Models"),
    (keys::LABEL_CRISIS, "Crisis Support"),
];

const DE: Table = &[
    (
        keys::FALLBACK_ERROR,
        "Entschuldige, ich habe gerade ein technisches Problem. Bitte versuche es gleich noch einmal.",
    ),
    (
        keys::FALLBACK_EMPTY,
        "Ich konnte gerade keine Antwort formulieren. Magst du deine Frage noch einmal anders stellen?",
    ),
    (
        keys::CRISIS_BANNER,
        "Ich merke, dass es dir gerade nicht gut geht. Hier sind sofortige Anlaufstellen:",
    ),
    (keys::LABEL_COMPASS, "KODA Kompass"),
    (keys::LABEL_FINANCING, "Finanzberater"),
    (keys::LABEL_STUDY_CHOICE, "Studienberater"),
    (keys::LABEL_ACADEMIC_BASICS, "Akademischer Coach"),
    (keys::LABEL_ROLE_MODELS, "Vorbilder"),
    (keys::LABEL_CRISIS, "Krisenunterstützung"),
];

pub fn table(language: Language) -> Table {
    match language {
        Language::En => EN,
        Language::De => DE,
    }
}

pub fn lookup(language: Language, key: &str) -> Option<&'static str> {
    table(language)
        .iter()
        .find_map(|(candidate, value)| (*candidate == key).then_some(*value))
}

/// Localized text for `key`; falls back to the baseline table, then to the key itself.
pub fn text(language: Language, key: &'static str) -> &'static str {
    lookup(language, key)
        .or_else(|| lookup(Language::BASELINE, key))
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn key_set(language: Language) -> BTreeSet<&'static str> {
        table(language).iter().map(|(key, _)| *key).collect()
    }

    #[test]
    fn every_locale_has_the_same_keys_and_no_empty_values() {
        let baseline = key_set(Language::BASELINE);
        assert!(!baseline.is_empty());

        for language in Language::ALL {
            assert_eq!(key_set(language), baseline, "key set mismatch for {language}");
            assert_eq!(
                table(language).len(),
                baseline.len(),
                "duplicate keys in {language}"
            );
            for (key, value) in table(language) {
                assert!(!value.trim().is_empty(), "{language}:{key} is empty");
            }
        }
    }

    #[test]
    fn text_falls_back_to_the_key_for_unknown_entries() {
        assert_eq!(text(Language::De, "no_such_key"), "no_such_key");
        assert_eq!(
            text(Language::De, keys::LABEL_ROLE_MODELS),
            "Vorbilder"
        );
    }

    #[test]
    fn language_codes_round_trip() {
        for language in Language::ALL {
            assert_eq!(Language::from_code(language.code()), Some(language));
        }
        assert_eq!(Language::from_code("fr"), None);
    }
}
