//! Lightweight language guess used to localize fallback messages.

use kprovider::{Role, Turn};

use crate::i18n::Language;

/// Number of leading tokens inspected.
pub const DETECTION_WINDOW: usize = 10;

// Function words that are unambiguous against English ("die", "was", "will" are left out).
const GERMAN_MARKERS: &[&str] = &[
    "ich", "du", "und", "ist", "nicht", "das", "der", "dem", "den", "ein", "eine", "einen",
    "mein", "meine", "kann", "habe", "hab", "wir", "mit", "für", "auf", "zu", "sind", "bitte",
    "warum", "wie", "welche", "wo", "wer", "kein", "keine", "mir", "mich", "dich", "auch",
    "oder", "aber", "noch", "sehr", "gibt", "soll", "muss", "hallo", "bekomme", "weiß",
];

pub fn detect_language(text: &str) -> Language {
    let is_german = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|token| !token.is_empty())
        .take(DETECTION_WINDOW)
        .any(|token| GERMAN_MARKERS.contains(&token.to_lowercase().as_str()));

    if is_german {
        Language::De
    } else {
        Language::BASELINE
    }
}

/// Language of the most recent user turn, or the baseline when there is none.
pub fn detect_for_turns(turns: &[Turn]) -> Language {
    turns
        .iter()
        .rev()
        .find(|turn| turn.role == Role::User)
        .map(|turn| detect_language(&turn.text))
        .unwrap_or(Language::BASELINE)
}
