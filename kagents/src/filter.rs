//! Shame-language detection on outgoing text. Matches are logged, never rewritten.

const SHAME_PATTERNS: &[&str] = &[
    "you should know",
    "this is basic",
    "everyone knows",
    "obviously",
    "common knowledge",
    "should have learned",
    "das solltest du wissen",
    "das ist grundwissen",
    "jeder weiss",
    "jeder weiß",
    "selbstverstaendlich",
    "selbstverständlich",
];

#[derive(Debug, Clone)]
pub struct ContentFilter {
    patterns: Vec<String>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(SHAME_PATTERNS.iter().copied())
    }
}

impl ContentFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|pattern| pattern.into().trim().to_lowercase())
                .filter(|pattern| !pattern.is_empty())
                .collect(),
        }
    }

    pub fn detect(&self, text: &str) -> Vec<&str> {
        let lower = text.to_lowercase();
        self.patterns
            .iter()
            .filter(|pattern| lower.contains(pattern.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Logs every matched pattern and returns `text` unchanged.
    pub fn apply(&self, text: String) -> String {
        for pattern in self.detect(&text) {
            tracing::warn!(phase = "filter", event = "shame_pattern_detected", pattern);
        }
        text
    }
}
