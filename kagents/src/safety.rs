//! Crisis scanning that runs alongside every chat turn.
//!
//! The scanner asks the model for a two-line verdict and parses it leniently.
//! A positive verdict carries the static resource list, which the chat service
//! renders above the specialist's answer.
//!
//! ```rust
//! use kagents::{CrisisCategory, CrisisResources, parse_assessment};
//!
//! let assessment = parse_assessment("**crisis:** yes\nTYPE: financial", &CrisisResources::builtin());
//! assert!(assessment.is_crisis);
//! assert_eq!(assessment.category, CrisisCategory::Financial);
//! assert_eq!(assessment.resources.map(|r| r.len()), Some(5));
//! ```

use std::fmt::{Display, Formatter};

use kprovider::{GatewayError, InferenceGateway, ReasoningEffort, Turn};

const SCAN_PROMPT: &str = "You screen messages sent to a support service for people who are \
the first in their family to go to university.

Look for signs of:
1. FINANCIAL: cannot pay for rent or food, about to drop out for lack of money.
2. MENTAL: hopelessness, self-harm, extreme isolation, despair.
3. DROPOUT: wants to abandon their studies and sees no point in continuing.
4. ACUTE: homelessness, violence, immediate physical danger.

Judge the context, not single words. Frustration about an exam is not a crisis. \
\"I can't do this anymore, I just want to disappear\" may be one.

Answer with exactly these two lines and nothing else:
CRISIS: YES or NO
TYPE: FINANCIAL | MENTAL | DROPOUT | ACUTE | NONE";

const SCAN_MAX_TOKENS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrisisCategory {
    Financial,
    Mental,
    Dropout,
    Acute,
    /// Flagged as a crisis without a usable type line.
    Unspecified,
    None,
}

impl CrisisCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Mental => "mental",
            Self::Dropout => "dropout",
            Self::Acute => "acute",
            Self::Unspecified => "unspecified",
            Self::None => "none",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        [
            ("FINANCIAL", Self::Financial),
            ("MENTAL", Self::Mental),
            ("DROPOUT", Self::Dropout),
            ("ACUTE", Self::Acute),
            ("NONE", Self::None),
        ]
        .into_iter()
        .find(|(name, _)| token.starts_with(name))
        .map(|(_, category)| category)
    }
}

impl Display for CrisisCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrisisResource {
    pub key: String,
    pub value: String,
}

/// Ordered list of help resources shown with a crisis banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrisisResources {
    entries: Vec<CrisisResource>,
}

impl CrisisResources {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| CrisisResource {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new([
            ("emergency", "112 (Emergency) / 110 (Police)"),
            (
                "crisis_hotline",
                "Telefonseelsorge: 0800 111 0 111 (free, 24/7, Germany)",
            ),
            (
                "student_counseling",
                "Free psychological counseling at your university's Studierendenwerk",
            ),
            (
                "financial_emergency",
                "BAföG office: emergency advance payment application (Vorausleistung)",
            ),
            (
                "peer_support",
                "ArbeiterKind.de: mentoring network for first-generation students",
            ),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CrisisResource> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Banner line, one bullet per resource, then a blank line.
    pub fn render_prefix(&self, banner: &str) -> String {
        let mut prefix = format!("⚠️ {banner}\n");
        for resource in &self.entries {
            prefix.push_str("• ");
            prefix.push_str(&resource.value);
            prefix.push('\n');
        }
        prefix.push('\n');
        prefix
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyAssessment {
    pub is_crisis: bool,
    pub category: CrisisCategory,
    pub resources: Option<CrisisResources>,
}

impl SafetyAssessment {
    pub fn clear() -> Self {
        Self {
            is_crisis: false,
            category: CrisisCategory::None,
            resources: None,
        }
    }
}

/// Parses a scanner verdict. Markdown emphasis, letter case, and whitespace
/// around the separators are ignored; anything unrecognized means no crisis.
pub fn parse_assessment(reply: &str, resources: &CrisisResources) -> SafetyAssessment {
    let mut is_crisis = false;
    let mut category = None;

    for line in reply.lines() {
        let compact = line
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '*')
            .collect::<String>()
            .to_uppercase();

        if compact.contains("CRISIS:YES") {
            is_crisis = true;
        }
        if category.is_none()
            && let Some(index) = compact.find("TYPE:")
        {
            category = CrisisCategory::from_token(&compact[index + "TYPE:".len()..]);
        }
    }

    if !is_crisis {
        return SafetyAssessment::clear();
    }

    let category = match category {
        Some(CrisisCategory::None) | None => CrisisCategory::Unspecified,
        Some(category) => category,
    };

    SafetyAssessment {
        is_crisis,
        category,
        resources: Some(resources.clone()),
    }
}

#[derive(Debug, Clone)]
pub struct SafetyScanner {
    gateway: InferenceGateway,
    resources: CrisisResources,
}

impl SafetyScanner {
    pub fn new(gateway: InferenceGateway) -> Self {
        Self::with_resources(gateway, CrisisResources::builtin())
    }

    pub fn with_resources(gateway: InferenceGateway, resources: CrisisResources) -> Self {
        Self { gateway, resources }
    }

    pub fn resources(&self) -> &CrisisResources {
        &self.resources
    }

    pub async fn scan(&self, message: &str) -> Result<SafetyAssessment, GatewayError> {
        let request = self
            .gateway
            .request()
            .turn(Turn::user(message))
            .persona_prompt(SCAN_PROMPT)
            .reasoning_effort(ReasoningEffort::Low)
            .temperature(0.0)
            .max_tokens(SCAN_MAX_TOKENS)
            .build()?;

        let response = self.gateway.call(request).await?;
        let assessment = parse_assessment(&response.extract_text(), &self.resources);

        if assessment.is_crisis {
            tracing::warn!(
                phase = "safety",
                event = "crisis_detected",
                category = assessment.category.as_str()
            );
        }

        Ok(assessment)
    }
}
