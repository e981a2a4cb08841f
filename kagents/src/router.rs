//! Intent routing: picks the specialist for a message. Never fails.

use std::fmt::{Display, Formatter};

use kprovider::{GatewayError, InferenceGateway, ReasoningEffort, Turn};

use crate::specialist::SpecialistId;

const ROUTE_PROMPT: &str = "You route messages for KODA, a companion for people who are the \
first in their family to study.

Pick the one specialist that should answer:
- COMPASS: first contact, emotional support, general orientation. Use it for anyone new, \
unsure, overwhelmed, or when nothing else fits.
- FINANCING: student aid (BAföG), scholarships, living costs, student jobs, loans.
- STUDY_CHOICE: degree programs, universities, admission restrictions, applications, kinds of \
higher education institutions.
- ACADEMIC_BASICS: how university works, academic vocabulary, degree versus apprenticeship.
- ROLE_MODELS: motivation, role models, career ideas, impostor feelings, self-doubt.

Reply with nothing but:
AGENT: <NAME>

When in doubt, choose COMPASS.";

const ROUTE_MAX_TOKENS: u32 = 50;

/// How to choose when the model's reply names more than one specialist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RouteTieBreak {
    /// First id in [`SpecialistId::ALL`] order.
    #[default]
    DeclarationOrder,
    /// The id whose token occurs first in the reply.
    EarliestMention,
}

impl RouteTieBreak {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeclarationOrder => "declaration_order",
            Self::EarliestMention => "earliest_mention",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "declaration_order" => Some(Self::DeclarationOrder),
            "earliest_mention" => Some(Self::EarliestMention),
            _ => None,
        }
    }
}

impl Display for RouteTieBreak {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct IntentRouter {
    gateway: InferenceGateway,
    tie_break: RouteTieBreak,
}

impl IntentRouter {
    pub fn new(gateway: InferenceGateway) -> Self {
        Self {
            gateway,
            tie_break: RouteTieBreak::default(),
        }
    }

    pub fn with_tie_break(mut self, tie_break: RouteTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn tie_break(&self) -> RouteTieBreak {
        self.tie_break
    }

    pub async fn route(&self, message: &str) -> SpecialistId {
        match self.classify(message).await {
            Ok(reply) => self.pick(&reply).unwrap_or(SpecialistId::DEFAULT),
            Err(error) => {
                tracing::warn!(
                    phase = "route",
                    event = "routing_failed",
                    kind = error.kind.as_str(),
                    error = %error,
                    fallback = SpecialistId::DEFAULT.as_str()
                );
                SpecialistId::DEFAULT
            }
        }
    }

    /// The specialist named in `reply`, if any, under this router's tie-break rule.
    pub fn pick(&self, reply: &str) -> Option<SpecialistId> {
        let reply = reply.to_uppercase();

        match self.tie_break {
            RouteTieBreak::DeclarationOrder => SpecialistId::ALL
                .into_iter()
                .find(|id| reply.contains(id.as_str())),
            RouteTieBreak::EarliestMention => SpecialistId::ALL
                .into_iter()
                .filter_map(|id| reply.find(id.as_str()).map(|position| (position, id)))
                .min_by_key(|(position, _)| *position)
                .map(|(_, id)| id),
        }
    }

    async fn classify(&self, message: &str) -> Result<String, GatewayError> {
        let request = self
            .gateway
            .request()
            .turn(Turn::user(message))
            .persona_prompt(ROUTE_PROMPT)
            .reasoning_effort(ReasoningEffort::Low)
            .temperature(0.0)
            .max_tokens(ROUTE_MAX_TOKENS)
            .build()?;

        let response = self.gateway.call(request).await?;
        Ok(response.extract_text())
    }
}
