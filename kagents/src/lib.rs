//! Specialist agents, intent routing, and crisis scanning.
//!
//! Every component here talks to the model through a shared
//! [`kprovider::InferenceGateway`]; none of them hold conversation state.

mod agent;
mod filter;
pub mod i18n;
mod language;
mod personas;
mod router;
mod safety;
mod specialist;

#[cfg(test)]
mod test_support;

pub mod prelude {
    pub use crate::{
        AgentEvent, AgentEventStream, ContentFilter, CrisisCategory, CrisisResources,
        IntentRouter, Language, RouteTieBreak, SafetyAssessment, SafetyScanner, SpecialistAgent,
        SpecialistDescriptor, SpecialistId, SpecialistRegistry,
    };
}

pub use agent::{
    AgentEvent, AgentEventStream, LANGUAGE_INSTRUCTION, SpecialistAgent, build_context_addendum,
};
pub use filter::ContentFilter;
pub use i18n::Language;
pub use language::{DETECTION_WINDOW, detect_for_turns, detect_language};
pub use router::{IntentRouter, RouteTieBreak};
pub use safety::{
    CrisisCategory, CrisisResource, CrisisResources, SafetyAssessment, SafetyScanner,
    parse_assessment,
};
pub use specialist::{SpecialistDescriptor, SpecialistId, SpecialistRegistry};
