//! Specialist agents: persona prompt assembly, the gateway call, and post-processing.
//!
//! `respond` never fails. Gateway errors and panics inside the call become a
//! localized fallback message, so the chat service always has text to return.

use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use futures_util::{FutureExt, StreamExt};
use kcommon::MetadataMap;
use kprovider::{
    Augmentation, BoxedEventStream, GatewayError, InferenceGateway, InferenceRequest, StreamEvent,
    Turn,
};

use crate::filter::ContentFilter;
use crate::i18n::{self, Language, keys};
use crate::language::detect_for_turns;
use crate::specialist::{SpecialistDescriptor, SpecialistId};

/// Appended to every persona prompt.
pub const LANGUAGE_INSTRUCTION: &str = "

LANGUAGE RULE:
Always answer in the language of the user's most recent message.
German in, German out. English in, English out.
For any other language, answer in that language.";

const CODE_EXECUTION_TEMPERATURE: f32 = 0.0;
const WEB_SEARCH_TEMPERATURE: f32 = 0.3;

/// Renders session context as a prompt section, or an empty string when there is none.
pub fn build_context_addendum(context: &MetadataMap) -> String {
    if context.is_empty() {
        return String::new();
    }

    let mut lines = vec!["\n--- Adapt guidance to this user context ---".to_string()];
    lines.extend(context.iter().map(|(key, value)| format!("- {key}: {value}")));
    lines.push("---\n".to_string());
    lines.join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    TextDelta(String),
    /// Supersedes everything sent so far with the full final text.
    Replacement(String),
}

pub type AgentEventStream<'a> = Pin<Box<dyn Stream<Item = AgentEvent> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct SpecialistAgent {
    descriptor: Arc<SpecialistDescriptor>,
    gateway: InferenceGateway,
    filter: Arc<ContentFilter>,
}

impl SpecialistAgent {
    pub fn new(descriptor: Arc<SpecialistDescriptor>, gateway: InferenceGateway) -> Self {
        Self {
            descriptor,
            gateway,
            filter: Arc::new(ContentFilter::default()),
        }
    }

    pub fn with_filter(mut self, filter: Arc<ContentFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn id(&self) -> SpecialistId {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &SpecialistDescriptor {
        &self.descriptor
    }

    pub fn build_prompt(&self, context: &MetadataMap) -> String {
        let mut prompt = format!("{}{}", self.descriptor.persona_prompt, LANGUAGE_INSTRUCTION);
        prompt.push_str(&build_context_addendum(context));
        prompt
    }

    pub fn build_request(
        &self,
        turns: &[Turn],
        context: &MetadataMap,
    ) -> Result<InferenceRequest, GatewayError> {
        let builder = self
            .gateway
            .request()
            .turns(turns.iter().cloned())
            .persona_prompt(self.build_prompt(context))
            .reasoning_effort(self.descriptor.reasoning_effort)
            .maybe_augmentation(self.descriptor.augmentation);

        let builder = match self.descriptor.augmentation {
            Some(Augmentation::CodeExecution) => builder.temperature(CODE_EXECUTION_TEMPERATURE),
            Some(Augmentation::WebSearch) => builder.temperature(WEB_SEARCH_TEMPERATURE),
            None => builder,
        };

        builder.build()
    }

    pub async fn respond(&self, turns: &[Turn], context: &MetadataMap) -> String {
        let language = detect_for_turns(turns);

        match AssertUnwindSafe(self.generate(turns, context))
            .catch_unwind()
            .await
        {
            Ok(Ok(text)) => self.finalize(text, language),
            Ok(Err(error)) => {
                self.log_failure(&error);
                fallback(language)
            }
            Err(_) => {
                self.log_panic();
                fallback(language)
            }
        }
    }

    /// Streams the answer. Tool-augmented specialists answer in one piece; others
    /// forward deltas and send a [`AgentEvent::Replacement`] when post-processing
    /// changed the assembled text.
    pub fn respond_stream(&self, turns: Vec<Turn>, context: MetadataMap) -> AgentEventStream<'static> {
        let agent = self.clone();

        if agent.descriptor.augmentation.is_some() {
            return Box::pin(async_stream::stream! {
                yield AgentEvent::TextDelta(agent.respond(&turns, &context).await);
            });
        }

        Box::pin(async_stream::stream! {
            let language = detect_for_turns(&turns);

            let opened = AssertUnwindSafe(agent.open_stream(&turns, &context))
                .catch_unwind()
                .await;
            let events = match opened {
                Ok(Ok(events)) => events,
                Ok(Err(error)) => {
                    agent.log_failure(&error);
                    yield AgentEvent::TextDelta(fallback(language));
                    return;
                }
                Err(_) => {
                    agent.log_panic();
                    yield AgentEvent::TextDelta(fallback(language));
                    return;
                }
            };

            let mut events = AssertUnwindSafe(events).catch_unwind();
            let mut assembled = String::new();
            let mut failed = false;

            while let Some(item) = events.next().await {
                match item {
                    Ok(Ok(StreamEvent::TextDelta(delta))) => {
                        if delta.is_empty() {
                            continue;
                        }
                        assembled.push_str(&delta);
                        yield AgentEvent::TextDelta(delta);
                    }
                    Ok(Ok(StreamEvent::ResponseComplete(_))) => {}
                    Ok(Err(error)) => {
                        agent.log_failure(&error);
                        failed = true;
                        break;
                    }
                    Err(_) => {
                        agent.log_panic();
                        failed = true;
                        break;
                    }
                }
            }

            if failed {
                let text = fallback(language);
                if assembled.is_empty() {
                    yield AgentEvent::TextDelta(text);
                } else {
                    yield AgentEvent::Replacement(text);
                }
                return;
            }

            let finalized = agent.finalize(assembled.clone(), language);
            if finalized != assembled {
                yield AgentEvent::Replacement(finalized);
            }
        })
    }

    async fn generate(&self, turns: &[Turn], context: &MetadataMap) -> Result<String, GatewayError> {
        let request = self.build_request(turns, context)?;
        let response = self.gateway.call(request).await?;
        Ok(response.extract_text())
    }

    async fn open_stream<'a>(
        &'a self,
        turns: &[Turn],
        context: &MetadataMap,
    ) -> Result<BoxedEventStream<'a>, GatewayError> {
        let request = self.build_request(turns, context)?;
        self.gateway.stream(request).await
    }

    fn finalize(&self, text: String, language: Language) -> String {
        if text.trim().is_empty() {
            return i18n::text(language, keys::FALLBACK_EMPTY).to_string();
        }
        self.filter.apply(text)
    }

    fn log_failure(&self, error: &GatewayError) {
        tracing::warn!(
            phase = "respond",
            event = "specialist_failed",
            specialist = self.id().as_str(),
            kind = error.kind.as_str(),
            error = %error
        );
    }

    fn log_panic(&self) {
        tracing::error!(
            phase = "respond",
            event = "specialist_panicked",
            specialist = self.id().as_str()
        );
    }
}

fn fallback(language: Language) -> String {
    i18n::text(language, keys::FALLBACK_ERROR).to_string()
}
