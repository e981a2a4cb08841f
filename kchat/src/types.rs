//! Chat request, response, session, and event types.

use std::pin::Pin;
use std::time::Instant;

use futures_core::Stream;
use kagents::{CrisisCategory, CrisisResources, SpecialistId};
use kcommon::{MetadataMap, SessionId};
use kprovider::Turn;

use crate::ChatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Continue this session when it is still live; otherwise a new one is created.
    pub session_id: Option<SessionId>,
    pub message: String,
    /// Merged into the session context before the specialist is prompted.
    pub context: MetadataMap,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            message: message.into(),
            context: MetadataMap::new(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn maybe_session_id(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub session_id: SessionId,
    pub response: String,
    pub specialist: SpecialistId,
    pub crisis_detected: bool,
    pub crisis_category: CrisisCategory,
    pub crisis_resources: Option<CrisisResources>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Started {
        session_id: SessionId,
        specialist: SpecialistId,
    },
    TextDelta(String),
    /// Full response text, superseding every delta sent before it.
    Replacement(String),
    TurnComplete(ChatResponse),
}

pub type ChatEventStream<'a> = Pin<Box<dyn Stream<Item = Result<ChatEvent, ChatError>> + Send + 'a>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub current_specialist: Option<SpecialistId>,
    pub context: MetadataMap,
    /// Sticky: once a turn is flagged the session stays flagged.
    pub crisis_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub turns: Vec<Turn>,
    pub metadata: SessionMetadata,
    pub last_activity: Instant,
}

impl Session {
    pub fn new(id: SessionId, now: Instant) -> Self {
        Self {
            id,
            turns: Vec::new(),
            metadata: SessionMetadata::default(),
            last_activity: now,
        }
    }
}

/// Changes applied to a session's metadata at the end of a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub current_specialist: Option<SpecialistId>,
    pub crisis_detected: bool,
    pub context: MetadataMap,
}

impl MetadataUpdate {
    pub fn apply(self, metadata: &mut SessionMetadata) {
        if let Some(specialist) = self.current_specialist {
            metadata.current_specialist = Some(specialist);
        }
        metadata.crisis_detected |= self.crisis_detected;
        metadata.context.extend(self.context);
    }
}
