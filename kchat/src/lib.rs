//! Chat orchestration over the koda specialists.
//!
//! A turn runs the crisis scan next to routing and the specialist answer, then
//! records the exchange in an ephemeral session store.
//!
//! ```rust
//! use kchat::{ChatRequest, MetadataUpdate, SessionMetadata};
//! use kagents::SpecialistId;
//!
//! let request = ChatRequest::new("Wie funktioniert BAföG?").with_context("semester", "first");
//! assert!(request.session_id.is_none());
//!
//! let mut metadata = SessionMetadata::default();
//! MetadataUpdate {
//!     current_specialist: Some(SpecialistId::Financing),
//!     crisis_detected: true,
//!     ..MetadataUpdate::default()
//! }
//! .apply(&mut metadata);
//! MetadataUpdate::default().apply(&mut metadata);
//!
//! assert!(metadata.crisis_detected);
//! assert_eq!(metadata.current_specialist, Some(SpecialistId::Financing));
//! ```

mod error;
mod hooks;
mod service;
mod store;
mod types;

pub mod prelude {
    pub use crate::{
        ChatError, ChatErrorKind, ChatEvent, ChatEventStream, ChatRequest, ChatResponse,
        ChatRuntimeHooks, ChatService, ChatServiceBuilder, InMemorySessionStore, NoopChatHooks,
        Session, SessionStore, TurnPhase,
    };
    pub use kcommon::{MetadataMap, SessionId};
}

pub use error::{ChatError, ChatErrorKind};
pub use hooks::{ChatRuntimeHooks, NoopChatHooks, TurnPhase};
pub use service::{ChatService, ChatServiceBuilder};
pub use store::{
    ChatFuture, Clock, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_TURNS, InMemorySessionStore,
    MIN_MAX_TURNS, SessionStore, SystemClock,
};
pub use types::{
    ChatEvent, ChatEventStream, ChatRequest, ChatResponse, MetadataUpdate, Session,
    SessionMetadata,
};
pub use kcommon::{MetadataMap, SessionId};
