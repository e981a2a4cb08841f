//! Common imports for applications embedding koda.

pub use crate::{
    AppConfig, ChatError, ChatEvent, ChatRequest, ChatResponse, ChatService, ConfigError,
    InferenceGateway, ModelProvider, RuntimeBundle, SessionId, SpecialistId, build_runtime_with,
    router, spawn_session_sweeper,
};
#[cfg(feature = "provider-converse")]
pub use crate::build_runtime;
