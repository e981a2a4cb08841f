//! Unified facade over the koda workspace crates.
//!
//! Re-exports the agent, chat, provider, and observability crates, and adds the
//! pieces a deployment needs on top: layered configuration, runtime wiring,
//! and the HTTP surface served by the `koda` binary.
//!
//! ```rust
//! use koda::config::AppConfig;
//! use koda::{SpecialistId, parse_origins};
//!
//! let config = AppConfig::from_toml_str("").expect("defaults");
//! assert_eq!(config.retry.policy().max_retries(), 3);
//! assert_eq!(SpecialistId::DEFAULT, SpecialistId::Compass);
//! assert_eq!(parse_origins("https://a.example, ,https://b.example").len(), 2);
//! ```

pub mod config;
pub mod prelude;
pub mod runtime;
pub mod server;

pub use kagents;
pub use kchat;
pub use kcommon;
pub use kobserve;
pub use kprovider;

pub use kagents::{
    ContentFilter, CrisisCategory, CrisisResources, IntentRouter, Language, RouteTieBreak,
    SafetyAssessment, SafetyScanner, SpecialistAgent, SpecialistDescriptor, SpecialistId,
    SpecialistRegistry,
};
pub use kchat::{
    ChatError, ChatErrorKind, ChatEvent, ChatEventStream, ChatRequest, ChatResponse,
    ChatRuntimeHooks, ChatService, ChatServiceBuilder, InMemorySessionStore, SessionStore,
};
pub use kcommon::{MetadataMap, SamplingParams, SessionId};
pub use kobserve::{
    CombinedHooks, MetricsObservabilityHooks, SafeChatHooks, SafeGatewayHooks,
    TracingObservabilityHooks,
};
pub use kprovider::{
    GatewayError, GatewayErrorKind, GatewayOperationHooks, InferenceGateway, ModelProvider,
    RetryPolicy, Turn,
};

pub use crate::config::{AppConfig, ConfigError, ConfigErrorKind, parse_origins};
#[cfg(feature = "provider-converse")]
pub use runtime::{build_runtime, converse_provider};
pub use runtime::{
    RuntimeBundle, build_runtime_with, build_runtime_with_store, chat_hooks, gateway_hooks,
    session_store, spawn_session_sweeper,
};
pub use server::{ApiError, AppState, router};
