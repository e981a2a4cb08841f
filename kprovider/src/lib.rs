//! Inference gateway: the single seam between the chat service and the hosted model.
//!
//! ```rust
//! use kprovider::{GatewayError, GatewayErrorKind, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.max_retries(), 3);
//! assert!(policy.should_retry(1, &GatewayError::rate_limited("slow down")));
//! assert!(!policy.should_retry(1, &GatewayError::timeout("no answer")));
//! assert_eq!(GatewayError::timeout("x").kind, GatewayErrorKind::UpstreamTimeout);
//! ```

pub mod adapters;
pub mod error;
pub mod gateway;
pub mod model;
pub mod prelude;
pub mod provider;
pub mod resilience;
pub mod stream;

pub use error::{GatewayError, GatewayErrorKind};
pub use gateway::{InferenceGateway, InferenceGatewayBuilder};
pub use model::{
    Augmentation, ContentBlock, InferenceRequest, InferenceRequestBuilder, InferenceResponse,
    ReasoningEffort, Role, StopReason, TokenUsage, ToolResultBlock, ToolResultContent, Turn,
    extract_text,
};
pub use provider::{ModelProvider, ProviderFuture};
pub use resilience::{GatewayOperationHooks, NoopOperationHooks, RetryPolicy, execute_with_retry};
pub use stream::{BoxedEventStream, ModelEventStream, StreamEvent, VecEventStream};

#[cfg(feature = "provider-converse")]
pub use adapters::converse;
