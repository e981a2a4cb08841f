//! Common `kprovider` imports for downstream crates.

pub use crate::{
    Augmentation, BoxedEventStream, GatewayError, GatewayErrorKind, GatewayOperationHooks,
    InferenceGateway, InferenceRequest, InferenceRequestBuilder, InferenceResponse,
    ModelEventStream, ModelProvider, NoopOperationHooks, ProviderFuture, ReasoningEffort,
    RetryPolicy, Role, StreamEvent, Turn,
};
pub use kcommon::{BoxFuture, MetadataMap, SamplingParams};
