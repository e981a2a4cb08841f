//! The inference gateway: the single component allowed to reach the provider.
//!
//! It validates requests, runs them through the rate-limit retry policy, and reports
//! every attempt to the configured [`GatewayOperationHooks`].

use std::sync::Arc;

use kcommon::SamplingParams;

use crate::{
    BoxedEventStream, GatewayError, GatewayOperationHooks, InferenceRequest,
    InferenceRequestBuilder, InferenceResponse, ModelProvider, NoopOperationHooks, RetryPolicy,
    execute_with_retry,
};

#[derive(Clone)]
pub struct InferenceGateway {
    provider: Arc<dyn ModelProvider>,
    policy: RetryPolicy,
    hooks: Arc<dyn GatewayOperationHooks>,
    defaults: SamplingParams,
}

impl std::fmt::Debug for InferenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceGateway")
            .field("provider", &self.provider.name())
            .field("policy", &self.policy)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl InferenceGateway {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self::builder(provider).build()
    }

    pub fn builder(provider: Arc<dyn ModelProvider>) -> InferenceGatewayBuilder {
        InferenceGatewayBuilder::new(provider)
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn defaults(&self) -> SamplingParams {
        self.defaults
    }

    /// Request builder pre-seeded with this gateway's default sampling parameters.
    pub fn request(&self) -> InferenceRequestBuilder {
        InferenceRequest::builder().sampling(self.defaults)
    }

    pub async fn call(&self, request: InferenceRequest) -> Result<InferenceResponse, GatewayError> {
        request.validate()?;

        execute_with_retry(
            self.provider.name(),
            "converse",
            &self.policy,
            self.hooks.as_ref(),
            |_| self.provider.complete(request.clone()),
            tokio::time::sleep,
        )
        .await
    }

    /// Opens a provider stream. Only opening the stream is retried; failures after
    /// the first event arrive as stream items.
    pub async fn stream<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> Result<BoxedEventStream<'a>, GatewayError> {
        request.validate()?;

        execute_with_retry(
            self.provider.name(),
            "converse_stream",
            &self.policy,
            self.hooks.as_ref(),
            |_| self.provider.stream(request.clone()),
            tokio::time::sleep,
        )
        .await
    }

    pub fn extract_text(response: &InferenceResponse) -> String {
        crate::extract_text(response)
    }
}

pub struct InferenceGatewayBuilder {
    provider: Arc<dyn ModelProvider>,
    policy: RetryPolicy,
    hooks: Arc<dyn GatewayOperationHooks>,
    defaults: SamplingParams,
}

impl InferenceGatewayBuilder {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::default(),
            hooks: Arc::new(NoopOperationHooks),
            defaults: SamplingParams::default(),
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn GatewayOperationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn defaults(mut self, defaults: SamplingParams) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn build(self) -> InferenceGateway {
        InferenceGateway {
            provider: self.provider,
            policy: self.policy,
            hooks: self.hooks,
            defaults: self.defaults,
        }
    }
}
