//! Runtime wiring from [`AppConfig`] to a ready [`ChatService`].

use std::sync::Arc;
use std::time::Duration;

use kchat::{ChatRuntimeHooks, ChatService, InMemorySessionStore, SessionStore};
use kobserve::{
    CombinedHooks, MetricsObservabilityHooks, SafeChatHooks, SafeGatewayHooks,
    TracingObservabilityHooks,
};
use kprovider::{GatewayOperationHooks, InferenceGateway, ModelProvider};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, ConfigError, ObservabilityConfig};

#[derive(Debug, Clone)]
pub struct RuntimeBundle {
    pub gateway: InferenceGateway,
    pub chat: ChatService,
}

/// The Converse provider described by `config.provider`.
#[cfg(feature = "provider-converse")]
pub fn converse_provider(config: &AppConfig) -> Result<Arc<dyn ModelProvider>, ConfigError> {
    use kprovider::converse::{ConverseHttpTransport, ConverseProvider};

    let settings = &config.provider;
    let client = ConverseHttpTransport::client_with_read_timeout(settings.read_timeout())
        .map_err(|error| ConfigError::invalid(format!("provider client: {error}")))?;

    let mut transport = ConverseHttpTransport::new(client, &settings.region);
    if let Some(endpoint) = &settings.endpoint {
        transport = transport.with_base_url(endpoint.clone());
    }
    if let Some(api_key) = &settings.api_key {
        transport = transport.with_api_key(api_key.clone());
    }

    let provider = ConverseProvider::new(Arc::new(transport)).with_model_id(settings.model_id.clone());
    Ok(Arc::new(provider))
}

pub fn gateway_hooks(observability: &ObservabilityConfig) -> Arc<dyn GatewayOperationHooks> {
    if observability.metrics {
        Arc::new(SafeGatewayHooks::new(CombinedHooks::new(
            TracingObservabilityHooks,
            MetricsObservabilityHooks,
        )))
    } else {
        Arc::new(SafeGatewayHooks::new(TracingObservabilityHooks))
    }
}

pub fn chat_hooks(observability: &ObservabilityConfig) -> Arc<dyn ChatRuntimeHooks> {
    if observability.metrics {
        Arc::new(SafeChatHooks::new(CombinedHooks::new(
            TracingObservabilityHooks,
            MetricsObservabilityHooks,
        )))
    } else {
        Arc::new(SafeChatHooks::new(TracingObservabilityHooks))
    }
}

pub fn session_store(config: &AppConfig) -> Arc<dyn SessionStore> {
    Arc::new(
        InMemorySessionStore::new()
            .with_idle_timeout(config.session.idle_timeout())
            .with_max_turns(config.session.max_turns),
    )
}

#[cfg(feature = "provider-converse")]
pub fn build_runtime(config: &AppConfig) -> Result<RuntimeBundle, ConfigError> {
    build_runtime_with(converse_provider(config)?, config)
}

pub fn build_runtime_with(
    provider: Arc<dyn ModelProvider>,
    config: &AppConfig,
) -> Result<RuntimeBundle, ConfigError> {
    build_runtime_with_store(provider, config, session_store(config))
}

pub fn build_runtime_with_store(
    provider: Arc<dyn ModelProvider>,
    config: &AppConfig,
    store: Arc<dyn SessionStore>,
) -> Result<RuntimeBundle, ConfigError> {
    let gateway = InferenceGateway::builder(provider)
        .retry_policy(config.retry.policy())
        .defaults(config.inference.sampling())
        .hooks(gateway_hooks(&config.observability))
        .build();

    let chat = ChatService::builder(gateway.clone())
        .store(store)
        .tie_break(config.router.tie_break()?)
        .hooks(chat_hooks(&config.observability))
        .build();

    Ok(RuntimeBundle { gateway, chat })
}

/// Purges idle sessions every `interval` until the task is aborted.
pub fn spawn_session_sweeper(chat: ChatService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(error) = chat.purge_expired().await {
                tracing::warn!(phase = "session", event = "sweep_failed", error = %error);
            }
        }
    })
}
