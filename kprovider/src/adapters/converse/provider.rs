//! Converse provider implementation over transport and shared models.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;

use crate::{
    BoxedEventStream, ContentBlock, GatewayError, InferenceRequest, InferenceResponse,
    ModelProvider, ProviderFuture, StopReason, StreamEvent, TokenUsage,
};

use super::transport::ConverseTransport;
use super::types::{
    AdditionalModelRequestFields, ConverseContent, ConverseMessage, ConverseRequest,
    ConverseStreamChunk, InferenceConfig, ToolConfig,
};

pub const DEFAULT_MODEL_ID: &str = "us.amazon.nova-2-lite-v1:0";

#[derive(Debug, Clone)]
pub struct ConverseProvider {
    transport: Arc<dyn ConverseTransport>,
    model_id: String,
}

impl ConverseProvider {
    pub fn new(transport: Arc<dyn ConverseTransport>) -> Self {
        Self {
            transport,
            model_id: DEFAULT_MODEL_ID.to_string(),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub(crate) fn build_converse_request(&self, request: InferenceRequest) -> ConverseRequest {
        let model_id = request
            .model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| self.model_id.clone());

        ConverseRequest {
            model_id,
            messages: request
                .turns
                .into_iter()
                .map(ConverseMessage::from)
                .collect(),
            system: request
                .persona_prompt
                .map(|text| vec![ConverseContent { text }])
                .unwrap_or_default(),
            inference_config: InferenceConfig {
                max_tokens: request.sampling.max_tokens,
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
            },
            tool_config: request.augmentation.map(ToolConfig::for_augmentation),
            additional_model_request_fields: request
                .reasoning_effort
                .map(AdditionalModelRequestFields::from),
        }
    }
}

impl ModelProvider for ConverseProvider {
    fn name(&self) -> &'static str {
        "converse"
    }

    fn complete<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> ProviderFuture<'a, Result<InferenceResponse, GatewayError>> {
        Box::pin(async move {
            request.validate()?;
            let converse_request = self.build_converse_request(request);
            let model = converse_request.model_id.clone();
            let response = self.transport.converse(converse_request).await?;
            Ok(response.into_inference_response(model))
        })
    }

    fn stream<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, GatewayError>> {
        Box::pin(async move {
            request.validate()?;
            let converse_request = self.build_converse_request(request);
            let model = converse_request.model_id.clone();
            let mut chunks = self.transport.converse_stream(converse_request).await?;

            let stream = try_stream! {
                let mut text = String::new();
                let mut stop_reason = StopReason::Other;
                let mut usage = TokenUsage::default();

                while let Some(chunk) = chunks.next().await {
                    match chunk? {
                        ConverseStreamChunk::TextDelta(delta) => {
                            text.push_str(&delta);
                            yield StreamEvent::TextDelta(delta);
                        }
                        ConverseStreamChunk::MessageStop(reason) => stop_reason = reason,
                        ConverseStreamChunk::Metadata(reported) => usage = reported,
                    }
                }

                let content = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![ContentBlock::Text(text)]
                };

                yield StreamEvent::ResponseComplete(InferenceResponse {
                    model,
                    content,
                    stop_reason,
                    usage,
                });
            };

            Ok(Box::pin(stream) as BoxedEventStream<'a>)
        })
    }
}
