//! Converse transport trait and reqwest-based HTTP implementation.

use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::{GatewayError, ProviderFuture, TokenUsage};

use super::event_stream::{EventStreamDecoder, EventStreamMessage};
use super::types::{
    ConverseRequest, ConverseResponse, ConverseStreamChunk, ConverseUsage, parse_error_body,
    parse_stop_reason,
};

/// Long enough for high-effort reasoning calls.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3600);

pub type ConverseChunkStream<'a> =
    Pin<Box<dyn Stream<Item = Result<ConverseStreamChunk, GatewayError>> + Send + 'a>>;

pub trait ConverseTransport: Send + Sync + std::fmt::Debug {
    fn converse<'a>(
        &'a self,
        request: ConverseRequest,
    ) -> ProviderFuture<'a, Result<ConverseResponse, GatewayError>>;

    fn converse_stream<'a>(
        &'a self,
        request: ConverseRequest,
    ) -> ProviderFuture<'a, Result<ConverseChunkStream<'a>, GatewayError>>;
}

#[derive(Clone)]
pub struct ConverseHttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for ConverseHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverseHttpTransport")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConverseHttpTransport {
    pub fn new(client: Client, region: &str) -> Self {
        Self {
            client,
            base_url: format!("https://bedrock-runtime.{region}.amazonaws.com"),
            api_key: None,
        }
    }

    /// Builds a client whose per-read timeout is `read_timeout`.
    pub fn client_with_read_timeout(read_timeout: Duration) -> Result<Client, GatewayError> {
        Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(read_timeout)
            .build()
            .map_err(|err| GatewayError::provider(format!("failed to build HTTP client: {err}")))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, model_id: &str, operation: &str) -> String {
        format!(
            "{}/model/{}/{operation}",
            self.base_url.trim_end_matches('/'),
            model_id.replace(':', "%3A")
        )
    }

    async fn send(&self, request: &ConverseRequest, operation: &str) -> Result<Response, GatewayError> {
        let url = self.endpoint(&request.model_id, operation);
        let mut builder = self.client.post(url).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        if !response.status().is_success() {
            return Err(Self::parse_error(response).await);
        }

        Ok(response)
    }

    async fn parse_error(response: Response) -> GatewayError {
        let status = response.status();
        let header_code = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        classify_error_response(status.as_u16(), header_code.as_deref(), &body)
    }
}

pub(crate) fn classify_error_response(
    status: u16,
    header_code: Option<&str>,
    body: &str,
) -> GatewayError {
    let parsed = parse_error_body(body);
    let message = parsed
        .message
        .unwrap_or_else(|| format!("request failed with status {status}"));

    match header_code.map(str::to_string).or(parsed.error_type) {
        Some(code) if !code.trim().is_empty() => GatewayError::classify_code(&code, message),
        _ => GatewayError::classify_status(status, message),
    }
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::timeout("provider did not respond in time")
    } else {
        GatewayError::provider(format!("transport error: {err}"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct DeltaPayload {
    #[serde(default)]
    delta: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStopPayload {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataPayload {
    #[serde(default)]
    usage: Option<ConverseUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct ExceptionPayload {
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

/// Maps one decoded frame onto a chunk. Frames without textual content
/// (`messageStart`, `contentBlockStart`, reasoning deltas, ...) yield `None`.
pub(crate) fn chunk_from_message(
    message: &EventStreamMessage,
) -> Result<Option<ConverseStreamChunk>, GatewayError> {
    if message.message_type() == Some("exception") {
        let payload: ExceptionPayload = serde_json::from_slice(&message.payload).unwrap_or_default();
        let code = message.exception_type().unwrap_or_default();
        return Err(GatewayError::classify_code(
            code,
            payload
                .message
                .unwrap_or_else(|| "stream aborted by provider".to_string()),
        ));
    }

    let parse_error = |err: serde_json::Error| {
        GatewayError::provider(format!("invalid stream payload: {err}"))
    };

    match message.event_type() {
        Some("contentBlockDelta") => {
            let payload: DeltaPayload =
                serde_json::from_slice(&message.payload).map_err(parse_error)?;
            let text = payload
                .delta
                .as_ref()
                .and_then(|delta| delta.get("text"))
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(|text| ConverseStreamChunk::TextDelta(text.to_string()));
            Ok(text)
        }
        Some("messageStop") => {
            let payload: MessageStopPayload =
                serde_json::from_slice(&message.payload).map_err(parse_error)?;
            Ok(Some(ConverseStreamChunk::MessageStop(parse_stop_reason(
                payload.stop_reason.as_deref(),
            ))))
        }
        Some("metadata") => {
            let payload: MetadataPayload =
                serde_json::from_slice(&message.payload).map_err(parse_error)?;
            Ok(Some(ConverseStreamChunk::Metadata(
                payload.usage.map(TokenUsage::from).unwrap_or_default(),
            )))
        }
        _ => Ok(None),
    }
}

impl ConverseTransport for ConverseHttpTransport {
    fn converse<'a>(
        &'a self,
        request: ConverseRequest,
    ) -> ProviderFuture<'a, Result<ConverseResponse, GatewayError>> {
        Box::pin(async move {
            let response = self.send(&request, "converse").await?;
            let body = response.text().await.map_err(map_transport_error)?;

            serde_json::from_str::<ConverseResponse>(&body)
                .map_err(|err| GatewayError::provider(format!("invalid response body: {err}")))
        })
    }

    fn converse_stream<'a>(
        &'a self,
        request: ConverseRequest,
    ) -> ProviderFuture<'a, Result<ConverseChunkStream<'a>, GatewayError>> {
        Box::pin(async move {
            let response = self.send(&request, "converse-stream").await?;

            let stream = try_stream! {
                let mut bytes = response.bytes_stream();
                let mut decoder = EventStreamDecoder::new();

                while let Some(item) = bytes.next().await {
                    let chunk = item.map_err(map_transport_error)?;
                    decoder.push(&chunk);

                    while let Some(message) = decoder.next_message()? {
                        if let Some(chunk) = chunk_from_message(&message)? {
                            yield chunk;
                        }
                    }
                }

                if decoder.pending() > 0 {
                    Err::<(), GatewayError>(GatewayError::provider(
                        "stream ended inside an unfinished frame",
                    ))?;
                }
            };

            Ok(Box::pin(stream) as ConverseChunkStream<'a>)
        })
    }
}
