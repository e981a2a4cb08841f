use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kprovider::{
    BoxedEventStream, GatewayError, InferenceGateway, InferenceRequest, InferenceResponse,
    ModelProvider, ProviderFuture, RetryPolicy, StreamEvent, VecEventStream,
};

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Reply(String),
    Fail(GatewayError),
    Panic,
    /// Streams `partial` and then fails with `error`.
    BreakMidStream(String, GatewayError),
}

pub(crate) fn reply(text: &str) -> Script {
    Script::Reply(text.to_string())
}

#[derive(Default)]
pub(crate) struct ScriptedProvider {
    queue: Mutex<VecDeque<Script>>,
    repeat: Option<Script>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn sequence(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(scripts.into()),
            ..Self::default()
        })
    }

    pub(crate) fn always(script: Script) -> Arc<Self> {
        Arc::new(Self {
            repeat: Some(script),
            ..Self::default()
        })
    }

    pub(crate) fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn next(&self, request: InferenceRequest) -> Script {
        self.requests.lock().expect("requests lock").push(request);
        self.queue
            .lock()
            .expect("queue lock")
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| Script::Fail(GatewayError::provider("script exhausted")))
    }
}

impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn complete<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> ProviderFuture<'a, Result<InferenceResponse, GatewayError>> {
        Box::pin(async move {
            match self.next(request) {
                Script::Reply(text) => Ok(InferenceResponse::from_text("scripted", text)),
                Script::Fail(error) | Script::BreakMidStream(_, error) => Err(error),
                Script::Panic => panic!("scripted provider panic"),
            }
        })
    }

    fn stream<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, GatewayError>> {
        Box::pin(async move {
            let events = match self.next(request) {
                Script::Reply(text) => {
                    let mut events = text
                        .split_inclusive(' ')
                        .map(|piece| Ok(StreamEvent::TextDelta(piece.to_string())))
                        .collect::<Vec<_>>();
                    events.push(Ok(StreamEvent::ResponseComplete(
                        InferenceResponse::from_text("scripted", text),
                    )));
                    events
                }
                Script::BreakMidStream(partial, error) => {
                    vec![Ok(StreamEvent::TextDelta(partial)), Err(error)]
                }
                Script::Fail(error) => return Err(error),
                Script::Panic => panic!("scripted provider panic"),
            };

            Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
        })
    }
}

pub(crate) fn gateway(provider: Arc<ScriptedProvider>) -> InferenceGateway {
    InferenceGateway::builder(provider)
        .retry_policy(RetryPolicy::default().with_initial_backoff(Duration::from_millis(1)))
        .build()
}
