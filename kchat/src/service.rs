//! Turn orchestration: scan and route in parallel, answer with the chosen
//! specialist, and record the exchange in the session store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use futures_util::StreamExt;
use futures_util::future::join;
use kagents::{
    AgentEvent, ContentFilter, CrisisResources, IntentRouter, Language, RouteTieBreak,
    SafetyAssessment, SafetyScanner, SpecialistAgent, SpecialistId, SpecialistRegistry,
    detect_language,
    i18n::{self, keys},
};
use kcommon::{MetadataMap, SessionId};
use kprovider::{InferenceGateway, Turn};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    ChatError, ChatEvent, ChatEventStream, ChatRequest, ChatResponse, ChatRuntimeHooks,
    InMemorySessionStore, MetadataUpdate, NoopChatHooks, SessionStore, TurnPhase,
};

#[derive(Clone)]
pub struct ChatService {
    gateway: InferenceGateway,
    store: Arc<dyn SessionStore>,
    registry: Arc<SpecialistRegistry>,
    router: IntentRouter,
    scanner: SafetyScanner,
    filter: Arc<ContentFilter>,
    hooks: Arc<dyn ChatRuntimeHooks>,
    turn_locks: Arc<TurnLocks>,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("gateway", &self.gateway)
            .field("specialists", &self.registry.ids())
            .field("tie_break", &self.router.tie_break())
            .finish()
    }
}

impl ChatService {
    pub fn new(gateway: InferenceGateway) -> Self {
        Self::builder(gateway).build()
    }

    pub fn builder(gateway: InferenceGateway) -> ChatServiceBuilder {
        ChatServiceBuilder::new(gateway)
    }

    /// Registered specialist ids in routing precedence order.
    pub fn specialists(&self) -> Vec<SpecialistId> {
        self.registry.ids()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn run_turn(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let message = validate_message(&request.message)?;
        let PendingTurn {
            session_id,
            turns,
            context,
            guard: _turn,
        } = self.begin_turn(&request, message).await?;

        let scan = self.scan(&session_id, message);
        let answer = async {
            let specialist = self.route(&session_id, message).await;
            let agent = self.agent(specialist);
            let text = self
                .observe(TurnPhase::Respond, &session_id, async {
                    Ok::<_, ChatError>(agent.respond(&turns, &context).await)
                })
                .await
                .unwrap_or_default();
            (specialist, text)
        };

        let (assessment, (specialist, text)) = join(scan, answer).await;
        let assessment = assessment?;

        let prefix = self.crisis_prefix(&assessment, detect_language(message));
        let response = format!("{prefix}{text}");

        self.finish_turn(session_id, message, response, specialist, assessment, request.context)
            .await
    }

    /// Streams a turn. Session lookup and validation errors are returned before
    /// the stream starts; a failed crisis scan arrives as the only stream item.
    ///
    /// The scan runs alongside routing and completes before the first delta, so the
    /// crisis banner always leads the streamed text. The exchange is recorded only
    /// when the stream is driven to completion; dropping it early leaves the
    /// session untouched.
    pub async fn stream_turn(&self, request: ChatRequest) -> Result<ChatEventStream<'static>, ChatError> {
        let message = validate_message(&request.message)?.to_string();
        let PendingTurn {
            session_id,
            turns,
            context,
            guard,
        } = self.begin_turn(&request, &message).await?;
        let service = self.clone();

        Ok(Box::pin(async_stream::stream! {
            let _turn = guard;
            let (assessment, specialist) = join(
                service.scan(&session_id, &message),
                service.route(&session_id, &message),
            )
            .await;

            let assessment = match assessment {
                Ok(assessment) => assessment,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };

            yield Ok(ChatEvent::Started {
                session_id: session_id.clone(),
                specialist,
            });

            let prefix = service.crisis_prefix(&assessment, detect_language(&message));
            if !prefix.is_empty() {
                yield Ok(ChatEvent::TextDelta(prefix.clone()));
            }

            service.hooks.on_phase_start(TurnPhase::Respond, &session_id);
            let started = Instant::now();
            let mut body = String::new();
            let mut events = service.agent(specialist).respond_stream(turns, context);

            while let Some(event) = events.next().await {
                match event {
                    AgentEvent::TextDelta(delta) => {
                        body.push_str(&delta);
                        yield Ok(ChatEvent::TextDelta(delta));
                    }
                    AgentEvent::Replacement(text) => {
                        body = text;
                        yield Ok(ChatEvent::Replacement(format!("{prefix}{body}")));
                    }
                }
            }
            service
                .hooks
                .on_phase_success(TurnPhase::Respond, &session_id, started.elapsed());

            let response = format!("{prefix}{body}");
            yield service
                .finish_turn(session_id, &message, response, specialist, assessment, request.context)
                .await
                .map(ChatEvent::TurnComplete);
        }))
    }

    /// Idempotent.
    pub async fn end_session(&self, session_id: &SessionId) -> Result<(), ChatError> {
        if self.store.delete(session_id).await? {
            tracing::info!(phase = "session", event = "session_deleted", session_id = %session_id);
        }
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<usize, ChatError> {
        let purged = self.store.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(phase = "session", event = "sessions_purged", purged);
        }
        Ok(purged)
    }

    /// Resolves the session and waits for any other turn on it to finish. The
    /// returned history ends with the pending user message, which is not stored
    /// until the turn completes.
    async fn begin_turn(
        &self,
        request: &ChatRequest,
        message: &str,
    ) -> Result<PendingTurn, ChatError> {
        let session_id = self.store.get_or_create(request.session_id.as_ref()).await?;
        let guard = self.turn_locks.acquire(&session_id)?.lock_owned().await;
        let session = self
            .store
            .snapshot(&session_id)
            .await?
            .ok_or_else(|| ChatError::store(format!("unknown session '{session_id}'")))?;

        let mut turns = session.turns;
        turns.push(Turn::user(message));

        Ok(PendingTurn {
            context: merged_context(session.metadata.context, &request.context),
            session_id,
            turns,
            guard,
        })
    }

    async fn scan(&self, session_id: &SessionId, message: &str) -> Result<SafetyAssessment, ChatError> {
        let assessment = self
            .observe(TurnPhase::Scan, session_id, async {
                self.scanner.scan(message).await.map_err(ChatError::from)
            })
            .await?;

        if assessment.is_crisis {
            self.hooks.on_crisis_detected(session_id, assessment.category);
        }
        Ok(assessment)
    }

    async fn route(&self, session_id: &SessionId, message: &str) -> SpecialistId {
        self.observe(TurnPhase::Route, session_id, async {
            Ok::<_, ChatError>(self.router.route(message).await)
        })
        .await
        .unwrap_or(SpecialistId::DEFAULT)
    }

    async fn observe<T>(
        &self,
        phase: TurnPhase,
        session_id: &SessionId,
        run: impl Future<Output = Result<T, ChatError>>,
    ) -> Result<T, ChatError> {
        self.hooks.on_phase_start(phase, session_id);
        let started = Instant::now();

        let outcome = run.await;
        match &outcome {
            Ok(_) => self.hooks.on_phase_success(phase, session_id, started.elapsed()),
            Err(error) => self
                .hooks
                .on_phase_failure(phase, session_id, error, started.elapsed()),
        }
        outcome
    }

    fn agent(&self, specialist: SpecialistId) -> SpecialistAgent {
        SpecialistAgent::new(Arc::clone(self.registry.resolve(specialist)), self.gateway.clone())
            .with_filter(Arc::clone(&self.filter))
    }

    fn crisis_prefix(&self, assessment: &SafetyAssessment, language: Language) -> String {
        match &assessment.resources {
            Some(resources) if assessment.is_crisis => {
                resources.render_prefix(i18n::text(language, keys::CRISIS_BANNER))
            }
            _ => String::new(),
        }
    }

    async fn finish_turn(
        &self,
        session_id: SessionId,
        message: &str,
        response: String,
        specialist: SpecialistId,
        assessment: SafetyAssessment,
        context: MetadataMap,
    ) -> Result<ChatResponse, ChatError> {
        self.store.append_exchange(&session_id, message, &response).await?;
        self.store
            .update_metadata(
                &session_id,
                MetadataUpdate {
                    current_specialist: Some(specialist),
                    crisis_detected: assessment.is_crisis,
                    context,
                },
            )
            .await?;

        tracing::info!(
            phase = "turn",
            event = "turn_complete",
            session_id = %session_id,
            specialist = specialist.as_str(),
            crisis_detected = assessment.is_crisis
        );

        Ok(ChatResponse {
            session_id,
            response,
            specialist,
            crisis_detected: assessment.is_crisis,
            crisis_category: assessment.category,
            crisis_resources: assessment.resources,
        })
    }
}

struct PendingTurn {
    session_id: SessionId,
    turns: Vec<Turn>,
    context: MetadataMap,
    guard: OwnedMutexGuard<()>,
}

/// One async lock per session with a turn in flight. Entries are weak, so a
/// session's lock disappears once no turn holds or awaits it.
#[derive(Debug, Default)]
struct TurnLocks {
    locks: Mutex<HashMap<SessionId, Weak<AsyncMutex<()>>>>,
}

impl TurnLocks {
    fn acquire(&self, session_id: &SessionId) -> Result<Arc<AsyncMutex<()>>, ChatError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| ChatError::store("turn lock table poisoned"))?;

        if let Some(lock) = locks.get(session_id).and_then(Weak::upgrade) {
            return Ok(lock);
        }

        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(session_id.clone(), Arc::downgrade(&lock));
        Ok(lock)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.values().filter(|lock| lock.strong_count() > 0).count())
            .unwrap_or_default()
    }
}

fn validate_message(message: &str) -> Result<&str, ChatError> {
    if message.trim().is_empty() {
        return Err(ChatError::invalid_request("message must not be empty"));
    }
    Ok(message)
}

fn merged_context(mut stored: MetadataMap, incoming: &MetadataMap) -> MetadataMap {
    stored.extend(incoming.iter().map(|(key, value)| (key.clone(), value.clone())));
    stored
}

pub struct ChatServiceBuilder {
    gateway: InferenceGateway,
    store: Option<Arc<dyn SessionStore>>,
    registry: Option<SpecialistRegistry>,
    tie_break: RouteTieBreak,
    resources: Option<CrisisResources>,
    filter: Option<ContentFilter>,
    hooks: Arc<dyn ChatRuntimeHooks>,
}

impl ChatServiceBuilder {
    pub fn new(gateway: InferenceGateway) -> Self {
        Self {
            gateway,
            store: None,
            registry: None,
            tie_break: RouteTieBreak::default(),
            resources: None,
            filter: None,
            hooks: Arc::new(NoopChatHooks),
        }
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: SpecialistRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn tie_break(mut self, tie_break: RouteTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn crisis_resources(mut self, resources: CrisisResources) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn content_filter(mut self, filter: ContentFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ChatRuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> ChatService {
        let gateway = self.gateway;

        ChatService {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemorySessionStore::new())),
            registry: Arc::new(self.registry.unwrap_or_else(SpecialistRegistry::builtin)),
            router: IntentRouter::new(gateway.clone()).with_tie_break(self.tie_break),
            scanner: SafetyScanner::with_resources(
                gateway.clone(),
                self.resources.unwrap_or_else(CrisisResources::builtin),
            ),
            filter: Arc::new(self.filter.unwrap_or_default()),
            hooks: self.hooks,
            turn_locks: Arc::new(TurnLocks::default()),
            gateway,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::StreamExt;
    use kagents::CrisisCategory;
    use kprovider::{
        BoxedEventStream, GatewayError, InferenceRequest, InferenceResponse, ModelProvider,
        ProviderFuture, RetryPolicy, StreamEvent, VecEventStream,
    };

    use super::*;
    use crate::ChatErrorKind;

    /// Answers by prompt: scan requests, route requests, and specialist requests
    /// each get their own reply.
    #[derive(Debug, Default)]
    struct PromptAwareProvider {
        scan: Mutex<VecDeque<Result<String, GatewayError>>>,
        route: String,
        answer: String,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl PromptAwareProvider {
        fn new(scan: &str, route: &str, answer: &str) -> Self {
            Self {
                scan: Mutex::new(VecDeque::from([Ok(scan.to_string())])),
                route: route.to_string(),
                answer: answer.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing_scan(route: &str, answer: &str) -> Self {
            let provider = Self::new("", route, answer);
            *provider.scan.lock().expect("scan lock") =
                VecDeque::from([Err(GatewayError::permission_denied("no access"))]);
            provider
        }

        fn reply_for(&self, request: &InferenceRequest) -> Result<String, GatewayError> {
            self.requests.lock().expect("requests lock").push(request.clone());
            let prompt = request.persona_prompt.clone().unwrap_or_default();

            if prompt.contains("CRISIS: YES or NO") {
                self.scan
                    .lock()
                    .expect("scan lock")
                    .pop_front()
                    .unwrap_or_else(|| Ok("CRISIS: NO".to_string()))
            } else if prompt.contains("AGENT: <NAME>") {
                Ok(self.route.clone())
            } else {
                Ok(self.answer.clone())
            }
        }
    }

    impl ModelProvider for PromptAwareProvider {
        fn name(&self) -> &'static str {
            "prompt-aware"
        }

        fn complete<'a>(
            &'a self,
            request: InferenceRequest,
        ) -> ProviderFuture<'a, Result<InferenceResponse, GatewayError>> {
            Box::pin(async move {
                self.reply_for(&request)
                    .map(|text| InferenceResponse::from_text("test-model", text))
            })
        }

        fn stream<'a>(
            &'a self,
            request: InferenceRequest,
        ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, GatewayError>> {
            Box::pin(async move {
                let text = self.reply_for(&request)?;
                let mut events = text
                    .split_inclusive(' ')
                    .map(|piece| Ok(StreamEvent::TextDelta(piece.to_string())))
                    .collect::<Vec<_>>();
                events.push(Ok(StreamEvent::ResponseComplete(InferenceResponse::from_text(
                    "test-model",
                    text,
                ))));
                Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
            })
        }
    }

    fn service(provider: PromptAwareProvider) -> ChatService {
        let gateway = InferenceGateway::builder(Arc::new(provider))
            .retry_policy(RetryPolicy::default().with_initial_backoff(Duration::from_millis(1)))
            .build();
        ChatService::new(gateway)
    }

    #[tokio::test]
    async fn empty_messages_are_rejected_before_any_work() {
        let service = service(PromptAwareProvider::new("CRISIS: NO", "AGENT: COMPASS", "hi"));

        let error = service
            .run_turn(ChatRequest::new("   "))
            .await
            .expect_err("empty message");
        assert_eq!(error.kind, ChatErrorKind::InvalidRequest);
        assert_eq!(service.store().len().await.expect("len"), 0);
    }

    #[tokio::test]
    async fn crisis_prefix_leads_the_response() {
        let service = service(PromptAwareProvider::new(
            "CRISIS: YES\nTYPE: MENTAL",
            "AGENT: COMPASS",
            "I'm here with you.",
        ));

        let response = service
            .run_turn(ChatRequest::new("I can't do this anymore"))
            .await
            .expect("turn");

        assert!(response.crisis_detected);
        assert_eq!(response.crisis_category, CrisisCategory::Mental);
        assert!(response.response.starts_with("⚠️ "));
        assert!(response.response.ends_with("\n\nI'm here with you."));
        assert!(response.response.contains("• 112 (Emergency) / 110 (Police)\n"));
    }

    #[tokio::test]
    async fn failed_scans_surface_as_safety_errors() {
        let service = service(PromptAwareProvider::failing_scan("AGENT: COMPASS", "hello"));

        let error = service
            .run_turn(ChatRequest::new("hello"))
            .await
            .expect_err("scan failure");
        assert_eq!(error.kind, ChatErrorKind::Safety);
    }

    #[tokio::test]
    async fn turn_locks_are_released_by_finished_and_dropped_turns() {
        let service = service(PromptAwareProvider::new("CRISIS: NO", "AGENT: COMPASS", "hi"));

        let response = service.run_turn(ChatRequest::new("hello")).await.expect("turn");
        assert_eq!(service.turn_locks.len(), 0);

        let events = service
            .stream_turn(ChatRequest::new("again").with_session_id(response.session_id.clone()))
            .await
            .expect("stream");
        assert_eq!(service.turn_locks.len(), 1);

        drop(events);
        assert_eq!(service.turn_locks.len(), 0);
        let session = service
            .store()
            .snapshot(&response.session_id)
            .await
            .expect("snapshot")
            .expect("live session");
        assert_eq!(session.turns.len(), 2);
    }

    #[tokio::test]
    async fn streamed_turns_start_with_the_specialist_and_end_with_the_response() {
        let service = service(PromptAwareProvider::new(
            "CRISIS: NO\nTYPE: NONE",
            "AGENT: ROLE_MODELS",
            "You belong here.",
        ));

        let events = service
            .stream_turn(ChatRequest::new("Do I even belong at university?"))
            .await
            .expect("stream")
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .expect("events");

        let Some(ChatEvent::Started { specialist, .. }) = events.first() else {
            panic!("first event should be Started");
        };
        assert_eq!(*specialist, SpecialistId::RoleModels);

        let streamed = events
            .iter()
            .filter_map(|event| match event {
                ChatEvent::TextDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect::<String>();
        assert_eq!(streamed, "You belong here.");

        let Some(ChatEvent::TurnComplete(response)) = events.last() else {
            panic!("last event should be TurnComplete");
        };
        assert_eq!(response.response, "You belong here.");
        assert!(!response.crisis_detected);

        let session = service
            .store()
            .snapshot(&response.session_id)
            .await
            .expect("snapshot")
            .expect("live session");
        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.metadata.current_specialist, Some(SpecialistId::RoleModels));
    }

    #[tokio::test]
    async fn streamed_crisis_banner_is_the_first_delta() {
        let service = service(PromptAwareProvider::new(
            "CRISIS: YES\nTYPE: FINANCIAL",
            "AGENT: FINANCING",
            "Let's look at emergency aid.",
        ));

        let events = service
            .stream_turn(ChatRequest::new("I can't pay rent this month"))
            .await
            .expect("stream")
            .collect::<Vec<_>>()
            .await;

        let Some(Ok(ChatEvent::TextDelta(first))) = events.get(1) else {
            panic!("second event should be a delta");
        };
        assert!(first.starts_with("⚠️ "));
    }

    #[tokio::test]
    async fn context_reaches_the_specialist_prompt_and_persists() {
        let provider = Arc::new(PromptAwareProvider::new("CRISIS: NO", "AGENT: COMPASS", "ok"));
        let gateway = InferenceGateway::new(provider.clone());
        let service = ChatService::new(gateway);

        let response = service
            .run_turn(ChatRequest::new("hello").with_context("first_generation", "yes"))
            .await
            .expect("turn");

        let answered = provider
            .requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter_map(|request| request.persona_prompt.clone())
            .any(|prompt| prompt.contains("- first_generation: yes"));
        assert!(answered);

        let session = service
            .store()
            .snapshot(&response.session_id)
            .await
            .expect("snapshot")
            .expect("live session");
        assert_eq!(
            session.metadata.context.get("first_generation").map(String::as_str),
            Some("yes")
        );
    }
}
