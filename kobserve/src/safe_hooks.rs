use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use kagents::CrisisCategory;
use kchat::{ChatError, ChatRuntimeHooks, TurnPhase};
use kcommon::SessionId;
use kprovider::{GatewayError, GatewayOperationHooks};

/// Swallows panics raised by the wrapped gateway hooks.
pub struct SafeGatewayHooks<H> {
    inner: H,
}

impl<H> SafeGatewayHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> GatewayOperationHooks for SafeGatewayHooks<H>
where
    H: GatewayOperationHooks,
{
    fn on_attempt_start(&self, provider: &str, operation: &str, attempt: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_attempt_start(provider, operation, attempt)
        }));
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &GatewayError,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_retry_scheduled(provider, operation, attempt, delay, error)
        }));
    }

    fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_success(provider, operation, attempts)
        }));
    }

    fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &GatewayError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_failure(provider, operation, attempts, error)
        }));
    }
}

/// Swallows panics raised by the wrapped chat hooks.
pub struct SafeChatHooks<H> {
    inner: H,
}

impl<H> SafeChatHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ChatRuntimeHooks for SafeChatHooks<H>
where
    H: ChatRuntimeHooks,
{
    fn on_phase_start(&self, phase: TurnPhase, session_id: &SessionId) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_phase_start(phase, session_id)
        }));
    }

    fn on_phase_success(&self, phase: TurnPhase, session_id: &SessionId, elapsed: Duration) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_phase_success(phase, session_id, elapsed)
        }));
    }

    fn on_phase_failure(
        &self,
        phase: TurnPhase,
        session_id: &SessionId,
        error: &ChatError,
        elapsed: Duration,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_phase_failure(phase, session_id, error, elapsed)
        }));
    }

    fn on_crisis_detected(&self, session_id: &SessionId, category: CrisisCategory) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_crisis_detected(session_id, category)
        }));
    }
}

/// Fans every callback out to two hook sets, in order.
pub struct CombinedHooks<A, B> {
    first: A,
    second: B,
}

impl<A, B> CombinedHooks<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> GatewayOperationHooks for CombinedHooks<A, B>
where
    A: GatewayOperationHooks,
    B: GatewayOperationHooks,
{
    fn on_attempt_start(&self, provider: &str, operation: &str, attempt: u32) {
        self.first.on_attempt_start(provider, operation, attempt);
        self.second.on_attempt_start(provider, operation, attempt);
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &GatewayError,
    ) {
        self.first
            .on_retry_scheduled(provider, operation, attempt, delay, error);
        self.second
            .on_retry_scheduled(provider, operation, attempt, delay, error);
    }

    fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
        self.first.on_success(provider, operation, attempts);
        self.second.on_success(provider, operation, attempts);
    }

    fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &GatewayError) {
        self.first.on_failure(provider, operation, attempts, error);
        self.second.on_failure(provider, operation, attempts, error);
    }
}

impl<A, B> ChatRuntimeHooks for CombinedHooks<A, B>
where
    A: ChatRuntimeHooks,
    B: ChatRuntimeHooks,
{
    fn on_phase_start(&self, phase: TurnPhase, session_id: &SessionId) {
        self.first.on_phase_start(phase, session_id);
        self.second.on_phase_start(phase, session_id);
    }

    fn on_phase_success(&self, phase: TurnPhase, session_id: &SessionId, elapsed: Duration) {
        self.first.on_phase_success(phase, session_id, elapsed);
        self.second.on_phase_success(phase, session_id, elapsed);
    }

    fn on_phase_failure(
        &self,
        phase: TurnPhase,
        session_id: &SessionId,
        error: &ChatError,
        elapsed: Duration,
    ) {
        self.first.on_phase_failure(phase, session_id, error, elapsed);
        self.second.on_phase_failure(phase, session_id, error, elapsed);
    }

    fn on_crisis_detected(&self, session_id: &SessionId, category: CrisisCategory) {
        self.first.on_crisis_detected(session_id, category);
        self.second.on_crisis_detected(session_id, category);
    }
}
