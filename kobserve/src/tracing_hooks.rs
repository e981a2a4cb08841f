//! Tracing-based observability hooks for gateway operations and chat turn phases.
//!
//! ```rust
//! use kchat::ChatRuntimeHooks;
//! use kobserve::TracingObservabilityHooks;
//!
//! fn accepts_chat_hooks(_hooks: &dyn ChatRuntimeHooks) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_chat_hooks(&hooks);
//! ```

use std::time::Duration;

use kagents::CrisisCategory;
use kchat::{ChatError, ChatRuntimeHooks, TurnPhase};
use kcommon::SessionId;
use kprovider::{GatewayError, GatewayOperationHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

impl GatewayOperationHooks for TracingObservabilityHooks {
    fn on_attempt_start(&self, provider: &str, operation: &str, attempt: u32) {
        tracing::debug!(
            phase = "gateway",
            event = "attempt_start",
            provider,
            operation,
            attempt
        );
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &GatewayError,
    ) {
        tracing::warn!(
            phase = "gateway",
            event = "retry_scheduled",
            provider,
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error_kind = error.kind.as_str(),
            error = %error
        );
    }

    fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
        tracing::debug!(
            phase = "gateway",
            event = "success",
            provider,
            operation,
            attempts
        );
    }

    fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &GatewayError) {
        tracing::error!(
            phase = "gateway",
            event = "failure",
            provider,
            operation,
            attempts,
            error_kind = error.kind.as_str(),
            retryable = error.retryable,
            error = %error
        );
    }
}

impl ChatRuntimeHooks for TracingObservabilityHooks {
    fn on_phase_start(&self, phase: TurnPhase, session_id: &SessionId) {
        tracing::debug!(
            phase = "turn",
            event = "phase_start",
            turn_phase = phase.as_str(),
            session_id = %session_id
        );
    }

    fn on_phase_success(&self, phase: TurnPhase, session_id: &SessionId, elapsed: Duration) {
        tracing::info!(
            phase = "turn",
            event = "phase_success",
            turn_phase = phase.as_str(),
            session_id = %session_id,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_phase_failure(
        &self,
        phase: TurnPhase,
        session_id: &SessionId,
        error: &ChatError,
        elapsed: Duration,
    ) {
        tracing::error!(
            phase = "turn",
            event = "phase_failure",
            turn_phase = phase.as_str(),
            session_id = %session_id,
            elapsed_ms = elapsed.as_millis() as u64,
            error_kind = error.kind.as_str(),
            error = %error
        );
    }

    fn on_crisis_detected(&self, session_id: &SessionId, category: CrisisCategory) {
        tracing::warn!(
            phase = "turn",
            event = "crisis_detected",
            session_id = %session_id,
            category = category.as_str()
        );
    }
}
