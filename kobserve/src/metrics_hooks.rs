//! Metrics-based observability hooks for gateway operations and chat turn phases.
//!
//! ```rust
//! use kobserve::MetricsObservabilityHooks;
//! use kprovider::GatewayOperationHooks;
//!
//! fn accepts_gateway_hooks(_hooks: &dyn GatewayOperationHooks) {}
//!
//! let hooks = MetricsObservabilityHooks;
//! accepts_gateway_hooks(&hooks);
//! ```

use std::time::Duration;

use kagents::CrisisCategory;
use kchat::{ChatError, ChatRuntimeHooks, TurnPhase};
use kcommon::SessionId;
use kprovider::{GatewayError, GatewayOperationHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObservabilityHooks;

impl GatewayOperationHooks for MetricsObservabilityHooks {
    fn on_attempt_start(&self, provider: &str, operation: &str, _attempt: u32) {
        metrics::counter!(
            "koda_gateway_attempt_start_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        _attempt: u32,
        delay: Duration,
        error: &GatewayError,
    ) {
        metrics::counter!(
            "koda_gateway_retry_scheduled_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string(),
            "error_kind" => error.kind.as_str()
        )
        .increment(1);
        metrics::histogram!(
            "koda_gateway_retry_delay_seconds",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(delay.as_secs_f64());
    }

    fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
        metrics::counter!(
            "koda_gateway_success_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
        metrics::histogram!(
            "koda_gateway_attempts_per_success",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(attempts as f64);
    }

    fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &GatewayError) {
        metrics::counter!(
            "koda_gateway_failure_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string(),
            "error_kind" => error.kind.as_str()
        )
        .increment(1);
        metrics::histogram!(
            "koda_gateway_attempts_per_failure",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(attempts as f64);
    }
}

impl ChatRuntimeHooks for MetricsObservabilityHooks {
    fn on_phase_start(&self, phase: TurnPhase, _session_id: &SessionId) {
        metrics::counter!("koda_turn_phase_start_total", "phase" => phase.as_str()).increment(1);
    }

    fn on_phase_success(&self, phase: TurnPhase, _session_id: &SessionId, elapsed: Duration) {
        metrics::counter!("koda_turn_phase_success_total", "phase" => phase.as_str())
            .increment(1);
        metrics::histogram!(
            "koda_turn_phase_duration_seconds",
            "phase" => phase.as_str(),
            "status" => "success"
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_phase_failure(
        &self,
        phase: TurnPhase,
        _session_id: &SessionId,
        error: &ChatError,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "koda_turn_phase_failure_total",
            "phase" => phase.as_str(),
            "error_kind" => error.kind.as_str()
        )
        .increment(1);
        metrics::histogram!(
            "koda_turn_phase_duration_seconds",
            "phase" => phase.as_str(),
            "status" => "failure"
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_crisis_detected(&self, _session_id: &SessionId, category: CrisisCategory) {
        metrics::counter!("koda_crisis_detected_total", "category" => category.as_str())
            .increment(1);
    }
}
