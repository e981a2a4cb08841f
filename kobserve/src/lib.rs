//! Observability hooks for gateway operations and chat turn phases.
//!
//! ```rust
//! use kobserve::{
//!     CombinedHooks, MetricsObservabilityHooks, SafeChatHooks, SafeGatewayHooks,
//!     TracingObservabilityHooks,
//! };
//!
//! let _gateway_hooks = SafeGatewayHooks::new(TracingObservabilityHooks);
//! let _chat_hooks = SafeChatHooks::new(CombinedHooks::new(
//!     TracingObservabilityHooks,
//!     MetricsObservabilityHooks,
//! ));
//! ```

mod metrics_hooks;
mod safe_hooks;
mod tracing_hooks;

pub use metrics_hooks::MetricsObservabilityHooks;
pub use safe_hooks::{CombinedHooks, SafeChatHooks, SafeGatewayHooks};
pub use tracing_hooks::TracingObservabilityHooks;

pub mod prelude {
    pub use crate::{
        CombinedHooks, MetricsObservabilityHooks, SafeChatHooks, SafeGatewayHooks,
        TracingObservabilityHooks,
    };
}
