//! Runtime hook contracts for observing the phases of a chat turn.
//!
//! ```rust
//! use kchat::{ChatRuntimeHooks, NoopChatHooks, TurnPhase};
//!
//! fn accepts_hooks(_hooks: &dyn ChatRuntimeHooks) {}
//!
//! accepts_hooks(&NoopChatHooks);
//! assert_eq!(TurnPhase::Scan.as_str(), "scan");
//! ```

use std::time::Duration;

use kagents::CrisisCategory;
use kcommon::SessionId;

use crate::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnPhase {
    Scan,
    Route,
    Respond,
}

impl TurnPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Route => "route",
            Self::Respond => "respond",
        }
    }
}

pub trait ChatRuntimeHooks: Send + Sync {
    fn on_phase_start(&self, _phase: TurnPhase, _session_id: &SessionId) {}

    fn on_phase_success(&self, _phase: TurnPhase, _session_id: &SessionId, _elapsed: Duration) {}

    fn on_phase_failure(
        &self,
        _phase: TurnPhase,
        _session_id: &SessionId,
        _error: &ChatError,
        _elapsed: Duration,
    ) {
    }

    fn on_crisis_detected(&self, _session_id: &SessionId, _category: CrisisCategory) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChatHooks;

impl ChatRuntimeHooks for NoopChatHooks {}
