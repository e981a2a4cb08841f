//! Ephemeral session storage.
//!
//! Sessions live only in process memory and expire lazily: a session idle for
//! longer than the timeout is treated as absent the next time it is looked up.
//! The map is guarded by one coarse lock; each session has its own lock so
//! concurrent turns on different sessions never contend on history.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kcommon::SessionId;
use kprovider::{Role, Turn};

use crate::{ChatError, MetadataUpdate, Session};

pub type ChatFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_TURNS: usize = 100;
pub const MIN_MAX_TURNS: usize = 2;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub trait SessionStore: Send + Sync {
    /// Returns `session_id` when it names a live session, otherwise a fresh session's id.
    fn get_or_create<'a>(
        &'a self,
        session_id: Option<&'a SessionId>,
    ) -> ChatFuture<'a, Result<SessionId, ChatError>>;

    /// Appends a user turn and returns a snapshot of the session including it.
    fn append_user<'a>(
        &'a self,
        session_id: &'a SessionId,
        text: &'a str,
    ) -> ChatFuture<'a, Result<Session, ChatError>>;

    /// Appends an assistant turn. Writes to a session deleted mid-turn are dropped.
    fn append_assistant<'a>(
        &'a self,
        session_id: &'a SessionId,
        text: &'a str,
    ) -> ChatFuture<'a, Result<(), ChatError>>;

    /// Appends a completed user/assistant pair under one lock, so a turn that
    /// fails or is abandoned leaves no trace. Dropped like `append_assistant`
    /// when the session is gone.
    fn append_exchange<'a>(
        &'a self,
        session_id: &'a SessionId,
        user: &'a str,
        assistant: &'a str,
    ) -> ChatFuture<'a, Result<(), ChatError>>;

    fn update_metadata<'a>(
        &'a self,
        session_id: &'a SessionId,
        update: MetadataUpdate,
    ) -> ChatFuture<'a, Result<(), ChatError>>;

    /// Unknown sessions count as expired.
    fn is_expired<'a>(&'a self, session_id: &'a SessionId) -> ChatFuture<'a, Result<bool, ChatError>>;

    fn snapshot<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> ChatFuture<'a, Result<Option<Session>, ChatError>>;

    /// Idempotent. Returns whether a session was removed.
    fn delete<'a>(&'a self, session_id: &'a SessionId) -> ChatFuture<'a, Result<bool, ChatError>>;

    fn len<'a>(&'a self) -> ChatFuture<'a, Result<usize, ChatError>>;

    /// Removes every expired session and returns how many were removed.
    fn purge_expired<'a>(&'a self) -> ChatFuture<'a, Result<usize, ChatError>>;
}

type SessionHandle = Arc<Mutex<Session>>;

#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    idle_timeout: Duration,
    max_turns: usize,
    clock: Arc<dyn Clock>,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_turns: DEFAULT_MAX_TURNS,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Bounds the stored history. Zero disables the bound; any other value is
    /// raised to 2 so the latest exchange always survives trimming.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = match max_turns {
            0 => 0,
            bound => bound.max(MIN_MAX_TURNS),
        };
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn expired(&self, session: &Session, now: Instant) -> bool {
        now.saturating_duration_since(session.last_activity) > self.idle_timeout
    }

    fn handle(&self, session_id: &SessionId) -> Result<Option<SessionHandle>, ChatError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| ChatError::store("session store lock poisoned"))?;
        Ok(sessions.get(session_id).cloned())
    }

    fn with_session<T>(
        &self,
        session_id: &SessionId,
        apply: impl FnOnce(&mut Session, Instant) -> T,
    ) -> Result<Option<T>, ChatError> {
        let Some(handle) = self.handle(session_id)? else {
            return Ok(None);
        };
        let mut session = handle
            .lock()
            .map_err(|_| ChatError::store("session lock poisoned"))?;
        Ok(Some(apply(&mut session, self.clock.now())))
    }

    fn push_turn(&self, session: &mut Session, turn: Turn, now: Instant) {
        session.turns.push(turn);
        session.last_activity = now;

        if self.max_turns == 0 || session.turns.len() <= self.max_turns {
            return;
        }

        let mut excess = session.turns.len() - self.max_turns;
        while excess < session.turns.len() && session.turns[excess].role == Role::Assistant {
            excess += 1;
        }
        session.turns.drain(..excess);
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_create<'a>(
        &'a self,
        session_id: Option<&'a SessionId>,
    ) -> ChatFuture<'a, Result<SessionId, ChatError>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| ChatError::store("session store lock poisoned"))?;

            if let Some(session_id) = session_id
                && let Some(handle) = sessions.get(session_id)
            {
                let expired = {
                    let session = handle
                        .lock()
                        .map_err(|_| ChatError::store("session lock poisoned"))?;
                    self.expired(&session, now)
                };

                if !expired {
                    return Ok(session_id.clone());
                }

                sessions.remove(session_id);
                tracing::debug!(
                    phase = "session",
                    event = "session_expired",
                    session_id = %session_id
                );
            }

            let session_id = SessionId::generate();
            sessions.insert(
                session_id.clone(),
                Arc::new(Mutex::new(Session::new(session_id.clone(), now))),
            );
            tracing::debug!(phase = "session", event = "session_created", session_id = %session_id);

            Ok(session_id)
        })
    }

    fn append_user<'a>(
        &'a self,
        session_id: &'a SessionId,
        text: &'a str,
    ) -> ChatFuture<'a, Result<Session, ChatError>> {
        Box::pin(async move {
            self.with_session(session_id, |session, now| {
                self.push_turn(session, Turn::user(text), now);
                session.clone()
            })?
            .ok_or_else(|| ChatError::store(format!("unknown session '{session_id}'")))
        })
    }

    fn append_assistant<'a>(
        &'a self,
        session_id: &'a SessionId,
        text: &'a str,
    ) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.with_session(session_id, |session, now| {
                self.push_turn(session, Turn::assistant(text), now);
            })?;
            Ok(())
        })
    }

    fn append_exchange<'a>(
        &'a self,
        session_id: &'a SessionId,
        user: &'a str,
        assistant: &'a str,
    ) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.with_session(session_id, |session, now| {
                self.push_turn(session, Turn::user(user), now);
                self.push_turn(session, Turn::assistant(assistant), now);
            })?;
            Ok(())
        })
    }

    fn update_metadata<'a>(
        &'a self,
        session_id: &'a SessionId,
        update: MetadataUpdate,
    ) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.with_session(session_id, |session, _| update.apply(&mut session.metadata))?;
            Ok(())
        })
    }

    fn is_expired<'a>(&'a self, session_id: &'a SessionId) -> ChatFuture<'a, Result<bool, ChatError>> {
        Box::pin(async move {
            Ok(self
                .with_session(session_id, |session, now| self.expired(session, now))?
                .unwrap_or(true))
        })
    }

    fn snapshot<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> ChatFuture<'a, Result<Option<Session>, ChatError>> {
        Box::pin(async move { self.with_session(session_id, |session, _| session.clone()) })
    }

    fn delete<'a>(&'a self, session_id: &'a SessionId) -> ChatFuture<'a, Result<bool, ChatError>> {
        Box::pin(async move {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| ChatError::store("session store lock poisoned"))?;
            Ok(sessions.remove(session_id).is_some())
        })
    }

    fn len<'a>(&'a self) -> ChatFuture<'a, Result<usize, ChatError>> {
        Box::pin(async move {
            let sessions = self
                .sessions
                .lock()
                .map_err(|_| ChatError::store("session store lock poisoned"))?;
            Ok(sessions.len())
        })
    }

    fn purge_expired<'a>(&'a self) -> ChatFuture<'a, Result<usize, ChatError>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| ChatError::store("session store lock poisoned"))?;

            let before = sessions.len();
            sessions.retain(|_, handle| match handle.lock() {
                Ok(session) => !self.expired(&session, now),
                Err(_) => false,
            });

            Ok(before - sessions.len())
        })
    }
}
