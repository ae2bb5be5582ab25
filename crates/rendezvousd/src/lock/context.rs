//! Deadline and cancellation context threaded through blocking lock calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared flag used to abandon an in-flight acquisition from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Builds a token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every operation bound to this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bounds a blocking operation by an optional deadline and a cancel token.
#[derive(Debug, Clone)]
pub struct LockContext {
    started: Instant,
    deadline: Option<Instant>,
    token: CancelToken,
}

/// Reason a context stopped an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextExpiry {
    Cancelled,
    DeadlineExceeded,
}

impl LockContext {
    /// Context that never times out; only the token can interrupt it.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
            token: CancelToken::new(),
        }
    }

    /// Context expiring `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started.checked_add(timeout),
            token: CancelToken::new(),
        }
    }

    /// Context built from an optional timeout, unbounded when `None`.
    #[must_use]
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::unbounded, Self::with_timeout)
    }

    /// Binds the context to an existing cancel token.
    #[must_use]
    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }

    /// Token observed by this context.
    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn expiry(&self) -> Option<ContextExpiry> {
        if self.token.is_cancelled() {
            return Some(ContextExpiry::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextExpiry::DeadlineExceeded),
            _ => None,
        }
    }
}

impl Default for LockContext {
    fn default() -> Self {
        Self::unbounded()
    }
}
