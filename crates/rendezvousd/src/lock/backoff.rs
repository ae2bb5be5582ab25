//! Randomised exponential backoff for lock polling.
//!
//! Many build subprocesses fail the fast path at the same moment and then
//! converge on the exclusive lock. Jitter spreads their retries so the lock
//! file is not hammered in lockstep.

use std::time::Duration;

use rand::Rng;

const INITIAL_DELAY: Duration = Duration::from_millis(5);
const MAX_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub(super) struct Backoff {
    current: Duration,
}

impl Backoff {
    pub(super) const fn new() -> Self {
        Self {
            current: INITIAL_DELAY,
        }
    }

    /// Next sleep interval, capped by the time left on the context.
    pub(super) fn next_delay(&mut self, remaining: Option<Duration>) -> Duration {
        let base = self.current;
        self.current = base.saturating_mul(2).min(MAX_DELAY);
        let ceiling = u64::try_from((base / 2).as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling));
        let delay = base.saturating_add(jitter);
        remaining.map_or(delay, |left| delay.min(left))
    }
}
