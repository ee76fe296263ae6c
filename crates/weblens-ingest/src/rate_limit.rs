use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use uuid::Uuid;

/// Events allowed per workspace per minute.
pub const DEFAULT_EVENTS_PER_MINUTE: u32 = 1000;

type KeyedLimiter = RateLimiter<Uuid, DefaultKeyedStateStore<Uuid>, DefaultClock>;

/// Per-workspace token bucket for event admission.
///
/// The bucket is keyed by workspace id and refills continuously; a batch is
/// admitted only if the whole batch fits the remaining budget.
pub struct WorkspaceRateLimiter {
    limiter: KeyedLimiter,
    events_per_minute: u32,
}

impl WorkspaceRateLimiter {
    pub fn new(events_per_minute: u32) -> Self {
        let quota = Quota::per_minute(
            NonZeroU32::new(events_per_minute.max(1)).expect("nonzero after max(1)"),
        );
        Self {
            limiter: RateLimiter::keyed(quota),
            events_per_minute,
        }
    }

    /// Try to admit `events` events for a workspace. Returns false when the
    /// budget is exhausted; the tokens stay untouched in that case.
    pub fn try_admit(&self, workspace_id: Uuid, events: usize) -> bool {
        let Some(n) = NonZeroU32::new(events.min(u32::MAX as usize) as u32) else {
            // An empty batch consumes no budget.
            return true;
        };
        if n.get() > self.events_per_minute {
            // Larger than the bucket can ever hold.
            return false;
        }
        matches!(self.limiter.check_key_n(&workspace_id, n), Ok(Ok(())))
    }
}

impl Default for WorkspaceRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENTS_PER_MINUTE)
    }
}
