//! Continuous-refill token bucket for a single client key.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Request may proceed.
    Admitted {
        /// Bucket capacity
        limit: u32,
        /// Tokens left after this request
        remaining: f64,
    },
    /// Request exceeds the client's quota.
    Rejected {
        /// Bucket capacity
        limit: u32,
        /// Time until the requested cost is available again
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected { .. })
    }

    pub fn limit(&self) -> u32 {
        match self {
            Decision::Admitted { limit, .. } | Decision::Rejected { limit, .. } => *limit,
        }
    }

    /// Whole tokens left; always 0 when rejected.
    pub fn remaining(&self) -> u64 {
        match self {
            Decision::Admitted { remaining, .. } => remaining.floor().max(0.0) as u64,
            Decision::Rejected { .. } => 0,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket refilled lazily on every check.
///
/// `tokens` stays within `[0, capacity]`: refill is capped at `capacity`, and
/// the check-then-subtract happens under the bucket's own mutex, so two
/// callers can never both spend the last token.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64,
    limit: u32,
}

impl TokenBucket {
    /// Full bucket holding `capacity` tokens, refilled at `refill_rate`
    /// tokens per second.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self::new_at(capacity, refill_rate, Instant::now())
    }

    pub fn new_at(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        let capacity_f = f64::from(capacity);
        Self {
            state: Mutex::new(BucketState { tokens: capacity_f, last_refill: now }),
            capacity: capacity_f,
            refill_rate,
            limit: capacity,
        }
    }

    /// Bucket that refills from empty to full over `window`.
    pub fn per_window(capacity: u32, window: Duration) -> Self {
        Self::new(capacity, refill_rate_for(capacity, window))
    }

    pub fn allow(&self, cost: f64) -> Decision {
        self.allow_at(cost, Instant::now())
    }

    /// Admission check at an explicit instant.
    ///
    /// An instant earlier than the last refill counts as zero elapsed time.
    pub fn allow_at(&self, cost: f64, now: Instant) -> Decision {
        // A panic can't leave BucketState half-updated, so a poisoned lock is still usable.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= cost {
            state.tokens -= cost;
            Decision::Admitted { limit: self.limit, remaining: state.tokens }
        } else {
            Decision::Rejected { limit: self.limit, retry_after: self.time_until(cost, state.tokens) }
        }
    }

    fn time_until(&self, cost: f64, tokens: f64) -> Duration {
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        let secs = (cost - tokens).max(0.0) / self.refill_rate;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Current token count without refilling.
    pub fn tokens(&self) -> f64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).tokens
    }

    /// Instant of the last admission check (or creation).
    pub fn last_refill(&self) -> Instant {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).last_refill
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

/// Tokens per second needed to refill `capacity` tokens over `window`.
pub fn refill_rate_for(capacity: u32, window: Duration) -> f64 {
    let secs = window.as_secs_f64();
    if secs <= 0.0 {
        return f64::INFINITY;
    }
    f64::from(capacity) / secs
}
