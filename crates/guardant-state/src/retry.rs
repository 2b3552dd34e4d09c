//! RetryPolicy — shared backoff arithmetic for every redelivery path.
//!
//! The job queue and the result outbox both count failures per item and
//! space redeliveries exponentially; this value object is the single
//! place that math lives.

use serde::{Deserialize, Serialize};

/// Exponential backoff parameters for a redelivery path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff multiplier applied per retry.
    pub multiplier: u32,
    /// Retries after which the item is dropped.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(base_delay_ms: u64, multiplier: u32, max_attempts: u32) -> Self {
        Self { base_delay_ms, multiplier, max_attempts }
    }

    /// Queue defaults: three delivery attempts, backoff from 2 seconds.
    pub const fn queue_default() -> Self {
        Self::new(2_000, 2, 3)
    }

    /// Outbox defaults: five flush attempts per entry, backoff from 5 seconds.
    pub const fn outbox_default() -> Self {
        Self::new(5_000, 2, 5)
    }

    /// Delay before the `(retry_count + 1)`-th retry:
    /// `base_delay_ms * multiplier^retry_count`, saturating.
    pub fn delay_ms(&self, retry_count: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul((self.multiplier as u64).saturating_pow(retry_count))
    }

    /// Epoch-ms instant at which the next retry becomes due.
    pub fn next_attempt_at(&self, now_ms: u64, retry_count: u32) -> u64 {
        now_ms.saturating_add(self.delay_ms(retry_count))
    }

    /// True once an item has used up its retry budget.
    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_per_retry() {
        let policy = RetryPolicy::queue_default();
        assert_eq!(policy.delay_ms(0), 2_000);
        assert_eq!(policy.delay_ms(1), 4_000);
        assert_eq!(policy.delay_ms(2), 8_000);
    }

    #[test]
    fn next_attempt_is_offset_from_now() {
        let policy = RetryPolicy::new(1_000, 2, 5);
        assert_eq!(policy.next_attempt_at(10_000, 0), 11_000);
        assert_eq!(policy.next_attempt_at(10_000, 3), 18_000);
    }

    #[test]
    fn exhaustion_boundary() {
        let policy = RetryPolicy::outbox_default();
        assert!(!policy.exhausted(4));
        assert!(policy.exhausted(5));
        assert!(policy.exhausted(6));
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(u64::MAX / 2, 4, 10);
        assert_eq!(policy.delay_ms(8), u64::MAX);
        assert_eq!(policy.next_attempt_at(u64::MAX - 1, 1), u64::MAX);
    }
}
