//! Retry backoff schedules.

use std::time::Duration;

/// Delay to wait after a failed attempt before trying again.
pub trait Backoff: Send + Sync {
    /// `attempt` is zero-based: the wait after the first failure uses `0`.
    fn delay(&self, attempt: usize) -> Duration;
}

/// The same delay after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn delay(&self, _attempt: usize) -> Duration {
        self.0
    }
}

/// `base * 2^attempt`, optionally capped. Saturates at [`Duration::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, cap: None }
    }

    /// Never wait longer than `cap`.
    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: usize) -> Duration {
        let doubled = u32::try_from(attempt)
            .ok()
            .and_then(|shift| 1u32.checked_shl(shift))
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(Duration::MAX);

        match self.cap {
            Some(cap) => doubled.min(cap),
            None => doubled,
        }
    }
}
