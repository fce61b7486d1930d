use std::time::{Duration, Instant};

use channel_refresh_core::events::LifecycleEvent;

/// Events emitted while managing the channel slot.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A new channel was dialed and published.
    Established {
        target: String,
        timestamp: Instant,
        generation: u64,
    },
    /// Dialing failed; the previous channel stays active.
    EstablishFailed {
        target: String,
        timestamp: Instant,
        error: String,
    },
    /// A reconnect request arrived within the throttle window and was skipped.
    Throttled {
        target: String,
        timestamp: Instant,
        since_last: Duration,
    },
    /// A superseded channel was closed after its grace period.
    GracefulClose {
        target: String,
        timestamp: Instant,
        generation: u64,
    },
    /// The active channel was closed on shutdown.
    Closed { target: String, timestamp: Instant },
}

impl LifecycleEvent for ConnectionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ConnectionEvent::Established { .. } => "Established",
            ConnectionEvent::EstablishFailed { .. } => "EstablishFailed",
            ConnectionEvent::Throttled { .. } => "Throttled",
            ConnectionEvent::GracefulClose { .. } => "GracefulClose",
            ConnectionEvent::Closed { .. } => "Closed",
        }
    }

    fn target(&self) -> &str {
        match self {
            ConnectionEvent::Established { target, .. }
            | ConnectionEvent::EstablishFailed { target, .. }
            | ConnectionEvent::Throttled { target, .. }
            | ConnectionEvent::GracefulClose { target, .. }
            | ConnectionEvent::Closed { target, .. } => target,
        }
    }
}

/// Events emitted by the retry interceptor.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A transient failure; the call is retried after `delay`.
    Retry {
        target: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The call succeeded after `attempts` invocations.
    Success {
        target: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Every attempt failed transiently.
    Exhausted {
        target: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The call failed with an error that is never retried.
    NonTransient { target: String, timestamp: Instant },
    /// The call context fired before the call completed.
    Interrupted {
        target: String,
        timestamp: Instant,
        attempts: usize,
    },
}

impl LifecycleEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "Retry",
            RetryEvent::Success { .. } => "Success",
            RetryEvent::Exhausted { .. } => "Exhausted",
            RetryEvent::NonTransient { .. } => "NonTransient",
            RetryEvent::Interrupted { .. } => "Interrupted",
        }
    }

    fn target(&self) -> &str {
        match self {
            RetryEvent::Retry { target, .. }
            | RetryEvent::Success { target, .. }
            | RetryEvent::Exhausted { target, .. }
            | RetryEvent::NonTransient { target, .. }
            | RetryEvent::Interrupted { target, .. } => target,
        }
    }
}
