//! Core infrastructure for channel-refresh.
//!
//! Shared pieces used by the connection manager and its retry interceptor:
//! - Lifecycle event listeners
//! - Retry backoff schedules

pub mod backoff;
pub mod events;

pub use backoff::{Backoff, ExponentialBackoff, FixedBackoff};
pub use events::{EventListener, EventListeners, LifecycleEvent};
