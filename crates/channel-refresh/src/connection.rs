//! The single channel slot with deferred close of superseded channels.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use channel_refresh_core::events::EventListeners;
use tokio::time::Instant;

use crate::dialer::ChannelHandle;
use crate::events::ConnectionEvent;
use crate::logger::Logger;

/// How long a superseded channel stays open for in-flight calls.
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

struct Slot<C> {
    channel: Option<Arc<C>>,
    last_established: Option<Instant>,
    max_age: Duration,
    generation: u64,
}

/// Holds the currently active channel for one target.
///
/// Readers never block behind a close: [`swap`](Self::swap) only holds the
/// write lock while replacing the pointer, and the previous channel is closed
/// from a background task once the grace period has elapsed.
pub struct Connection<C> {
    id: String,
    slot: RwLock<Slot<C>>,
    grace_period: Duration,
    logger: Logger,
    listeners: EventListeners<ConnectionEvent>,
}

impl<C: ChannelHandle> Connection<C> {
    /// An empty slot identified by `id` (the target address).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slot: RwLock::new(Slot {
                channel: None,
                last_established: None,
                max_age: Duration::ZERO,
                generation: 0,
            }),
            grace_period: GRACE_PERIOD,
            logger: Logger::noop(),
            listeners: EventListeners::new(),
        }
    }

    /// Overrides [`GRACE_PERIOD`].
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub(crate) fn with_listeners(mut self, listeners: EventListeners<ConnectionEvent>) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// The active channel, if one was published and not closed.
    pub fn current(&self) -> Option<Arc<C>> {
        self.read().channel.clone()
    }

    /// Publishes `channel` as the active one and returns it.
    ///
    /// Records the establishment time and `max_age`, and schedules the
    /// previously active channel to close after the grace period.
    pub fn swap(&self, channel: C, max_age: Duration) -> Arc<C> {
        let channel = Arc::new(channel);
        self.logger
            .logf(format_args!("Setting new connection (ID: {})", self.id));

        let previous = {
            let mut slot = self.write();
            let previous = slot.channel.replace(Arc::clone(&channel));
            let previous_generation = slot.generation;
            slot.last_established = Some(Instant::now());
            slot.max_age = max_age;
            slot.generation += 1;
            previous.map(|previous| (previous, previous_generation))
        };

        if let Some((previous, generation)) = previous {
            self.schedule_close(previous, generation);
        }

        channel
    }

    /// Whether the active channel has reached its maximum age.
    ///
    /// An empty slot is always expired.
    pub fn is_expired(&self) -> bool {
        let slot = self.read();
        match (&slot.channel, slot.last_established) {
            (Some(_), Some(at)) => at.elapsed() >= slot.max_age,
            _ => true,
        }
    }

    /// Time since the last successful [`swap`](Self::swap).
    pub fn age(&self) -> Option<Duration> {
        self.read().last_established.map(|at| at.elapsed())
    }

    pub fn last_established(&self) -> Option<Instant> {
        self.read().last_established
    }

    /// Number of channels published so far.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Closes and clears the active channel immediately.
    ///
    /// Channels still waiting out their grace period close on schedule.
    /// Calling this on an empty slot does nothing.
    pub fn close(&self) {
        let channel = self.write().channel.take();
        if let Some(channel) = channel {
            self.logger
                .logf(format_args!("gRPC close connection Id: {}", self.id));
            channel.close();
            self.listeners.emit(&ConnectionEvent::Closed {
                target: self.id.clone(),
                timestamp: std::time::Instant::now(),
            });
        }
    }

    fn schedule_close(&self, channel: Arc<C>, generation: u64) {
        let deadline = Instant::now() + self.grace_period;
        let close = DeferredClose {
            id: self.id.clone(),
            channel: Some(channel),
            generation,
            logger: self.logger.clone(),
            listeners: self.listeners.clone(),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    close.run();
                });
            }
            Err(_) => {
                let grace_period = self.grace_period;
                std::thread::spawn(move || {
                    std::thread::sleep(grace_period);
                    close.run();
                });
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Slot<C>> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot<C>> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("active", &slot.channel.is_some())
            .field("generation", &slot.generation)
            .field("last_established", &slot.last_established)
            .field("max_age", &slot.max_age)
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

/// Closes a superseded channel once. If the task running it is dropped
/// before the grace period ends, as on runtime shutdown, the channel is
/// closed on drop instead.
struct DeferredClose<C: ChannelHandle> {
    id: String,
    channel: Option<Arc<C>>,
    generation: u64,
    logger: Logger,
    listeners: EventListeners<ConnectionEvent>,
}

impl<C: ChannelHandle> DeferredClose<C> {
    fn run(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        channel.close();
        self.logger.logf(format_args!(
            "Old gRPC connection (ID: {}) closed after grace period.",
            self.id
        ));
        self.listeners.emit(&ConnectionEvent::GracefulClose {
            target: self.id.clone(),
            timestamp: std::time::Instant::now(),
            generation: self.generation,
        });
    }
}

impl<C: ChannelHandle> Drop for DeferredClose<C> {
    fn drop(&mut self) {
        self.finish();
    }
}
