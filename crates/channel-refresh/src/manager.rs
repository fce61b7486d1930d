//! Age-based refresh and throttled reconnection of a single channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::channel::ManagedChannel;
use crate::config::{ConnectionManagerBuilder, ManagerConfig, MIN_CONNECTION_AGE};
use crate::connection::Connection;
use crate::dialer::{DialOptions, Dialer};
use crate::error::{ConnectError, RefreshError};
use crate::events::{ConnectionEvent, RetryEvent};
use crate::interceptor::RetryInterceptor;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

#[cfg(feature = "metrics")]
static METRICS_INIT: std::sync::Once = std::sync::Once::new();

/// Owns the channel to one target and keeps it fresh.
///
/// Cloning is cheap and shares the same channel slot.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use channel_refresh::{ChannelHandle, ConnectionManager, ConnectivityState, FnDialer};
///
/// struct Stub;
///
/// impl ChannelHandle for Stub {
///     fn close(&self) {}
///     fn state(&self) -> ConnectivityState {
///         ConnectivityState::Ready
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), channel_refresh::RefreshError> {
/// let dialer = FnDialer::new(|_, _| Ok::<_, std::io::Error>(Stub));
/// let manager = ConnectionManager::new("localhost:50051", Duration::from_secs(60), 3, false, dialer);
///
/// let first = manager.get_connection()?;
/// let second = manager.get_connection()?;
/// assert!(first.same_channel(&second));
///
/// manager.close();
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<D: Dialer> {
    shared: Arc<Shared<D>>,
}

pub(crate) struct Shared<D: Dialer> {
    target: String,
    pub(crate) config: ManagerConfig,
    dialer: D,
    pub(crate) connection: Connection<D::Channel>,
    establishing: Mutex<()>,
    closed: AtomicBool,
}

impl<D: Dialer> ConnectionManager<D> {
    /// Creates a manager for `target`.
    ///
    /// `max_connection_age` below [`MIN_CONNECTION_AGE`] is raised to it.
    /// With `enable_logging` set, lifecycle lines are written through
    /// `tracing`. No channel is dialed until the first
    /// [`get_connection`](Self::get_connection).
    pub fn new(
        target: impl Into<String>,
        max_connection_age: Duration,
        max_retries: u32,
        enable_logging: bool,
        dialer: D,
    ) -> Self {
        ConnectionManagerBuilder::new(target)
            .max_connection_age(max_connection_age)
            .max_retries(max_retries)
            .enable_logging(enable_logging)
            .build(dialer)
    }

    pub(crate) fn from_parts(target: String, config: ManagerConfig, dialer: D) -> Self {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "channel_refresh_establish_total",
                    "Channel establishment attempts by outcome"
                );
                describe_counter!(
                    "channel_refresh_throttled_total",
                    "Reconnect requests skipped because the channel was too young"
                );
                describe_counter!(
                    "channel_refresh_retries_total",
                    "Calls retried after a transient failure"
                );
                describe_counter!(
                    "channel_refresh_calls_total",
                    "Intercepted calls by final outcome"
                );
            });
        }

        let connection = Connection::new(target.clone())
            .with_grace_period(config.grace_period)
            .with_logger(config.logger.clone())
            .with_listeners(config.connection_listeners.clone());

        Self {
            shared: Arc::new(Shared {
                target,
                config,
                dialer,
                connection,
                establishing: Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a fresh channel, establishing one first if the current channel
    /// is missing or older than the maximum connection age.
    ///
    /// On an establishment error the previous channel stays in place. The
    /// error carries it as [`ConnectError::stale`], so callers can keep
    /// using the expired channel until a refresh succeeds.
    pub fn get_connection(&self) -> Result<ManagedChannel<D>, ConnectError<D>> {
        self.shared.get_connection()
    }

    /// Re-establishes the channel unless the last establishment happened less
    /// than [`MIN_CONNECTION_AGE`] ago, in which case the current channel is
    /// returned unchanged.
    pub fn try_reconnect(&self) -> Result<ManagedChannel<D>, RefreshError> {
        self.shared.try_reconnect()
    }

    /// Whether the next [`get_connection`](Self::get_connection) will dial.
    pub fn should_reconnect(&self) -> bool {
        self.shared.connection.is_expired()
    }

    /// The active channel without refreshing it.
    pub fn current(&self) -> Option<ManagedChannel<D>> {
        self.shared.current()
    }

    /// Closes the active channel and refuses further establishment.
    ///
    /// Superseded channels still close when their grace period ends.
    pub fn close(&self) {
        let _guard = self.shared.lock_establishing();
        self.shared.closed.store(true, Ordering::Release);
        self.shared.connection.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Backoff before retrying after the failed zero-based `attempt`.
    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        self.shared.config.backoff_duration(attempt)
    }

    pub fn target(&self) -> &str {
        &self.shared.target
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn dial_options(&self) -> &DialOptions {
        &self.shared.config.dial_options
    }

    /// Number of channels established so far.
    pub fn generation(&self) -> u64 {
        self.shared.connection.generation()
    }

    /// Time since the last successful establishment.
    pub fn connection_age(&self) -> Option<Duration> {
        self.shared.connection.age()
    }

    /// The retry interceptor installed on every channel of this manager.
    pub fn interceptor(&self) -> RetryInterceptor<D> {
        RetryInterceptor::new(Arc::downgrade(&self.shared))
    }
}

impl<D: Dialer> Clone for ConnectionManager<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Dialer> std::fmt::Debug for ConnectionManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.shared.target)
            .field("config", &self.shared.config)
            .field("connection", &self.shared.connection)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<D: Dialer> Shared<D> {
    pub(crate) fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn get_connection(self: &Arc<Self>) -> Result<ManagedChannel<D>, ConnectError<D>> {
        self.ensure_open()?;

        if self.connection.is_expired() {
            let _guard = self.lock_establishing();
            // Another caller may have refreshed while we waited for the lock.
            if self.connection.is_expired() {
                return match self.establish() {
                    Ok(channel) => Ok(ManagedChannel::new(channel, self.interceptor())),
                    Err(error) => Err(ConnectError::new(error, self.current())),
                };
            }
        }

        self.current()
            .ok_or_else(|| ConnectError::from(self.closed_error()))
    }

    pub(crate) fn try_reconnect(self: &Arc<Self>) -> Result<ManagedChannel<D>, RefreshError> {
        self.ensure_open()?;

        let _guard = self.lock_establishing();
        match self.connection.age() {
            Some(since_last) if since_last < MIN_CONNECTION_AGE => {
                self.config.logger.logf(format_args!(
                    "Skipping reconnect for {}: last connection established {:?} ago",
                    self.target, since_last
                ));
                self.config
                    .connection_listeners
                    .emit(&ConnectionEvent::Throttled {
                        target: self.target.clone(),
                        timestamp: std::time::Instant::now(),
                        since_last,
                    });

                #[cfg(feature = "metrics")]
                counter!("channel_refresh_throttled_total", "target" => self.target.clone())
                    .increment(1);

                self.current().ok_or_else(|| self.closed_error())
            }
            _ => {
                let channel = self.establish()?;
                Ok(ManagedChannel::new(channel, self.interceptor()))
            }
        }
    }

    pub(crate) fn current(self: &Arc<Self>) -> Option<ManagedChannel<D>> {
        self.connection
            .current()
            .map(|channel| ManagedChannel::new(channel, self.interceptor()))
    }

    pub(crate) fn emit_retry(&self, event: RetryEvent) {
        self.config.retry_listeners.emit(&event);
    }

    /// Dials and publishes a new channel. Callers hold the establishment lock.
    fn establish(&self) -> Result<Arc<D::Channel>, RefreshError> {
        self.ensure_open()?;

        match self.dialer.dial(&self.target, &self.config.dial_options) {
            Ok(channel) => {
                let channel = self
                    .connection
                    .swap(channel, self.config.max_connection_age);
                let generation = self.connection.generation();

                self.config
                    .connection_listeners
                    .emit(&ConnectionEvent::Established {
                        target: self.target.clone(),
                        timestamp: std::time::Instant::now(),
                        generation,
                    });

                #[cfg(feature = "metrics")]
                counter!(
                    "channel_refresh_establish_total",
                    "target" => self.target.clone(),
                    "outcome" => "success"
                )
                .increment(1);

                Ok(channel)
            }
            Err(err) => {
                let message = err.to_string();
                self.config.logger.logf(format_args!(
                    "Failed to establish connection to {}: {}",
                    self.target, message
                ));
                self.config
                    .connection_listeners
                    .emit(&ConnectionEvent::EstablishFailed {
                        target: self.target.clone(),
                        timestamp: std::time::Instant::now(),
                        error: message,
                    });

                #[cfg(feature = "metrics")]
                counter!(
                    "channel_refresh_establish_total",
                    "target" => self.target.clone(),
                    "outcome" => "failure"
                )
                .increment(1);

                Err(RefreshError::Establish {
                    target: self.target.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    fn interceptor(self: &Arc<Self>) -> RetryInterceptor<D> {
        RetryInterceptor::new(Arc::downgrade(self))
    }

    fn ensure_open(&self) -> Result<(), RefreshError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> RefreshError {
        RefreshError::Closed {
            target: self.target.clone(),
        }
    }

    fn lock_establishing(&self) -> MutexGuard<'_, ()> {
        self.establishing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
