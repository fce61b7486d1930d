use std::sync::Arc;
use std::time::Duration;

use channel_refresh_core::backoff::{Backoff, ExponentialBackoff, FixedBackoff};
use channel_refresh_core::events::{EventListener, EventListeners};

use crate::connection::GRACE_PERIOD;
use crate::dialer::{DialOptions, Dialer, LoadBalancing, TransportSecurity};
use crate::events::{ConnectionEvent, RetryEvent};
use crate::logger::Logger;
use crate::manager::ConnectionManager;

/// Minimum spacing between two re-establishments, and the floor applied to
/// the configured maximum connection age.
pub const MIN_CONNECTION_AGE: Duration = Duration::from_secs(15);

/// Base delay of the default exponential retry backoff.
pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Retry budget used when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Resolved configuration of a [`ConnectionManager`].
pub struct ManagerConfig {
    pub(crate) max_connection_age: Duration,
    pub(crate) max_retries: u32,
    pub(crate) grace_period: Duration,
    pub(crate) backoff: Arc<dyn Backoff>,
    pub(crate) dial_options: DialOptions,
    pub(crate) logger: Logger,
    pub(crate) connection_listeners: EventListeners<ConnectionEvent>,
    pub(crate) retry_listeners: EventListeners<RetryEvent>,
}

impl ManagerConfig {
    /// Age after which the channel is refreshed on the next `get_connection`.
    /// Never below [`MIN_CONNECTION_AGE`].
    pub fn max_connection_age(&self) -> Duration {
        self.max_connection_age
    }

    /// Throttle interval between reconnections triggered by failures.
    pub fn min_connection_age(&self) -> Duration {
        MIN_CONNECTION_AGE
    }

    /// Per-call retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Number of invocations a call gets. A zero budget still invokes once.
    pub fn max_attempts(&self) -> usize {
        self.max_retries.max(1) as usize
    }

    /// Delay before closing a superseded channel.
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Backoff before the retry following the failed zero-based `attempt`.
    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Options handed to the dialer for every channel.
    pub fn dial_options(&self) -> &DialOptions {
        &self.dial_options
    }

    /// The logger shared by the manager, its connection and its interceptor.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl std::fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("max_connection_age", &self.max_connection_age)
            .field("max_retries", &self.max_retries)
            .field("grace_period", &self.grace_period)
            .field("dial_options", &self.dial_options)
            .field("logger", &self.logger)
            .field("connection_listeners", &self.connection_listeners.len())
            .field("retry_listeners", &self.retry_listeners.len())
            .finish()
    }
}

/// Builder for [`ConnectionManager`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use channel_refresh::{ChannelHandle, ConnectionManagerBuilder, ConnectivityState, FnDialer};
///
/// struct Stub;
///
/// impl ChannelHandle for Stub {
///     fn close(&self) {}
///     fn state(&self) -> ConnectivityState {
///         ConnectivityState::Idle
///     }
/// }
///
/// let manager = ConnectionManagerBuilder::new("localhost:50051")
///     .max_connection_age(Duration::from_secs(60))
///     .max_retries(5)
///     .on_established(|generation| println!("channel #{generation} is live"))
///     .build(FnDialer::new(|_, _| Ok::<_, std::io::Error>(Stub)));
///
/// assert_eq!(manager.config().max_retries(), 5);
/// assert!(manager.should_reconnect());
/// ```
pub struct ConnectionManagerBuilder {
    target: String,
    max_connection_age: Duration,
    max_retries: u32,
    grace_period: Duration,
    backoff: Option<Arc<dyn Backoff>>,
    dial_options: DialOptions,
    logger: Option<Logger>,
    enable_logging: bool,
    connection_listeners: EventListeners<ConnectionEvent>,
    retry_listeners: EventListeners<RetryEvent>,
}

impl ConnectionManagerBuilder {
    /// Starts a builder for `target`.
    ///
    /// Defaults:
    /// - max_connection_age: [`MIN_CONNECTION_AGE`]
    /// - max_retries: [`DEFAULT_MAX_RETRIES`]
    /// - grace_period: [`GRACE_PERIOD`]
    /// - backoff: exponential from [`BASE_RETRY_DELAY`]
    /// - dial options: insecure, round robin, no connect timeout
    /// - logging: disabled
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            max_connection_age: MIN_CONNECTION_AGE,
            max_retries: DEFAULT_MAX_RETRIES,
            grace_period: GRACE_PERIOD,
            backoff: None,
            dial_options: DialOptions::default(),
            logger: None,
            enable_logging: false,
            connection_listeners: EventListeners::new(),
            retry_listeners: EventListeners::new(),
        }
    }

    /// Maximum age before the channel is refreshed. Values below
    /// [`MIN_CONNECTION_AGE`] are raised to it.
    pub fn max_connection_age(mut self, age: Duration) -> Self {
        self.max_connection_age = age;
        self
    }

    /// Per-call retry budget (total invocations of a failing call).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay between superseding a channel and closing it.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Custom backoff schedule.
    pub fn backoff<I>(mut self, backoff: I) -> Self
    where
        I: Backoff + 'static,
    {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Doubling backoff from `base`.
    pub fn exponential_backoff(self, base: Duration) -> Self {
        self.backoff(ExponentialBackoff::new(base))
    }

    /// Constant backoff.
    pub fn fixed_backoff(self, delay: Duration) -> Self {
        self.backoff(FixedBackoff(delay))
    }

    /// Transport security used when dialing.
    pub fn transport_security(mut self, security: TransportSecurity) -> Self {
        self.dial_options.transport_security = security;
        self
    }

    /// Balancing policy requested from the channel library.
    pub fn load_balancing(mut self, policy: LoadBalancing) -> Self {
        self.dial_options.load_balancing = policy;
        self
    }

    /// Upper bound on establishing the transport.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.dial_options.connect_timeout = Some(timeout);
        self
    }

    /// Injects a logger. It is enabled at build time if
    /// [`enable_logging`](Self::enable_logging) is set.
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Turns logging on. Without an injected logger, lines go to `tracing`.
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    /// Adds a raw listener for connection events.
    pub fn connection_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<ConnectionEvent> + 'static,
    {
        self.connection_listeners.add(listener);
        self
    }

    /// Adds a raw listener for retry events.
    pub fn retry_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RetryEvent> + 'static,
    {
        self.retry_listeners.add(listener);
        self
    }

    /// Called with the generation number of every newly published channel.
    pub fn on_established<F>(self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.connection_listener(move |event: &ConnectionEvent| {
            if let ConnectionEvent::Established { generation, .. } = event {
                f(*generation);
            }
        })
    }

    /// Called with the dial error message when establishing fails.
    pub fn on_establish_failed<F>(self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.connection_listener(move |event: &ConnectionEvent| {
            if let ConnectionEvent::EstablishFailed { error, .. } = event {
                f(error);
            }
        })
    }

    /// Called when a reconnect is skipped by the throttle, with the time since
    /// the last establishment.
    pub fn on_throttled<F>(self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.connection_listener(move |event: &ConnectionEvent| {
            if let ConnectionEvent::Throttled { since_last, .. } = event {
                f(*since_last);
            }
        })
    }

    /// Called with the generation of each superseded channel once it is closed.
    pub fn on_graceful_close<F>(self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.connection_listener(move |event: &ConnectionEvent| {
            if let ConnectionEvent::GracefulClose { generation, .. } = event {
                f(*generation);
            }
        })
    }

    /// Called before each retry with the zero-based attempt that failed and
    /// the backoff about to be waited.
    pub fn on_retry<F>(self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.retry_listener(move |event: &RetryEvent| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        })
    }

    /// Called with the number of invocations when a call runs out of retries.
    pub fn on_retries_exhausted<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.retry_listener(move |event: &RetryEvent| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        })
    }

    /// Builds the manager around `dialer`. No channel is dialed yet.
    pub fn build<D: Dialer>(self, dialer: D) -> ConnectionManager<D> {
        let logger = match self.logger {
            Some(logger) => {
                if self.enable_logging {
                    logger.enable();
                }
                logger
            }
            None if self.enable_logging => Logger::tracing(true),
            None => Logger::noop(),
        };

        let backoff = self
            .backoff
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::new(BASE_RETRY_DELAY)));

        let config = ManagerConfig {
            max_connection_age: self.max_connection_age.max(MIN_CONNECTION_AGE),
            max_retries: self.max_retries,
            grace_period: self.grace_period,
            backoff,
            dial_options: self.dial_options,
            logger,
            connection_listeners: self.connection_listeners,
            retry_listeners: self.retry_listeners,
        };

        ConnectionManager::from_parts(self.target, config, dialer)
    }
}

impl std::fmt::Debug for ConnectionManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManagerBuilder")
            .field("target", &self.target)
            .field("max_connection_age", &self.max_connection_age)
            .field("max_retries", &self.max_retries)
            .field("grace_period", &self.grace_period)
            .field("dial_options", &self.dial_options)
            .field("enable_logging", &self.enable_logging)
            .finish_non_exhaustive()
    }
}
