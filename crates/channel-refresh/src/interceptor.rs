//! Per-call retry with backoff and forced reconnection.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use crate::classify::StatusCode;
use crate::context::CallContext;
use crate::dialer::Dialer;
use crate::error::CallError;
use crate::events::RetryEvent;
use crate::manager::Shared;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Retries transient call failures on a freshly reconnected channel.
///
/// Holds only a weak reference to its manager. Once the manager is gone,
/// calls go through unretried.
pub struct RetryInterceptor<D: Dialer> {
    shared: Weak<Shared<D>>,
}

impl<D: Dialer> RetryInterceptor<D> {
    pub(crate) fn new(shared: Weak<Shared<D>>) -> Self {
        Self { shared }
    }

    /// Whether the owning manager is still alive.
    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Runs `invoke` against `channel`, retrying transient failures.
    ///
    /// A failing call is invoked at most `max(max_retries, 1)` times. After
    /// every transient failure, the last one included, the interceptor waits
    /// out the backoff and asks the manager to reconnect; later attempts use
    /// whatever channel that returns. Errors that are not transient, and the
    /// error of the last attempt, are returned as they are. The context is checked before every attempt and
    /// interrupts both the call and the backoff wait.
    pub async fn intercept<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        channel: Arc<D::Channel>,
        mut invoke: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut(Arc<D::Channel>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusCode + fmt::Display,
    {
        let Some(shared) = self.shared.upgrade() else {
            if let Some(reason) = ctx.err() {
                return Err(reason.into());
            }
            return ctx.run(invoke(channel)).await?.map_err(CallError::Call);
        };

        let max_attempts = shared.config.max_attempts();
        let mut channel = channel;
        let mut attempt = 0;

        loop {
            if let Some(reason) = ctx.err() {
                interrupted(&shared, attempt);
                return Err(reason.into());
            }

            let error = match ctx.run(invoke(Arc::clone(&channel))).await {
                Err(reason) => {
                    interrupted(&shared, attempt + 1);
                    return Err(reason.into());
                }
                Ok(Ok(response)) => {
                    shared.emit_retry(RetryEvent::Success {
                        target: shared.target().to_string(),
                        timestamp: std::time::Instant::now(),
                        attempts: attempt + 1,
                    });
                    record_call(&shared, "success");
                    return Ok(response);
                }
                Ok(Err(error)) => error,
            };

            if !error.is_transient() {
                shared.emit_retry(RetryEvent::NonTransient {
                    target: shared.target().to_string(),
                    timestamp: std::time::Instant::now(),
                });
                record_call(&shared, "non_transient");
                return Err(CallError::Call(error));
            }

            let delay = shared.config.backoff_duration(attempt);
            let retrying = attempt + 1 < max_attempts;
            if retrying {
                shared.config.logger.logf(format_args!(
                    "Retrying request (attempt {}/{}) due to error: {}",
                    attempt + 1,
                    shared.config.max_retries,
                    error
                ));
                shared.emit_retry(RetryEvent::Retry {
                    target: shared.target().to_string(),
                    timestamp: std::time::Instant::now(),
                    attempt,
                    delay,
                });

                #[cfg(feature = "metrics")]
                counter!("channel_refresh_retries_total", "target" => shared.target().to_string())
                    .increment(1);
            }

            if let Err(reason) = ctx.run(tokio::time::sleep(delay)).await {
                interrupted(&shared, attempt + 1);
                return Err(reason.into());
            }

            // The final failure still forces a reconnect so the next call
            // starts on a fresh channel.
            channel = match shared.try_reconnect() {
                Ok(fresh) => fresh.into_handle(),
                Err(err) => {
                    shared.config.logger.logf(format_args!(
                        "Reconnect failed, keeping the current connection: {}",
                        err
                    ));
                    shared.connection.current().unwrap_or(channel)
                }
            };

            if !retrying {
                shared.emit_retry(RetryEvent::Exhausted {
                    target: shared.target().to_string(),
                    timestamp: std::time::Instant::now(),
                    attempts: attempt + 1,
                });
                record_call(&shared, "exhausted");
                return Err(CallError::Call(error));
            }
            attempt += 1;
        }
    }
}

fn interrupted<D: Dialer>(shared: &Shared<D>, attempts: usize) {
    shared.emit_retry(RetryEvent::Interrupted {
        target: shared.target().to_string(),
        timestamp: std::time::Instant::now(),
        attempts,
    });
    record_call(shared, "interrupted");
}

#[cfg(feature = "metrics")]
fn record_call<D: Dialer>(shared: &Shared<D>, outcome: &'static str) {
    counter!(
        "channel_refresh_calls_total",
        "target" => shared.target().to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_call<D: Dialer>(_shared: &Shared<D>, _outcome: &'static str) {}

impl<D: Dialer> Clone for RetryInterceptor<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<D: Dialer> fmt::Debug for RetryInterceptor<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryInterceptor")
            .field("attached", &self.is_attached())
            .finish()
    }
}
