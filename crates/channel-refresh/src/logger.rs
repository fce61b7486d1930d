//! Injectable, toggleable logging capability.
//!
//! Every component receives a [`Logger`] at construction instead of reaching
//! for process-wide state. A logger pairs a [`LogSink`] with an enabled flag;
//! when disabled nothing reaches the sink.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Destination for log lines.
pub trait LogSink: Send + Sync {
    /// Writes one line.
    fn log(&self, message: &str);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn log(&self, _message: &str) {}
}

/// Forwards lines to `tracing` at `INFO` under the `channel_refresh` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::info!(target: "channel_refresh", "{}", message);
    }
}

/// Shared logging handle.
///
/// Clones share both the sink and the enabled flag, so toggling one clone
/// toggles all of them.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    enabled: Arc<AtomicBool>,
}

impl Logger {
    /// A disabled logger writing to `sink` once enabled.
    pub fn new<S>(sink: S) -> Self
    where
        S: LogSink + 'static,
    {
        Self {
            sink: Arc::new(sink),
            enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A disabled logger that discards everything.
    pub fn noop() -> Self {
        Self::new(NoopSink)
    }

    /// A logger backed by [`TracingSink`], enabled according to `enabled`.
    pub fn tracing(enabled: bool) -> Self {
        let logger = Self::new(TracingSink);
        if enabled {
            logger.enable();
        }
        logger
    }

    /// Turns logging on.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Turns logging off.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Whether lines currently reach the sink.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Logs `message` if enabled.
    pub fn log(&self, message: impl AsRef<str>) {
        if self.is_enabled() {
            self.sink.log(message.as_ref());
        }
    }

    /// Logs preformatted arguments if enabled. Formatting is skipped when disabled.
    ///
    /// ```
    /// use channel_refresh::Logger;
    ///
    /// let logger = Logger::noop();
    /// logger.logf(format_args!("attempt {}/{}", 1, 3));
    /// ```
    pub fn logf(&self, args: fmt::Arguments<'_>) {
        if self.is_enabled() {
            match args.as_str() {
                Some(message) => self.sink.log(message),
                None => self.sink.log(&args.to_string()),
            }
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}
