use std::fmt;

use thiserror::Error;

use crate::channel::ManagedChannel;
use crate::context::ContextError;
use crate::dialer::Dialer;

/// Boxed error from the channel library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from establishing or refreshing the managed channel.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The channel library failed to build a channel. The previously active
    /// channel, if any, is left in place.
    #[error("failed to establish channel to {target}: {source}")]
    Establish {
        /// Target address that was dialed.
        target: String,
        /// Error reported by the dialer.
        #[source]
        source: BoxError,
    },

    /// The manager was closed and no longer hands out channels.
    #[error("connection manager for {target} is closed")]
    Closed {
        /// Target address of the closed manager.
        target: String,
    },
}

impl RefreshError {
    /// Returns `true` for [`RefreshError::Establish`].
    pub fn is_establish(&self) -> bool {
        matches!(self, RefreshError::Establish { .. })
    }

    /// Returns `true` for [`RefreshError::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, RefreshError::Closed { .. })
    }
}

/// Error from [`ConnectionManager::get_connection`](crate::ConnectionManager::get_connection).
///
/// When the channel has expired and re-establishing it fails, the expired
/// channel is still open and usable. It is handed back as a last resort
/// through [`stale`](Self::stale).
pub struct ConnectError<D: Dialer> {
    error: RefreshError,
    stale: Option<ManagedChannel<D>>,
}

impl<D: Dialer> ConnectError<D> {
    pub(crate) fn new(error: RefreshError, stale: Option<ManagedChannel<D>>) -> Self {
        Self { error, stale }
    }

    pub fn error(&self) -> &RefreshError {
        &self.error
    }

    pub fn into_error(self) -> RefreshError {
        self.error
    }

    /// The expired channel that could not be replaced, if there was one.
    pub fn stale(&self) -> Option<&ManagedChannel<D>> {
        self.stale.as_ref()
    }

    pub fn into_stale(self) -> Option<ManagedChannel<D>> {
        self.stale
    }

    pub fn is_establish(&self) -> bool {
        self.error.is_establish()
    }

    pub fn is_closed(&self) -> bool {
        self.error.is_closed()
    }
}

impl<D: Dialer> From<RefreshError> for ConnectError<D> {
    fn from(error: RefreshError) -> Self {
        Self::new(error, None)
    }
}

impl<D: Dialer> From<ConnectError<D>> for RefreshError {
    fn from(err: ConnectError<D>) -> Self {
        err.error
    }
}

impl<D: Dialer> fmt::Display for ConnectError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<D: Dialer> fmt::Debug for ConnectError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectError")
            .field("error", &self.error)
            .field("stale", &self.stale.is_some())
            .finish()
    }
}

impl<D: Dialer> std::error::Error for ConnectError<D> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

/// Outcome of a failed intercepted call.
///
/// Either the call's own context fired, or the call returned an error that
/// was not retried (or the retry budget ran out). In the latter case the
/// original error is returned untouched.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The call's cancellation or deadline fired.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The last error returned by the call itself.
    #[error(transparent)]
    Call(E),
}

impl<E> CallError<E> {
    /// Returns `true` if the context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallError::Context(ContextError::Cancelled))
    }

    /// Returns `true` if the context fired (cancellation or deadline).
    pub fn is_context(&self) -> bool {
        matches!(self, CallError::Context(_))
    }

    /// The call error, if this is not a context error.
    pub fn into_call(self) -> Option<E> {
        match self {
            CallError::Call(e) => Some(e),
            CallError::Context(_) => None,
        }
    }

    /// Borrows the call error, if any.
    pub fn call_error(&self) -> Option<&E> {
        match self {
            CallError::Call(e) => Some(e),
            CallError::Context(_) => None,
        }
    }
}
