//! Boundary to the underlying RPC channel library.
//!
//! The manager never looks inside a channel. It only dials new handles
//! through a [`Dialer`], hands them out, and eventually calls
//! [`ChannelHandle::close`] on them.

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

/// Connectivity state reported by a channel handle.
///
/// Only used for observability and tests; no lifecycle decision reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    /// Not connected and not trying to connect.
    Idle,
    /// Connection establishment in progress.
    Connecting,
    /// Connected and able to carry calls.
    Ready,
    /// Last connection attempt failed; will retry.
    TransientFailure,
    /// Closed for good.
    Shutdown,
}

/// An established, possibly multiplexed channel to a remote service.
pub trait ChannelHandle: Send + Sync + 'static {
    /// Tears the channel down. Called at most once by this crate.
    fn close(&self);

    /// Current connectivity state.
    fn state(&self) -> ConnectivityState;
}

/// Transport security mode used when dialing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Plaintext transport.
    #[default]
    Insecure,
    /// TLS with the platform's default roots.
    Tls,
}

/// Balancing policy the channel library should run across resolved backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalancing {
    /// Stick to the first address that connects.
    PickFirst,
    /// Spread calls across every resolved backend.
    #[default]
    RoundRobin,
}

impl LoadBalancing {
    /// Policy name as understood by gRPC service configs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancing::PickFirst => "pick_first",
            LoadBalancing::RoundRobin => "round_robin",
        }
    }

    /// Renders the default service config selecting this policy.
    pub fn service_config(&self) -> String {
        format!(r#"{{"loadBalancingConfig":[{{"{}":{{}}}}]}}"#, self.as_str())
    }
}

impl fmt::Display for LoadBalancing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed channel-construction options, built once per manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialOptions {
    /// Transport security mode.
    pub transport_security: TransportSecurity,
    /// Balancing policy name handed to the channel library.
    pub load_balancing: LoadBalancing,
    /// Upper bound on establishing the underlying transport, if any.
    pub connect_timeout: Option<Duration>,
}

/// Creates channel handles for a target address.
pub trait Dialer: Send + Sync + 'static {
    /// Handle type produced by this dialer.
    type Channel: ChannelHandle;

    /// Construction error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Builds a new channel to `target`.
    ///
    /// Implementations are expected to connect lazily; the call should not
    /// block on network round trips.
    fn dial(&self, target: &str, options: &DialOptions) -> Result<Self::Channel, Self::Error>;
}

/// A [`Dialer`] backed by a closure.
///
/// # Examples
///
/// ```
/// use channel_refresh::{ChannelHandle, ConnectivityState, FnDialer};
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
/// let dialer = FnDialer::new(|_target, _options| Ok::<_, std::io::Error>(Stub));
/// ```
pub struct FnDialer<F, C, E> {
    f: F,
    _marker: PhantomData<fn() -> Result<C, E>>,
}

impl<F, C, E> FnDialer<F, C, E>
where
    F: Fn(&str, &DialOptions) -> Result<C, E> + Send + Sync + 'static,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, C, E> Dialer for FnDialer<F, C, E>
where
    F: Fn(&str, &DialOptions) -> Result<C, E> + Send + Sync + 'static,
    C: ChannelHandle,
    E: std::error::Error + Send + Sync + 'static,
{
    type Channel = C;
    type Error = E;

    fn dial(&self, target: &str, options: &DialOptions) -> Result<C, E> {
        (self.f)(target, options)
    }
}

impl<F, C, E> fmt::Debug for FnDialer<F, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDialer").finish_non_exhaustive()
    }
}
