//! Lifecycle management for a long-lived RPC channel.
//!
//! A multiplexed HTTP/2 channel pins its traffic to whatever backends it
//! resolved when it was dialed. [`ConnectionManager`] keeps one channel per
//! target and re-dials it once it reaches a maximum age, so new backends get
//! traffic. The superseded channel is not closed right away: it stays open
//! for a grace period so in-flight calls can finish.
//!
//! Every channel the manager hands out carries a [`RetryInterceptor`]. Calls
//! made through [`ManagedChannel::call`] that fail with a transient status
//! (`Unavailable` or `DeadlineExceeded`) are retried with backoff, and the
//! manager is asked to reconnect between attempts. Reconnects are throttled
//! to one per [`MIN_CONNECTION_AGE`].
//!
//! ## Usage
//!
//! ```rust
//! use std::io;
//! use std::time::Duration;
//! use channel_refresh::{
//!     CallContext, ChannelHandle, ConnectionManagerBuilder, ConnectivityState, FnDialer,
//! };
//!
//! struct Stub;
//!
//! impl ChannelHandle for Stub {
//!     fn close(&self) {}
//!     fn state(&self) -> ConnectivityState {
//!         ConnectivityState::Ready
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManagerBuilder::new("orders.internal:50051")
//!     .max_connection_age(Duration::from_secs(300))
//!     .max_retries(3)
//!     .on_retry(|attempt, delay| println!("retry #{attempt} in {delay:?}"))
//!     .build(FnDialer::new(|_, _| Ok::<_, io::Error>(Stub)));
//!
//! let channel = manager.get_connection()?;
//! let ctx = CallContext::with_timeout(Duration::from_secs(2));
//! let reply = channel
//!     .call(&ctx, |_channel| async { Ok::<_, io::Error>("ok") })
//!     .await?;
//! assert_eq!(reply, "ok");
//!
//! manager.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `metrics`: counters for establishments, throttled reconnects, retries
//!   and call outcomes
//! - `tonic`: [`TonicDialer`](transport::TonicDialer) and [`StatusCode`] for
//!   `tonic::Status`

pub mod channel;
pub mod classify;
pub mod config;
pub mod connection;
pub mod context;
pub mod dialer;
pub mod error;
pub mod events;
pub mod interceptor;
pub mod logger;
pub mod manager;
#[cfg(feature = "tonic")]
pub mod transport;

pub use channel::ManagedChannel;
pub use classify::{Code, StatusCode};
pub use config::{
    ConnectionManagerBuilder, ManagerConfig, BASE_RETRY_DELAY, DEFAULT_MAX_RETRIES,
    MIN_CONNECTION_AGE,
};
pub use connection::{Connection, GRACE_PERIOD};
pub use context::{CallContext, ContextError};
pub use dialer::{
    ChannelHandle, ConnectivityState, DialOptions, Dialer, FnDialer, LoadBalancing,
    TransportSecurity,
};
pub use error::{BoxError, CallError, ConnectError, RefreshError};
pub use events::{ConnectionEvent, RetryEvent};
pub use interceptor::RetryInterceptor;
pub use logger::{LogSink, Logger, NoopSink, TracingSink};
pub use manager::ConnectionManager;

pub use channel_refresh_core::backoff::{Backoff, ExponentialBackoff, FixedBackoff};
pub use channel_refresh_core::events::{EventListener, LifecycleEvent};

#[cfg(feature = "tonic")]
pub use transport::{TonicChannel, TonicDialError, TonicDialer};
