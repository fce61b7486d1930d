use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use crate::classify::StatusCode;
use crate::context::CallContext;
use crate::dialer::{ChannelHandle, ConnectivityState, Dialer};
use crate::error::CallError;
use crate::interceptor::RetryInterceptor;

/// A channel handed out by a [`ConnectionManager`](crate::ConnectionManager),
/// with the manager's retry interceptor attached.
///
/// Dereferences to the underlying channel handle.
pub struct ManagedChannel<D: Dialer> {
    channel: Arc<D::Channel>,
    interceptor: RetryInterceptor<D>,
}

impl<D: Dialer> ManagedChannel<D> {
    pub(crate) fn new(channel: Arc<D::Channel>, interceptor: RetryInterceptor<D>) -> Self {
        Self {
            channel,
            interceptor,
        }
    }

    pub fn handle(&self) -> &Arc<D::Channel> {
        &self.channel
    }

    pub fn into_handle(self) -> Arc<D::Channel> {
        self.channel
    }

    pub fn interceptor(&self) -> &RetryInterceptor<D> {
        &self.interceptor
    }

    pub fn state(&self) -> ConnectivityState {
        self.channel.state()
    }

    /// Whether both values wrap the same underlying channel.
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.channel, &other.channel)
    }

    /// Performs a unary call through the retry interceptor.
    ///
    /// `invoke` receives the channel to use for each attempt, which changes
    /// when the interceptor reconnects.
    pub async fn call<T, E, F, Fut>(&self, ctx: &CallContext, invoke: F) -> Result<T, CallError<E>>
    where
        F: FnMut(Arc<D::Channel>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusCode + fmt::Display,
    {
        self.interceptor
            .intercept(ctx, Arc::clone(&self.channel), invoke)
            .await
    }
}

impl<D: Dialer> Deref for ManagedChannel<D> {
    type Target = D::Channel;

    fn deref(&self) -> &Self::Target {
        &self.channel
    }
}

impl<D: Dialer> Clone for ManagedChannel<D> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            interceptor: self.interceptor.clone(),
        }
    }
}

impl<D: Dialer> fmt::Debug for ManagedChannel<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedChannel")
            .field("state", &self.state())
            .field("interceptor", &self.interceptor)
            .finish()
    }
}
