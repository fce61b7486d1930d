//! [`Dialer`] backed by a tonic transport channel.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use ::tonic::transport::{Channel, Endpoint};

use crate::classify::{Code, StatusCode};
use crate::dialer::{ChannelHandle, ConnectivityState, DialOptions, Dialer, TransportSecurity};

/// Errors from building a tonic endpoint.
#[derive(Debug, Error)]
pub enum TonicDialError {
    /// The target could not be parsed as an endpoint URI.
    #[error("invalid target uri {uri}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: ::tonic::transport::Error,
    },
    /// TLS was requested but this dialer only speaks plaintext HTTP/2.
    #[error("TLS transport is not supported by TonicDialer")]
    TlsUnsupported,
}

/// Dials lazily connecting tonic channels.
///
/// Targets without a scheme get `http://` prepended. Balancing across
/// resolved backends is left to tonic. Dialing spawns the channel's worker,
/// so it must happen inside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TonicDialer;

impl TonicDialer {
    pub fn new() -> Self {
        Self
    }
}

impl Dialer for TonicDialer {
    type Channel = TonicChannel;
    type Error = TonicDialError;

    fn dial(&self, target: &str, options: &DialOptions) -> Result<TonicChannel, TonicDialError> {
        if options.transport_security == TransportSecurity::Tls {
            return Err(TonicDialError::TlsUnsupported);
        }

        let uri = if target.contains("://") {
            target.to_string()
        } else {
            format!("http://{target}")
        };

        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|source| TonicDialError::InvalidUri { uri, source })?;
        if let Some(timeout) = options.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        Ok(TonicChannel {
            inner: Mutex::new(Some(endpoint.connect_lazy())),
        })
    }
}

/// A tonic channel that can be closed.
///
/// Closing drops the inner channel; clones already handed to clients keep
/// working until they are dropped too.
#[derive(Debug)]
pub struct TonicChannel {
    inner: Mutex<Option<Channel>>,
}

impl TonicChannel {
    /// A clone of the inner channel for building generated clients, or `None`
    /// once closed.
    pub fn channel(&self) -> Option<Channel> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ChannelHandle for TonicChannel {
    fn close(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn state(&self) -> ConnectivityState {
        match *self.inner.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(_) => ConnectivityState::Idle,
            None => ConnectivityState::Shutdown,
        }
    }
}

impl StatusCode for ::tonic::Status {
    fn code(&self) -> Code {
        use ::tonic::Code as C;

        match ::tonic::Status::code(self) {
            C::Ok => Code::Ok,
            C::Cancelled => Code::Cancelled,
            C::Unknown => Code::Unknown,
            C::InvalidArgument => Code::InvalidArgument,
            C::DeadlineExceeded => Code::DeadlineExceeded,
            C::NotFound => Code::NotFound,
            C::AlreadyExists => Code::AlreadyExists,
            C::PermissionDenied => Code::PermissionDenied,
            C::ResourceExhausted => Code::ResourceExhausted,
            C::FailedPrecondition => Code::FailedPrecondition,
            C::Aborted => Code::Aborted,
            C::OutOfRange => Code::OutOfRange,
            C::Unimplemented => Code::Unimplemented,
            C::Internal => Code::Internal,
            C::Unavailable => Code::Unavailable,
            C::DataLoss => Code::DataLoss,
            C::Unauthenticated => Code::Unauthenticated,
        }
    }
}
