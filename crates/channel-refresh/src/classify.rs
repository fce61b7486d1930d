//! Call error classification.
//!
//! The retry interceptor only cares whether a failure is worth retrying on a
//! (possibly fresh) channel. Errors expose a gRPC-style [`Code`] through
//! [`StatusCode`]; `DeadlineExceeded` and `Unavailable` are transient,
//! everything else short-circuits.

use std::io;

/// gRPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Whether a call failing with this code may succeed if retried,
    /// possibly on a re-established channel.
    pub fn is_transient(&self) -> bool {
        matches!(self, Code::DeadlineExceeded | Code::Unavailable)
    }
}

/// Errors that carry a status code.
pub trait StatusCode {
    /// Status code of this error.
    fn code(&self) -> Code;

    /// Shorthand for `self.code().is_transient()`.
    fn is_transient(&self) -> bool {
        self.code().is_transient()
    }
}

impl StatusCode for io::Error {
    fn code(&self) -> Code {
        match self.kind() {
            io::ErrorKind::TimedOut => Code::DeadlineExceeded,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe => Code::Unavailable,
            io::ErrorKind::InvalidInput => Code::InvalidArgument,
            io::ErrorKind::PermissionDenied => Code::PermissionDenied,
            _ => Code::Unknown,
        }
    }
}
