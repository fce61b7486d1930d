use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use channel_refresh::{ChannelHandle, ConnectivityState, DialOptions, Dialer, LogSink};

/// Channel that counts how often it was closed.
#[derive(Debug)]
pub(crate) struct MockChannel {
    pub(crate) id: usize,
    closes: AtomicUsize,
}

impl MockChannel {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            closes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl ChannelHandle for MockChannel {
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn state(&self) -> ConnectivityState {
        if self.close_count() > 0 {
            ConnectivityState::Shutdown
        } else {
            ConnectivityState::Ready
        }
    }
}

/// Dialer handing out numbered [`MockChannel`]s. Can be switched to failing.
#[derive(Clone, Default)]
pub(crate) struct MockDialer {
    dials: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MockDialer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Successful dials so far.
    pub(crate) fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Dialer for MockDialer {
    type Channel = MockChannel;
    type Error = io::Error;

    fn dial(&self, _target: &str, _options: &DialOptions) -> Result<MockChannel, io::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::other("name resolution failed"));
        }
        Ok(MockChannel::new(self.dials.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Sink keeping every line it receives.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

pub(crate) fn unavailable(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionRefused, message.to_string())
}
