//! Error types for in-memory network operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while listening, dialing or moving bytes.
///
/// Every variant carries a timeout and a temporary classification, mirroring
/// what callers of OS sockets expect from `net` errors. Retrying is always the
/// caller's decision: nothing in this crate retries on its own.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// No listener is registered at the dialed address.
    #[error("connection refused")]
    ConnRefused,

    /// A listener is already registered at this address.
    #[error("address already in use")]
    AddressInUse,

    /// The accept deadline expired before a dial arrived.
    #[error("accept timed out")]
    AcceptTimeout,

    /// The listener backlog is full; the dial was not queued.
    #[error("listen queue is full")]
    ListenQueueFull,

    /// The peer closed the connection, or this side closed its write half.
    #[error("connection closed")]
    ConnClosed,

    /// The handshake did not complete within the connect timeout.
    #[error("connection timed out")]
    ConnTimeout,

    /// The read deadline expired.
    #[error("read timed out")]
    ReadTimeout,

    /// The write deadline expired.
    #[error("write timed out")]
    WriteTimeout,

    /// The listener was unregistered and its backlog is drained.
    #[error("listener closed")]
    ListenerClosed,

    /// The network was shut down and accepts no new listeners.
    #[error("network shut down")]
    Shutdown,
}

impl NetError {
    /// Whether the error was caused by a deadline or timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            NetError::AcceptTimeout
                | NetError::ConnTimeout
                | NetError::ReadTimeout
                | NetError::WriteTimeout
        )
    }

    /// Whether the same call may succeed if retried later.
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            NetError::AcceptTimeout
                | NetError::ListenQueueFull
                | NetError::ReadTimeout
                | NetError::WriteTimeout
        )
    }

    /// The `io::ErrorKind` an OS socket would report for this condition.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            NetError::ConnRefused => io::ErrorKind::ConnectionRefused,
            NetError::AddressInUse => io::ErrorKind::AddrInUse,
            NetError::AcceptTimeout
            | NetError::ConnTimeout
            | NetError::ReadTimeout
            | NetError::WriteTimeout => io::ErrorKind::TimedOut,
            NetError::ListenQueueFull => io::ErrorKind::WouldBlock,
            NetError::ConnClosed => io::ErrorKind::BrokenPipe,
            NetError::ListenerClosed => io::ErrorKind::NotConnected,
            NetError::Shutdown => io::ErrorKind::Other,
        }
    }
}

impl From<NetError> for io::Error {
    fn from(error: NetError) -> Self {
        io::Error::new(error.kind(), error)
    }
}

/// Result type for in-memory network operations.
pub type NetResult<T> = Result<T, NetError>;
