//! Core types for in-memory endpoint identity.
//!
//! - [`MemAddr`]: the listen address a connection belongs to
//! - [`ConnectionId`], [`PairId`], [`ListenerId`]: registry-allocated identifiers

use std::fmt;
use std::sync::Arc;

/// Network name reported by [`MemAddr::network`].
pub const NETWORK_NAME: &str = "mem";

/// Address of an in-memory endpoint.
///
/// Wraps the listen address string. Both ends of a connection report the
/// listener's address as their local and remote address, so
/// `a.peer_addr() == b.local_addr()` for a matched pair.
///
/// # Examples
///
/// ```
/// use moonpool_memnet::MemAddr;
///
/// let addr = MemAddr::new("db-primary");
/// assert_eq!(addr.as_str(), "db-primary");
/// assert_eq!(addr.network(), "mem");
/// assert_eq!(addr.to_string(), "db-primary");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemAddr(Arc<str>);

impl MemAddr {
    /// Create an address from a listen address string.
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(Arc::from(address.as_ref()))
    }

    /// The listen address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the network this address belongs to.
    pub fn network(&self) -> &'static str {
        NETWORK_NAME
    }
}

impl fmt::Display for MemAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemAddr {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for MemAddr {
    fn from(address: String) -> Self {
        Self(Arc::from(address))
    }
}

/// Unique identifier for one end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier shared by the two ends of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairId(pub(crate) u64);

impl PairId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pair-{}", self.0)
    }
}

/// Unique identifier for a listener registration.
///
/// Distinguishes a listener from a later one bound to the same address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
