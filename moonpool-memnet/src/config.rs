//! Configuration for the in-memory network.
//!
//! | Setting | Field | Default |
//! |---------|-------|---------|
//! | Pending dials per listener | `backlog_capacity` | 32 |
//! | Queued chunks per connection direction | `inbound_capacity` | 10 |
//! | Dial handshake bound | `connect_timeout` | 10s |
//! | Largest chunk copied by one write | `max_write_payload` | 64 KiB |

use std::time::Duration;

/// Configuration shared by every listener and connection of a [`MemNetwork`].
///
/// [`MemNetwork`]: crate::MemNetwork
#[derive(Debug, Clone)]
pub struct NetworkConfiguration {
    /// Capacity of each listener's backlog of not-yet-accepted dials.
    ///
    /// A dial against a full backlog fails with `ListenQueueFull` instead of
    /// waiting.
    pub backlog_capacity: usize,

    /// Capacity, in chunks, of each connection's inbound queue.
    ///
    /// Writers block once the peer has this many unread chunks queued.
    pub inbound_capacity: usize,

    /// How long a dial waits for an accept before failing with `ConnTimeout`.
    pub connect_timeout: Duration,

    /// Maximum number of bytes copied by a single write call.
    ///
    /// Larger buffers produce a short write.
    pub max_write_payload: usize,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            backlog_capacity: 32,
            inbound_capacity: 10,
            connect_timeout: Duration::from_secs(10),
            max_write_payload: 64 * 1024,
        }
    }
}

impl NetworkConfiguration {
    /// Create a configuration with explicit parameters.
    pub fn new(
        backlog_capacity: usize,
        inbound_capacity: usize,
        connect_timeout: Duration,
        max_write_payload: usize,
    ) -> Self {
        Self {
            backlog_capacity,
            inbound_capacity,
            connect_timeout,
            max_write_payload,
        }
        .sanitized()
    }

    /// Small queues and a short connect timeout, for tests exercising
    /// back-pressure and timeouts.
    pub fn tight() -> Self {
        Self {
            backlog_capacity: 4,
            inbound_capacity: 2,
            connect_timeout: Duration::from_millis(500),
            max_write_payload: 4 * 1024,
        }
    }

    /// Set the listener backlog capacity.
    pub fn with_backlog_capacity(mut self, capacity: usize) -> Self {
        self.backlog_capacity = capacity;
        self.sanitized()
    }

    /// Set the per-connection inbound queue capacity.
    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self.sanitized()
    }

    /// Set the dial handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum payload of a single write.
    pub fn with_max_write_payload(mut self, bytes: usize) -> Self {
        self.max_write_payload = bytes;
        self.sanitized()
    }

    // tokio's bounded channels panic on a zero capacity.
    pub(crate) fn sanitized(mut self) -> Self {
        self.backlog_capacity = self.backlog_capacity.max(1);
        self.inbound_capacity = self.inbound_capacity.max(1);
        self.max_write_payload = self.max_write_payload.max(1);
        self
    }
}
