//! Address registry and the dialing side of the handshake.
//!
//! [`MemNetwork`] is the context object every `listen` and `dial` goes
//! through. It is constructed explicitly and cloned into whatever needs it;
//! clones share one registry.
//!
//! ## Handshake
//!
//! ```text
//! dial(addr)                              Listener::accept()
//! ──────────                              ──────────────────
//! lookup addr ──► backlog sender
//! try_send(ConnectRequest) ─────────────► backlog.recv()
//!                                         Connection::pair()
//! reply_rx ◄───────────────────────────── reply.send(client end)
//! return client end                       return server end
//! ```
//!
//! A full backlog fails the dial right away with `ListenQueueFull`. The
//! dialer then waits at most `connect_timeout` for the reply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

use crate::config::NetworkConfiguration;
use crate::connection::Connection;
use crate::error::{NetError, NetResult};
use crate::listener::{ConnectRequest, Listener};
use crate::types::{ConnectionId, ListenerId, MemAddr, PairId};

/// In-memory network: a registry of listeners plus the dial operation.
///
/// # Examples
///
/// ```
/// use moonpool_memnet::MemNetwork;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let network = MemNetwork::new();
/// let listener = network.listen("echo").unwrap();
///
/// let (client, server) = tokio::join!(network.dial("echo"), listener.accept());
/// let (client, server) = (client.unwrap(), server.unwrap());
/// assert_eq!(client.peer_addr(), server.local_addr());
/// # }
/// ```
#[derive(Clone)]
pub struct MemNetwork {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    config: NetworkConfiguration,
    state: Mutex<RegistryState>,
    next_listener_id: AtomicU64,
    next_pair_id: AtomicU64,
    next_connection_id: AtomicU64,
}

#[derive(Default)]
struct RegistryState {
    listeners: HashMap<String, Registration>,
    shut_down: bool,
}

struct Registration {
    id: ListenerId,
    backlog: mpsc::Sender<ConnectRequest>,
}

impl MemNetwork {
    /// Create a network with the default configuration.
    pub fn new() -> Self {
        Self::with_config(NetworkConfiguration::default())
    }

    /// Create a network with the given configuration.
    ///
    /// Zero capacities are raised to one.
    pub fn with_config(config: NetworkConfiguration) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                config: config.sanitized(),
                state: Mutex::new(RegistryState::default()),
                next_listener_id: AtomicU64::new(1),
                next_pair_id: AtomicU64::new(1),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Configuration shared by every listener and connection.
    pub fn config(&self) -> &NetworkConfiguration {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        // Registry updates cannot be left half done, so a poisoned lock is still usable.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener at `address`.
    ///
    /// Fails with [`NetError::AddressInUse`] when a listener is already
    /// registered there, and with [`NetError::Shutdown`] after [`shutdown`].
    ///
    /// [`shutdown`]: MemNetwork::shutdown
    #[instrument(skip(self))]
    pub fn listen(&self, address: &str) -> NetResult<Listener> {
        let mut state = self.state();

        if state.shut_down {
            tracing::debug!("listen refused, network shut down");
            return Err(NetError::Shutdown);
        }

        if state.listeners.contains_key(address) {
            tracing::debug!("listen refused, address in use");
            return Err(NetError::AddressInUse);
        }

        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let (backlog_tx, backlog_rx) = mpsc::channel(self.inner.config.backlog_capacity);
        state.listeners.insert(
            address.to_string(),
            Registration {
                id,
                backlog: backlog_tx,
            },
        );
        drop(state);

        tracing::debug!(listener = %id, "listener registered");
        Ok(Listener::new(
            self.clone(),
            id,
            MemAddr::new(address),
            backlog_rx,
        ))
    }

    /// Remove the registration at `address`, whichever listener owns it.
    ///
    /// The listener stops receiving dials; once its backlog is drained its
    /// accepts fail with [`NetError::ListenerClosed`]. Returns whether a
    /// registration was removed.
    #[instrument(skip(self))]
    pub fn unregister(&self, address: &str) -> bool {
        let removed = self.state().listeners.remove(address).is_some();
        if removed {
            tracing::debug!("listener unregistered");
        }
        removed
    }

    /// Remove the registration at `address` only if it still belongs to `id`.
    pub(crate) fn unregister_listener(&self, address: &str, id: ListenerId) -> bool {
        let mut state = self.state();
        match state.listeners.get(address) {
            Some(registration) if registration.id == id => {
                state.listeners.remove(address);
                tracing::debug!(listener = %id, addr = address, "listener unregistered");
                true
            }
            _ => false,
        }
    }

    /// Whether a listener is registered at `address`.
    pub fn is_listening(&self, address: &str) -> bool {
        self.state().listeners.contains_key(address)
    }

    /// Addresses with a registered listener, sorted.
    pub fn addresses(&self) -> Vec<MemAddr> {
        let mut addresses: Vec<MemAddr> = self.state().listeners.keys().map(MemAddr::new).collect();
        addresses.sort();
        addresses
    }

    /// Remove every registration and refuse further listens.
    ///
    /// Established connections are not affected.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let mut state = self.state();
        state.shut_down = true;
        let count = state.listeners.len();
        state.listeners.clear();
        drop(state);
        tracing::debug!(listeners = count, "network shut down");
    }

    /// Whether [`shutdown`](MemNetwork::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }

    /// Connect to the listener at `address`.
    ///
    /// # Errors
    ///
    /// - [`NetError::ConnRefused`]: nothing listens at `address`
    /// - [`NetError::ListenQueueFull`]: the backlog is full, the dial was not queued
    /// - [`NetError::ConnClosed`]: the listener went away before accepting
    /// - [`NetError::ConnTimeout`]: no accept within `connect_timeout`
    #[instrument(skip(self))]
    pub async fn dial(&self, address: &str) -> NetResult<Connection> {
        let backlog = self
            .state()
            .listeners
            .get(address)
            .map(|registration| registration.backlog.clone());

        let Some(backlog) = backlog else {
            tracing::debug!("dial refused, no listener");
            return Err(NetError::ConnRefused);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = backlog.try_send(ConnectRequest::new(reply_tx));
        drop(backlog);

        if let Err(err) = queued {
            return Err(match err {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::debug!("dial failed, listen queue full");
                    NetError::ListenQueueFull
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!("dial refused, listener closed");
                    NetError::ConnRefused
                }
            });
        }

        tokio::select! {
            reply = reply_rx => match reply {
                Ok(connection) => {
                    tracing::debug!(
                        conn = %connection.connection_id(),
                        pair = %connection.pair_id(),
                        "dial established"
                    );
                    Ok(connection)
                }
                Err(_) => {
                    tracing::debug!("dial failed, listener dropped the request");
                    Err(NetError::ConnClosed)
                }
            },
            _ = tokio::time::sleep(self.inner.config.connect_timeout) => {
                tracing::debug!(
                    timeout = ?self.inner.config.connect_timeout,
                    "dial timed out"
                );
                Err(NetError::ConnTimeout)
            }
        }
    }

    /// Build a connection pair bound to `addr`, dialing end first.
    pub(crate) fn new_pair(&self, addr: &MemAddr) -> (Connection, Connection) {
        let pair_id = PairId(self.inner.next_pair_id.fetch_add(1, Ordering::Relaxed));
        let first = self
            .inner
            .next_connection_id
            .fetch_add(2, Ordering::Relaxed);
        Connection::pair(
            addr.clone(),
            pair_id,
            (ConnectionId(first), ConnectionId(first + 1)),
            &self.inner.config,
        )
    }
}

impl Default for MemNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemNetwork")
            .field("listeners", &state.listeners.len())
            .field("shut_down", &state.shut_down)
            .field("config", &self.inner.config)
            .finish()
    }
}
