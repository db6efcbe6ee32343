//! Listeners and their backlog of pending dials.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::time::Instant;
use tracing::instrument;

use crate::connection::Connection;
use crate::error::{NetError, NetResult};
use crate::registry::MemNetwork;
use crate::timer::timer;
use crate::types::{ListenerId, MemAddr};

/// A dial waiting in a listener's backlog.
///
/// Consumed by exactly one accept, which answers through `reply`.
pub(crate) struct ConnectRequest {
    reply: oneshot::Sender<Connection>,
}

impl ConnectRequest {
    pub(crate) fn new(reply: oneshot::Sender<Connection>) -> Self {
        Self { reply }
    }
}

/// Rendezvous point registered at an address of a [`MemNetwork`].
///
/// Pending dials queue in a bounded backlog and are accepted in FIFO order.
/// `accept` takes `&self`, so one listener can be shared between several
/// accepting tasks; each dial is still handed to exactly one of them.
///
/// Dropping the listener unregisters it, and dials still in its backlog fail
/// with [`NetError::ConnClosed`].
pub struct Listener {
    network: MemNetwork,
    id: ListenerId,
    addr: MemAddr,
    backlog: AsyncMutex<mpsc::Receiver<ConnectRequest>>,
    deadline: Mutex<Option<Instant>>,
    closed: AtomicBool,
}

impl Listener {
    pub(crate) fn new(
        network: MemNetwork,
        id: ListenerId,
        addr: MemAddr,
        backlog: mpsc::Receiver<ConnectRequest>,
    ) -> Self {
        Self {
            network,
            id,
            addr,
            backlog: AsyncMutex::new(backlog),
            deadline: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Address this listener is registered at.
    pub fn local_addr(&self) -> &MemAddr {
        &self.addr
    }

    /// Identifier of this registration.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Set the deadline applied to accepts. `None` waits indefinitely.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        *self.deadline_slot() = deadline;
    }

    /// Current accept deadline.
    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline_slot()
    }

    fn deadline_slot(&self) -> MutexGuard<'_, Option<Instant>> {
        let slot = self.deadline.lock();
        slot.unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a dial and complete the handshake.
    ///
    /// Returns the accepting end of a new connection pair; the dialing end is
    /// handed to the dialer. Dials whose caller already gave up are skipped.
    ///
    /// # Errors
    ///
    /// - [`NetError::AcceptTimeout`]: the accept deadline passed
    /// - [`NetError::ListenerClosed`]: the listener was closed or unregistered
    #[instrument(skip(self), fields(addr = %self.addr, listener = %self.id))]
    pub async fn accept(&self) -> NetResult<Connection> {
        let mut deadline = timer(self.deadline());
        let mut backlog = self.backlog.lock().await;

        loop {
            if self.is_closed() {
                refuse_pending(&mut backlog);
                return Err(NetError::ListenerClosed);
            }

            let request = tokio::select! {
                biased;
                _ = &mut deadline => {
                    tracing::debug!("accept timed out");
                    return Err(NetError::AcceptTimeout);
                }
                request = backlog.recv() => request,
            };

            let Some(request) = request else {
                tracing::debug!("backlog closed");
                return Err(NetError::ListenerClosed);
            };

            // Closed while this accept was waiting.
            if self.is_closed() {
                drop(request);
                refuse_pending(&mut backlog);
                tracing::debug!("listener closed during accept, refusing dial");
                return Err(NetError::ListenerClosed);
            }

            if request.reply.is_closed() {
                tracing::debug!("dialer gave up before accept, skipping");
                continue;
            }

            let (client, server) = self.network.new_pair(&self.addr);
            match request.reply.send(client) {
                Ok(()) => {
                    tracing::debug!(
                        conn = %server.connection_id(),
                        pair = %server.pair_id(),
                        "accepted"
                    );
                    return Ok(server);
                }
                Err(client) => {
                    tracing::debug!(
                        pair = %client.pair_id(),
                        "dialer gave up during handshake, skipping"
                    );
                }
            }
        }
    }

    /// Stop accepting and unregister the address.
    ///
    /// Dials still in the backlog fail with [`NetError::ConnClosed`], unless
    /// an accept is running concurrently, in which case they are refused when
    /// that accept returns.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.network
            .unregister_listener(self.addr.as_str(), self.id);

        if let Ok(mut backlog) = self.backlog.try_lock() {
            refuse_pending(&mut backlog);
        }

        tracing::debug!(listener = %self.id, addr = %self.addr, "listener closed");
    }

    /// Whether [`close`](Listener::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Close the backlog and drop every queued dial, failing it with `ConnClosed`.
fn refuse_pending(backlog: &mut mpsc::Receiver<ConnectRequest>) {
    backlog.close();
    while backlog.try_recv().is_ok() {}
}

impl Drop for Listener {
    fn drop(&mut self) {
        tracing::trace!(listener = %self.id, addr = %self.addr, "listener dropped");
        self.network
            .unregister_listener(self.addr.as_str(), self.id);
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
