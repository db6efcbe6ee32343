//! One end of an established in-memory byte stream.
//!
//! A pair of [`Connection`]s is created atomically by `Listener::accept`.
//! Each end owns its inbound queue and a close-notification channel, and holds
//! the sending side of its peer's inbound queue plus a receiver on its peer's
//! close notification:
//!
//! ```text
//!          client                                server
//!   ┌──────────────────┐                  ┌──────────────────┐
//!   │ outbound ────────┼──── chunks ────► │ inbound          │
//!   │ inbound  ◄───────┼──── chunks ───── │ outbound         │
//!   │ close_tx ────────┼──── closed? ───► │ peer_closed      │
//!   │ peer_closed ◄────┼──── closed? ──── │ close_tx         │
//!   └──────────────────┘                  └──────────────────┘
//! ```
//!
//! Both ends share a [`PairId`]; nothing else links them, so dropping both
//! ends releases every channel.

mod stream;

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::NetworkConfiguration;
use crate::error::{NetError, NetResult};
use crate::timer::{timer, DeadlineTimer};
use crate::types::{ConnectionId, MemAddr, PairId};

type WriteFuture = Pin<Box<dyn Future<Output = NetResult<usize>> + Send>>;

/// One end of an in-memory connection.
///
/// Reads and writes follow stream socket semantics: bytes arrive in write
/// order, a read returns as soon as some bytes are available, and a write
/// blocks while the peer's inbound queue is full. Every blocking operation is
/// bounded by the matching deadline, when one is set.
///
/// `Connection` implements tokio's `AsyncRead` and `AsyncWrite`; use
/// `tokio::io::split` to read and write from different tasks.
pub struct Connection {
    id: ConnectionId,
    pair_id: PairId,
    addr: MemAddr,

    inbound: mpsc::Receiver<Bytes>,
    /// Rest of the last inbound chunk that did not fit the caller's buffer.
    pending: Bytes,
    /// `None` once the write side is closed.
    outbound: Option<mpsc::Sender<Bytes>>,

    close_tx: watch::Sender<bool>,
    peer_closed: watch::Receiver<bool>,
    read_closed: bool,

    read_timer: DeadlineTimer,
    write_deadline: Option<Instant>,
    max_write_payload: usize,

    /// Write started by `poll_write` that has not resolved yet.
    write_in_flight: Option<WriteFuture>,
}

impl Connection {
    /// Build two cross-wired ends sharing `pair_id`.
    ///
    /// The first element is the dialing side, the second the accepting side.
    pub(crate) fn pair(
        addr: MemAddr,
        pair_id: PairId,
        ids: (ConnectionId, ConnectionId),
        config: &NetworkConfiguration,
    ) -> (Connection, Connection) {
        let (client_inbound_tx, client_inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (server_inbound_tx, server_inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (client_close_tx, client_close_rx) = watch::channel(false);
        let (server_close_tx, server_close_rx) = watch::channel(false);

        let client = Connection::new(
            ids.0,
            pair_id,
            addr.clone(),
            client_inbound_rx,
            server_inbound_tx,
            client_close_tx,
            server_close_rx,
            config.max_write_payload,
        );
        let server = Connection::new(
            ids.1,
            pair_id,
            addr,
            server_inbound_rx,
            client_inbound_tx,
            server_close_tx,
            client_close_rx,
            config.max_write_payload,
        );

        tracing::debug!(
            pair = %pair_id,
            client = %client.id,
            server = %server.id,
            addr = %client.addr,
            "connection pair created"
        );

        (client, server)
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        id: ConnectionId,
        pair_id: PairId,
        addr: MemAddr,
        inbound: mpsc::Receiver<Bytes>,
        outbound: mpsc::Sender<Bytes>,
        close_tx: watch::Sender<bool>,
        peer_closed: watch::Receiver<bool>,
        max_write_payload: usize,
    ) -> Self {
        Self {
            id,
            pair_id,
            addr,
            inbound,
            pending: Bytes::new(),
            outbound: Some(outbound),
            close_tx,
            peer_closed,
            read_closed: false,
            read_timer: DeadlineTimer::never(),
            write_deadline: None,
            max_write_payload,
            write_in_flight: None,
        }
    }

    /// Identifier of this end.
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Identifier shared with the peer end.
    pub fn pair_id(&self) -> PairId {
        self.pair_id
    }

    /// Local address: the listen address of the pair.
    pub fn local_addr(&self) -> &MemAddr {
        &self.addr
    }

    /// Remote address: the listen address of the pair.
    pub fn peer_addr(&self) -> &MemAddr {
        &self.addr
    }

    /// Number of received bytes buffered but not yet read.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Whether `close_read` (or `close`) was called on this end.
    pub fn is_read_closed(&self) -> bool {
        self.read_closed
    }

    /// Whether `close_write` (or `close`) was called on this end.
    pub fn is_write_closed(&self) -> bool {
        self.outbound.is_none()
    }

    /// Whether the peer closed its read side or went away.
    pub fn is_peer_closed(&self) -> bool {
        *self.peer_closed.borrow() || self.peer_closed.has_changed().is_err()
    }

    // --- deadlines ---

    /// Set both the read and the write deadline. `None` disables them.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    /// Set the deadline for current and future reads. `None` disables it.
    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_timer.reset(deadline);
    }

    /// Set the deadline for future writes. `None` disables it.
    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline = deadline;
    }

    /// Current read deadline.
    pub fn read_deadline(&self) -> Option<Instant> {
        self.read_timer.deadline()
    }

    /// Current write deadline.
    pub fn write_deadline(&self) -> Option<Instant> {
        self.write_deadline
    }

    // --- read ---

    /// Read up to `buf.len()` bytes.
    ///
    /// Waits only for the first chunk: once some bytes are copied, the call
    /// returns them instead of waiting for more. `Ok(0)` with a non-empty
    /// buffer is end of stream, either because the peer closed its write side
    /// and everything it sent was read, or because this end closed its read
    /// side. Fails with [`NetError::ReadTimeout`] once the read deadline has
    /// passed; an expired deadline fails without waiting.
    pub async fn read(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        poll_fn(|cx| self.poll_read_into(cx, buf)).await
    }

    pub(crate) fn poll_read_into(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<NetResult<usize>> {
        if self.read_closed {
            return Poll::Ready(Ok(0));
        }

        let mut copied = 0;
        while copied < buf.len() {
            if self.pending.is_empty() {
                // Only the first chunk is waited for.
                if copied > 0 {
                    match self.inbound.try_recv() {
                        Ok(chunk) => {
                            self.pending = chunk;
                            continue;
                        }
                        Err(_) => break,
                    }
                }

                if self.read_timer.is_expired() {
                    tracing::trace!(conn = %self.id, "read deadline already expired");
                    return Poll::Ready(Err(NetError::ReadTimeout));
                }

                match self.inbound.poll_recv(cx) {
                    Poll::Ready(Some(chunk)) => {
                        self.pending = chunk;
                        continue;
                    }
                    Poll::Ready(None) => {
                        tracing::trace!(conn = %self.id, "peer closed its write side, eof");
                        return Poll::Ready(Ok(0));
                    }
                    Poll::Pending => {
                        return match self.read_timer.poll_expired(cx) {
                            Poll::Ready(()) => {
                                tracing::trace!(conn = %self.id, "read deadline expired");
                                Poll::Ready(Err(NetError::ReadTimeout))
                            }
                            Poll::Pending => Poll::Pending,
                        };
                    }
                }
            }

            let n = (buf.len() - copied).min(self.pending.len());
            buf[copied..copied + n].copy_from_slice(&self.pending[..n]);
            self.pending.advance(n);
            copied += n;
        }

        Poll::Ready(Ok(copied))
    }

    // --- write ---

    /// Write up to `max_write_payload` bytes of `buf`.
    ///
    /// The bytes are copied before the call waits, so the caller may reuse
    /// `buf` as soon as the future is created and polled once. Blocks while
    /// the peer's inbound queue is full. Fails with [`NetError::ConnClosed`]
    /// when the peer closed its read side or this end closed its write side,
    /// and with [`NetError::WriteTimeout`] when the write deadline passes.
    pub async fn write(&mut self, buf: &[u8]) -> NetResult<usize> {
        if let Some(in_flight) = self.write_in_flight.take() {
            in_flight.await?;
        }

        if buf.is_empty() {
            return Ok(0);
        }

        self.start_write(buf)?.await
    }

    /// Write the whole buffer, looping over short writes.
    pub async fn write_all(&mut self, mut buf: &[u8]) -> NetResult<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Copy the next chunk of `buf` and build the future delivering it.
    ///
    /// The returned future owns everything it needs, which lets `poll_write`
    /// keep it across polls.
    fn start_write(
        &self,
        buf: &[u8],
    ) -> NetResult<impl Future<Output = NetResult<usize>> + Send + 'static> {
        let outbound = self.outbound.clone().ok_or(NetError::ConnClosed)?;

        let len = buf.len().min(self.max_write_payload);
        let chunk = Bytes::copy_from_slice(&buf[..len]);

        tracing::trace!(conn = %self.id, bytes = len, requested = buf.len(), "write");

        Ok(send_chunk(
            outbound,
            self.peer_closed.clone(),
            self.write_deadline,
            chunk,
        ))
    }

    // --- close ---

    /// Close the read side.
    ///
    /// Later reads on this end return end of stream, and the peer's writes,
    /// including one blocked on a full queue, fail with
    /// [`NetError::ConnClosed`].
    pub fn close_read(&mut self) {
        if !self.read_closed {
            tracing::debug!(conn = %self.id, pair = %self.pair_id, "closing read side");
        }
        self.read_closed = true;
        self.pending = Bytes::new();
        self.close_tx.send_replace(true);
        self.inbound.close();
    }

    /// Close the write side.
    ///
    /// The peer reads whatever was already queued, then end of stream.
    pub fn close_write(&mut self) {
        if self.outbound.take().is_some() {
            tracing::debug!(conn = %self.id, pair = %self.pair_id, "closing write side");
        }
        self.write_in_flight = None;
    }

    /// Close both sides. Calling it again has no further effect.
    pub fn close(&mut self) {
        self.close_read();
        self.close_write();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        tracing::trace!(conn = %self.id, "connection dropped");
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("pair_id", &self.pair_id)
            .field("addr", &self.addr)
            .field("buffered", &self.pending.len())
            .field("read_closed", &self.read_closed)
            .field("write_closed", &self.outbound.is_none())
            .finish()
    }
}

/// Deliver one chunk to the peer's inbound queue.
///
/// Races the peer's close notification, the write deadline and the queue
/// having room, in that priority order.
async fn send_chunk(
    outbound: mpsc::Sender<Bytes>,
    mut peer_closed: watch::Receiver<bool>,
    deadline: Option<Instant>,
    chunk: Bytes,
) -> NetResult<usize> {
    let len = chunk.len();

    tokio::select! {
        biased;
        _ = wait_closed(&mut peer_closed) => Err(NetError::ConnClosed),
        _ = timer(deadline) => Err(NetError::WriteTimeout),
        sent = outbound.send(chunk) => sent.map(|()| len).map_err(|_| NetError::ConnClosed),
    }
}

/// Resolves once the watched end is closed or dropped.
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}
