//! tokio `AsyncRead` / `AsyncWrite` for [`Connection`].
//!
//! `poll_write` may be polled with a different buffer after returning
//! `Pending`; the chunk copied on the first poll is the one delivered, and its
//! length is what the call eventually reports.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::{Connection, WriteFuture};

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let n = ready!(this.poll_read_into(cx, buf.initialize_unfilled()))?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if this.write_in_flight.is_none() {
            if buf.is_empty() {
                return Poll::Ready(Ok(0));
            }
            let write: WriteFuture = Box::pin(this.start_write(buf)?);
            this.write_in_flight = Some(write);
        }

        let result = match this.write_in_flight.as_mut() {
            Some(write) => ready!(write.as_mut().poll(cx)),
            None => return Poll::Ready(Ok(0)),
        };
        this.write_in_flight = None;

        Poll::Ready(result.map_err(io::Error::from))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if let Some(write) = this.write_in_flight.as_mut() {
            let result = ready!(write.as_mut().poll(cx));
            this.write_in_flight = None;
            result?;
        }

        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_flush(cx))?;
        self.get_mut().close_write();
        Poll::Ready(Ok(()))
    }
}
