//! Network provider abstraction.
//!
//! Code written against [`NetworkProvider`] can run over the in-memory network
//! in tests and over any other transport implementing the same traits
//! elsewhere. Errors are plain `io::Error`s whose kinds match what an OS
//! socket reports for the same condition.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::listener::Listener;
use crate::registry::MemNetwork;

/// Provider trait for creating connections and listeners.
///
/// Clone allows sharing one provider between many tasks.
#[async_trait]
pub trait NetworkProvider: Clone + Send + Sync + 'static {
    /// The byte stream type for this provider.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// The listener type for this provider.
    type Listener: StreamListener<Stream = Self::Stream> + Send + Sync + 'static;

    /// Create a listener bound to the given address.
    async fn bind(&self, addr: &str) -> io::Result<Self::Listener>;

    /// Connect to a remote address.
    async fn connect(&self, addr: &str) -> io::Result<Self::Stream>;
}

/// Trait for listeners that can accept connections.
#[async_trait]
pub trait StreamListener {
    /// The byte stream type that this listener produces.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Accept a single incoming connection, with the peer's address.
    async fn accept(&self) -> io::Result<(Self::Stream, String)>;

    /// Get the local address this listener is bound to.
    fn local_addr(&self) -> io::Result<String>;
}

#[async_trait]
impl NetworkProvider for MemNetwork {
    type Stream = Connection;
    type Listener = Listener;

    async fn bind(&self, addr: &str) -> io::Result<Self::Listener> {
        Ok(self.listen(addr)?)
    }

    async fn connect(&self, addr: &str) -> io::Result<Self::Stream> {
        Ok(self.dial(addr).await?)
    }
}

#[async_trait]
impl StreamListener for Listener {
    type Stream = Connection;

    async fn accept(&self) -> io::Result<(Self::Stream, String)> {
        let connection = Listener::accept(self).await?;
        let peer = connection.peer_addr().to_string();
        Ok((connection, peer))
    }

    fn local_addr(&self) -> io::Result<String> {
        Ok(Listener::local_addr(self).to_string())
    }
}
