//! # moonpool-memnet
//!
//! In-process, socket-like byte streams over bounded channels.
//!
//! Components of one process talk to each other through the familiar
//! listen / accept / dial / read / write surface without touching the OS
//! network stack. Everything lives in memory, so tests get stream socket
//! behavior (back-pressure, half-close, deadlines, connection refusal) with no
//! ports and no flakiness from the host.
//!
//! ## Components
//!
//! - [`MemNetwork`]: address registry, `listen` and `dial`
//! - [`Listener`]: bounded backlog of pending dials, `accept`
//! - [`Connection`]: one end of a byte stream, `read` / `write` / half-close
//! - [`NetError`]: error taxonomy with timeout and temporary classification
//! - [`NetworkProvider`]: trait seam for code generic over the transport
//!
//! ## Example
//!
//! ```
//! use moonpool_memnet::MemNetwork;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let network = MemNetwork::new();
//! let listener = network.listen("kv").unwrap();
//!
//! let (client, server) = tokio::join!(network.dial("kv"), listener.accept());
//! let (mut client, mut server) = (client.unwrap(), server.unwrap());
//!
//! client.write_all(b"ping").await.unwrap();
//! let mut buf = [0u8; 16];
//! let n = server.read(&mut buf).await.unwrap();
//! assert_eq!(&buf[..n], b"ping");
//! # }
//! ```
//!
//! ## Semantics
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | Dial, nothing listening | `ConnRefused` |
//! | Dial, backlog full | `ListenQueueFull`, nothing queued |
//! | Dial, no accept in time | `ConnTimeout` |
//! | Read, peer closed its write side | queued bytes, then `Ok(0)` |
//! | Write, peer closed its read side | `ConnClosed` |
//! | Write, peer queue full | blocks until room or deadline |
//! | Any blocking call, deadline passed | matching `*Timeout` |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod config;
mod connection;
mod error;
mod listener;
mod provider;
mod registry;
mod timer;
mod types;

// Configuration exports
pub use config::NetworkConfiguration;

// Error exports
pub use error::{NetError, NetResult};

// Network exports
pub use connection::Connection;
pub use listener::Listener;
pub use registry::MemNetwork;

// Provider trait exports
pub use provider::{NetworkProvider, StreamListener};

// Core type exports
pub use timer::{timer, DeadlineTimer};
pub use types::{ConnectionId, ListenerId, MemAddr, PairId, NETWORK_NAME};
