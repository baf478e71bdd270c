// Copyright (c) 2024 Botho Foundation

//! DHT rendezvous and line handshake for picolo database nodes.
//!
//! A node either *announces* itself as a database host under a well-known
//! rendezvous topic, or *connects* to one announced host found through the
//! Kademlia DHT. Once a stream is open, both sides run a short newline
//! delimited handshake:
//!
//! ```text
//!  connecting peer                      announcing peer
//!  ───────────────                      ───────────────
//!  "connect\n"        ────────────────▶
//!                     ◀────────────────  "<database name>\n"
//!                     ◀────────────────  "<node count>\n"
//!  "<peer id>\n"      ────────────────▶
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RendezvousHandle                         │
//! │        (PeerTransport + PeerDiscovery, cheap clones)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ command chan │  │ stream ctrl  │  │  libp2p Swarm    │  │
//! │  │ (dial, kad)  │  │ (raw streams)│  │  (swarm task)    │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The protocol logic ([`StreamHandler`], [`connect`], [`announce`],
//! [`connect_bootstrap_peers`]) only sees the [`PeerTransport`] and
//! [`PeerDiscovery`] traits, so it runs unchanged against in-memory fakes.
//!
//! # Usage
//!
//! ```ignore
//! use picolo_rendezvous::{
//!     connect, connect_bootstrap_peers, RendezvousConfig, RendezvousService,
//!     PROTOCOL_ID, RENDEZVOUS_TOPIC,
//! };
//!
//! let config = RendezvousConfig::default();
//! let handle = RendezvousService::new(config.clone()).start().await?;
//! let transport = std::sync::Arc::new(handle.clone());
//! connect_bootstrap_peers(transport, &config.bootstrap_peers)
//!     .await
//!     .ensure(config.min_bootstrap_successes)?;
//!
//! if let Some(connection) = connect(&handle, &handle, RENDEZVOUS_TOPIC, PROTOCOL_ID).await? {
//!     println!("{} runs on {} nodes", connection.remote.name, connection.remote.node_count);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod announce;
pub mod behaviour;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod initiator;
pub mod protocol;
pub mod service;
pub mod transport;

#[cfg(test)]
mod test_utils;

// Re-export main types for convenience
pub use announce::announce;
pub use behaviour::{RendezvousCommand, RendezvousHandle};
pub use bootstrap::{connect_bootstrap_peers, BootstrapReport};
pub use config::{RendezvousConfig, RendezvousConfigBuilder};
pub use error::{HandshakeError, RendezvousError, RendezvousResult};
pub use handler::StreamHandler;
pub use handshake::{
    drain_lines, initiate, serve, DatabaseInfo, HandshakeSession, RemoteDatabase, ServerOutcome,
};
pub use initiator::{connect, Connection};
pub use protocol::{
    default_bootstrap_peers, topic_key, CONNECT_REQUEST, DEFAULT_BOOTSTRAP_PEERS, PROTOCOL_ID,
    PROTOCOL_VERSION, RENDEZVOUS_TOPIC,
};
pub use service::RendezvousService;
pub use transport::{
    BoxedStream, DuplexStream, IncomingStreams, PeerDiscovery, PeerStream, PeerTransport,
};
