// Copyright (c) 2024 Botho Foundation

//! Collaborator interfaces the rendezvous logic is written against.
//!
//! [`PeerTransport`] opens and accepts application streams, [`PeerDiscovery`]
//! publishes and looks up rendezvous topics. The libp2p backed
//! [`RendezvousHandle`](crate::RendezvousHandle) implements both; tests use
//! in-memory fakes.

use crate::error::RendezvousResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream to a single remote peer.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

/// Blanket implementation for any type that satisfies the bounds.
impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A boxed stream for dynamic dispatch.
pub type BoxedStream = Box<dyn DuplexStream>;

/// Streams opened by remote peers for one protocol.
pub type IncomingStreams = BoxStream<'static, (PeerId, BoxedStream)>;

/// Lazily produced discovery results. Finite, not restartable, unordered.
pub type PeerStream = BoxStream<'static, PeerId>;

/// Opens and accepts application streams between peers.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Our own peer id.
    fn local_peer_id(&self) -> PeerId;

    /// Connect to a peer by address, resolving once the connection is up.
    async fn dial(&self, addr: Multiaddr) -> RendezvousResult<PeerId>;

    /// Open a new stream to `peer` speaking `protocol`.
    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
    ) -> RendezvousResult<BoxedStream>;

    /// Take the inbound streams for `protocol`.
    ///
    /// Each protocol can be registered once; a second call fails.
    fn incoming(&self, protocol: StreamProtocol) -> RendezvousResult<IncomingStreams>;
}

/// Rendezvous on a shared topic.
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// Advertise ourselves under `topic`. Returns once the advertisement has
    /// been handed to the discovery layer; propagation continues in the
    /// background.
    async fn advertise(&self, topic: &str) -> RendezvousResult<()>;

    /// Look up peers advertising `topic`.
    async fn find_peers(&self, topic: &str) -> RendezvousResult<PeerStream>;
}
