// Copyright (c) 2024 Botho Foundation

//! libp2p network behaviour and the command handle for the rendezvous swarm.
//!
//! This module implements the networking side using libp2p:
//! - Kademlia DHT for topic advertisement (provider records) and lookup
//! - Identify to learn which peers speak Kademlia and where they listen
//! - Raw streams for the line handshake

use crate::{
    error::{RendezvousError, RendezvousResult},
    protocol::{topic_key, PROTOCOL_VERSION},
    transport::{BoxedStream, IncomingStreams, PeerDiscovery, PeerStream, PeerTransport},
};
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    identify,
    kad::{self, store::MemoryStore},
    swarm::NetworkBehaviour,
    Multiaddr, PeerId, StreamProtocol,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::FuturesAsyncReadCompatExt;

/// Combined network behaviour for rendezvous.
#[derive(NetworkBehaviour)]
pub(crate) struct RendezvousBehaviour {
    /// Kademlia DHT for topic rendezvous
    pub kademlia: kad::Behaviour<MemoryStore>,

    /// Identify protocol for learning peer addresses and protocols
    pub identify: identify::Behaviour,

    /// Raw application streams
    pub streams: libp2p_stream::Behaviour,
}

impl RendezvousBehaviour {
    /// Create a new rendezvous behaviour.
    pub fn new(keypair: &libp2p::identity::Keypair) -> Self {
        let local_peer_id = keypair.public().to_peer_id();

        let mut kademlia = kad::Behaviour::new(local_peer_id, MemoryStore::new(local_peer_id));
        // Answer provider lookups even before an external address is confirmed.
        kademlia.set_mode(Some(kad::Mode::Server));

        let identify = identify::Behaviour::new(
            identify::Config::new(PROTOCOL_VERSION.to_string(), keypair.public())
                .with_agent_version(format!("picolo/{}", env!("CARGO_PKG_VERSION"))),
        );

        Self {
            kademlia,
            identify,
            streams: libp2p_stream::Behaviour::new(),
        }
    }

    /// Add a peer to Kademlia for discovery.
    pub fn add_peer(&mut self, peer_id: PeerId, addr: Multiaddr) {
        self.kademlia.add_address(&peer_id, addr);
    }

    /// Start providing `topic`. The record is stored locally right away and
    /// published to the closest peers in the background.
    pub fn advertise(&mut self, topic: &str) -> RendezvousResult<kad::QueryId> {
        self.kademlia
            .start_providing(topic_key(topic))
            .map_err(|e| RendezvousError::Advertise(topic.to_string(), e.to_string()))
    }

    /// Start a provider lookup for `topic`.
    pub fn find_providers(&mut self, topic: &str) -> kad::QueryId {
        self.kademlia.get_providers(topic_key(topic))
    }

    /// Bootstrap Kademlia by finding closest peers.
    pub fn bootstrap(&mut self) -> RendezvousResult<kad::QueryId> {
        self.kademlia
            .bootstrap()
            .map_err(|e| RendezvousError::DhtBootstrap(e.to_string()))
    }
}

/// Commands that can be sent to the rendezvous swarm.
#[derive(Debug)]
pub enum RendezvousCommand {
    /// Dial an address; the reply carries the remote peer once connected
    Dial {
        /// Address to dial
        addr: Multiaddr,
        /// Resolved when the connection is established or fails
        reply: oneshot::Sender<RendezvousResult<PeerId>>,
    },

    /// Provide a rendezvous topic
    Advertise {
        /// Topic to provide
        topic: String,
        /// Resolved once the provider record is stored locally
        reply: oneshot::Sender<RendezvousResult<()>>,
    },

    /// Look up providers of a topic; the channel closes when the query ends
    FindProviders {
        /// Topic to look up
        topic: String,
        /// Receives each provider once
        results: mpsc::UnboundedSender<PeerId>,
    },

    /// Run a Kademlia bootstrap query
    Bootstrap(oneshot::Sender<RendezvousResult<()>>),

    /// Shutdown the swarm
    Shutdown,
}

/// Handle for controlling the rendezvous swarm.
///
/// Cheap to clone; every clone talks to the same swarm task.
#[derive(Clone)]
pub struct RendezvousHandle {
    /// Channel to send commands to the swarm
    command_tx: mpsc::Sender<RendezvousCommand>,

    /// Raw stream control, usable without going through the swarm task
    control: libp2p_stream::Control,

    /// Our peer id
    local_peer_id: PeerId,

    /// Addresses the swarm was listening on when it started
    listen_addrs: Vec<Multiaddr>,
}

impl RendezvousHandle {
    /// Create a new handle.
    pub fn new(
        command_tx: mpsc::Sender<RendezvousCommand>,
        control: libp2p_stream::Control,
        local_peer_id: PeerId,
        listen_addrs: Vec<Multiaddr>,
    ) -> Self {
        Self {
            command_tx,
            control,
            local_peer_id,
            listen_addrs,
        }
    }

    /// Addresses we listen on, without the `/p2p` suffix.
    pub fn listen_addrs(&self) -> &[Multiaddr] {
        &self.listen_addrs
    }

    /// Run a Kademlia bootstrap query against the peers known so far.
    pub async fn bootstrap_dht(&self) -> RendezvousResult<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(RendezvousCommand::Bootstrap(tx))
            .await
            .map_err(|_| RendezvousError::ChannelClosed)?;

        rx.await.map_err(|_| RendezvousError::ChannelClosed)?
    }

    /// Shutdown the rendezvous swarm.
    pub async fn shutdown(&self) -> RendezvousResult<()> {
        self.command_tx
            .send(RendezvousCommand::Shutdown)
            .await
            .map_err(|_| RendezvousError::ChannelClosed)
    }
}

#[async_trait]
impl PeerTransport for RendezvousHandle {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn dial(&self, addr: Multiaddr) -> RendezvousResult<PeerId> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(RendezvousCommand::Dial { addr, reply: tx })
            .await
            .map_err(|_| RendezvousError::ChannelClosed)?;

        rx.await.map_err(|_| RendezvousError::ChannelClosed)?
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
    ) -> RendezvousResult<BoxedStream> {
        let stream = self
            .control
            .clone()
            .open_stream(peer, protocol)
            .await
            .map_err(|e| RendezvousError::OpenStream(peer, e.to_string()))?;

        Ok(Box::new(stream.compat()))
    }

    fn incoming(&self, protocol: StreamProtocol) -> RendezvousResult<IncomingStreams> {
        let incoming = self
            .control
            .clone()
            .accept(protocol.clone())
            .map_err(|_| RendezvousError::AlreadyRegistered(protocol))?;

        Ok(incoming
            .map(|(peer, stream)| (peer, Box::new(stream.compat()) as BoxedStream))
            .boxed())
    }
}

#[async_trait]
impl PeerDiscovery for RendezvousHandle {
    async fn advertise(&self, topic: &str) -> RendezvousResult<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(RendezvousCommand::Advertise {
                topic: topic.to_string(),
                reply: tx,
            })
            .await
            .map_err(|_| RendezvousError::ChannelClosed)?;

        rx.await.map_err(|_| RendezvousError::ChannelClosed)?
    }

    async fn find_peers(&self, topic: &str) -> RendezvousResult<PeerStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.command_tx
            .send(RendezvousCommand::FindProviders {
                topic: topic.to_string(),
                results: tx,
            })
            .await
            .map_err(|_| {
                RendezvousError::Discovery(topic.to_string(), "swarm task stopped".to_string())
            })?;

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|peer| (peer, rx))
        })
        .boxed())
    }
}
