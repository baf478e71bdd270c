// Copyright (c) 2024 Botho Foundation

//! Connecting side: find an announced database host and shake hands with it.
//!
//! Candidates are tried one at a time in the order discovery yields them.
//! Our own peer id is skipped and a candidate that cannot be reached is
//! logged and skipped. The first stream that opens ends the search, whether
//! or not the handshake on it then succeeds.

use crate::{
    error::{RendezvousError, RendezvousResult},
    handshake::{initiate, HandshakeSession, RemoteDatabase},
    transport::{BoxedStream, PeerDiscovery, PeerTransport},
};
use futures::StreamExt;
use libp2p::{PeerId, StreamProtocol};
use tracing::{info, warn};

/// An established connection to an announced database host.
pub struct Connection {
    /// The host we connected to
    pub peer: PeerId,
    /// What the host told us about its database
    pub remote: RemoteDatabase,
    /// The stream the handshake ran on, still open
    pub session: HandshakeSession<BoxedStream>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Connect to at most one peer announcing `topic`.
///
/// Running out of candidates is not an error and yields `Ok(None)`. Fails if
/// the discovery query fails, or with [`RendezvousError::Handshake`] if the
/// handshake on the first opened stream fails.
pub async fn connect<T, D>(
    transport: &T,
    discovery: &D,
    topic: &str,
    protocol: StreamProtocol,
) -> RendezvousResult<Option<Connection>>
where
    T: PeerTransport + ?Sized,
    D: PeerDiscovery + ?Sized,
{
    let local_peer_id = transport.local_peer_id();

    info!(%topic, "Searching for other peers...");
    let mut candidates = discovery.find_peers(topic).await?;

    while let Some(peer) = candidates.next().await {
        if peer == local_peer_id {
            continue;
        }
        info!(%peer, "Found peer");

        info!(%peer, "Connecting to");
        let stream = match transport.open_stream(peer, protocol.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%peer, %e, "Connection failed");
                continue;
            }
        };

        let mut session = HandshakeSession::new(stream);
        let remote = initiate(&mut session, &local_peer_id).await.map_err(|e| {
            warn!(%peer, %e, "Handshake failed");
            RendezvousError::Handshake(e)
        })?;

        info!(%peer, database = %remote.name, nodes = %remote.node_count, "Connected to");
        return Ok(Some(Connection {
            peer,
            remote,
            session,
        }));
    }

    info!(%topic, "No announced database host reachable");
    Ok(None)
}
