// Copyright (c) 2024 Botho Foundation

//! Announcing side entry point.

use crate::{
    error::RendezvousResult,
    handler::StreamHandler,
    transport::{PeerDiscovery, PeerTransport},
};
use libp2p::StreamProtocol;
use tokio::task::JoinHandle;
use tracing::info;

/// Register `handler` for `protocol`, then advertise ourselves under `topic`.
///
/// The handler is in place before the advertisement goes out, so a peer that
/// finds us can always open a stream. Returns the task serving incoming
/// streams; the advertisement itself is fire and forget.
pub async fn announce<T, D>(
    transport: &T,
    discovery: &D,
    handler: &StreamHandler,
    protocol: StreamProtocol,
    topic: &str,
) -> RendezvousResult<JoinHandle<()>>
where
    T: PeerTransport + ?Sized,
    D: PeerDiscovery + ?Sized,
{
    let serving = handler.register(transport, protocol)?;

    info!(%topic, "Announcing ourselves...");
    discovery.advertise(topic).await?;
    info!(
        database = %handler.info().name,
        nodes = handler.info().node_count,
        "Successfully announced!"
    );

    Ok(serving)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::RendezvousError,
        handshake::DatabaseInfo,
        protocol::{PROTOCOL_ID, RENDEZVOUS_TOPIC},
        test_utils::MockNetwork,
    };
    use assert_matches::assert_matches;
    use libp2p::PeerId;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_announce_registers_then_advertises() {
        let network = MockNetwork::new();
        let handler = StreamHandler::new(DatabaseInfo::new("mydb", 1));

        announce(&network, &network, &handler, PROTOCOL_ID, RENDEZVOUS_TOPIC)
            .await
            .unwrap();

        assert_eq!(
            *network.advertised.lock().unwrap(),
            vec![RENDEZVOUS_TOPIC.to_string()]
        );

        let mut remote = network.push_incoming(PeerId::random());
        remote.write_all(b"connect\n").await.unwrap();
        let mut name = String::new();
        BufReader::new(&mut remote).read_line(&mut name).await.unwrap();
        assert_eq!(name, "mydb\n");
    }

    #[tokio::test]
    async fn test_announce_does_not_advertise_without_handler() {
        let network = MockNetwork::new();
        let handler = StreamHandler::new(DatabaseInfo::new("mydb", 1));
        handler.register(&network, PROTOCOL_ID).unwrap();

        let result = announce(&network, &network, &handler, PROTOCOL_ID, RENDEZVOUS_TOPIC).await;

        assert_matches!(result, Err(RendezvousError::AlreadyRegistered(_)));
        assert!(network.advertised.lock().unwrap().is_empty());
    }
}
