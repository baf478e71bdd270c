// Copyright (c) 2024 Botho Foundation

//! Protocol identifiers shared by every picolo node.
//!
//! Announcing and connecting peers only find each other if they agree on
//! [`RENDEZVOUS_TOPIC`] and [`PROTOCOL_ID`] out of band.

use libp2p::{kad::RecordKey, Multiaddr, StreamProtocol};
use sha2::{Digest, Sha256};

/// Version string of the picolo application protocol.
pub const PROTOCOL_VERSION: &str = "/picolo/1.0";

/// Application stream protocol negotiated on top of the libp2p connection.
pub const PROTOCOL_ID: StreamProtocol = StreamProtocol::new(PROTOCOL_VERSION);

/// Topic under which database hosts advertise themselves in the DHT.
pub const RENDEZVOUS_TOPIC: &str = "Database Bootstrap";

/// First line a connecting peer sends.
pub const CONNECT_REQUEST: &str = "connect";

/// Public libp2p DHT bootstrap nodes.
pub const DEFAULT_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnEQAwu2XbDnyhU5K2tYjFjSD1v",
];

/// Multihash code for SHA2-256.
const SHA2_256_CODE: u8 = 0x12;

/// Parsed [`DEFAULT_BOOTSTRAP_PEERS`].
pub fn default_bootstrap_peers() -> Vec<Multiaddr> {
    DEFAULT_BOOTSTRAP_PEERS
        .iter()
        .filter_map(|addr| addr.parse().ok())
        .collect()
}

/// DHT key a rendezvous topic is provided under.
///
/// This is the SHA2-256 multihash of the topic string, the same key libp2p
/// routing discovery derives, so hosts announced by other implementations on
/// the same DHT are found too.
pub fn topic_key(topic: &str) -> RecordKey {
    let digest = Sha256::digest(topic.as_bytes());
    let mut multihash = Vec::with_capacity(2 + digest.len());
    multihash.push(SHA2_256_CODE);
    multihash.push(digest.len() as u8);
    multihash.extend_from_slice(&digest);
    RecordKey::new(&multihash)
}
