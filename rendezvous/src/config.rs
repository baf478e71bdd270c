// Copyright (c) 2024 Botho Foundation

//! Configuration for the rendezvous service.

use crate::protocol::default_bootstrap_peers;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, time::Duration};

/// Configuration for the rendezvous service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Interface to listen on for libp2p connections
    pub listen_host: IpAddr,

    /// Port to listen on for libp2p connections (0 picks a free port)
    pub listen_port: u16,

    /// Bootstrap peers dialled on startup to join the DHT (libp2p multiaddrs)
    pub bootstrap_peers: Vec<Multiaddr>,

    /// Minimum number of bootstrap dials that must succeed.
    /// Zero accepts any outcome, including no connection at all.
    pub min_bootstrap_successes: usize,

    /// How long an unused connection is kept open (seconds)
    pub idle_connection_timeout_secs: u64,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            listen_host: IpAddr::from([127, 0, 0, 1]),
            listen_port: 3001,
            bootstrap_peers: default_bootstrap_peers(),
            min_bootstrap_successes: 0,
            idle_connection_timeout_secs: 60,
        }
    }
}

impl RendezvousConfig {
    /// Get the listen multiaddr.
    pub fn listen_multiaddr(&self) -> Multiaddr {
        let ip = match self.listen_host {
            IpAddr::V4(ip) => libp2p::multiaddr::Protocol::Ip4(ip),
            IpAddr::V6(ip) => libp2p::multiaddr::Protocol::Ip6(ip),
        };
        Multiaddr::empty()
            .with(ip)
            .with(libp2p::multiaddr::Protocol::Tcp(self.listen_port))
    }

    /// Get the idle connection timeout as a Duration.
    pub fn idle_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_connection_timeout_secs)
    }
}

/// Builder for RendezvousConfig.
#[derive(Debug, Default)]
pub struct RendezvousConfigBuilder {
    config: RendezvousConfig,
}

impl RendezvousConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen host.
    pub fn listen_host(mut self, host: IpAddr) -> Self {
        self.config.listen_host = host;
        self
    }

    /// Set the listen port.
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.listen_port = port;
        self
    }

    /// Add a bootstrap peer.
    pub fn add_bootstrap_peer(mut self, peer: Multiaddr) -> Self {
        self.config.bootstrap_peers.push(peer);
        self
    }

    /// Set bootstrap peers.
    pub fn bootstrap_peers(mut self, peers: Vec<Multiaddr>) -> Self {
        self.config.bootstrap_peers = peers;
        self
    }

    /// Require at least this many successful bootstrap dials.
    pub fn min_bootstrap_successes(mut self, min: usize) -> Self {
        self.config.min_bootstrap_successes = min;
        self
    }

    /// Set the idle connection timeout in seconds.
    pub fn idle_connection_timeout_secs(mut self, secs: u64) -> Self {
        self.config.idle_connection_timeout_secs = secs;
        self
    }

    /// Build the config.
    pub fn build(self) -> RendezvousConfig {
        self.config
    }
}
