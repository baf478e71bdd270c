// Copyright (c) 2024 Botho Foundation

//! Error types for the rendezvous module.

use displaydoc::Display;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use std::io;
use thiserror::Error;

/// Errors that can occur while establishing or serving a rendezvous.
#[derive(Debug, Display, Error)]
pub enum RendezvousError {
    /// Failed to build the libp2p swarm: {0}
    SwarmBuild(String),

    /// Failed to listen on {0}: {1}
    Listen(Multiaddr, String),

    /// Failed to dial {0}: {1}
    Dial(Multiaddr, String),

    /// Failed to open a stream to {0}: {1}
    OpenStream(PeerId, String),

    /// A stream handler is already registered for {0}
    AlreadyRegistered(StreamProtocol),

    /// Failed to advertise topic "{0}": {1}
    Advertise(String, String),

    /// Failed to query topic "{0}": {1}
    Discovery(String, String),

    /// Kademlia bootstrap failed: {0}
    DhtBootstrap(String),

    /// Bootstrap failed: {succeeded} of {attempted} connections succeeded, {required} required
    BootstrapFailed {
        /// Number of bootstrap addresses dialled
        attempted: usize,
        /// Number of dials that produced a connection
        succeeded: usize,
        /// Minimum number of successful dials the configuration asks for
        required: usize,
    },

    /// Handshake failed: {0}
    Handshake(#[from] HandshakeError),

    /// Channel closed
    ChannelClosed,
}

/// Errors that end a single handshake session.
///
/// These never take the process down on their own; the caller decides.
#[derive(Debug, Display, Error)]
pub enum HandshakeError {
    /// I/O error on handshake stream: {0}
    Io(#[from] io::Error),

    /// Stream ended while waiting for the {0}
    UnexpectedEof(&'static str),
}

/// Result type for rendezvous operations.
pub type RendezvousResult<T> = Result<T, RendezvousError>;
