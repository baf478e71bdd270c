// Copyright (c) 2024 Botho Foundation

//! Server side: answers connect handshakes on incoming streams.

use crate::{
    error::{HandshakeError, RendezvousResult},
    handshake::{drain_lines, serve, DatabaseInfo, HandshakeSession, ServerOutcome},
    transport::{IncomingStreams, PeerTransport},
};
use futures::StreamExt;
use libp2p::{PeerId, StreamProtocol};
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Serves the announcing side of the handshake, one task per stream.
///
/// The database info is fixed when the handler is built and shared read-only
/// by every session.
#[derive(Debug, Clone)]
pub struct StreamHandler {
    info: Arc<DatabaseInfo>,
    follow_lines: bool,
}

impl StreamHandler {
    /// Create a handler announcing `info`.
    pub fn new(info: DatabaseInfo) -> Self {
        Self {
            info: Arc::new(info),
            follow_lines: false,
        }
    }

    /// Keep reading after a completed handshake and log every line the peer
    /// sends until it closes the stream.
    pub fn follow_lines(mut self, follow: bool) -> Self {
        self.follow_lines = follow;
        self
    }

    /// The database info served to connecting peers.
    pub fn info(&self) -> &DatabaseInfo {
        &self.info
    }

    /// Register for `protocol` on `transport` and serve incoming streams in
    /// the background.
    pub fn register<T>(
        &self,
        transport: &T,
        protocol: StreamProtocol,
    ) -> RendezvousResult<JoinHandle<()>>
    where
        T: PeerTransport + ?Sized,
    {
        let incoming = transport.incoming(protocol.clone())?;
        debug!(%protocol, "Stream handler registered");
        Ok(tokio::spawn(self.clone().serve_incoming(incoming)))
    }

    /// Spawn a session for every stream until the transport stops delivering.
    pub async fn serve_incoming(self, mut incoming: IncomingStreams) {
        while let Some((peer, stream)) = incoming.next().await {
            let handler = self.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.handle_stream(peer, stream).await {
                    warn!(%peer, %e, "Handshake session failed");
                }
            });
        }
        debug!("Incoming streams closed");
    }

    /// Run one server session on `stream`.
    pub async fn handle_stream<S>(
        &self,
        peer: PeerId,
        stream: S,
    ) -> Result<ServerOutcome, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(%peer, "Got a new stream!");

        let mut session = HandshakeSession::new(stream);
        let outcome = serve(&mut session, &self.info).await?;

        if let ServerOutcome::Served { ack: Some(_) } = &outcome {
            if self.follow_lines {
                let (mut reader, _writer) = session.into_split();
                drain_lines(&mut reader, |line| info!(%peer, "{}", line)).await?;
                debug!(%peer, "Peer closed the stream");
            }
        }

        Ok(outcome)
    }
}
