// Copyright (c) 2024 Botho Foundation

//! Concurrent connection to the bootstrap peers.

use crate::{
    error::{RendezvousError, RendezvousResult},
    transport::PeerTransport,
};
use libp2p::{Multiaddr, PeerId};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Result of a bootstrap round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Number of addresses dialled
    pub attempted: usize,
    /// Number of dials that produced a connection
    pub succeeded: usize,
    /// Peers we are now connected to
    pub connected: Vec<PeerId>,
}

impl BootstrapReport {
    /// Fail if fewer than `min_successes` dials succeeded.
    pub fn ensure(&self, min_successes: usize) -> RendezvousResult<()> {
        if self.succeeded < min_successes {
            return Err(RendezvousError::BootstrapFailed {
                attempted: self.attempted,
                succeeded: self.succeeded,
                required: min_successes,
            });
        }
        Ok(())
    }
}

/// Dial every address in `peers` concurrently and wait for all of them.
///
/// Individual failures are logged and otherwise ignored. The function only
/// returns once every attempt has finished, successfully or not.
pub async fn connect_bootstrap_peers<T>(transport: Arc<T>, peers: &[Multiaddr]) -> BootstrapReport
where
    T: PeerTransport + ?Sized + 'static,
{
    let mut attempts = JoinSet::new();
    for addr in peers.iter().cloned() {
        let transport = Arc::clone(&transport);
        attempts.spawn(async move {
            let result = transport.dial(addr.clone()).await;
            (addr, result)
        });
    }

    let mut report = BootstrapReport {
        attempted: peers.len(),
        ..Default::default()
    };

    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok((addr, Ok(peer))) => {
                info!(%peer, %addr, "Connection established with bootstrap node");
                report.succeeded += 1;
                report.connected.push(peer);
            }
            Ok((addr, Err(e))) => {
                debug!(%addr, %e, "Bootstrap dial failed");
            }
            Err(e) => {
                warn!(%e, "Bootstrap dial task aborted");
            }
        }
    }

    info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        "Bootstrap complete"
    );
    report
}
