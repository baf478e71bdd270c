// Copyright (c) 2024 Botho Foundation

//! Node process: start the swarm, join the DHT, then announce or connect.

use anyhow::{Context, Result};
use picolo_rendezvous::{
    announce, connect, connect_bootstrap_peers, PeerTransport, RendezvousError, RendezvousService,
    StreamHandler, PROTOCOL_ID, RENDEZVOUS_TOPIC,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    config::{Mode, NodeConfig},
    console,
    shutdown::Shutdown,
};

/// Run the node until Ctrl-C.
pub fn run(config: NodeConfig) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    rt.block_on(run_async(config))
}

async fn run_async(config: NodeConfig) -> Result<()> {
    let mut shutdown = Shutdown::install()?;

    let handle = RendezvousService::new(config.rendezvous.clone())
        .start()
        .await
        .context("Failed to start libp2p host")?;
    info!(
        peer_id = %handle.local_peer_id(),
        port = config.listen_port(),
        mode = ?config.mode,
        "Node started"
    );

    let report =
        connect_bootstrap_peers(Arc::new(handle.clone()), &config.rendezvous.bootstrap_peers).await;
    report
        .ensure(config.rendezvous.min_bootstrap_successes)
        .context("Not enough bootstrap peers reachable")?;

    if let Err(e) = handle.bootstrap_dht().await {
        warn!(%e, "DHT bootstrap did not run");
    }

    // Held until shutdown so the stream stays open.
    let _connection = match config.mode {
        Mode::Announce => {
            let handler =
                StreamHandler::new(config.database_info()).follow_lines(config.interactive);
            announce(&handle, &handle, &handler, PROTOCOL_ID, RENDEZVOUS_TOPIC)
                .await
                .context("Failed to announce database")?;
            None
        }
        Mode::Connect => {
            let found = match connect(&handle, &handle, RENDEZVOUS_TOPIC, PROTOCOL_ID).await {
                // The session is over but the node keeps running.
                Err(RendezvousError::Handshake(e)) => {
                    warn!(%e, "Could not complete handshake with database host");
                    None
                }
                found => found.context("Failed to search for peers")?,
            };

            match found {
                Some(connection) if config.interactive => {
                    tokio::select! {
                        chat = console::run(connection) => chat?,
                        _ = shutdown.wait() => {}
                    }
                    None
                }
                Some(connection) => Some(connection),
                None => {
                    warn!("No database connection established");
                    None
                }
            }
        }
    };

    if !shutdown.is_requested() {
        info!("Running. Press Ctrl+C to stop.");
        shutdown.wait().await;
    }

    info!("Shutting down");
    if let Err(e) = handle.shutdown().await {
        warn!(%e, "Swarm already stopped");
    }
    Ok(())
}
