// Copyright (c) 2024 Botho Foundation

//! Rendezvous service that owns the libp2p swarm.
//!
//! The service provides:
//! - Swarm construction (TCP + Noise + Yamux, DNS resolution)
//! - Completion-tracked dials for bootstrap connectivity
//! - Topic advertisement and streamed provider lookups on Kademlia
//! - Routing table upkeep from identify and bootstrap connections

use crate::{
    behaviour::{
        RendezvousBehaviour, RendezvousBehaviourEvent, RendezvousCommand, RendezvousHandle,
    },
    config::RendezvousConfig,
    error::{RendezvousError, RendezvousResult},
};
use futures::StreamExt;
use libp2p::{
    identify, kad, noise,
    swarm::{dial_opts::DialOpts, ConnectionId, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use std::collections::{HashMap, HashSet};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, info, trace, warn};

/// Builds the swarm and hands out a [`RendezvousHandle`] to it.
pub struct RendezvousService {
    /// Configuration
    config: RendezvousConfig,
}

impl RendezvousService {
    /// Create a new rendezvous service.
    pub fn new(config: RendezvousConfig) -> Self {
        Self { config }
    }

    /// Start the rendezvous service.
    ///
    /// Builds the swarm, waits until it is listening, then spawns the swarm
    /// task. Any error here means the node cannot function.
    pub async fn start(&self) -> RendezvousResult<RendezvousHandle> {
        let mut swarm = build_swarm(&self.config)?;

        let listen_addr = self.config.listen_multiaddr();
        swarm
            .listen_on(listen_addr.clone())
            .map_err(|e| RendezvousError::Listen(listen_addr.clone(), e.to_string()))?;

        let listening = wait_for_listen_addr(&mut swarm, &listen_addr).await?;
        let local_peer_id = *swarm.local_peer_id();
        info!(%local_peer_id, address = %listening, "Rendezvous node listening");

        let (command_tx, command_rx) = mpsc::channel(256);
        let control = swarm.behaviour().streams.new_control();
        let handle = RendezvousHandle::new(command_tx, control, local_peer_id, vec![listening]);

        tokio::spawn(async move {
            if let Err(e) = run_swarm(swarm, command_rx).await {
                error!("Swarm task failed: {:?}", e);
            }
        });

        Ok(handle)
    }
}

fn build_swarm(config: &RendezvousConfig) -> RendezvousResult<Swarm<RendezvousBehaviour>> {
    let swarm = SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| RendezvousError::SwarmBuild(e.to_string()))?
        .with_dns()
        .map_err(|e| RendezvousError::SwarmBuild(e.to_string()))?
        .with_behaviour(RendezvousBehaviour::new)
        .map_err(|e| RendezvousError::SwarmBuild(e.to_string()))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(config.idle_connection_timeout()))
        .build();

    Ok(swarm)
}

async fn wait_for_listen_addr(
    swarm: &mut Swarm<RendezvousBehaviour>,
    requested: &Multiaddr,
) -> RendezvousResult<Multiaddr> {
    loop {
        match swarm.select_next_some().await {
            SwarmEvent::NewListenAddr { address, .. } => return Ok(address),
            SwarmEvent::ListenerError { error, .. } => {
                return Err(RendezvousError::Listen(requested.clone(), error.to_string()))
            }
            SwarmEvent::ListenerClosed { reason, .. } => {
                let reason = match reason {
                    Ok(()) => "listener closed".to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(RendezvousError::Listen(requested.clone(), reason));
            }
            event => trace!(?event, "Swarm event before listening"),
        }
    }
}

/// A dial waiting for its connection to be established.
struct PendingDial {
    addr: Multiaddr,
    reply: oneshot::Sender<RendezvousResult<PeerId>>,
}

/// A provider lookup streaming results to a caller.
struct ProviderQuery {
    topic: String,
    results: mpsc::UnboundedSender<PeerId>,
    seen: HashSet<PeerId>,
}

/// Mutable state owned by the swarm task.
#[derive(Default)]
struct SwarmState {
    pending_dials: HashMap<ConnectionId, PendingDial>,
    provider_queries: HashMap<kad::QueryId, ProviderQuery>,
}

/// Run the libp2p swarm until shutdown or until every handle is dropped.
async fn run_swarm(
    mut swarm: Swarm<RendezvousBehaviour>,
    mut command_rx: mpsc::Receiver<RendezvousCommand>,
) -> RendezvousResult<()> {
    let mut state = SwarmState::default();

    loop {
        select! {
            event = swarm.select_next_some() => {
                handle_swarm_event(event, &mut swarm, &mut state);
            }

            command = command_rx.recv() => {
                let keep_running = match command {
                    Some(command) => handle_command(command, &mut swarm, &mut state),
                    None => false,
                };
                if !keep_running {
                    info!("Shutting down rendezvous swarm");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Apply one command to the swarm. Returns `false` once the swarm should stop.
fn handle_command(
    command: RendezvousCommand,
    swarm: &mut Swarm<RendezvousBehaviour>,
    state: &mut SwarmState,
) -> bool {
    match command {
        RendezvousCommand::Dial { addr, reply } => {
            let opts = DialOpts::from(addr.clone());
            let connection_id = opts.connection_id();
            match swarm.dial(opts) {
                Ok(()) => {
                    debug!(%addr, "Dialing peer");
                    state
                        .pending_dials
                        .insert(connection_id, PendingDial { addr, reply });
                }
                Err(e) => {
                    let _ = reply.send(Err(RendezvousError::Dial(addr, e.to_string())));
                }
            }
        }

        RendezvousCommand::Advertise { topic, reply } => {
            let result = swarm.behaviour_mut().advertise(&topic).map(|query_id| {
                debug!(%topic, ?query_id, "Providing topic");
            });
            let _ = reply.send(result);
        }

        RendezvousCommand::FindProviders { topic, results } => {
            let query_id = swarm.behaviour_mut().find_providers(&topic);
            debug!(%topic, ?query_id, "Looking up providers");
            state.provider_queries.insert(
                query_id,
                ProviderQuery {
                    topic,
                    results,
                    seen: HashSet::new(),
                },
            );
        }

        RendezvousCommand::Bootstrap(reply) => {
            let result = swarm.behaviour_mut().bootstrap().map(|query_id| {
                debug!(?query_id, "Kademlia bootstrap started");
            });
            let _ = reply.send(result);
        }

        RendezvousCommand::Shutdown => return false,
    }

    true
}

fn handle_swarm_event(
    event: SwarmEvent<RendezvousBehaviourEvent>,
    swarm: &mut Swarm<RendezvousBehaviour>,
    state: &mut SwarmState,
) {
    match event {
        SwarmEvent::NewListenAddr { address, .. } => {
            info!(%address, "Listening on");
        }

        SwarmEvent::ConnectionEstablished {
            peer_id,
            connection_id,
            endpoint,
            ..
        } => {
            debug!(%peer_id, "Connected to peer");
            if let Some(dial) = state.pending_dials.remove(&connection_id) {
                // Dialled peers are bootstrap candidates for the routing table.
                swarm
                    .behaviour_mut()
                    .add_peer(peer_id, endpoint.get_remote_address().clone());
                trace!(addr = %dial.addr, "Dial completed");
                let _ = dial.reply.send(Ok(peer_id));
            }
        }

        SwarmEvent::OutgoingConnectionError {
            connection_id,
            error,
            ..
        } => {
            if let Some(dial) = state.pending_dials.remove(&connection_id) {
                let _ = dial
                    .reply
                    .send(Err(RendezvousError::Dial(dial.addr, error.to_string())));
            } else {
                debug!(%error, "Outgoing connection failed");
            }
        }

        SwarmEvent::ConnectionClosed { peer_id, .. } => {
            debug!(%peer_id, "Disconnected from peer");
        }

        SwarmEvent::Behaviour(event) => handle_behaviour_event(event, swarm, state),

        _ => {}
    }
}

fn handle_behaviour_event(
    event: RendezvousBehaviourEvent,
    swarm: &mut Swarm<RendezvousBehaviour>,
    state: &mut SwarmState,
) {
    match event {
        RendezvousBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::GetProviders(result),
            step,
            ..
        }) => {
            let Some(query) = state.provider_queries.get_mut(&id) else {
                return;
            };

            let mut receiver_gone = false;
            match result {
                Ok(kad::GetProvidersOk::FoundProviders { providers, .. }) => {
                    for provider in providers {
                        if query.seen.insert(provider) && query.results.send(provider).is_err() {
                            receiver_gone = true;
                        }
                    }
                }
                Ok(kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. }) => {}
                Err(e) => {
                    warn!(topic = %query.topic, ?e, "Provider lookup failed");
                }
            }

            if step.last {
                debug!(topic = %query.topic, found = query.seen.len(), "Provider lookup finished");
                state.provider_queries.remove(&id);
            } else if receiver_gone {
                // Nobody is listening any more; stop the query early.
                if let Some(mut running) = swarm.behaviour_mut().kademlia.query_mut(&id) {
                    running.finish();
                }
                state.provider_queries.remove(&id);
            }
        }

        RendezvousBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
            result: kad::QueryResult::StartProviding(result),
            ..
        }) => match result {
            Ok(kad::AddProviderOk { .. }) => debug!("Provider record published"),
            Err(e) => warn!(?e, "Publishing provider record failed"),
        },

        RendezvousBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
            result: kad::QueryResult::Bootstrap(result),
            step,
            ..
        }) => match result {
            Ok(_) if step.last => info!("Kademlia bootstrap completed"),
            Ok(_) => {}
            Err(e) => warn!(?e, "Kademlia bootstrap failed"),
        },

        RendezvousBehaviourEvent::Kademlia(kad::Event::RoutingUpdated { peer, .. }) => {
            debug!(%peer, "Kademlia routing updated");
        }

        RendezvousBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
            debug!(%peer_id, agent = %info.agent_version, "Identified peer");

            // Only peers speaking Kademlia belong in the routing table.
            if info.protocols.contains(&kad::PROTOCOL_NAME) {
                for addr in info.listen_addrs {
                    swarm.behaviour_mut().add_peer(peer_id, addr);
                }
            }
        }

        _ => {}
    }
}
