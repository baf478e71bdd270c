// Copyright (c) 2024 Botho Foundation

//! In-memory transport and discovery for exercising the rendezvous logic.

use crate::{
    error::{RendezvousError, RendezvousResult},
    handshake::{serve, DatabaseInfo, HandshakeSession, ServerOutcome},
    transport::{BoxedStream, IncomingStreams, PeerDiscovery, PeerStream, PeerTransport},
};
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    io::{duplex, DuplexStream},
    sync::mpsc,
};

/// How a fake remote peer reacts to a new stream.
#[derive(Debug, Clone)]
pub enum RemotePeer {
    /// Opening a stream fails
    Unreachable,
    /// Runs the server side of the handshake
    Database(DatabaseInfo),
    /// Accepts the stream and closes it immediately
    HangUp,
}

/// How a fake bootstrap address reacts to a dial.
#[derive(Debug, Clone, Copy)]
pub struct DialPlan {
    pub delay: Duration,
    pub succeed: bool,
}

/// Fake network implementing both collaborator traits.
pub struct MockNetwork {
    local: PeerId,
    remotes: Mutex<HashMap<PeerId, RemotePeer>>,
    discovered: Mutex<Vec<PeerId>>,
    fail_discovery: AtomicBool,
    dial_plans: Mutex<HashMap<Multiaddr, DialPlan>>,

    pub opened: Mutex<Vec<PeerId>>,
    pub advertised: Mutex<Vec<String>>,
    pub served: Arc<Mutex<Vec<ServerOutcome>>>,
    pub candidates_pulled: Arc<AtomicUsize>,
    pub dials_completed: AtomicUsize,

    incoming_tx: mpsc::UnboundedSender<(PeerId, BoxedStream)>,
    incoming_rx: Mutex<Option<mpsc::UnboundedReceiver<(PeerId, BoxedStream)>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            local: PeerId::random(),
            remotes: Mutex::new(HashMap::new()),
            discovered: Mutex::new(Vec::new()),
            fail_discovery: AtomicBool::new(false),
            dial_plans: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            advertised: Mutex::new(Vec::new()),
            served: Arc::new(Mutex::new(Vec::new())),
            candidates_pulled: Arc::new(AtomicUsize::new(0)),
            dials_completed: AtomicUsize::new(0),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
        }
    }

    pub fn with_remote(self, peer: PeerId, remote: RemotePeer) -> Self {
        self.remotes.lock().unwrap().insert(peer, remote);
        self
    }

    /// Discovery results, in the order they are returned.
    pub fn with_discovered(self, peers: Vec<PeerId>) -> Self {
        *self.discovered.lock().unwrap() = peers;
        self
    }

    pub fn with_failing_discovery(self) -> Self {
        self.fail_discovery.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_dial_plan(self, addr: Multiaddr, plan: DialPlan) -> Self {
        self.dial_plans.lock().unwrap().insert(addr, plan);
        self
    }

    /// Simulate a remote peer opening a stream to us; returns the remote end.
    pub fn push_incoming(&self, peer: PeerId) -> DuplexStream {
        let (ours, theirs) = duplex(1024);
        self.incoming_tx
            .send((peer, Box::new(ours)))
            .expect("incoming receiver alive");
        theirs
    }

    pub fn opened(&self) -> Vec<PeerId> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerTransport for MockNetwork {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    async fn dial(&self, addr: Multiaddr) -> RendezvousResult<PeerId> {
        let plan = self.dial_plans.lock().unwrap().get(&addr).copied();
        let plan = plan.unwrap_or(DialPlan {
            delay: Duration::ZERO,
            succeed: false,
        });

        tokio::time::sleep(plan.delay).await;
        self.dials_completed.fetch_add(1, Ordering::SeqCst);

        if plan.succeed {
            Ok(PeerId::random())
        } else {
            Err(RendezvousError::Dial(addr, "connection refused".to_string()))
        }
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        _protocol: StreamProtocol,
    ) -> RendezvousResult<BoxedStream> {
        self.opened.lock().unwrap().push(peer);

        let remote = self.remotes.lock().unwrap().get(&peer).cloned();
        match remote {
            None | Some(RemotePeer::Unreachable) => Err(RendezvousError::OpenStream(
                peer,
                "no addresses for peer".to_string(),
            )),
            Some(RemotePeer::HangUp) => {
                let (ours, theirs) = duplex(1024);
                drop(theirs);
                Ok(Box::new(ours))
            }
            Some(RemotePeer::Database(info)) => {
                let (ours, theirs) = duplex(1024);
                let served = Arc::clone(&self.served);
                tokio::spawn(async move {
                    let mut session = HandshakeSession::new(theirs);
                    if let Ok(outcome) = serve(&mut session, &info).await {
                        served.lock().unwrap().push(outcome);
                    }
                });
                Ok(Box::new(ours))
            }
        }
    }

    fn incoming(&self, protocol: StreamProtocol) -> RendezvousResult<IncomingStreams> {
        let rx = self
            .incoming_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(RendezvousError::AlreadyRegistered(protocol))?;

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

#[async_trait]
impl PeerDiscovery for MockNetwork {
    async fn advertise(&self, topic: &str) -> RendezvousResult<()> {
        self.advertised.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn find_peers(&self, topic: &str) -> RendezvousResult<PeerStream> {
        if self.fail_discovery.load(Ordering::SeqCst) {
            return Err(RendezvousError::Discovery(
                topic.to_string(),
                "routing table empty".to_string(),
            ));
        }

        let peers = self.discovered.lock().unwrap().clone();
        let pulled = Arc::clone(&self.candidates_pulled);
        Ok(futures::stream::iter(peers)
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed())
    }
}
