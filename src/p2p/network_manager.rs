//! TCP networking: peer manager, coordinator transport and bidder node

use crate::error::{AuctionError, Result};
use crate::negotiation::{BidderResponder, BiddingStrategy};
use crate::types::{BidderId, PeerId};
use futures::{SinkExt, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use super::discovery::{Discovery, StaticDirectory, BIDDER_SERVICE};
use super::message::{NetworkMessage, Registration};
use super::transport::{Inbound, Transport};

/// Network events that can occur
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// New peer connected
    PeerConnected(PeerId),
    /// Peer disconnected
    PeerDisconnected(PeerId),
    /// Frame received from peer
    MessageReceived { from: PeerId, data: Vec<u8> },
}

type FrameWriter = Arc<Mutex<FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>>>;
type PeerMap = Arc<Mutex<HashMap<PeerId, FrameWriter>>>;
type TaskList = Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>;

/// Length-delimited TCP peer manager
///
/// Dropping the manager stops the listener and every reader task and closes
/// all peer connections.
pub struct NetworkManager {
    local_addr: Option<SocketAddr>,
    peers: PeerMap,
    tasks: TaskList,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl NetworkManager {
    /// Bind `listen_addr` and start accepting peers
    pub async fn bind(listen_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| AuctionError::NetworkConnection(format!("bind {listen_addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        let mut manager = Self::client();
        manager.local_addr = Some(local_addr);

        let peers = manager.peers.clone();
        let tasks = manager.tasks.clone();
        let event_tx = manager.event_tx.clone();
        let listener_task = tokio::spawn(Self::listen_loop(listener, peers, tasks, event_tx));
        Self::track(&manager.tasks, listener_task);

        tracing::info!("Listening on {}", local_addr);
        Ok(manager)
    }

    /// Manager that only dials out
    pub fn client() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            local_addr: None,
            peers: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(std::sync::Mutex::new(Vec::new())),
            event_tx,
            event_rx,
        }
    }

    /// Listen address, if bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Connect to a peer
    pub async fn connect_to_peer(&self, addr: &str) -> Result<PeerId> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| AuctionError::NetworkConnection(e.to_string()))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| AuctionError::NetworkConnection(e.to_string()))?;

        let peer_id = PeerId::from_addr(&peer_addr);
        Self::attach(stream, peer_id.clone(), &self.peers, &self.tasks, &self.event_tx).await;
        Ok(peer_id)
    }

    /// Send one frame to a specific peer
    pub async fn send_to_peer(&self, peer_id: &PeerId, message: Vec<u8>) -> Result<()> {
        let writer = self
            .peers
            .lock()
            .await
            .get(peer_id)
            .cloned()
            .ok_or_else(|| AuctionError::PeerNotFound(peer_id.0.clone()))?;

        let len = message.len();
        writer
            .lock()
            .await
            .send(Bytes::from(message))
            .await
            .map_err(|e| AuctionError::MessageRouting(e.to_string()))?;

        tracing::debug!("Sent {} bytes to {}", len, peer_id);
        Ok(())
    }

    /// Get list of connected peers
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.lock().await.keys().cloned().collect()
    }

    /// Wait for the next network event
    pub async fn next_event(&mut self) -> Option<NetworkEvent> {
        self.event_rx.recv().await
    }

    /// Wait for the next network event, giving up at `deadline`
    pub async fn next_event_until(&mut self, deadline: Instant) -> Option<NetworkEvent> {
        tokio::time::timeout_at(deadline, self.event_rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn listen_loop(
        listener: TcpListener,
        peers: PeerMap,
        tasks: TaskList,
        event_tx: mpsc::UnboundedSender<NetworkEvent>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::info!("New connection from {}", addr);
                    let peer_id = PeerId::from_addr(&addr);
                    Self::attach(stream, peer_id, &peers, &tasks, &event_tx).await;
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Register the write half and start reading frames from the peer
    async fn attach(
        stream: TcpStream,
        peer_id: PeerId,
        peers: &PeerMap,
        tasks: &TaskList,
        event_tx: &mpsc::UnboundedSender<NetworkEvent>,
    ) {
        let (reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(FramedWrite::new(writer, LengthDelimitedCodec::new())));
        peers.lock().await.insert(peer_id.clone(), writer);

        let _ = event_tx.send(NetworkEvent::PeerConnected(peer_id.clone()));

        let peers = peers.clone();
        let event_tx = event_tx.clone();
        let reader_task = tokio::spawn(async move {
            if let Err(e) = Self::read_loop(&peer_id, reader, &event_tx).await {
                tracing::debug!("Read loop ended for {}: {}", peer_id, e);
            }
            peers.lock().await.remove(&peer_id);
            let _ = event_tx.send(NetworkEvent::PeerDisconnected(peer_id));
        });
        Self::track(tasks, reader_task);
    }

    fn track(tasks: &TaskList, handle: JoinHandle<()>) {
        let mut tasks = tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Read frames until the peer hangs up
    async fn read_loop(
        peer_id: &PeerId,
        reader: OwnedReadHalf,
        event_tx: &mpsc::UnboundedSender<NetworkEvent>,
    ) -> Result<()> {
        let mut frames = FramedRead::new(reader, LengthDelimitedCodec::new());

        while let Some(frame) = frames.next().await {
            let data = frame.map_err(|e| AuctionError::NetworkConnection(e.to_string()))?;
            tracing::debug!("Received {} bytes from {}", data.len(), peer_id);

            let _ = event_tx.send(NetworkEvent::MessageReceived {
                from: peer_id.clone(),
                data: data.to_vec(),
            });
        }
        Ok(())
    }
}

impl Drop for NetworkManager {
    fn drop(&mut self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            task.abort();
        }
        // Aborted readers release their halves lazily; closing the writers sends FIN now
        if let Ok(mut peers) = self.peers.try_lock() {
            peers.clear();
        }
    }
}

/// Coordinator-side TCP transport
///
/// Bidders dial in and send a `Register` frame; from then on their peer is
/// addressed by bidder id and listed in the directory.
pub struct TcpTransport {
    network: NetworkManager,
    directory: StaticDirectory,
    bidder_peers: HashMap<BidderId, PeerId>,
    peer_bidders: HashMap<PeerId, BidderId>,
}

impl TcpTransport {
    /// Bind the coordinator's listener
    pub async fn bind(listen_addr: &str, directory: StaticDirectory) -> Result<Self> {
        Ok(Self {
            network: NetworkManager::bind(listen_addr).await?,
            directory,
            bidder_peers: HashMap::new(),
            peer_bidders: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.network.local_addr()
    }

    pub fn directory(&self) -> &StaticDirectory {
        &self.directory
    }

    /// Process network events until at least `min` bidders have registered
    pub async fn wait_for_bidders(
        &mut self,
        min: usize,
        timeout: Option<Duration>,
    ) -> Result<BTreeSet<BidderId>> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let registered = self.directory.resolve(BIDDER_SERVICE);
            if registered.len() >= min {
                return Ok(registered.into_iter().map(BidderId).collect());
            }

            let event = match deadline {
                Some(deadline) => self.network.next_event_until(deadline).await,
                None => self.network.next_event().await,
            };
            let Some(event) = event else {
                return Err(AuctionError::NetworkConnection(format!(
                    "only {} of {} bidders registered",
                    registered.len(),
                    min
                )));
            };

            if let Some(inbound) = self.on_event(event) {
                tracing::debug!("Dropping {:?} received before the auction", inbound);
            }
        }
    }

    /// Keep registrations current; returns traffic meant for the coordinator
    fn on_event(&mut self, event: NetworkEvent) -> Option<Inbound> {
        match event {
            NetworkEvent::PeerConnected(peer) => {
                tracing::debug!("Peer connected: {}", peer);
                None
            }
            NetworkEvent::PeerDisconnected(peer) => {
                if let Some(bidder) = self.peer_bidders.remove(&peer) {
                    tracing::info!("Bidder {} disconnected", bidder);
                    self.bidder_peers.remove(&bidder);
                    self.directory.deregister_all(&bidder.0);
                }
                None
            }
            NetworkEvent::MessageReceived { from, data } => {
                let decoded = NetworkMessage::decode(&data);

                if let Ok(NetworkMessage::Register(Registration {
                    bidder,
                    service_type,
                })) = decoded
                {
                    tracing::info!("{} registered as {} ({})", from, bidder, service_type);
                    self.directory.register(&service_type, bidder.0.clone());
                    self.bidder_peers.insert(bidder.clone(), from.clone());
                    self.peer_bidders.insert(from, bidder);
                    return None;
                }

                let Some(bidder) = self.peer_bidders.get(&from).cloned() else {
                    tracing::warn!("Ignoring traffic from unregistered peer {}", from);
                    return None;
                };

                match decoded {
                    Ok(message) => Some(Inbound::Message {
                        from: bidder,
                        message,
                    }),
                    Err(e) => {
                        let error = AuctionError::MalformedResponse(e.to_string());
                        tracing::warn!("{}: {}", bidder, error);
                        Some(Inbound::Malformed {
                            from: bidder,
                            reason: error.to_string(),
                        })
                    }
                }
            }
        }
    }
}

impl Transport for TcpTransport {
    async fn send(&mut self, to: &BidderId, message: NetworkMessage) -> Result<()> {
        let failure = |reason: String| AuctionError::SendFailure {
            bidder: to.0.clone(),
            reason,
        };

        let peer = self
            .bidder_peers
            .get(to)
            .ok_or_else(|| failure("not connected".to_string()))?;
        let data = message.encode()?;

        self.network
            .send_to_peer(peer, data)
            .await
            .map_err(|e| failure(e.to_string()))
    }

    async fn receive(&mut self, deadline: Instant) -> Option<Inbound> {
        loop {
            let event = self.network.next_event_until(deadline).await?;
            if let Some(inbound) = self.on_event(event) {
                return Some(inbound);
            }
        }
    }
}

/// Bidder process: connects to a coordinator and answers its offers
pub struct BidderNode<S: BiddingStrategy> {
    network: NetworkManager,
    coordinator: PeerId,
    responder: BidderResponder<S>,
}

impl<S: BiddingStrategy> BidderNode<S> {
    /// Dial the coordinator and register under the responder's id
    pub async fn connect(coordinator_addr: &str, responder: BidderResponder<S>) -> Result<Self> {
        let network = NetworkManager::client();
        let coordinator = network.connect_to_peer(coordinator_addr).await?;

        let registration = NetworkMessage::Register(Registration {
            bidder: responder.id().clone(),
            service_type: BIDDER_SERVICE.to_string(),
        });
        network.send_to_peer(&coordinator, registration.encode()?).await?;
        tracing::info!("{}: registered with {}", responder.id(), coordinator_addr);

        Ok(Self {
            network,
            coordinator,
            responder,
        })
    }

    pub fn responder(&self) -> &BidderResponder<S> {
        &self.responder
    }

    /// Serve offers until the coordinator hangs up; hands back the responder
    pub async fn run(mut self) -> Result<BidderResponder<S>> {
        while let Some(event) = self.network.next_event().await {
            match event {
                NetworkEvent::MessageReceived { from, data } if from == self.coordinator => {
                    let message = match NetworkMessage::decode(&data) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::warn!("{}: unreadable frame: {}", self.responder.id(), e);
                            continue;
                        }
                    };

                    if let Some(reply) = self.responder.handle(message) {
                        let sent = match reply.encode() {
                            Ok(data) => self.network.send_to_peer(&self.coordinator, data).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = sent {
                            tracing::warn!("{}: reply not delivered: {}", self.responder.id(), e);
                        }
                    }
                }
                NetworkEvent::PeerDisconnected(peer) if peer == self.coordinator => {
                    tracing::info!("{}: coordinator disconnected", self.responder.id());
                    break;
                }
                other => tracing::debug!("{}: ignoring {:?}", self.responder.id(), other),
            }
        }

        Ok(self.responder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_network_creation() {
        let manager = NetworkManager::bind("127.0.0.1:0").await.unwrap();
        let addr = manager.local_addr().unwrap();
        assert!(addr.port() > 0);
        assert!(NetworkManager::client().local_addr().is_none());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = NetworkManager::bind("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap().to_string();

        let second = NetworkManager::bind(&taken).await;
        assert!(matches!(second, Err(AuctionError::NetworkConnection(_))));
    }

    #[tokio::test]
    async fn test_frames_between_nodes() {
        let mut node1 = NetworkManager::bind("127.0.0.1:0").await.unwrap();
        let node2 = NetworkManager::client();
        let addr = node1.local_addr().unwrap().to_string();

        let peer_id = node2.connect_to_peer(&addr).await.unwrap();
        assert_eq!(node2.connected_peers().await, vec![peer_id.clone()]);

        node2.send_to_peer(&peer_id, b"first".to_vec()).await.unwrap();
        node2.send_to_peer(&peer_id, b"second".to_vec()).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut frames = Vec::new();
        while frames.len() < 2 {
            match node1.next_event_until(deadline).await {
                Some(NetworkEvent::MessageReceived { data, .. }) => frames.push(data),
                Some(_) => {}
                None => panic!("frames not received"),
            }
        }
        assert_eq!(frames, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[tokio::test]
    async fn test_drop_closes_connections_and_listener() {
        let mut server = NetworkManager::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let mut client = NetworkManager::client();
        let peer = client.connect_to_peer(&addr).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        assert!(matches!(
            server.next_event_until(deadline).await,
            Some(NetworkEvent::PeerConnected(_))
        ));
        drop(server);

        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            match client.next_event_until(deadline).await {
                Some(NetworkEvent::PeerDisconnected(gone)) => {
                    assert_eq!(gone, peer);
                    break;
                }
                Some(_) => {}
                None => panic!("connection still open after drop"),
            }
        }
        assert!(client.connected_peers().await.is_empty());

        let mut rebound = false;
        for _ in 0..20 {
            if TcpListener::bind(&addr).await.is_ok() {
                rebound = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(rebound, "listener still bound after drop");
    }

    #[tokio::test]
    async fn test_unreadable_reply_is_malformed() {
        let mut transport = TcpTransport::bind("127.0.0.1:0", StaticDirectory::new())
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap().to_string();

        let client = NetworkManager::client();
        let coordinator = client.connect_to_peer(&addr).await.unwrap();
        let registration = NetworkMessage::Register(Registration {
            bidder: BidderId::new("garbled"),
            service_type: BIDDER_SERVICE.to_string(),
        });
        client
            .send_to_peer(&coordinator, registration.encode().unwrap())
            .await
            .unwrap();
        client
            .send_to_peer(&coordinator, b"{\"type\": 42".to_vec())
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        match transport.receive(deadline).await {
            Some(Inbound::Malformed { from, reason }) => {
                assert_eq!(from, BidderId::new("garbled"));
                assert!(reason.starts_with("Malformed response"), "{reason}");
            }
            other => panic!("expected malformed reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer() {
        let node = NetworkManager::client();
        let result = node
            .send_to_peer(&PeerId("peer_nowhere".to_string()), vec![1])
            .await;
        assert!(matches!(result, Err(AuctionError::PeerNotFound(_))));
    }

    #[tokio::test]
    async fn test_registration_populates_directory() {
        let directory = StaticDirectory::new();
        let mut transport = TcpTransport::bind("127.0.0.1:0", directory.clone())
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap().to_string();

        let responder = BidderResponder::new(
            BidderId::new("curator"),
            crate::negotiation::ThresholdStrategy::new(100, 100),
        );
        let node = BidderNode::connect(&addr, responder).await.unwrap();

        let bidders = transport
            .wait_for_bidders(1, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(bidders, BTreeSet::from([BidderId::new("curator")]));
        assert!(directory.resolve(BIDDER_SERVICE).contains("curator"));
        drop(node);
    }

    #[tokio::test]
    async fn test_wait_for_bidders_times_out() {
        let mut transport = TcpTransport::bind("127.0.0.1:0", StaticDirectory::new())
            .await
            .unwrap();
        let result = transport
            .wait_for_bidders(1, Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(AuctionError::NetworkConnection(_))));
    }
}
