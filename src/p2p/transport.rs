//! Transport seam between the coordinator and its bidders

use crate::error::{AuctionError, Result};
use crate::negotiation::{BidderResponder, BiddingStrategy};
use crate::types::BidderId;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::message::NetworkMessage;

/// Something that arrived for the coordinator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Decoded message from a known bidder
    Message { from: BidderId, message: NetworkMessage },
    /// Bytes from a known bidder that did not decode
    Malformed { from: BidderId, reason: String },
}

/// Coordinator-side message delivery
///
/// Delivery is at-most-once. Messages from one bidder arrive in the order
/// sent; there is no ordering across bidders.
pub trait Transport: Send {
    /// Deliver `message` to one bidder. Failure only concerns that bidder.
    fn send(
        &mut self,
        to: &BidderId,
        message: NetworkMessage,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Next inbound message, or `None` once `deadline` has passed
    fn receive(&mut self, deadline: Instant) -> impl Future<Output = Option<Inbound>> + Send;
}

/// In-process transport: every bidder is a tokio task fed through a channel
pub struct LocalTransport {
    bidders: HashMap<BidderId, mpsc::UnboundedSender<NetworkMessage>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
}

impl LocalTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            bidders: HashMap::new(),
            inbound_tx,
            inbound_rx,
        }
    }

    /// Run a responder as its own task; the task hands the responder back
    /// once the transport is closed or dropped
    pub fn spawn_bidder<S>(
        &mut self,
        responder: BidderResponder<S>,
    ) -> JoinHandle<BidderResponder<S>>
    where
        S: BiddingStrategy + 'static,
    {
        self.spawn_bidder_with_delay(responder, Duration::ZERO)
    }

    /// Like `spawn_bidder`, but every reply is held back for `delay`
    pub fn spawn_bidder_with_delay<S>(
        &mut self,
        mut responder: BidderResponder<S>,
        delay: Duration,
    ) -> JoinHandle<BidderResponder<S>>
    where
        S: BiddingStrategy + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<NetworkMessage>();
        let id = responder.id().clone();
        let inbound = self.inbound_tx.clone();
        self.bidders.insert(id.clone(), tx);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Some(reply) = responder.handle(message) {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let inbound_message = Inbound::Message {
                        from: id.clone(),
                        message: reply,
                    };
                    if inbound.send(inbound_message).is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("{}: local bidder stopped", id);
            responder
        })
    }

    /// Register a bidder that never answers; the receiver shows what it was sent
    pub fn add_silent_bidder(&mut self, id: BidderId) -> mpsc::UnboundedReceiver<NetworkMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bidders.insert(id, tx);
        rx
    }

    /// Register a bidder whose channel is already closed
    pub fn add_unreachable_bidder(&mut self, id: BidderId) {
        let (tx, _) = mpsc::unbounded_channel();
        self.bidders.insert(id, tx);
    }

    /// Handle for injecting inbound traffic directly
    pub fn inbound_sender(&self) -> mpsc::UnboundedSender<Inbound> {
        self.inbound_tx.clone()
    }

    /// Every registered bidder
    pub fn bidders(&self) -> BTreeSet<BidderId> {
        self.bidders.keys().cloned().collect()
    }

    /// Drop every bidder channel so bidder tasks finish
    pub fn close(&mut self) {
        self.bidders.clear();
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LocalTransport {
    async fn send(&mut self, to: &BidderId, message: NetworkMessage) -> Result<()> {
        let channel = self
            .bidders
            .get(to)
            .ok_or_else(|| AuctionError::PeerNotFound(to.0.clone()))?;

        tracing::debug!("-> {}: {}", to, message.kind());
        channel.send(message).map_err(|_| AuctionError::SendFailure {
            bidder: to.0.clone(),
            reason: "bidder channel closed".to_string(),
        })
    }

    async fn receive(&mut self, deadline: Instant) -> Option<Inbound> {
        tokio::time::timeout_at(deadline, self.inbound_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::{Offer, Response, ThresholdStrategy};
    use crate::types::{AuctionId, CoordinatorId};

    fn offer(round: u32, price: u64) -> NetworkMessage {
        NetworkMessage::CallForProposal(Offer {
            auction_id: AuctionId("auction_local".to_string()),
            round,
            price,
            coordinator: CoordinatorId::new("manager"),
            deadline_ms: 0,
        })
    }

    #[tokio::test]
    async fn test_round_trip_through_bidder_task() {
        let mut transport = LocalTransport::new();
        let handle = transport.spawn_bidder(BidderResponder::new(
            BidderId::new("alice"),
            ThresholdStrategy::new(800, 100),
        ));

        transport.send(&BidderId::new("alice"), offer(1, 750)).await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        let inbound = transport.receive(deadline).await.unwrap();

        match inbound {
            Inbound::Message {
                from,
                message: NetworkMessage::Response(Response::Propose { round, .. }),
            } => {
                assert_eq!(from, BidderId::new("alice"));
                assert_eq!(round, 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        transport.close();
        let responder = handle.await.unwrap();
        assert_eq!(responder.strategy().history(), &[750]);
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let mut transport = LocalTransport::new();
        let mut silent = transport.add_silent_bidder(BidderId::new("mute"));

        transport.send(&BidderId::new("mute"), offer(1, 1000)).await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(transport.receive(deadline).await.is_none());
        assert!(silent.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_send_failures() {
        let mut transport = LocalTransport::new();
        transport.add_unreachable_bidder(BidderId::new("gone"));

        let err = transport
            .send(&BidderId::new("gone"), offer(1, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, AuctionError::SendFailure { .. }));

        let err = transport
            .send(&BidderId::new("nobody"), offer(1, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, AuctionError::PeerNotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_inbound() {
        let mut transport = LocalTransport::new();
        transport
            .inbound_sender()
            .send(Inbound::Malformed {
                from: BidderId::new("x"),
                reason: "garbage".to_string(),
            })
            .unwrap();

        let deadline = Instant::now() + Duration::from_millis(50);
        assert!(matches!(
            transport.receive(deadline).await,
            Some(Inbound::Malformed { .. })
        ));
    }
}
