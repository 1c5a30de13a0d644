//! Bidder responder: answers offers and reacts to the coordinator's verdict

use crate::p2p::NetworkMessage;
use crate::types::{AuctionId, BidderId};

use super::strategy::{BiddingStrategy, ThresholdStrategy};
use super::types::{Decision, Inform, Offer, Response};

/// Protocol handler of one bidder
///
/// Each responder is driven by exactly one task, so its strategy state is
/// never touched by two offers at once.
pub struct BidderResponder<S: BiddingStrategy = ThresholdStrategy> {
    id: BidderId,
    strategy: S,
    reset_between_auctions: bool,
    current_auction: Option<AuctionId>,
    /// Answer to the latest round of `current_auction`
    last_answer: Option<Response>,
    wins: u32,
    rejections: u32,
}

impl<S: BiddingStrategy> BidderResponder<S> {
    pub fn new(id: BidderId, strategy: S) -> Self {
        Self {
            id,
            strategy,
            reset_between_auctions: false,
            current_auction: None,
            last_answer: None,
            wins: 0,
            rejections: 0,
        }
    }

    /// Restore the strategy whenever an offer for a new auction run arrives
    pub fn with_reset_between_auctions(mut self, reset: bool) -> Self {
        self.reset_between_auctions = reset;
        self
    }

    pub fn id(&self) -> &BidderId {
        &self.id
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Accepted proposals so far
    pub fn wins(&self) -> u32 {
        self.wins
    }

    /// Rejected proposals so far
    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    /// Answer an offer with `Propose` or `Refuse`
    ///
    /// A repeated offer for an already answered round gets the same answer
    /// again, and an offer for an older round gets `Refuse`; neither touches
    /// the strategy.
    pub fn on_offer(&mut self, offer: &Offer) -> Response {
        if self.current_auction.as_ref() != Some(&offer.auction_id) {
            if self.reset_between_auctions && self.current_auction.is_some() {
                self.strategy.reset();
            }
            self.current_auction = Some(offer.auction_id.clone());
            self.last_answer = None;
        }

        if let Some(last) = &self.last_answer {
            if offer.round == last.round() {
                tracing::debug!("{}: repeated offer for round {}", self.id, offer.round);
                return last.clone();
            }
            if offer.round < last.round() {
                tracing::debug!(
                    "{}: stale offer for round {} (already at {})",
                    self.id,
                    offer.round,
                    last.round()
                );
                return Response::refuse(self.id.clone(), offer);
            }
        }

        let accept = self.strategy.accepts(offer.price);
        self.strategy.observe(offer.price);

        let response = if accept {
            tracing::info!("{}: proposing at {} (round {})", self.id, offer.price, offer.round);
            Response::propose(self.id.clone(), offer)
        } else {
            tracing::info!(
                "{}: refusing {} (round {}), acceptable price now {}",
                self.id,
                offer.price,
                offer.round,
                self.strategy.acceptable_price()
            );
            Response::refuse(self.id.clone(), offer)
        };

        self.last_answer = Some(response.clone());
        response
    }

    /// Acknowledge that our proposal won; accepts meant for another bidder are dropped
    pub fn on_accept_proposal(&mut self, decision: &Decision) -> Option<Inform> {
        if decision.bidder != self.id {
            tracing::warn!("{}: ignoring accept addressed to {}", self.id, decision.bidder);
            return None;
        }
        self.wins += 1;
        tracing::info!(
            "{}: proposal accepted at {} ({} round {})",
            self.id,
            decision.price,
            decision.auction_id,
            decision.round
        );

        Some(Inform {
            auction_id: decision.auction_id.clone(),
            round: decision.round,
            bidder: self.id.clone(),
        })
    }

    /// Our proposal lost to an earlier one
    pub fn on_reject_proposal(&mut self, decision: &Decision) {
        self.rejections += 1;
        tracing::info!(
            "{}: proposal rejected ({} round {})",
            self.id,
            decision.auction_id,
            decision.round
        );
    }

    /// Dispatch a wire message, returning the reply to send back, if any
    pub fn handle(&mut self, message: NetworkMessage) -> Option<NetworkMessage> {
        match message {
            NetworkMessage::CallForProposal(offer) => {
                Some(NetworkMessage::Response(self.on_offer(&offer)))
            }
            NetworkMessage::AcceptProposal(decision) => {
                self.on_accept_proposal(&decision).map(NetworkMessage::Inform)
            }
            NetworkMessage::RejectProposal(decision) => {
                self.on_reject_proposal(&decision);
                None
            }
            other => {
                tracing::debug!("{}: ignoring {}", self.id, other.kind());
                None
            }
        }
    }
}
