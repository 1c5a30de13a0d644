//! Negotiation messages and the auction state machine

use crate::types::{AuctionId, BidderId, CoordinatorId, Price, Round};
use serde::{Deserialize, Serialize};

/// Price offer broadcast to every bidder at the start of a round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub auction_id: AuctionId,
    pub round: Round,
    pub price: Price,
    pub coordinator: CoordinatorId,
    /// Reply-by time, unix milliseconds
    pub deadline_ms: u64,
}

/// A bidder's answer to an offer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Propose {
        bidder: BidderId,
        auction_id: AuctionId,
        round: Round,
    },
    Refuse {
        bidder: BidderId,
        auction_id: AuctionId,
        round: Round,
    },
}

impl Response {
    pub fn propose(bidder: BidderId, offer: &Offer) -> Self {
        Response::Propose {
            bidder,
            auction_id: offer.auction_id.clone(),
            round: offer.round,
        }
    }

    pub fn refuse(bidder: BidderId, offer: &Offer) -> Self {
        Response::Refuse {
            bidder,
            auction_id: offer.auction_id.clone(),
            round: offer.round,
        }
    }

    pub fn bidder(&self) -> &BidderId {
        match self {
            Response::Propose { bidder, .. } | Response::Refuse { bidder, .. } => bidder,
        }
    }

    pub fn auction_id(&self) -> &AuctionId {
        match self {
            Response::Propose { auction_id, .. } | Response::Refuse { auction_id, .. } => {
                auction_id
            }
        }
    }

    pub fn round(&self) -> Round {
        match self {
            Response::Propose { round, .. } | Response::Refuse { round, .. } => *round,
        }
    }

    pub fn is_propose(&self) -> bool {
        matches!(self, Response::Propose { .. })
    }
}

/// Coordinator's verdict on a proposal (sent as accept or reject)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub auction_id: AuctionId,
    pub round: Round,
    pub bidder: BidderId,
    pub price: Price,
}

/// Winner's acknowledgment of an accepted proposal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inform {
    pub auction_id: AuctionId,
    pub round: Round,
    pub bidder: BidderId,
}

/// How an auction concluded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionOutcome {
    Winner {
        bidder: BidderId,
        price: Price,
        rounds: Round,
    },
    NoWinner {
        rounds: Round,
    },
}

impl AuctionOutcome {
    pub fn winner(&self) -> Option<&BidderId> {
        match self {
            AuctionOutcome::Winner { bidder, .. } => Some(bidder),
            AuctionOutcome::NoWinner { .. } => None,
        }
    }

    pub fn rounds(&self) -> Round {
        match self {
            AuctionOutcome::Winner { rounds, .. } | AuctionOutcome::NoWinner { rounds } => *rounds,
        }
    }
}

/// Auction state machine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationState {
    /// Waiting for `start()`
    Idle,
    /// Offers for this round are out, responses being collected
    RoundInProgress { round: Round, price: Price },
    /// A proposal was accepted
    WinnerSelected {
        bidder: BidderId,
        price: Price,
        round: Round,
    },
    /// Floor price passed without a proposal
    NoWinnerFloor { round: Round },
}

impl NegotiationState {
    /// Check if the auction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NegotiationState::WinnerSelected { .. } | NegotiationState::NoWinnerFloor { .. }
        )
    }

    /// Check if a round is running
    pub fn is_active(&self) -> bool {
        matches!(self, NegotiationState::RoundInProgress { .. })
    }

    /// Whether moving to `next` is a valid transition
    pub fn can_transition_to(&self, next: &NegotiationState) -> bool {
        use NegotiationState::*;
        match (self, next) {
            (Idle, RoundInProgress { round: 1, .. }) => true,
            // Next round, or round 1 again when a fresh run restarts after the floor
            (RoundInProgress { round: r, .. }, RoundInProgress { round: n, .. }) => {
                *n == r + 1 || *n == 1
            }
            (RoundInProgress { .. }, WinnerSelected { .. }) => true,
            (RoundInProgress { .. }, NoWinnerFloor { .. }) => true,
            _ => false,
        }
    }
}

/// What happened in one round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: Round,
    pub price: Price,
    /// Proposers in arrival order
    pub proposers: Vec<BidderId>,
    pub refusals: usize,
    pub silent: usize,
}
