//! Dutch auction negotiation: price ladder, bidder strategy and the round protocol

pub mod coordinator;
pub mod pricing;
pub mod responder;
pub mod session;
pub mod strategy;
pub mod types;

pub use coordinator::AuctionCoordinator;
pub use pricing::PriceStrategy;
pub use responder::BidderResponder;
pub use session::{Award, Recorded, RoundSession};
pub use strategy::{BidderState, BiddingStrategy, ThresholdStrategy};
pub use types::{
    AuctionOutcome, Decision, Inform, NegotiationState, Offer, Response, RoundRecord,
};
