//! dutchtrace: a dutch auction between one coordinator and a set of bidders
//!
//! The coordinator lowers its price round by round until a bidder proposes:
//! - `negotiation`: price ladder, bidder strategy, round collection and winner selection
//! - `p2p`: wire messages, the transport seam (in-process and TCP) and discovery
//! - `cli`: command line front end

pub mod cli;
pub mod config;
pub mod error;
pub mod negotiation;
pub mod p2p;
pub mod types;

// Re-export commonly used types
pub use config::{AuctionConfig, BidderConfig, FloorPolicy};
pub use error::{AuctionError, Result};
pub use negotiation::{AuctionCoordinator, AuctionOutcome, BidderResponder, ThresholdStrategy};
pub use types::{AuctionId, BidderId, CoordinatorId, Price, Round};
