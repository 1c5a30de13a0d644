//! CLI module for dutchtrace

pub mod app;
pub mod commands;

pub use app::{AuctionApp, BidderSummary, SimulationReport};
pub use commands::{AuctionArgs, BidderArgs, Cli, Commands};
