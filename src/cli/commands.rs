//! CLI command definitions

use crate::config::{AuctionConfig, BidderConfig, FloorPolicy};
use crate::error::Result;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "dutchtrace")]
#[command(about = "dutchtrace - dutch auction coordinator and bidders", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a complete auction in-process
    Simulate {
        /// Fixed initial threshold of one bidder (repeatable)
        #[arg(short = 't', long = "threshold")]
        thresholds: Vec<u64>,

        /// Number of bidders with random thresholds, used when no threshold is given
        #[arg(short, long, default_value = "3")]
        bidders: usize,

        #[command(flatten)]
        auction: AuctionArgs,

        #[command(flatten)]
        bidder: BidderArgs,
    },

    /// Start a coordinator node and auction to the bidders that connect
    Coordinator {
        /// Port to listen on
        #[arg(short, long, default_value = "9000")]
        port: u16,

        /// Bidders that must register before the auction starts
        #[arg(short = 'n', long, default_value = "1")]
        min_bidders: usize,

        /// Give up waiting for bidders after this many seconds
        #[arg(short, long)]
        wait_secs: Option<u64>,

        #[command(flatten)]
        auction: AuctionArgs,
    },

    /// Start a bidder node
    Bidder {
        /// Coordinator address to connect to
        #[arg(short = 'c', long)]
        connect: String,

        /// Name to register under
        #[arg(short, long)]
        name: String,

        /// Initial acceptance threshold (random when omitted)
        #[arg(short, long)]
        threshold: Option<u64>,

        #[command(flatten)]
        bidder: BidderArgs,
    },

    /// Print the price of every round
    Prices {
        #[command(flatten)]
        auction: AuctionArgs,
    },
}

/// Auction flags; anything unset keeps its env/default value
#[derive(Args, Debug, Clone, Default)]
pub struct AuctionArgs {
    /// Opening price
    #[arg(long)]
    pub highest: Option<u64>,

    /// Floor price
    #[arg(long)]
    pub lowest: Option<u64>,

    /// Price multiplier between rounds, in (0, 1)
    #[arg(long)]
    pub decay: Option<f64>,

    /// Reply deadline per round in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Start over from the highest price when the floor passes without a proposal
    #[arg(long)]
    pub restart_on_floor: bool,

    /// Limit on runs when restarting
    #[arg(long)]
    pub max_runs: Option<u32>,
}

impl AuctionArgs {
    pub fn apply(&self, mut config: AuctionConfig) -> Result<AuctionConfig> {
        if let Some(v) = self.highest {
            config.highest_price = v;
        }
        if let Some(v) = self.lowest {
            config.lowest_price = v;
        }
        if let Some(v) = self.decay {
            config.decay_factor = v;
        }
        if let Some(v) = self.timeout_ms {
            config.reply_timeout = Duration::from_millis(v);
        }
        if self.restart_on_floor {
            config.floor_policy = FloorPolicy::Restart {
                max_runs: self.max_runs,
            };
        } else if let (FloorPolicy::Restart { .. }, Some(max)) =
            (config.floor_policy, self.max_runs)
        {
            config.floor_policy = FloorPolicy::Restart {
                max_runs: Some(max),
            };
        }
        config.validate()?;
        Ok(config)
    }
}

/// Bidder flags
#[derive(Args, Debug, Clone, Default)]
pub struct BidderArgs {
    /// Threshold increase per observed offer
    #[arg(long)]
    pub increment: Option<u64>,

    /// Restore the initial threshold when a new auction run starts
    #[arg(long)]
    pub reset_between_auctions: bool,
}

impl BidderArgs {
    pub fn apply(&self, mut config: BidderConfig) -> Result<BidderConfig> {
        if let Some(v) = self.increment {
            config.increment = v;
        }
        if self.reset_between_auctions {
            config.reset_between_auctions = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "dutchtrace",
            "simulate",
            "-t",
            "900",
            "-t",
            "50",
            "--decay",
            "0.5",
            "--increment",
            "100",
        ])
        .unwrap();

        match cli.command {
            Commands::Simulate { thresholds, auction, bidder, .. } => {
                assert_eq!(thresholds, vec![900, 50]);
                let config = auction.apply(AuctionConfig::default()).unwrap();
                assert_eq!(config.decay_factor, 0.5);
                assert_eq!(bidder.apply(BidderConfig::default()).unwrap().increment, 100);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_bidder() {
        let cli = Cli::try_parse_from([
            "dutchtrace", "bidder", "-c", "127.0.0.1:9000", "-n", "curator",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Bidder { threshold: None, .. }
        ));
    }

    #[test]
    fn test_restart_flags() {
        let args = AuctionArgs {
            restart_on_floor: true,
            max_runs: Some(2),
            ..Default::default()
        };
        let config = args.apply(AuctionConfig::default()).unwrap();
        assert_eq!(config.floor_policy, FloorPolicy::Restart { max_runs: Some(2) });
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let args = AuctionArgs {
            highest: Some(50),
            ..Default::default()
        };
        assert!(args.apply(AuctionConfig::default()).is_err());
    }
}
