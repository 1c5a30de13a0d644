//! Auction and bidder configuration
//!
//! Defaults are overridden from `DUTCH_*` environment variables, and the CLI
//! overrides those in turn.

use crate::error::{AuctionError, Result};
use crate::types::Price;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;

/// What the coordinator does when the floor price passes without a proposal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloorPolicy {
    /// Conclude with `NoWinner`
    Terminate,
    /// Start over from the highest price in a fresh run.
    /// `max_runs: None` keeps restarting until somebody wins.
    Restart { max_runs: Option<u32> },
}

/// Coordinator-side settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// Opening price of every run
    pub highest_price: Price,
    /// Floor price
    pub lowest_price: Price,
    /// Multiplier applied to the price between rounds
    pub decay_factor: f64,
    /// How long bidders have to answer an offer
    pub reply_timeout: Duration,
    pub floor_policy: FloorPolicy,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            highest_price: 1000,
            lowest_price: 100,
            decay_factor: 0.75,
            reply_timeout: Duration::from_millis(3000),
            floor_policy: FloorPolicy::Terminate,
        }
    }
}

impl AuctionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults plus whatever `lookup` returns for each `DUTCH_*` key
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut c = Self::default();
        if let Some(v) = parse_var(&lookup, "DUTCH_HIGHEST_PRICE")? {
            c.highest_price = v;
        }
        if let Some(v) = parse_var(&lookup, "DUTCH_LOWEST_PRICE")? {
            c.lowest_price = v;
        }
        if let Some(v) = parse_var(&lookup, "DUTCH_DECAY_FACTOR")? {
            c.decay_factor = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "DUTCH_REPLY_TIMEOUT_MS")? {
            c.reply_timeout = Duration::from_millis(v);
        }

        let restart = parse_flag(&lookup, "DUTCH_RESTART_ON_FLOOR")?.unwrap_or(false);
        let max_runs = parse_var::<u32>(&lookup, "DUTCH_MAX_RUNS")?;
        match (restart, max_runs) {
            (true, max_runs) => c.floor_policy = FloorPolicy::Restart { max_runs },
            (false, Some(_)) => {
                return Err(AuctionError::InvalidConfig(
                    "DUTCH_MAX_RUNS is only valid with DUTCH_RESTART_ON_FLOOR set".to_string(),
                ));
            }
            (false, None) => {}
        }
        c.validate()?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lowest_price > self.highest_price {
            return Err(AuctionError::InvalidConfig(format!(
                "lowest price {} is above highest price {}",
                self.lowest_price, self.highest_price
            )));
        }
        if !(self.decay_factor > 0.0 && self.decay_factor < 1.0) {
            return Err(AuctionError::InvalidConfig(format!(
                "decay factor must be in (0, 1), got {}",
                self.decay_factor
            )));
        }
        if self.reply_timeout.is_zero() {
            return Err(AuctionError::InvalidConfig(
                "reply timeout must be positive".to_string(),
            ));
        }
        if let FloorPolicy::Restart { max_runs: Some(0) } = self.floor_policy {
            return Err(AuctionError::InvalidConfig(
                "max runs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bidder-side settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BidderConfig {
    /// Added to the acceptance threshold after every observed offer
    pub increment: Price,
    /// Range the initial threshold is drawn from when none is given
    pub threshold_range: Range<Price>,
    pub initial_threshold: Option<Price>,
    /// Restore the initial threshold when a new auction run starts
    pub reset_between_auctions: bool,
}

impl Default for BidderConfig {
    fn default() -> Self {
        Self {
            increment: 200,
            threshold_range: 0..1000,
            initial_threshold: None,
            reset_between_auctions: false,
        }
    }
}

impl BidderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut c = Self::default();
        if let Some(v) = parse_var(&lookup, "DUTCH_THRESHOLD_INCREMENT")? {
            c.increment = v;
        }
        if let Some(v) = parse_var(&lookup, "DUTCH_THRESHOLD_MIN")? {
            c.threshold_range.start = v;
        }
        if let Some(v) = parse_var(&lookup, "DUTCH_THRESHOLD_MAX")? {
            c.threshold_range.end = v;
        }
        if let Some(v) = parse_var(&lookup, "DUTCH_INITIAL_THRESHOLD")? {
            c.initial_threshold = Some(v);
        }
        if let Some(v) = parse_flag(&lookup, "DUTCH_RESET_BETWEEN_AUCTIONS")? {
            c.reset_between_auctions = v;
        }
        c.validate()?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_threshold.is_none() && self.threshold_range.is_empty() {
            return Err(AuctionError::InvalidConfig(format!(
                "threshold range {}..{} is empty",
                self.threshold_range.start, self.threshold_range.end
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AuctionError::Configuration(format!("{key}: cannot parse {raw:?}"))),
        None => Ok(None),
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(AuctionError::Configuration(format!(
            "{key}: expected a boolean, got {raw:?}"
        ))),
    }
}
