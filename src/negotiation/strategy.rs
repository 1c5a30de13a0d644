//! Bidder-side acceptance strategies

use crate::config::BidderConfig;
use crate::types::Price;
use rand::Rng;

/// Decides whether a bidder takes an offered price
///
/// `accepts` is consulted first and `observe` is called afterwards for every
/// offer, whatever the decision was.
pub trait BiddingStrategy: Send {
    /// Highest price the bidder currently takes
    fn acceptable_price(&self) -> Price;

    /// Record an observed offer
    fn observe(&mut self, price: Price);

    /// Observed prices, oldest first
    fn history(&self) -> &[Price];

    /// Forget everything observed so far
    fn reset(&mut self);

    fn accepts(&self, price: Price) -> bool {
        price <= self.acceptable_price()
    }
}

/// Mutable part of a bidder
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BidderState {
    pub acceptance_threshold: Price,
    pub offer_history: Vec<Price>,
}

/// Threshold that rises by a flat increment after every offer.
/// Non-decreasing: after N offers it equals `initial + N * increment`.
#[derive(Clone, Debug)]
pub struct ThresholdStrategy {
    initial_threshold: Price,
    increment: Price,
    state: BidderState,
}

impl ThresholdStrategy {
    pub fn new(initial_threshold: Price, increment: Price) -> Self {
        Self {
            initial_threshold,
            increment,
            state: BidderState {
                acceptance_threshold: initial_threshold,
                offer_history: Vec::new(),
            },
        }
    }

    /// Build from config, drawing the initial threshold once if none is set
    pub fn from_config<R: Rng>(config: &BidderConfig, rng: &mut R) -> Self {
        let initial = match config.initial_threshold {
            Some(threshold) => threshold,
            None => rng.gen_range(config.threshold_range.clone()),
        };
        Self::new(initial, config.increment)
    }

    pub fn initial_threshold(&self) -> Price {
        self.initial_threshold
    }

    pub fn increment(&self) -> Price {
        self.increment
    }

    pub fn state(&self) -> &BidderState {
        &self.state
    }
}

impl BiddingStrategy for ThresholdStrategy {
    fn acceptable_price(&self) -> Price {
        self.state.acceptance_threshold
    }

    fn observe(&mut self, price: Price) {
        self.state.offer_history.push(price);
        self.state.acceptance_threshold = self
            .state
            .acceptance_threshold
            .saturating_add(self.increment);
    }

    fn history(&self) -> &[Price] {
        &self.state.offer_history
    }

    fn reset(&mut self) {
        self.state = BidderState {
            acceptance_threshold: self.initial_threshold,
            offer_history: Vec::new(),
        };
    }
}
