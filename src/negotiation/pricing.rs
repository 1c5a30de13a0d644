//! Auctioneer price strategy: the descending price ladder of a dutch auction

use crate::config::AuctionConfig;
use crate::types::{Price, Round};

/// Produces the decreasing price of each round
///
/// Owned by the coordinator and only mutated between rounds. The current
/// price always stays within `[lowest_price, highest_price]`.
#[derive(Clone, Debug)]
pub struct PriceStrategy {
    highest_price: Price,
    lowest_price: Price,
    decay_factor: f64,
    current_price: Price,
    round: Round,
}

impl PriceStrategy {
    /// Create a strategy positioned at round 1, highest price.
    /// Expects a validated config (`lowest <= highest`, decay in (0, 1)).
    pub fn new(config: &AuctionConfig) -> Self {
        Self {
            highest_price: config.highest_price,
            lowest_price: config.lowest_price,
            decay_factor: config.decay_factor,
            current_price: config.highest_price,
            round: 1,
        }
    }

    /// Current price
    pub fn price(&self) -> Price {
        self.current_price
    }

    /// Current round number
    pub fn round(&self) -> Round {
        self.round
    }

    pub fn highest_price(&self) -> Price {
        self.highest_price
    }

    pub fn lowest_price(&self) -> Price {
        self.lowest_price
    }

    /// Whether the current price is the floor (final round)
    pub fn is_floor(&self) -> bool {
        self.current_price == self.lowest_price
    }

    /// Move to the next round's price
    pub fn advance(&mut self) {
        self.current_price = self.next_price();
        self.round += 1;
    }

    /// Back to round 1 at the highest price
    pub fn reset(&mut self) {
        self.current_price = self.highest_price;
        self.round = 1;
    }

    /// Every price of a full run, highest first, floor last
    pub fn trajectory(&self) -> Vec<Price> {
        let mut ladder = self.clone();
        ladder.reset();

        let mut prices = vec![ladder.price()];
        while !ladder.is_floor() {
            ladder.advance();
            prices.push(ladder.price());
        }
        prices
    }

    fn next_price(&self) -> Price {
        if self.is_floor() {
            return self.lowest_price;
        }

        // f64::round is half-away-from-zero, i.e. half-up for positive prices
        let mut next = (self.current_price as f64 * self.decay_factor).round() as Price;

        // Rounding can stall small prices (e.g. 2 * 0.75 -> 2)
        if next >= self.current_price {
            next = self.current_price - 1;
        }

        next.max(self.lowest_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strategy(highest: Price, lowest: Price, decay: f64) -> PriceStrategy {
        PriceStrategy::new(&AuctionConfig {
            highest_price: highest,
            lowest_price: lowest,
            decay_factor: decay,
            ..Default::default()
        })
    }

    #[test]
    fn test_starts_at_highest() {
        let s = strategy(1000, 100, 0.75);
        assert_eq!(s.price(), 1000);
        assert_eq!(s.round(), 1);
        assert!(!s.is_floor());
    }

    #[test]
    fn test_round_half_up_trajectory() {
        let s = strategy(1000, 100, 0.75);
        assert_eq!(
            s.trajectory(),
            vec![1000, 750, 563, 422, 317, 238, 179, 134, 101, 100]
        );
    }

    #[test]
    fn test_half_decay_trajectory() {
        let s = strategy(1000, 100, 0.5);
        assert_eq!(s.trajectory(), vec![1000, 500, 250, 125, 100]);
    }

    #[test]
    fn test_advance_clamps_to_floor() {
        let mut s = strategy(1000, 100, 0.75);
        for _ in 0..9 {
            s.advance();
        }
        assert_eq!(s.price(), 100);
        assert!(s.is_floor());
        assert_eq!(s.round(), 10);

        // Advancing at the floor stays there
        s.advance();
        assert_eq!(s.price(), 100);
    }

    #[test]
    fn test_reset() {
        let mut s = strategy(1000, 100, 0.75);
        s.advance();
        s.advance();
        assert_eq!(s.price(), 563);

        s.reset();
        assert_eq!(s.price(), 1000);
        assert_eq!(s.round(), 1);
    }

    #[test]
    fn test_small_prices_still_descend() {
        let s = strategy(3, 0, 0.75);
        // 3 * 0.75 = 2.25 -> 2, 2 * 0.75 = 1.5 -> 2 stalls, forced to 1
        assert_eq!(s.trajectory(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_highest_equals_lowest() {
        let s = strategy(100, 100, 0.75);
        assert!(s.is_floor());
        assert_eq!(s.trajectory(), vec![100]);
    }

    proptest! {
        #[test]
        fn trajectory_descends_to_floor(
            lowest in 0u64..10_000,
            spread in 1u64..100_000,
            decay in 0.01f64..0.99,
        ) {
            let highest = lowest + spread;
            let prices = strategy(highest, lowest, decay).trajectory();

            prop_assert_eq!(prices[0], highest);
            prop_assert_eq!(*prices.last().unwrap(), lowest);
            prop_assert!(prices.len() as u64 <= spread + 1);
            for pair in prices.windows(2) {
                prop_assert!(pair[1] < pair[0]);
                prop_assert!(pair[1] >= lowest);
            }
        }

        #[test]
        fn trajectory_is_deterministic(highest in 100u64..5_000, decay in 0.05f64..0.95) {
            let a = strategy(highest, 100, decay).trajectory();
            let b = strategy(highest, 100, decay).trajectory();
            prop_assert_eq!(a, b);
        }
    }
}
