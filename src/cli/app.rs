//! dutchtrace application wiring configs, transports and roles together

use crate::config::{AuctionConfig, BidderConfig};
use crate::error::{AuctionError, Result};
use crate::negotiation::{
    AuctionCoordinator, AuctionOutcome, BidderResponder, BiddingStrategy, RoundRecord,
    ThresholdStrategy,
};
use crate::p2p::{BidderNode, LocalTransport, StaticDirectory, TcpTransport};
use crate::types::{BidderId, CoordinatorId, Price};
use std::time::Duration;

/// End state of one bidder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidderSummary {
    pub bidder: BidderId,
    pub initial_threshold: Price,
    pub final_threshold: Price,
    pub offers_seen: usize,
    pub wins: u32,
    pub rejections: u32,
}

impl BidderSummary {
    fn from_responder(responder: &BidderResponder<ThresholdStrategy>) -> Self {
        let strategy = responder.strategy();
        Self {
            bidder: responder.id().clone(),
            initial_threshold: strategy.initial_threshold(),
            final_threshold: strategy.acceptable_price(),
            offers_seen: strategy.history().len(),
            wins: responder.wins(),
            rejections: responder.rejections(),
        }
    }
}

/// Everything an in-process auction produced
#[derive(Clone, Debug)]
pub struct SimulationReport {
    pub outcome: AuctionOutcome,
    /// Rounds of the final run
    pub rounds: Vec<RoundRecord>,
    pub bidders: Vec<BidderSummary>,
}

/// Main dutchtrace application
#[derive(Clone, Debug)]
pub struct AuctionApp {
    auction: AuctionConfig,
    bidder: BidderConfig,
}

impl AuctionApp {
    pub fn new(auction: AuctionConfig, bidder: BidderConfig) -> Result<Self> {
        auction.validate()?;
        bidder.validate()?;
        Ok(Self { auction, bidder })
    }

    pub fn auction_config(&self) -> &AuctionConfig {
        &self.auction
    }

    pub fn bidder_config(&self) -> &BidderConfig {
        &self.bidder
    }

    /// Prices of a full run
    pub fn price_trajectory(&self) -> Vec<Price> {
        crate::negotiation::PriceStrategy::new(&self.auction).trajectory()
    }

    /// Run an auction with in-process bidders. Explicit thresholds win over
    /// `random_bidders`, which draws that many thresholds from the config range.
    pub async fn simulate(
        &self,
        thresholds: &[Price],
        random_bidders: usize,
    ) -> Result<SimulationReport> {
        let mut rng = rand::thread_rng();
        let strategies: Vec<ThresholdStrategy> = if thresholds.is_empty() {
            (0..random_bidders)
                .map(|_| ThresholdStrategy::from_config(&self.bidder, &mut rng))
                .collect()
        } else {
            thresholds
                .iter()
                .map(|t| ThresholdStrategy::new(*t, self.bidder.increment))
                .collect()
        };

        let mut transport = LocalTransport::new();
        let handles: Vec<_> = strategies
            .into_iter()
            .enumerate()
            .map(|(i, strategy)| {
                let id = BidderId(format!("bidder-{}", i + 1));
                let responder = BidderResponder::new(id, strategy)
                    .with_reset_between_auctions(self.bidder.reset_between_auctions);
                transport.spawn_bidder(responder)
            })
            .collect();
        let bidders = transport.bidders();

        let mut coordinator = AuctionCoordinator::new(
            CoordinatorId::new("auctioneer"),
            self.auction.clone(),
            transport,
        )?;
        let outcome = coordinator.start(bidders).await?;
        let rounds = coordinator.history().to_vec();

        // Closing the transport lets every bidder task finish
        drop(coordinator);

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let responder = handle
                .await
                .map_err(|e| AuctionError::Internal(format!("bidder task failed: {e}")))?;
            summaries.push(BidderSummary::from_responder(&responder));
        }

        Ok(SimulationReport {
            outcome,
            rounds,
            bidders: summaries,
        })
    }

    /// Listen on `port`, wait for `min_bidders` registrations and run one auction
    pub async fn run_coordinator(
        &self,
        port: u16,
        min_bidders: usize,
        wait: Option<Duration>,
    ) -> Result<AuctionOutcome> {
        let mut transport =
            TcpTransport::bind(&format!("127.0.0.1:{port}"), StaticDirectory::new()).await?;
        tracing::info!("Waiting for {} bidder(s)", min_bidders);
        let bidders = transport.wait_for_bidders(min_bidders.max(1), wait).await?;

        let mut coordinator = AuctionCoordinator::new(
            CoordinatorId(format!("auctioneer-{port}")),
            self.auction.clone(),
            transport,
        )?;
        coordinator.start(bidders).await
    }

    /// Connect a bidder to `coordinator_addr` and serve until it disconnects
    pub async fn run_bidder(
        &self,
        coordinator_addr: &str,
        name: &str,
        threshold: Option<Price>,
    ) -> Result<BidderSummary> {
        let strategy = match threshold {
            Some(t) => ThresholdStrategy::new(t, self.bidder.increment),
            None => ThresholdStrategy::from_config(&self.bidder, &mut rand::thread_rng()),
        };
        tracing::info!(
            "{}: acceptable price starts at {}",
            name,
            strategy.acceptable_price()
        );

        let responder = BidderResponder::new(BidderId::new(name), strategy)
            .with_reset_between_auctions(self.bidder.reset_between_auctions);
        let node = BidderNode::connect(coordinator_addr, responder).await?;
        let responder = node.run().await?;

        Ok(BidderSummary::from_responder(&responder))
    }
}
