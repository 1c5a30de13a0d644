//! TCP demo: one coordinator, three bidders on localhost
//!
//! 1. Start the coordinator listener
//! 2. Connect three bidders with different thresholds
//! 3. Run the dutch auction until somebody buys
//!
//! Run with: cargo run --example tcp_auction

use dutchtrace::negotiation::{
    AuctionCoordinator, BidderResponder, BiddingStrategy, ThresholdStrategy,
};
use dutchtrace::p2p::{BidderNode, StaticDirectory, TcpTransport};
use dutchtrace::{AuctionConfig, AuctionOutcome, BidderId, CoordinatorId};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info,dutchtrace=debug")
        .init();

    let mut transport = TcpTransport::bind("127.0.0.1:0", StaticDirectory::new()).await?;
    let addr = transport
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    println!("Coordinator listening on {addr}");

    let mut nodes = Vec::new();
    let curators = [
        ("hm-curator", 300),
        ("galileo-curator", 150),
        ("louvre-curator", 50),
    ];
    for (name, threshold) in curators {
        let strategy = ThresholdStrategy::new(threshold, 100);
        let responder = BidderResponder::new(BidderId::new(name), strategy);
        let node = BidderNode::connect(&addr, responder).await?;
        println!("  {name} connected (threshold {threshold}, +100 per offer)");
        nodes.push(tokio::spawn(node.run()));
    }

    let bidders = transport
        .wait_for_bidders(3, Some(Duration::from_secs(5)))
        .await?;

    let config = AuctionConfig {
        reply_timeout: Duration::from_millis(1000),
        ..AuctionConfig::default()
    };
    let mut coordinator =
        AuctionCoordinator::new(CoordinatorId::new("artist-manager"), config, transport)?;

    match coordinator.start(bidders).await? {
        AuctionOutcome::Winner { bidder, price, rounds } => {
            println!("Sold to {bidder} at {price} after {rounds} rounds")
        }
        AuctionOutcome::NoWinner { rounds } => println!("No buyer after {rounds} rounds"),
    }

    for record in coordinator.history() {
        println!(
            "  round {:>2} @ {:>4}: proposers {:?}",
            record.round, record.price, record.proposers
        );
    }

    // Dropping the coordinator hangs up on every bidder
    drop(coordinator);
    for node in nodes {
        let responder = node.await??;
        println!(
            "  {}: {} offers seen, {} win(s)",
            responder.id(),
            responder.strategy().history().len(),
            responder.wins()
        );
    }
    Ok(())
}
