//! dutchtrace CLI binary

use clap::Parser;
use dutchtrace::cli::{AuctionApp, Cli, Commands};
use dutchtrace::{AuctionConfig, AuctionOutcome, BidderConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let auction_defaults = AuctionConfig::from_env()?;
    let bidder_defaults = BidderConfig::from_env()?;

    match cli.command {
        Commands::Simulate {
            thresholds,
            bidders,
            auction,
            bidder,
        } => {
            let app = AuctionApp::new(
                auction.apply(auction_defaults)?,
                bidder.apply(bidder_defaults)?,
            )?;
            let report = app.simulate(&thresholds, bidders).await?;

            for round in &report.rounds {
                tracing::info!(
                    "round {:>2} @ {:>5}: {} proposed, {} refused, {} silent",
                    round.round,
                    round.price,
                    round.proposers.len(),
                    round.refusals,
                    round.silent
                );
            }
            for summary in &report.bidders {
                tracing::info!(
                    "{}: threshold {} -> {} over {} offers, {} win(s)",
                    summary.bidder,
                    summary.initial_threshold,
                    summary.final_threshold,
                    summary.offers_seen,
                    summary.wins
                );
            }
            report_outcome(&report.outcome);
        }

        Commands::Coordinator {
            port,
            min_bidders,
            wait_secs,
            auction,
        } => {
            tracing::info!("Starting coordinator on port {}", port);
            let app = AuctionApp::new(auction.apply(auction_defaults)?, bidder_defaults)?;
            let outcome = app
                .run_coordinator(port, min_bidders, wait_secs.map(Duration::from_secs))
                .await?;
            report_outcome(&outcome);
        }

        Commands::Bidder {
            connect,
            name,
            threshold,
            bidder,
        } => {
            tracing::info!("Connecting {} to {}", name, connect);
            let app = AuctionApp::new(auction_defaults, bidder.apply(bidder_defaults)?)?;
            let summary = app.run_bidder(&connect, &name, threshold).await?;
            tracing::info!(
                "{} done: {} offers seen, {} win(s), threshold now {}",
                summary.bidder,
                summary.offers_seen,
                summary.wins,
                summary.final_threshold
            );
        }

        Commands::Prices { auction } => {
            let app = AuctionApp::new(auction.apply(auction_defaults)?, bidder_defaults)?;
            for (i, price) in app.price_trajectory().iter().enumerate() {
                println!("round {:>2}: {}", i + 1, price);
            }
        }
    }

    Ok(())
}

fn report_outcome(outcome: &AuctionOutcome) {
    match outcome {
        AuctionOutcome::Winner {
            bidder,
            price,
            rounds,
        } => tracing::info!("Sold to {} at {} after {} rounds", bidder, price, rounds),
        AuctionOutcome::NoWinner { rounds } => {
            tracing::info!("No buyer after {} rounds", rounds)
        }
    }
}
