//! Auction coordinator: drives dutch auction rounds over a transport

use crate::config::{AuctionConfig, FloorPolicy};
use crate::error::{AuctionError, Result};
use crate::p2p::{Inbound, NetworkMessage, Transport};
use crate::types::{unix_millis, AuctionId, BidderId, CoordinatorId, Round};
use std::collections::BTreeSet;
use tokio::time::Instant;

use super::pricing::PriceStrategy;
use super::session::{Award, Recorded, RoundSession};
use super::types::{AuctionOutcome, Decision, NegotiationState, Offer, RoundRecord};

/// Runs one auction against a fixed set of bidders
///
/// The coordinator is single-shot: once it reaches a terminal state a new
/// coordinator is needed for another auction.
pub struct AuctionCoordinator<T: Transport> {
    id: CoordinatorId,
    config: AuctionConfig,
    pricing: PriceStrategy,
    transport: T,
    state: NegotiationState,
    auction_id: AuctionId,
    history: Vec<RoundRecord>,
    runs: u32,
    rounds_elapsed: Round,
}

impl<T: Transport> AuctionCoordinator<T> {
    /// Create a coordinator; fails on an invalid config
    pub fn new(id: CoordinatorId, config: AuctionConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let pricing = PriceStrategy::new(&config);

        Ok(Self {
            id,
            config,
            pricing,
            transport,
            state: NegotiationState::Idle,
            auction_id: AuctionId::generate(),
            history: Vec::new(),
            runs: 0,
            rounds_elapsed: 0,
        })
    }

    pub fn id(&self) -> &CoordinatorId {
        &self.id
    }

    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Correlation id of the current run
    pub fn auction_id(&self) -> &AuctionId {
        &self.auction_id
    }

    /// Rounds of the current run
    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    /// Number of runs started (more than one only with `FloorPolicy::Restart`)
    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run the auction to completion
    ///
    /// Only an empty bidder set or a coordinator that already ran is an error;
    /// unreachable or misbehaving bidders are dropped from their round.
    pub async fn start(
        &mut self,
        bidders: impl IntoIterator<Item = BidderId>,
    ) -> Result<AuctionOutcome> {
        let bidders: BTreeSet<BidderId> = bidders.into_iter().collect();
        if bidders.is_empty() {
            return Err(AuctionError::NoParticipants);
        }
        if self.state != NegotiationState::Idle {
            return Err(AuctionError::InvalidStateTransition(format!(
                "auction already started ({:?})",
                self.state
            )));
        }

        tracing::info!(
            "{}: starting dutch auction with {} bidders ({} -> {}, decay {})",
            self.id,
            bidders.len(),
            self.config.highest_price,
            self.config.lowest_price,
            self.config.decay_factor
        );
        self.begin_run()?;

        loop {
            let round = self.pricing.round();
            let price = self.pricing.price();
            self.rounds_elapsed += 1;

            let session = self.run_round(&bidders).await;
            self.history.push(session.record_summary());

            if let Some(award) = session.award() {
                if let Some(winner) = self.settle(&session, award).await {
                    self.transition(NegotiationState::WinnerSelected {
                        bidder: winner.clone(),
                        price,
                        round,
                    })?;
                    tracing::info!(
                        "{}: {} wins at {} after {} rounds",
                        self.id,
                        winner,
                        price,
                        self.rounds_elapsed
                    );
                    return Ok(AuctionOutcome::Winner {
                        bidder: winner,
                        price,
                        rounds: self.rounds_elapsed,
                    });
                }
            }

            if self.pricing.is_floor() {
                if self.may_restart() {
                    tracing::info!(
                        "{}: floor price {} reached without proposals, restarting",
                        self.id,
                        price
                    );
                    self.begin_run()?;
                    continue;
                }

                self.transition(NegotiationState::NoWinnerFloor { round })?;
                tracing::info!(
                    "{}: auction ends without winner after {} rounds",
                    self.id,
                    self.rounds_elapsed
                );
                return Ok(AuctionOutcome::NoWinner {
                    rounds: self.rounds_elapsed,
                });
            }

            self.pricing.advance();
            self.transition(NegotiationState::RoundInProgress {
                round: self.pricing.round(),
                price: self.pricing.price(),
            })?;
        }
    }

    /// Open a fresh run at round 1 and the highest price
    fn begin_run(&mut self) -> Result<()> {
        self.pricing.reset();
        self.auction_id = AuctionId::generate();
        self.history.clear();
        self.runs += 1;

        tracing::debug!("{}: run {} as {}", self.id, self.runs, self.auction_id);
        self.transition(NegotiationState::RoundInProgress {
            round: self.pricing.round(),
            price: self.pricing.price(),
        })
    }

    fn may_restart(&self) -> bool {
        match self.config.floor_policy {
            FloorPolicy::Terminate => false,
            FloorPolicy::Restart { max_runs } => max_runs.map_or(true, |max| self.runs < max),
        }
    }

    fn transition(&mut self, next: NegotiationState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(AuctionError::InvalidStateTransition(format!(
                "{:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Broadcast the current offer and collect answers until all are in or the deadline passes
    async fn run_round(&mut self, bidders: &BTreeSet<BidderId>) -> RoundSession {
        let round = self.pricing.round();
        let price = self.pricing.price();
        let deadline = Instant::now() + self.config.reply_timeout;

        let offer = Offer {
            auction_id: self.auction_id.clone(),
            round,
            price,
            coordinator: self.id.clone(),
            deadline_ms: unix_millis() + self.config.reply_timeout.as_millis() as u64,
        };
        let mut session = RoundSession::new(self.auction_id.clone(), round, price);

        tracing::info!("{}: round {} at price {}", self.id, round, price);

        for bidder in bidders {
            let message = NetworkMessage::CallForProposal(offer.clone());
            match self.transport.send(bidder, message).await {
                Ok(()) => session.expect(bidder.clone()),
                Err(e) => tracing::warn!(
                    "{}: excluding {} from round {}: {}",
                    self.id,
                    bidder,
                    round,
                    e
                ),
            }
        }

        while !session.is_complete() {
            let Some(inbound) = self.transport.receive(deadline).await else {
                tracing::debug!(
                    "{}: round {} deadline passed, {} bidders silent",
                    self.id,
                    round,
                    session.outstanding()
                );
                break;
            };
            self.absorb(&mut session, inbound);
        }

        session
    }

    fn absorb(&self, session: &mut RoundSession, inbound: Inbound) {
        match inbound {
            Inbound::Message {
                from,
                message: NetworkMessage::Response(response),
            } => {
                let answered = response.round();
                match session.record(&from, response) {
                    Recorded::Accepted => {
                        tracing::debug!("{}: answer from {} for round {}", self.id, from, answered)
                    }
                    Recorded::Stale => tracing::debug!(
                        "{}: discarding stale answer from {} for round {}",
                        self.id,
                        from,
                        answered
                    ),
                    Recorded::Unexpected => {
                        tracing::warn!("{}: unexpected answer from {}", self.id, from)
                    }
                    Recorded::SenderMismatch => {
                        tracing::warn!("{}: answer from {} names another bidder", self.id, from)
                    }
                }
            }
            Inbound::Malformed { from, reason } => {
                tracing::warn!("{}: malformed reply from {}: {}", self.id, from, reason);
                session.record_malformed(&from);
            }
            Inbound::Message { from, message } => {
                tracing::debug!("{}: ignoring {} from {}", self.id, message.kind(), from);
            }
        }
    }

    /// Accept the first reachable proposer and reject the others
    async fn settle(&mut self, session: &RoundSession, award: Award) -> Option<BidderId> {
        let mut winner: Option<BidderId> = None;

        for bidder in std::iter::once(award.winner).chain(award.losers) {
            let decision = Decision {
                auction_id: self.auction_id.clone(),
                round: session.round(),
                bidder: bidder.clone(),
                price: session.price(),
            };

            if winner.is_none() {
                match self
                    .transport
                    .send(&bidder, NetworkMessage::AcceptProposal(decision))
                    .await
                {
                    Ok(()) => winner = Some(bidder),
                    Err(e) => tracing::warn!(
                        "{}: cannot accept {}, trying next proposer: {}",
                        self.id,
                        bidder,
                        e
                    ),
                }
            } else if let Err(e) = self
                .transport
                .send(&bidder, NetworkMessage::RejectProposal(decision))
                .await
            {
                tracing::warn!("{}: reject to {} not delivered: {}", self.id, bidder, e);
            }
        }

        if let Some(bidder) = &winner {
            self.await_inform(bidder, session.round()).await;
        }
        winner
    }

    /// Wait for the winner's acknowledgment; a missing one is only logged
    async fn await_inform(&mut self, winner: &BidderId, round: Round) -> bool {
        let deadline = Instant::now() + self.config.reply_timeout;

        while let Some(inbound) = self.transport.receive(deadline).await {
            match inbound {
                Inbound::Message {
                    from,
                    message: NetworkMessage::Inform(inform),
                } if &from == winner
                    && inform.round == round
                    && inform.auction_id == self.auction_id =>
                {
                    tracing::info!("{}: {} confirmed the purchase", self.id, from);
                    return true;
                }
                Inbound::Message { from, message } => {
                    tracing::debug!("{}: discarding {} from {}", self.id, message.kind(), from)
                }
                Inbound::Malformed { from, reason } => {
                    tracing::debug!(
                        "{}: discarding malformed reply from {}: {}",
                        self.id,
                        from,
                        reason
                    )
                }
            }
        }

        tracing::warn!("{}: no confirmation from {} before deadline", self.id, winner);
        false
    }
}
