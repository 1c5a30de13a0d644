//! Response collection for a single auction round

use crate::types::{AuctionId, BidderId, Price, Round};
use std::collections::HashSet;

use super::types::{Response, RoundRecord};

/// Result of recording one incoming response
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recorded {
    /// Counted for this round
    Accepted,
    /// Belongs to another round or auction run
    Stale,
    /// Sender is not expected (anymore) in this round
    Unexpected,
    /// Body names a different bidder than the sender
    SenderMismatch,
}

/// Winner of a round plus the proposers to turn down
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Award {
    pub winner: BidderId,
    pub losers: Vec<BidderId>,
}

/// Responses of one round, kept in arrival order
#[derive(Clone, Debug)]
pub struct RoundSession {
    auction_id: AuctionId,
    round: Round,
    price: Price,
    /// Bidders that were sent the offer and have not answered yet
    pending: HashSet<BidderId>,
    /// Answers in arrival order; `None` marks an unreadable reply
    answers: Vec<(BidderId, Option<Response>)>,
}

impl RoundSession {
    pub fn new(auction_id: AuctionId, round: Round, price: Price) -> Self {
        Self {
            auction_id,
            round,
            price,
            pending: HashSet::new(),
            answers: Vec::new(),
        }
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn price(&self) -> Price {
        self.price
    }

    /// Mark a bidder as having been sent the offer
    pub fn expect(&mut self, bidder: BidderId) {
        self.pending.insert(bidder);
    }

    /// Number of bidders still to answer
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Whether every bidder that was sent the offer has answered
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record a response from `from`
    pub fn record(&mut self, from: &BidderId, response: Response) -> Recorded {
        if response.auction_id() != &self.auction_id || response.round() != self.round {
            return Recorded::Stale;
        }
        if response.bidder() != from {
            return Recorded::SenderMismatch;
        }
        if !self.pending.remove(from) {
            return Recorded::Unexpected;
        }

        self.answers.push((from.clone(), Some(response)));
        Recorded::Accepted
    }

    /// Record a reply from `from` that could not be decoded; counts as a refusal
    pub fn record_malformed(&mut self, from: &BidderId) -> Recorded {
        if !self.pending.remove(from) {
            return Recorded::Unexpected;
        }
        self.answers.push((from.clone(), None));
        Recorded::Accepted
    }

    /// Proposers in arrival order
    pub fn proposers(&self) -> Vec<BidderId> {
        self.answers
            .iter()
            .filter(|(_, answer)| answer.as_ref().is_some_and(Response::is_propose))
            .map(|(bidder, _)| bidder.clone())
            .collect()
    }

    /// First proposer wins, every later proposer loses
    pub fn award(&self) -> Option<Award> {
        let mut proposers = self.proposers().into_iter();
        let winner = proposers.next()?;
        Some(Award {
            winner,
            losers: proposers.collect(),
        })
    }

    /// Summary for the coordinator's round history
    pub fn record_summary(&self) -> RoundRecord {
        let proposers = self.proposers();
        RoundRecord {
            round: self.round,
            price: self.price,
            refusals: self.answers.len() - proposers.len(),
            silent: self.pending.len(),
            proposers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auction() -> AuctionId {
        AuctionId("auction_test".to_string())
    }

    fn propose(name: &str, round: Round) -> Response {
        Response::Propose {
            bidder: BidderId::new(name),
            auction_id: auction(),
            round,
        }
    }

    fn refuse(name: &str, round: Round) -> Response {
        Response::Refuse {
            bidder: BidderId::new(name),
            auction_id: auction(),
            round,
        }
    }

    fn session(bidders: &[&str]) -> RoundSession {
        let mut s = RoundSession::new(auction(), 2, 750);
        for b in bidders {
            s.expect(BidderId::new(*b));
        }
        s
    }

    #[test]
    fn test_first_proposer_wins() {
        let mut s = session(&["a", "b", "c"]);
        assert_eq!(s.record(&BidderId::new("c"), propose("c", 2)), Recorded::Accepted);
        assert_eq!(s.record(&BidderId::new("a"), refuse("a", 2)), Recorded::Accepted);
        assert_eq!(s.record(&BidderId::new("b"), propose("b", 2)), Recorded::Accepted);

        let award = s.award().unwrap();
        assert_eq!(award.winner, BidderId::new("c"));
        assert_eq!(award.losers, vec![BidderId::new("b")]);
        assert!(s.is_complete());
    }

    #[test]
    fn test_tie_break_follows_arrival_not_id() {
        for _ in 0..10 {
            let mut s = session(&["alpha", "zulu"]);
            s.record(&BidderId::new("zulu"), propose("zulu", 2));
            s.record(&BidderId::new("alpha"), propose("alpha", 2));
            assert_eq!(s.award().unwrap().winner, BidderId::new("zulu"));
        }
    }

    #[test]
    fn test_no_proposals_no_award() {
        let mut s = session(&["a", "b"]);
        s.record(&BidderId::new("a"), refuse("a", 2));
        assert!(s.award().is_none());
        assert!(!s.is_complete());
        assert_eq!(s.outstanding(), 1);
    }

    #[test]
    fn test_stale_round_discarded() {
        let mut s = session(&["a"]);
        assert_eq!(s.record(&BidderId::new("a"), propose("a", 1)), Recorded::Stale);

        let other_run = Response::Propose {
            bidder: BidderId::new("a"),
            auction_id: AuctionId("auction_other".to_string()),
            round: 2,
        };
        assert_eq!(s.record(&BidderId::new("a"), other_run), Recorded::Stale);
        assert!(s.award().is_none());
        assert_eq!(s.outstanding(), 1);
    }

    #[test]
    fn test_duplicates_and_strangers_ignored() {
        let mut s = session(&["a"]);
        assert_eq!(s.record(&BidderId::new("a"), refuse("a", 2)), Recorded::Accepted);
        assert_eq!(s.record(&BidderId::new("a"), propose("a", 2)), Recorded::Unexpected);
        assert_eq!(s.record(&BidderId::new("x"), propose("x", 2)), Recorded::Unexpected);
        assert!(s.award().is_none());
    }

    #[test]
    fn test_sender_must_match_body() {
        let mut s = session(&["a", "b"]);
        assert_eq!(
            s.record(&BidderId::new("a"), propose("b", 2)),
            Recorded::SenderMismatch
        );
        assert_eq!(s.outstanding(), 2);
    }

    #[test]
    fn test_malformed_counts_as_refusal() {
        let mut s = session(&["a", "b"]);
        assert_eq!(s.record_malformed(&BidderId::new("a")), Recorded::Accepted);
        s.record(&BidderId::new("b"), propose("b", 2));

        assert_eq!(s.award().unwrap().winner, BidderId::new("b"));
        let summary = s.record_summary();
        assert_eq!(summary.refusals, 1);
        assert_eq!(summary.silent, 0);
    }

    #[test]
    fn test_summary_counts_silent_bidders() {
        let mut s = session(&["a", "b", "c"]);
        s.record(&BidderId::new("b"), propose("b", 2));

        let summary = s.record_summary();
        assert_eq!(summary.round, 2);
        assert_eq!(summary.price, 750);
        assert_eq!(summary.proposers, vec![BidderId::new("b")]);
        assert_eq!(summary.refusals, 0);
        assert_eq!(summary.silent, 2);
    }
}
