//! Wire messages exchanged between coordinator and bidders

use crate::error::{AuctionError, Result};
use crate::negotiation::{Decision, Inform, Offer, Response};
use crate::types::BidderId;
use serde::{Deserialize, Serialize};

/// Network message envelope
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum NetworkMessage {
    /// Bidder announces itself to a coordinator
    Register(Registration),
    /// Price offer for the current round
    CallForProposal(Offer),
    /// Bidder's propose/refuse answer
    Response(Response),
    /// Proposal won
    AcceptProposal(Decision),
    /// Proposal lost to an earlier one
    RejectProposal(Decision),
    /// Winner's acknowledgment
    Inform(Inform),
}

impl NetworkMessage {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            NetworkMessage::Register(_) => "register",
            NetworkMessage::CallForProposal(_) => "cfp",
            NetworkMessage::Response(_) => "response",
            NetworkMessage::AcceptProposal(_) => "accept-proposal",
            NetworkMessage::RejectProposal(_) => "reject-proposal",
            NetworkMessage::Inform(_) => "inform",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AuctionError::Serialization(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| AuctionError::Deserialization(e.to_string()))
    }
}

/// Directory entry a bidder sends when it connects
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub bidder: BidderId,
    pub service_type: String,
}
