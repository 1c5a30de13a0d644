//! Core types used throughout dutchtrace

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Prices are whole currency units
pub type Price = u64;

/// Round numbers start at 1 for every auction run
pub type Round = u32;

/// Milliseconds since the unix epoch (0 if the clock is before the epoch)
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Unique identifier for one auction run (timestamp plus random suffix)
///
/// Every message of a run carries it, so replies can be correlated with the
/// run that asked for them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuctionId(pub String);

impl AuctionId {
    /// Generate a new auction ID
    pub fn generate() -> Self {
        Self(format!("auction_{}_{:08x}", unix_millis(), rand::random::<u32>()))
    }
}

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bidder identifier (its registered name)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BidderId(pub String);

impl BidderId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for BidderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coordinator identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordinatorId(pub String);

impl CoordinatorId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for CoordinatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection-level peer identifier (derived from the socket address)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn from_addr(addr: &std::net::SocketAddr) -> Self {
        Self(format!("peer_{}", addr))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auction_id_creation() {
        let id1 = AuctionId::generate();
        let id2 = AuctionId::generate();

        assert!(id1.0.starts_with("auction_"));
        // Random suffix keeps ids apart even within the same millisecond
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_display() {
        assert_eq!(BidderId::new("alice").to_string(), "alice");
        assert_eq!(CoordinatorId::new("manager").to_string(), "manager");
    }

    #[test]
    fn test_peer_id_from_addr() {
        let addr: std::net::SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(PeerId::from_addr(&addr).0, "peer_127.0.0.1:9000");
    }

    #[test]
    fn test_serialization() {
        let bidder = BidderId::new("bob");
        let serialized = serde_json::to_string(&bidder).unwrap();
        assert_eq!(serialized, "\"bob\"");
        let deserialized: BidderId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(bidder, deserialized);
    }

    #[test]
    fn test_unix_millis_advances() {
        let a = unix_millis();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(unix_millis() > a);
    }
}
