//! Messaging between coordinator and bidders

pub mod discovery;
pub mod message;
pub mod network_manager;
pub mod transport;

pub use discovery::{Discovery, StaticDirectory, BIDDER_SERVICE};
pub use message::{NetworkMessage, Registration};
pub use network_manager::{BidderNode, NetworkEvent, NetworkManager, TcpTransport};
pub use transport::{Inbound, LocalTransport, Transport};
