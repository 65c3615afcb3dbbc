//! Events emitted by a [`crate::Network`].
//!
//! Consumers get a `tokio::sync::broadcast::Receiver<NetworkEvent>` from
//! [`crate::Network::events`]; dropping the receiver is the deregistration.

use crate::address::PeerAddress;
use crate::network::{ConnectionInfo, PeerId};

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A peer was found by the discovery mechanism (mDNS, bootstrap, ...)
    PeerDiscovered {
        peer: PeerId,
        addresses: Vec<PeerAddress>,
    },
    /// A connection finished opening
    ConnectionOpened(ConnectionInfo),
    /// A connection closed; the payload is the last known state
    ConnectionClosed(ConnectionInfo),
    /// A pubsub message arrived on a subscribed topic
    Message(PubsubMessage),
}

#[derive(Debug, Clone)]
pub struct PubsubMessage {
    pub topic: String,
    pub source: PeerId,
    pub data: bytes::Bytes,
    pub sequence: u64,
}
