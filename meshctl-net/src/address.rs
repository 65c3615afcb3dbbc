//! Multiaddr-style peer addresses.
//!
//! Addresses are kept as their textual form (`/ip4/10.0.0.2/tcp/4001/p2p/<id52>`,
//! `/memory/<id52>`). The coordination layer only ever needs two things from
//! them: which transport they advertise and, optionally, which peer they
//! point at.

use crate::network::PeerId;

/// Transport components recognised in an address, most specific last
const TRANSPORTS: &[&str] = &[
    "tcp", "udp", "quic", "quic-v1", "ws", "wss", "webtransport", "webrtc", "memory",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn parse(s: &str) -> Result<Self, crate::NetError> {
        let invalid = |reason: &str| crate::NetError::InvalidAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };
        if !s.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }
        if s.len() == 1 || s.split('/').skip(1).any(str::is_empty) {
            return Err(invalid("empty component"));
        }
        Ok(Self(s.to_string()))
    }

    /// In-process address of a node on the memory backend
    pub fn memory(peer: &PeerId) -> Self {
        Self(format!("/memory/{}", peer.id52()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').skip(1)
    }

    /// The outermost transport this address advertises (`tcp`, `ws`, `memory`...)
    pub fn transport(&self) -> Option<&str> {
        self.components()
            .filter(|c| TRANSPORTS.contains(c))
            .last()
    }

    /// Peer id carried by a `/p2p/<id>` or `/memory/<id>` component
    pub fn peer_id(&self) -> Option<PeerId> {
        let mut components = self.components();
        while let Some(component) = components.next() {
            if component == "p2p" || component == "memory" {
                return components.next().and_then(|id| id.parse().ok());
            }
        }
        None
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PeerAddress {
    type Err = crate::NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for PeerAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PeerAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// What `dial` is pointed at: a known peer id or a concrete address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialTarget {
    Peer(PeerId),
    Address(PeerAddress),
}

impl DialTarget {
    /// Peer id of the target, if it can be known before dialing
    pub fn peer_id(&self) -> Option<PeerId> {
        match self {
            DialTarget::Peer(peer) => Some(*peer),
            DialTarget::Address(address) => address.peer_id(),
        }
    }
}

impl std::fmt::Display for DialTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialTarget::Peer(peer) => write!(f, "{peer}"),
            DialTarget::Address(address) => write!(f, "{address}"),
        }
    }
}

impl std::str::FromStr for DialTarget {
    type Err = crate::NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('/') {
            return Ok(DialTarget::Address(PeerAddress::parse(s)?));
        }
        s.parse()
            .map(DialTarget::Peer)
            .map_err(|e: meshctl_id52::ParseId52Error| crate::NetError::InvalidAddress {
                address: s.to_string(),
                reason: e.to_string(),
            })
    }
}
