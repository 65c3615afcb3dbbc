//! Stream protocol identifiers.
//!
//! A node keeps a single connection per remote peer and multiplexes
//! protocols over bidirectional streams opened on that connection:
//!
//! ```text
//! Connection between two nodes
//!     ├── Stream 1: /ipfs/ping/1.0.0
//!     ├── Stream 2: /meshctl/file-exchange/1.0.0
//!     ├── Stream 3: /meshctl/direct-message/1.0.0
//!     └── Stream N: ...
//! ```
//!
//! Each stream is bound to exactly one [`Protocol`] when it is opened with
//! [`crate::Network::dial_protocol`]. The remote side only accepts streams
//! for protocols it registered with [`crate::Network::handle`].

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Liveness probe
    Ping,
    /// Peer identification exchange
    Identify,
    /// Publish-subscribe mesh
    PubSub,
    /// Fetch a shared file by identifier
    FileExchange,
    /// One-shot chat message to a single peer
    DirectMessage,
    /// Any other protocol, by its full identifier
    Application(String),
}

impl Protocol {
    pub const PING_ID: &'static str = "/ipfs/ping/1.0.0";
    pub const IDENTIFY_ID: &'static str = "/ipfs/id/1.0.0";
    pub const PUBSUB_ID: &'static str = "/meshsub/1.1.0";
    pub const FILE_EXCHANGE_ID: &'static str = "/meshctl/file-exchange/1.0.0";
    pub const DIRECT_MESSAGE_ID: &'static str = "/meshctl/direct-message/1.0.0";

    /// Full wire identifier, e.g. `/meshctl/file-exchange/1.0.0`
    pub fn id(&self) -> &str {
        match self {
            Protocol::Ping => Self::PING_ID,
            Protocol::Identify => Self::IDENTIFY_ID,
            Protocol::PubSub => Self::PUBSUB_ID,
            Protocol::FileExchange => Self::FILE_EXCHANGE_ID,
            Protocol::DirectMessage => Self::DIRECT_MESSAGE_ID,
            Protocol::Application(id) => id,
        }
    }

    /// Map a wire identifier back to a protocol; unknown ids become `Application`
    pub fn from_id(id: &str) -> Self {
        match id {
            Self::PING_ID => Protocol::Ping,
            Self::IDENTIFY_ID => Protocol::Identify,
            Self::PUBSUB_ID => Protocol::PubSub,
            Self::FILE_EXCHANGE_ID => Protocol::FileExchange,
            Self::DIRECT_MESSAGE_ID => Protocol::DirectMessage,
            other => Protocol::Application(other.to_string()),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_map_back() {
        for protocol in [
            Protocol::Ping,
            Protocol::Identify,
            Protocol::PubSub,
            Protocol::FileExchange,
            Protocol::DirectMessage,
        ] {
            assert_eq!(Protocol::from_id(protocol.id()), protocol);
        }
    }

    #[test]
    fn unknown_id_is_application() {
        let protocol = Protocol::from_id("/chat/2.0.0");
        assert_eq!(protocol, Protocol::Application("/chat/2.0.0".to_string()));
        assert_eq!(protocol.to_string(), "/chat/2.0.0");
    }
}
