//! Read-only `meshctl://` views, computed from the registry on every read.

use meshctl_net::PeerId;
use serde_json::{Value, json};

use crate::commands::CommandSurface;
use crate::error::Error;

pub const SCHEME: &str = "meshctl://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    ActiveConnections,
    DiscoveredPeers,
    NetworkStats,
    NodeInfo,
    SharedFiles,
    TopicMessages(String),
    PeerMessages(PeerId),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub description: &'static str,
}

pub fn resources() -> Vec<ResourceDescriptor> {
    [
        ("meshctl://connections/active", "Current connections"),
        ("meshctl://peers/discovered", "Discovered-peer cache"),
        ("meshctl://stats/network", "Traffic counters and totals"),
        ("meshctl://node/info", "Node phase and identity"),
        ("meshctl://files/shared", "Shared file catalog"),
        ("meshctl://messages/topic/{topic}", "Message history of a topic"),
        ("meshctl://messages/peer/{peerId}", "Direct messages with a peer"),
    ]
    .into_iter()
    .map(|(uri, description)| ResourceDescriptor { uri, description })
    .collect()
}

impl Resource {
    pub fn parse(uri: &str) -> Result<Resource, Error> {
        let unknown = || Error::UnknownResource(uri.to_string());
        let path = uri.strip_prefix(SCHEME).ok_or_else(unknown)?;
        let resource = match path {
            "connections/active" => Resource::ActiveConnections,
            "peers/discovered" => Resource::DiscoveredPeers,
            "stats/network" => Resource::NetworkStats,
            "node/info" => Resource::NodeInfo,
            "files/shared" => Resource::SharedFiles,
            _ => {
                if let Some(topic) = path.strip_prefix("messages/topic/").filter(|t| !t.is_empty()) {
                    Resource::TopicMessages(topic.to_string())
                } else if let Some(peer) = path.strip_prefix("messages/peer/") {
                    Resource::PeerMessages(peer.parse().map_err(|_| unknown())?)
                } else {
                    return Err(unknown());
                }
            }
        };
        Ok(resource)
    }

    pub fn read(&self, surface: &CommandSurface) -> Result<Value, Error> {
        let registry = surface.registry();
        let limit = surface.config().history_limit;
        let value = match self {
            Resource::ActiveConnections => {
                let connections = registry.connections();
                json!({ "connections": connections, "count": connections.len() })
            }
            Resource::DiscoveredPeers => {
                let peers = registry.discovered();
                json!({ "peers": peers, "count": peers.len() })
            }
            Resource::NetworkStats => {
                let snapshot = registry.snapshot();
                let mut stats = json!(snapshot.counters);
                stats["uptimeMs"] = json!(snapshot.uptime_ms());
                stats["connections"] = json!(snapshot.connections.len());
                stats["topics"] = json!(snapshot.subscriptions.len());
                stats["sharedFiles"] = json!(snapshot.files.len());
                stats
            }
            Resource::NodeInfo => {
                let phase = registry.phase();
                match surface.lifecycle().current() {
                    Some(node) => {
                        let mut info = crate::commands::node_info(&node);
                        info["phase"] = json!(phase);
                        info["subscriptions"] = json!(registry.subscriptions());
                        info
                    }
                    None => json!({ "phase": phase, "peerId": null }),
                }
            }
            Resource::SharedFiles => {
                let files = registry.files();
                json!({ "files": files, "count": files.len() })
            }
            Resource::TopicMessages(topic) => {
                let messages = registry.topic_history(topic, limit);
                json!({ "topic": topic, "messages": messages, "count": messages.len() })
            }
            Resource::PeerMessages(peer) => {
                let messages = registry.peer_history(peer, limit);
                json!({ "peerId": peer, "messages": messages, "count": messages.len() })
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_fixed_and_templated_uris() {
        assert_eq!(
            Resource::parse("meshctl://stats/network").unwrap(),
            Resource::NetworkStats
        );
        assert_eq!(
            Resource::parse("meshctl://messages/topic/chat/general").unwrap(),
            Resource::TopicMessages("chat/general".into())
        );
        let peer = meshctl_id52::SecretKey::generate().public_key();
        assert_eq!(
            Resource::parse(&format!("meshctl://messages/peer/{peer}")).unwrap(),
            Resource::PeerMessages(peer)
        );
    }

    #[test]
    fn unknown_uris_are_rejected() {
        for uri in [
            "meshctl://nope",
            "http://stats/network",
            "meshctl://messages/topic/",
            "meshctl://messages/peer/not-an-id",
        ] {
            assert_eq!(Resource::parse(uri).unwrap_err().kind(), ErrorKind::UnknownResource);
        }
    }

    #[test]
    fn every_listed_fixed_uri_parses() {
        for descriptor in resources() {
            if !descriptor.uri.contains('{') {
                Resource::parse(descriptor.uri).unwrap();
            }
        }
    }
}
