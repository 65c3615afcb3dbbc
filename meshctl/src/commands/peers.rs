use std::time::Duration;

use meshctl_net::{DialTarget, NetworkEvent, PeerId};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use super::CommandSurface;
use crate::error::Error;
use crate::registry::DiscoveredPeer;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DiscoverArgs {
    /// Milliseconds
    timeout: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConnectArgs {
    address: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PeerArgs {
    peer_id: PeerId,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PingArgs {
    peer_id: PeerId,
    timeout: Option<u64>,
}

impl CommandSurface {
    /// Collect discovery events until the deadline. The receiver is scoped to
    /// this call and dropped on every exit path.
    pub(super) async fn discover_peers(&self, args: DiscoverArgs) -> Result<Value, Error> {
        let node = self.node()?;
        let timeout = args
            .timeout
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.discovery_timeout());
        let deadline = Instant::now() + timeout;
        let mut events = node.network().events();
        let mut found: Vec<DiscoveredPeer> = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Err(_elapsed) => break,
                Ok(Ok(NetworkEvent::PeerDiscovered { peer, addresses })) => {
                    found.retain(|d| d.peer_id != peer);
                    found.push(DiscoveredPeer {
                        peer_id: peer,
                        addresses,
                        discovered_at: chrono::Utc::now(),
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!(skipped, "discovery listener lagged");
                }
                Ok(Err(RecvError::Closed)) => break,
            }
        }

        tracing::debug!(count = found.len(), ?timeout, "discovery finished");
        Ok(json!({ "discoveredPeers": found, "count": found.len() }))
    }

    pub(super) async fn connect_peer(&self, args: ConnectArgs) -> Result<Value, Error> {
        let node = self.node()?;
        let target: DialTarget = args
            .address
            .parse()
            .map_err(|e| Error::InvalidArguments(format!("address: {e}")))?;
        let connection = node
            .network()
            .dial(&target)
            .await
            .map_err(Error::transport("dial", &target))?;
        self.registry
            .replace_connections(node.network().connections(None));
        Ok(json!(connection))
    }

    pub(super) async fn disconnect_peer(&self, args: PeerArgs) -> Result<Value, Error> {
        let node = self.node()?;
        node.network()
            .hang_up(&args.peer_id)
            .await
            .map_err(Error::transport("hang up", args.peer_id))?;
        self.registry
            .replace_connections(node.network().connections(None));
        Ok(json!({ "disconnected": true, "peerId": args.peer_id }))
    }

    pub(super) fn list_connections(&self) -> Result<Value, Error> {
        self.node()?;
        let connections = self.registry.connections();
        Ok(json!({ "connections": connections, "count": connections.len() }))
    }

    pub(super) fn peer_info(&self, args: PeerArgs) -> Result<Value, Error> {
        let node = self.node()?;
        let connections: Vec<_> = self
            .registry
            .connections()
            .into_iter()
            .filter(|c| c.peer == args.peer_id)
            .collect();
        let record = node.network().peer_record(&args.peer_id);
        if record.is_none() && connections.is_empty() {
            return Err(Error::NotFound {
                what: "peer",
                id: args.peer_id.to_string(),
            });
        }
        Ok(json!({
            "peerId": args.peer_id,
            "addresses": record.as_ref().map(|r| r.addresses.clone()).unwrap_or_default(),
            "protocols": record.as_ref().map(|r| r.protocols.clone()).unwrap_or_default(),
            "connections": connections,
            "lastSeen": record.map(|r| r.last_seen),
        }))
    }

    /// A probe that outlives its timeout is reported, not raised
    pub(super) async fn ping_peer(&self, args: PingArgs) -> Result<Value, Error> {
        let node = self.node()?;
        let timeout = args
            .timeout
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.ping_timeout());
        let started = Instant::now();
        let probe = tokio::time::timeout(timeout, node.network().ping(&args.peer_id)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match probe {
            Ok(Ok(_)) => Ok(json!({
                "peerId": args.peer_id,
                "latencyMs": latency_ms,
                "timedOut": false,
            })),
            Ok(Err(e)) => Err(Error::transport("ping", args.peer_id)(e)),
            Err(_elapsed) => Ok(json!({
                "peerId": args.peer_id,
                "latencyMs": null,
                "timedOut": true,
            })),
        }
    }
}
