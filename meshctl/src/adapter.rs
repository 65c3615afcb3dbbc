//! Translates collaborator events into registry mutations.
//!
//! The adapter runs as its own task fed by the node's broadcast event
//! channel, so a slow registry update never holds up event delivery inside
//! the network layer. Each event kind maps to exactly one registry update.
//! Connection events never trust their payload: the full connection list is
//! re-derived from the collaborator and replaced wholesale.

use std::sync::Arc;

use meshctl_net::{DialTarget, NetError, Network, NetworkEvent, PeerAddress, PeerId, PubsubMessage};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::registry::{ChatMessage, Registry};

/// Outcome of an opportunistic dial towards a discovered peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialOutcome {
    Dialed,
    AlreadyConnected,
    /// None of the advertised addresses uses a transport we listen on
    NoSharedTransport,
}

/// Dial `peer` if one of `addresses` uses a transport this node listens on
/// and it is not connected yet. Callers are free to ignore the result.
pub async fn best_effort_dial(
    network: &dyn Network,
    peer: &PeerId,
    addresses: &[PeerAddress],
) -> Result<DialOutcome, NetError> {
    if !network.connections(Some(peer)).is_empty() {
        return Ok(DialOutcome::AlreadyConnected);
    }
    let listening: Vec<String> = network
        .listen_addresses()
        .iter()
        .filter_map(|a| a.transport().map(str::to_string))
        .collect();
    let Some(address) = addresses
        .iter()
        .find(|a| a.transport().is_some_and(|t| listening.iter().any(|l| l == t)))
    else {
        return Ok(DialOutcome::NoSharedTransport);
    };
    network.dial(&DialTarget::Address(address.clone())).await?;
    Ok(DialOutcome::Dialed)
}

#[derive(Debug, Clone)]
pub struct Adapter {
    registry: Arc<Registry>,
    network: Arc<dyn Network>,
}

impl Adapter {
    pub fn new(registry: Arc<Registry>, network: Arc<dyn Network>) -> Self {
        Self { registry, network }
    }

    /// Run until `cancel` fires or the event channel closes
    pub fn spawn(
        self,
        events: broadcast::Receiver<NetworkEvent>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }

    async fn run(self, mut events: broadcast::Receiver<NetworkEvent>, cancel: CancellationToken) {
        tracing::debug!(peer = %self.network.peer_id(), "event adapter started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event adapter lagged, resynchronising connections");
                        self.sync_connections();
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!(peer = %self.network.peer_id(), "event adapter stopped");
    }

    pub fn handle_event(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::ConnectionOpened(_) | NetworkEvent::ConnectionClosed(_) => {
                self.sync_connections()
            }
            NetworkEvent::PeerDiscovered { peer, addresses } => self.on_discovered(peer, addresses),
            NetworkEvent::Message(message) => self.on_message(message),
        }
    }

    pub fn sync_connections(&self) {
        self.registry
            .replace_connections(self.network.connections(None));
    }

    fn on_discovered(&self, peer: PeerId, addresses: Vec<PeerAddress>) {
        tracing::debug!(%peer, addresses = addresses.len(), "peer discovered");
        self.registry.record_discovered(peer, addresses.clone());

        let network = self.network.clone();
        tokio::spawn(async move {
            match best_effort_dial(network.as_ref(), &peer, &addresses).await {
                Ok(outcome) => tracing::debug!(%peer, ?outcome, "discovery dial"),
                Err(e) => tracing::debug!(%peer, error = %e, "discovery dial failed"),
            }
        });
    }

    fn on_message(&self, message: PubsubMessage) {
        let size = message.data.len();
        let body = String::from_utf8_lossy(&message.data).into_owned();
        self.registry
            .append_topic_message(&message.topic, ChatMessage::new(body, message.source, false));
        self.registry.record_received(1, size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshctl_net::NodeOptions;
    use meshctl_net::memory::MemoryNetwork;

    fn message(topic: &str, source: PeerId, data: &'static [u8]) -> NetworkEvent {
        NetworkEvent::Message(PubsubMessage {
            topic: topic.to_string(),
            source,
            data: bytes::Bytes::from_static(data),
            sequence: 0,
        })
    }

    #[tokio::test]
    async fn messages_append_in_arrival_order() {
        let network = MemoryNetwork::new();
        let node: Arc<dyn Network> = Arc::new(network.node(NodeOptions::default()));
        let registry = Arc::new(Registry::default());
        let adapter = Adapter::new(registry.clone(), node);
        let source = meshctl_id52::SecretKey::generate().public_key();

        for i in 0..3u8 {
            let data: &'static [u8] = match i {
                0 => b"one",
                1 => b"two",
                _ => b"three",
            };
            adapter.handle_event(message("t", source, data));
        }
        adapter.handle_event(message("t", source, &[b'h', b'i', 0xff]));

        let history = registry.topic_history("t", 50);
        let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["one", "two", "three", "hi\u{fffd}"]);
        assert!(history.iter().all(|m| !m.delivered && m.origin == source));
        assert_eq!(registry.counters().messages_received, 4);
        assert_eq!(registry.counters().bytes_received, 14);
    }

    #[tokio::test]
    async fn connection_events_rederive_the_full_list() {
        let network = MemoryNetwork::new();
        let a = network.node(NodeOptions::default());
        let b = network.node(NodeOptions::default());
        a.start().await.unwrap();
        b.start().await.unwrap();
        let registry = Arc::new(Registry::default());
        let a: Arc<dyn Network> = Arc::new(a);
        let adapter = Adapter::new(registry.clone(), a.clone());
        let mut events = a.events();

        a.dial(&DialTarget::Peer(b.peer_id())).await.unwrap();
        let opened = events.recv().await.unwrap();
        adapter.handle_event(opened.clone());
        assert_eq!(registry.connections(), a.connections(None));

        // replay is idempotent
        adapter.handle_event(opened);
        assert_eq!(registry.connections().len(), 1);

        a.hang_up(&b.peer_id()).await.unwrap();
        adapter.handle_event(events.recv().await.unwrap());
        assert!(registry.connections().is_empty());
    }

    #[tokio::test]
    async fn discovery_is_cached_and_dialed() {
        let network = MemoryNetwork::new();
        let a = network.node(NodeOptions::default());
        let b = network.node(NodeOptions::default());
        a.start().await.unwrap();
        b.start().await.unwrap();
        let a: Arc<dyn Network> = Arc::new(a);
        let registry = Arc::new(Registry::default());
        let cancel = CancellationToken::new();
        Adapter::new(registry.clone(), a.clone()).spawn(a.events(), cancel.clone());

        assert!(network.announce(&a.peer_id(), b.peer_id(), vec![b.address().clone()]));
        for _ in 0..100 {
            if !registry.connections().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(registry.discovered()[0].peer_id, b.peer_id());
        assert_eq!(registry.connections()[0].peer, b.peer_id());
        cancel.cancel();
    }

    #[tokio::test]
    async fn best_effort_dial_skips_foreign_transports() {
        let network = MemoryNetwork::new();
        let a = network.node(NodeOptions::default());
        a.start().await.unwrap();
        let peer = meshctl_id52::SecretKey::generate().public_key();
        let tcp: PeerAddress = format!("/ip4/10.0.0.9/tcp/4001/p2p/{peer}").parse().unwrap();
        assert_eq!(
            best_effort_dial(&a, &peer, &[tcp]).await.unwrap(),
            DialOutcome::NoSharedTransport
        );
        // a memory address for an offline peer fails, and the caller may ignore it
        assert!(best_effort_dial(&a, &peer, &[PeerAddress::memory(&peer)]).await.is_err());
    }
}
