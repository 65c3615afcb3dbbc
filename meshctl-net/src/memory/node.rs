use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

use super::{MemoryNetwork, MemoryStream, send_event};
use crate::address::{DialTarget, PeerAddress};
use crate::error::NetError;
use crate::event::{NetworkEvent, PubsubMessage};
use crate::network::{
    BoxStream, ConnectionInfo, ConnectionStatus, Direction, Network, NodeOptions, PeerId,
    PeerRecord, StreamHandler,
};
use crate::protocol::Protocol;

const EVENT_CAPACITY: usize = 256;

/// Protocols every memory node speaks without a registered handler
const BUILTIN: [Protocol; 3] = [Protocol::Ping, Protocol::Identify, Protocol::PubSub];

/// Node state visible to the hub and to other nodes.
///
/// Locks are never nested: a node's `state` is always released before the
/// hub or another node is locked.
pub(crate) struct NodeShared {
    pub(crate) peer: PeerId,
    address: PeerAddress,
    discoverable: bool,
    events: broadcast::Sender<NetworkEvent>,
    state: Mutex<NodeState>,
}

#[derive(Default)]
struct NodeState {
    running: bool,
    connections: BTreeMap<String, ConnectionInfo>,
    handlers: HashMap<Protocol, StreamHandler>,
    topics: BTreeSet<String>,
    peers: HashMap<PeerId, PeerRecord>,
    sequence: u64,
}

impl std::fmt::Debug for NodeShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeShared")
            .field("peer", &self.peer)
            .field("address", &self.address)
            .field("discoverable", &self.discoverable)
            .finish_non_exhaustive()
    }
}

impl NodeShared {
    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: NetworkEvent) {
        send_event(&self.events, event);
    }

    fn protocol_ids(&self) -> Vec<String> {
        let state = self.lock();
        protocol_ids(&state)
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        self.lock().topics.contains(topic)
    }

    fn is_connected_to(&self, peer: &PeerId) -> bool {
        self.lock().connections.values().any(|c| c.peer == *peer)
    }

    fn remember(&self, peer: PeerId, addresses: Vec<PeerAddress>, protocols: Option<Vec<String>>) {
        let mut state = self.lock();
        let now = chrono::Utc::now();
        let record = state.peers.entry(peer).or_insert_with(|| PeerRecord {
            peer,
            addresses: Vec::new(),
            protocols: Vec::new(),
            last_seen: now,
        });
        for address in addresses {
            if !record.addresses.contains(&address) {
                record.addresses.push(address);
            }
        }
        if let Some(protocols) = protocols {
            record.protocols = protocols;
        }
        record.last_seen = now;
    }

    pub(crate) fn discovered(&self, peer: PeerId, addresses: Vec<PeerAddress>) {
        self.remember(peer, addresses.clone(), None);
        self.emit(NetworkEvent::PeerDiscovered { peer, addresses });
    }

    fn add_connection(&self, info: ConnectionInfo) {
        self.lock().connections.insert(info.id.clone(), info.clone());
        self.emit(NetworkEvent::ConnectionOpened(info));
    }

    /// Drop every connection to `peer`, emitting one close event per connection
    fn remove_connections_to(&self, peer: &PeerId) {
        let closed: Vec<ConnectionInfo> = {
            let mut state = self.lock();
            let ids: Vec<String> = state
                .connections
                .values()
                .filter(|c| c.peer == *peer)
                .map(|c| c.id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| state.connections.remove(id))
                .collect()
        };
        for mut info in closed {
            info.status = ConnectionStatus::Closed;
            self.emit(NetworkEvent::ConnectionClosed(info));
        }
    }
}

fn protocol_ids(state: &NodeState) -> Vec<String> {
    let mut ids: Vec<String> = BUILTIN
        .iter()
        .chain(state.handlers.keys())
        .map(|p| p.id().to_string())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// A node on a [`MemoryNetwork`]
#[derive(Debug, Clone)]
pub struct MemoryNode {
    network: MemoryNetwork,
    shared: Arc<NodeShared>,
}

impl MemoryNode {
    pub(crate) fn new(network: MemoryNetwork, options: NodeOptions) -> Self {
        let key = options
            .secret_key
            .unwrap_or_else(meshctl_id52::SecretKey::generate);
        let peer = key.public_key();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            network,
            shared: Arc::new(NodeShared {
                peer,
                address: PeerAddress::memory(&peer),
                discoverable: options.discoverable,
                events,
                state: Mutex::new(NodeState::default()),
            }),
        }
    }

    pub fn address(&self) -> &PeerAddress {
        &self.shared.address
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    fn ensure_running(&self) -> Result<(), NetError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(NetError::NotRunning)
        }
    }

    fn remote(&self, peer: &PeerId) -> Result<Arc<NodeShared>, NetError> {
        self.network
            .lookup(peer)
            .ok_or_else(|| NetError::Unreachable(peer.to_string()))
    }

    fn existing_connection(&self, peer: &PeerId) -> Option<ConnectionInfo> {
        self.shared
            .lock()
            .connections
            .values()
            .find(|c| c.peer == *peer)
            .cloned()
    }

    fn resolve(&self, target: &DialTarget) -> Result<PeerId, NetError> {
        if let DialTarget::Address(address) = target {
            match address.transport() {
                Some("memory") => {}
                Some(other) => {
                    return Err(NetError::Unreachable(format!(
                        "{address} (no {other} listener on the memory backend)"
                    )));
                }
                None => {
                    return Err(NetError::InvalidAddress {
                        address: address.to_string(),
                        reason: "no transport component".to_string(),
                    });
                }
            }
        }
        target.peer_id().ok_or_else(|| NetError::InvalidAddress {
            address: target.to_string(),
            reason: "address does not name a peer".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Network for MemoryNode {
    fn peer_id(&self) -> PeerId {
        self.shared.peer
    }

    fn listen_addresses(&self) -> Vec<PeerAddress> {
        if self.is_running() {
            vec![self.shared.address.clone()]
        } else {
            Vec::new()
        }
    }

    fn protocols(&self) -> Vec<Protocol> {
        self.shared
            .protocol_ids()
            .iter()
            .map(|id| Protocol::from_id(id))
            .collect()
    }

    fn events(&self) -> broadcast::Receiver<NetworkEvent> {
        self.shared.events.subscribe()
    }

    #[tracing::instrument(skip(self), fields(peer = %self.shared.peer))]
    async fn start(&self) -> Result<(), NetError> {
        if self.network.take_start_failure() {
            return Err(NetError::Backend("injected start failure".to_string()));
        }
        if self.is_running() {
            return Ok(());
        }
        let others = self.network.join(self.shared.clone())?;
        self.shared.lock().running = true;
        tracing::debug!(online = others.len(), "memory node online");

        if self.shared.discoverable {
            for other in others.iter().filter(|o| o.discoverable) {
                other.discovered(self.shared.peer, vec![self.shared.address.clone()]);
                self.shared
                    .discovered(other.peer, vec![other.address.clone()]);
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(peer = %self.shared.peer))]
    async fn stop(&self) -> Result<(), NetError> {
        if self.network.take_stop_failure() {
            return Err(NetError::Backend("injected stop failure".to_string()));
        }
        self.network.leave(&self.shared.peer);
        let peers: BTreeSet<PeerId> = {
            let mut state = self.shared.lock();
            state.running = false;
            state.topics.clear();
            state.connections.values().map(|c| c.peer).collect()
        };
        for peer in peers {
            if let Some(remote) = self.network.lookup(&peer) {
                remote.remove_connections_to(&self.shared.peer);
            }
            self.shared.remove_connections_to(&peer);
        }
        Ok(())
    }

    async fn dial(&self, target: &DialTarget) -> Result<ConnectionInfo, NetError> {
        self.ensure_running()?;
        let peer = self.resolve(target)?;
        if peer == self.shared.peer {
            return Err(NetError::InvalidAddress {
                address: target.to_string(),
                reason: "cannot dial self".to_string(),
            });
        }
        if let Some(existing) = self.existing_connection(&peer) {
            return Ok(existing);
        }
        let remote = self.remote(&peer)?;

        let id = self.network.next_connection_id();
        let opened_at = chrono::Utc::now();
        let remote_protocols = remote.protocol_ids();
        let local_protocols = self.shared.protocol_ids();
        let outbound = ConnectionInfo {
            id: id.clone(),
            peer,
            remote_address: remote.address.clone(),
            protocols: remote_protocols.clone(),
            direction: Direction::Outbound,
            status: ConnectionStatus::Open,
            opened_at,
        };
        let inbound = ConnectionInfo {
            id,
            peer: self.shared.peer,
            remote_address: self.shared.address.clone(),
            protocols: local_protocols.clone(),
            direction: Direction::Inbound,
            status: ConnectionStatus::Open,
            opened_at,
        };

        self.shared
            .remember(peer, vec![remote.address.clone()], Some(remote_protocols));
        remote.remember(
            self.shared.peer,
            vec![self.shared.address.clone()],
            Some(local_protocols),
        );
        remote.add_connection(inbound);
        self.shared.add_connection(outbound.clone());
        tracing::debug!(local = %self.shared.peer, remote = %peer, "memory connection opened");
        Ok(outbound)
    }

    async fn hang_up(&self, peer: &PeerId) -> Result<(), NetError> {
        self.ensure_running()?;
        if let Some(remote) = self.network.lookup(peer) {
            remote.remove_connections_to(&self.shared.peer);
        }
        self.shared.remove_connections_to(peer);
        Ok(())
    }

    fn connections(&self, peer: Option<&PeerId>) -> Vec<ConnectionInfo> {
        self.shared
            .lock()
            .connections
            .values()
            .filter(|c| peer.is_none_or(|p| c.peer == *p))
            .cloned()
            .collect()
    }

    fn handle(&self, protocol: Protocol, handler: StreamHandler) {
        self.shared.lock().handlers.insert(protocol, handler);
    }

    fn unhandle(&self, protocol: &Protocol) {
        self.shared.lock().handlers.remove(protocol);
    }

    async fn dial_protocol(&self, peer: &PeerId, protocol: Protocol) -> Result<BoxStream, NetError> {
        self.ensure_running()?;
        if self.existing_connection(peer).is_none() {
            self.dial(&DialTarget::Peer(*peer)).await?;
        }
        let remote = self.remote(peer)?;
        let handler = remote
            .lock()
            .handlers
            .get(&protocol)
            .cloned()
            .ok_or_else(|| NetError::UnsupportedProtocol {
                peer: peer.to_string(),
                protocol: protocol.to_string(),
            })?;
        let (local, inbound) = MemoryStream::pair(self.shared.peer, *peer, protocol);
        tokio::spawn(handler(Box::new(inbound)));
        Ok(Box::new(local))
    }

    async fn ping(&self, peer: &PeerId) -> Result<Duration, NetError> {
        self.ensure_running()?;
        self.remote(peer)?;
        let started = tokio::time::Instant::now();
        let latency = self.network.ping_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(started.elapsed())
    }

    async fn publish(&self, topic: &str, data: Bytes) -> Result<Vec<PeerId>, NetError> {
        self.ensure_running()?;
        let (sequence, connected) = {
            let mut state = self.shared.lock();
            state.sequence += 1;
            let connected: BTreeSet<PeerId> = state.connections.values().map(|c| c.peer).collect();
            (state.sequence, connected)
        };
        let mut recipients = Vec::new();
        for peer in connected {
            let Some(remote) = self.network.lookup(&peer) else {
                continue;
            };
            if !remote.is_subscribed(topic) {
                continue;
            }
            remote.emit(NetworkEvent::Message(PubsubMessage {
                topic: topic.to_string(),
                source: self.shared.peer,
                data: data.clone(),
                sequence,
            }));
            recipients.push(peer);
        }
        tracing::trace!(topic, recipients = recipients.len(), "published");
        Ok(recipients)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), NetError> {
        self.ensure_running()?;
        self.shared.lock().topics.insert(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), NetError> {
        self.ensure_running()?;
        self.shared.lock().topics.remove(topic);
        Ok(())
    }

    fn subscribers(&self, topic: &str) -> Vec<PeerId> {
        let connected: BTreeSet<PeerId> = self
            .shared
            .lock()
            .connections
            .values()
            .map(|c| c.peer)
            .collect();
        connected
            .into_iter()
            .filter(|peer| {
                self.network
                    .lookup(peer)
                    .is_some_and(|remote| remote.is_subscribed(topic) && remote.is_connected_to(&self.shared.peer))
            })
            .collect()
    }

    fn peer_record(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.shared.lock().peers.get(peer).cloned()
    }

    fn peer_records(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = self.shared.lock().peers.values().cloned().collect();
        records.sort_by(|a, b| a.peer.cmp(&b.peer));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{FramedStream, is_reset};
    use crate::network::stream_handler;

    async fn online_pair(network: &MemoryNetwork) -> (MemoryNode, MemoryNode) {
        let a = network.node(NodeOptions::default());
        let b = network.node(NodeOptions::default());
        a.start().await.unwrap();
        b.start().await.unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn dial_creates_a_connection_on_both_sides() {
        let network = MemoryNetwork::new();
        let (a, b) = online_pair(&network).await;
        let mut b_events = b.events();

        let info = a.dial(&DialTarget::Address(b.address().clone())).await.unwrap();
        assert_eq!(info.peer, b.peer_id());
        assert_eq!(info.direction, Direction::Outbound);
        assert_eq!(a.connections(None).len(), 1);
        assert_eq!(b.connections(Some(&a.peer_id()))[0].direction, Direction::Inbound);

        match b_events.recv().await.unwrap() {
            NetworkEvent::ConnectionOpened(c) => assert_eq!(c.peer, a.peer_id()),
            other => panic!("unexpected event {other:?}"),
        }

        // second dial reuses the connection
        let again = a.dial(&DialTarget::Peer(b.peer_id())).await.unwrap();
        assert_eq!(again.id, info.id);
    }

    #[tokio::test]
    async fn hang_up_closes_both_sides() {
        let network = MemoryNetwork::new();
        let (a, b) = online_pair(&network).await;
        a.dial(&DialTarget::Peer(b.peer_id())).await.unwrap();
        let mut a_events = a.events();

        a.hang_up(&b.peer_id()).await.unwrap();
        assert!(a.connections(None).is_empty());
        assert!(b.connections(None).is_empty());
        match a_events.recv().await.unwrap() {
            NetworkEvent::ConnectionClosed(c) => assert_eq!(c.status, ConnectionStatus::Closed),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn dial_rejects_foreign_transports_and_offline_peers() {
        let network = MemoryNetwork::new();
        let a = network.node(NodeOptions::default());
        a.start().await.unwrap();
        let offline = meshctl_id52::SecretKey::generate().public_key();

        let tcp: PeerAddress = format!("/ip4/10.0.0.2/tcp/4001/p2p/{offline}").parse().unwrap();
        assert!(matches!(
            a.dial(&DialTarget::Address(tcp)).await,
            Err(NetError::Unreachable(_))
        ));
        assert!(matches!(
            a.dial(&DialTarget::Peer(offline)).await,
            Err(NetError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn not_running_node_refuses_work() {
        let network = MemoryNetwork::new();
        let a = network.node(NodeOptions::default());
        let peer = meshctl_id52::SecretKey::generate().public_key();
        assert!(matches!(
            a.dial(&DialTarget::Peer(peer)).await,
            Err(NetError::NotRunning)
        ));
        assert!(a.listen_addresses().is_empty());
    }

    #[tokio::test]
    async fn starting_announces_discoverable_nodes() {
        let network = MemoryNetwork::new();
        let a = network.node(NodeOptions::default());
        a.start().await.unwrap();
        let mut a_events = a.events();

        let b = network.node(NodeOptions::default());
        let hidden = network.node(NodeOptions {
            secret_key: None,
            discoverable: false,
        });
        hidden.start().await.unwrap();
        b.start().await.unwrap();

        match a_events.recv().await.unwrap() {
            NetworkEvent::PeerDiscovered { peer, addresses } => {
                assert_eq!(peer, b.peer_id());
                assert_eq!(addresses, vec![b.address().clone()]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(a_events.try_recv().is_err());
        assert!(a.peer_record(&b.peer_id()).is_some());
        assert!(a.peer_record(&hidden.peer_id()).is_none());
    }

    #[tokio::test]
    async fn publish_reaches_connected_subscribers_only() {
        let network = MemoryNetwork::new();
        let (a, b) = online_pair(&network).await;
        let c = network.node(NodeOptions::default());
        c.start().await.unwrap();
        b.subscribe("news").await.unwrap();
        c.subscribe("news").await.unwrap();
        a.dial(&DialTarget::Peer(b.peer_id())).await.unwrap();
        let mut b_events = b.events();

        let recipients = a.publish("news", Bytes::from_static(b"hi")).await.unwrap();
        assert_eq!(recipients, vec![b.peer_id()]);
        assert_eq!(a.subscribers("news"), vec![b.peer_id()]);
        match b_events.recv().await.unwrap() {
            NetworkEvent::Message(m) => {
                assert_eq!(m.source, a.peer_id());
                assert_eq!(&m.data[..], b"hi");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn dial_protocol_runs_the_remote_handler() {
        let network = MemoryNetwork::new();
        let (a, b) = online_pair(&network).await;
        b.handle(
            Protocol::FileExchange,
            stream_handler(|stream| async move {
                let mut framed = FramedStream::new(stream);
                if let Ok(Some(request)) = framed.recv().await {
                    let _ = framed.send(request.freeze()).await;
                    let _ = framed.close().await;
                }
            }),
        );

        let stream = a.dial_protocol(&b.peer_id(), Protocol::FileExchange).await.unwrap();
        assert_eq!(stream.remote_peer(), b.peer_id());
        let mut framed = FramedStream::new(stream);
        framed.send(Bytes::from_static(b"echo")).await.unwrap();
        assert_eq!(&framed.recv().await.unwrap().unwrap()[..], b"echo");
        assert!(framed.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_handler_is_unsupported() {
        let network = MemoryNetwork::new();
        let (a, b) = online_pair(&network).await;
        let err = a
            .dial_protocol(&b.peer_id(), Protocol::DirectMessage)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, NetError::UnsupportedProtocol { .. }));
    }

    #[tokio::test]
    async fn handler_reset_reaches_the_initiator() {
        let network = MemoryNetwork::new();
        let (a, b) = online_pair(&network).await;
        b.handle(
            Protocol::FileExchange,
            stream_handler(|stream| async move { stream.reset() }),
        );
        let stream = a.dial_protocol(&b.peer_id(), Protocol::FileExchange).await.unwrap();
        let mut framed = FramedStream::new(stream);
        let err = framed.recv().await.unwrap_err();
        assert!(is_reset(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn ping_reports_configured_latency() {
        let network = MemoryNetwork::new();
        network.set_ping_latency(Duration::from_millis(30));
        let (a, b) = online_pair(&network).await;
        let rtt = a.ping(&b.peer_id()).await.unwrap();
        assert!(rtt >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let network = MemoryNetwork::new();
        let a = network.node(NodeOptions::default());
        network.fail_next_start();
        assert!(a.start().await.is_err());
        a.start().await.unwrap();

        network.fail_next_stop();
        assert!(a.stop().await.is_err());
        assert!(a.is_running());
        a.stop().await.unwrap();
        assert!(!a.is_running());
        assert!(network.online().is_empty());
    }

    #[tokio::test]
    async fn stop_closes_connections_on_the_remote() {
        let network = MemoryNetwork::new();
        let (a, b) = online_pair(&network).await;
        a.dial(&DialTarget::Peer(b.peer_id())).await.unwrap();
        a.stop().await.unwrap();
        assert!(b.connections(None).is_empty());
        assert!(a.connections(None).is_empty());
    }
}
