//! Authoritative in-memory view of the node.
//!
//! One [`Registry`] owns connections, message histories, subscriptions,
//! shared files, counters, the discovery cache and the lifecycle phase.
//! Everything sits behind a single mutex and every method takes it exactly
//! once, so each call is one atomic update or one consistent read.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use meshctl_net::{ConnectionInfo, PeerAddress, PeerId};

/// Default capacity of the discovered-peer cache
pub const DEFAULT_DISCOVERY_CACHE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePhase {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for NodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NodePhase::Stopped => "stopped",
            NodePhase::Starting => "starting",
            NodePhase::Running => "running",
            NodePhase::Stopping => "stopping",
        })
    }
}

/// A group or direct message as seen by this node. Immutable once built.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: uuid::Uuid,
    pub body: String,
    #[serde(rename = "originPeerId")]
    pub origin: PeerId,
    pub delivered: bool,
    pub received_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(body: String, origin: PeerId, delivered: bool) -> Self {
        Self::with_id(uuid::Uuid::new_v4(), body, origin, delivered)
    }

    pub fn with_id(message_id: uuid::Uuid, body: String, origin: PeerId, delivered: bool) -> Self {
        Self {
            message_id,
            body,
            origin,
            delivered,
            received_at: Utc::now(),
        }
    }
}

/// File bytes held for serving or fetched from a peer
#[derive(Debug, Clone, PartialEq)]
pub struct SharedFile {
    pub file_id: String,
    pub content: Bytes,
    pub sender: PeerId,
    pub shared_at: DateTime<Utc>,
}

impl SharedFile {
    pub fn new(file_id: String, content: Bytes, sender: PeerId) -> Self {
        Self {
            file_id,
            content,
            sender,
            shared_at: Utc::now(),
        }
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            file_id: self.file_id.clone(),
            size: self.size(),
            sender_peer_id: self.sender,
            shared_at: self.shared_at,
        }
    }
}

/// Catalog entry of a shared file, without its bytes
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub file_id: String,
    pub size: usize,
    pub sender_peer_id: PeerId,
    pub shared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCounters {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPeer {
    pub peer_id: PeerId,
    pub addresses: Vec<PeerAddress>,
    pub discovered_at: DateTime<Utc>,
}

/// Why a lifecycle compare-and-set was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseConflict {
    pub phase: NodePhase,
    pub in_flight: bool,
}

/// Immutable copy of the registry at one instant
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: NodePhase,
    pub started_at: Option<DateTime<Utc>>,
    pub connections: Vec<ConnectionInfo>,
    pub subscriptions: Vec<String>,
    pub counters: NetworkCounters,
    pub files: Vec<FileSummary>,
    pub discovered: Vec<DiscoveredPeer>,
    pub topics_with_history: usize,
    pub peers_with_history: usize,
}

impl Snapshot {
    pub fn uptime_ms(&self) -> u64 {
        uptime_ms(self.started_at)
    }
}

pub(crate) fn uptime_ms(started_at: Option<DateTime<Utc>>) -> u64 {
    started_at
        .map(|t| (Utc::now() - t).num_milliseconds().max(0) as u64)
        .unwrap_or(0)
}

#[derive(Debug)]
struct State {
    phase: NodePhase,
    in_flight: bool,
    started_at: Option<DateTime<Utc>>,
    connections: Vec<ConnectionInfo>,
    topic_history: HashMap<String, Vec<ChatMessage>>,
    peer_history: HashMap<PeerId, Vec<ChatMessage>>,
    subscriptions: BTreeSet<String>,
    files: Vec<SharedFile>,
    counters: NetworkCounters,
    discovered: VecDeque<DiscoveredPeer>,
    discovery_capacity: usize,
}

#[derive(Debug)]
pub struct Registry {
    state: Mutex<State>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_CACHE_SIZE)
    }
}

fn last(messages: Option<&Vec<ChatMessage>>, limit: usize) -> Vec<ChatMessage> {
    match messages {
        Some(messages) => messages[messages.len().saturating_sub(limit)..].to_vec(),
        None => Vec::new(),
    }
}

impl Registry {
    pub fn new(discovery_capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                phase: NodePhase::Stopped,
                in_flight: false,
                started_at: None,
                connections: Vec::new(),
                topic_history: HashMap::new(),
                peer_history: HashMap::new(),
                subscriptions: BTreeSet::new(),
                files: Vec::new(),
                counters: NetworkCounters::default(),
                discovered: VecDeque::new(),
                discovery_capacity: discovery_capacity.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            phase: state.phase,
            started_at: state.started_at,
            connections: state.connections.clone(),
            subscriptions: state.subscriptions.iter().cloned().collect(),
            counters: state.counters,
            files: state.files.iter().map(SharedFile::summary).collect(),
            discovered: state.discovered.iter().cloned().collect(),
            topics_with_history: state.topic_history.len(),
            peers_with_history: state.peer_history.len(),
        }
    }

    // lifecycle

    pub fn phase(&self) -> NodePhase {
        self.lock().phase
    }

    /// Current phase and whether a transition is in progress
    pub fn lifecycle(&self) -> (NodePhase, bool) {
        let state = self.lock();
        (state.phase, state.in_flight)
    }

    /// Move from one of `from` to `to` and mark a transition in flight
    pub fn begin_transition(&self, from: &[NodePhase], to: NodePhase) -> Result<(), PhaseConflict> {
        let mut state = self.lock();
        if state.in_flight || !from.contains(&state.phase) {
            return Err(PhaseConflict {
                phase: state.phase,
                in_flight: state.in_flight,
            });
        }
        state.phase = to;
        state.in_flight = true;
        Ok(())
    }

    /// Settle the in-flight transition on `phase`
    pub fn finish_transition(&self, phase: NodePhase) {
        let mut state = self.lock();
        state.phase = phase;
        state.in_flight = false;
        match phase {
            NodePhase::Running => state.started_at = Some(Utc::now()),
            NodePhase::Stopped => state.started_at = None,
            NodePhase::Starting | NodePhase::Stopping => {}
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock().started_at
    }

    // connections

    /// Replace the connection set wholesale
    pub fn replace_connections(&self, connections: Vec<ConnectionInfo>) {
        self.lock().connections = connections;
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.lock().connections.clone()
    }

    // messages

    pub fn append_topic_message(&self, topic: &str, message: ChatMessage) {
        self.lock()
            .topic_history
            .entry(topic.to_string())
            .or_default()
            .push(message);
    }

    pub fn append_peer_message(&self, peer: PeerId, message: ChatMessage) {
        self.lock()
            .peer_history
            .entry(peer)
            .or_default()
            .push(message);
    }

    /// The last `limit` messages on `topic`, oldest first
    pub fn topic_history(&self, topic: &str, limit: usize) -> Vec<ChatMessage> {
        last(self.lock().topic_history.get(topic), limit)
    }

    /// The last `limit` direct messages exchanged with `peer`, oldest first
    pub fn peer_history(&self, peer: &PeerId, limit: usize) -> Vec<ChatMessage> {
        last(self.lock().peer_history.get(peer), limit)
    }

    // subscriptions

    /// Returns false when already subscribed
    pub fn subscribe(&self, topic: &str) -> bool {
        self.lock().subscriptions.insert(topic.to_string())
    }

    /// Returns false when not subscribed
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.lock().subscriptions.remove(topic)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.iter().cloned().collect()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.lock().subscriptions.contains(topic)
    }

    // files

    pub fn add_file(&self, file: SharedFile) {
        self.lock().files.push(file);
    }

    /// Latest file stored under `file_id`
    pub fn file(&self, file_id: &str) -> Option<SharedFile> {
        self.lock()
            .files
            .iter()
            .rev()
            .find(|f| f.file_id == file_id)
            .cloned()
    }

    pub fn files(&self) -> Vec<FileSummary> {
        self.lock().files.iter().map(SharedFile::summary).collect()
    }

    // counters

    pub fn record_sent(&self, messages: u64, bytes: usize) {
        let mut state = self.lock();
        state.counters.messages_sent += messages;
        state.counters.bytes_sent += bytes as u64;
    }

    pub fn record_received(&self, messages: u64, bytes: usize) {
        let mut state = self.lock();
        state.counters.messages_received += messages;
        state.counters.bytes_received += bytes as u64;
    }

    pub fn counters(&self) -> NetworkCounters {
        self.lock().counters
    }

    // discovery cache

    /// Insert or refresh a discovered peer, evicting the oldest entry when full
    pub fn record_discovered(&self, peer: PeerId, addresses: Vec<PeerAddress>) {
        let mut state = self.lock();
        state.discovered.retain(|d| d.peer_id != peer);
        if state.discovered.len() >= state.discovery_capacity {
            state.discovered.pop_front();
        }
        state.discovered.push_back(DiscoveredPeer {
            peer_id: peer,
            addresses,
            discovered_at: Utc::now(),
        });
    }

    pub fn discovered(&self) -> Vec<DiscoveredPeer> {
        self.lock().discovered.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshctl_net::{ConnectionStatus, Direction};

    fn peer() -> PeerId {
        meshctl_id52::SecretKey::generate().public_key()
    }

    fn connection(id: &str, peer: PeerId) -> ConnectionInfo {
        ConnectionInfo {
            id: id.to_string(),
            peer,
            remote_address: PeerAddress::memory(&peer),
            protocols: vec![],
            direction: Direction::Outbound,
            status: ConnectionStatus::Open,
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn replace_connections_is_wholesale() {
        let registry = Registry::default();
        let (a, b) = (peer(), peer());
        registry.replace_connections(vec![connection("1", a), connection("2", b)]);
        registry.replace_connections(vec![connection("2", b)]);
        let connections = registry.connections();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].peer, b);

        // replaying the same list changes nothing
        registry.replace_connections(vec![connection("2", b)]);
        assert_eq!(registry.connections(), connections);
    }

    #[test]
    fn history_keeps_arrival_order_and_limit_takes_the_tail() {
        let registry = Registry::default();
        let origin = peer();
        for i in 0..5 {
            registry.append_topic_message("t", ChatMessage::new(format!("m{i}"), origin, false));
        }
        let bodies = |v: Vec<ChatMessage>| v.into_iter().map(|m| m.body).collect::<Vec<_>>();
        assert_eq!(bodies(registry.topic_history("t", 50)), ["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(bodies(registry.topic_history("t", 2)), ["m3", "m4"]);
        assert!(registry.topic_history("t", 0).is_empty());
        assert!(registry.topic_history("other", 10).is_empty());
    }

    #[test]
    fn peer_history_is_keyed_by_peer() {
        let registry = Registry::default();
        let (a, b) = (peer(), peer());
        registry.append_peer_message(a, ChatMessage::new("hi a".into(), a, false));
        registry.append_peer_message(b, ChatMessage::new("hi b".into(), b, false));
        assert_eq!(registry.peer_history(&a, 10).len(), 1);
        assert_eq!(registry.peer_history(&a, 10)[0].body, "hi a");
    }

    #[test]
    fn file_lookup_is_last_write_wins() {
        let registry = Registry::default();
        let sender = peer();
        registry.add_file(SharedFile::new("f".into(), Bytes::from_static(b"old"), sender));
        registry.add_file(SharedFile::new("f".into(), Bytes::from_static(b"newer"), sender));
        assert_eq!(&registry.file("f").unwrap().content[..], b"newer");
        assert_eq!(registry.files().len(), 2);
        assert!(registry.file("missing").is_none());
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let registry = Registry::default();
        assert!(registry.subscribe("t"));
        assert!(!registry.subscribe("t"));
        assert!(registry.is_subscribed("t"));
        assert!(registry.unsubscribe("t"));
        assert!(!registry.unsubscribe("t"));
        assert!(registry.subscriptions().is_empty());
    }

    #[test]
    fn discovery_cache_is_bounded_and_refreshes() {
        let registry = Registry::new(2);
        let (a, b, c) = (peer(), peer(), peer());
        registry.record_discovered(a, vec![]);
        registry.record_discovered(b, vec![]);
        registry.record_discovered(a, vec![PeerAddress::memory(&a)]);
        registry.record_discovered(c, vec![]);

        let cached: Vec<PeerId> = registry.discovered().iter().map(|d| d.peer_id).collect();
        assert_eq!(cached, vec![a, c]);
        assert_eq!(registry.discovered()[0].addresses.len(), 1);
    }

    #[test]
    fn transitions_are_compare_and_set() {
        let registry = Registry::default();
        registry
            .begin_transition(&[NodePhase::Stopped], NodePhase::Starting)
            .unwrap();
        let conflict = registry
            .begin_transition(&[NodePhase::Stopped], NodePhase::Starting)
            .unwrap_err();
        assert_eq!(conflict.phase, NodePhase::Starting);
        assert!(conflict.in_flight);

        registry.finish_transition(NodePhase::Running);
        assert_eq!(registry.lifecycle(), (NodePhase::Running, false));
        assert!(registry.started_at().is_some());

        registry.finish_transition(NodePhase::Stopped);
        assert!(registry.started_at().is_none());
    }

    #[test]
    fn counters_accumulate() {
        let registry = Registry::default();
        registry.record_sent(1, 10);
        registry.record_sent(1, 5);
        registry.record_received(2, 7);
        let counters = registry.counters();
        assert_eq!(counters.messages_sent, 2);
        assert_eq!(counters.bytes_sent, 15);
        assert_eq!(counters.messages_received, 2);
        assert_eq!(counters.bytes_received, 7);
    }
}
