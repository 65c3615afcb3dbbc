//! In-process [`Network`] backend.
//!
//! A [`MemoryNetwork`] is the shared hub; every [`MemoryNode`] built from it
//! can dial the others by peer id or `/memory/<id52>` address. Streams are
//! `tokio::io::duplex` pairs, pubsub fans out to connected subscribers and
//! starting a discoverable node announces it to every other discoverable
//! node on the hub.
//!
//! Test hooks on the hub: [`MemoryNetwork::set_ping_latency`],
//! [`MemoryNetwork::fail_next_start`], [`MemoryNetwork::fail_next_stop`] and
//! [`MemoryNetwork::announce`].

mod node;
mod stream;

pub use node::MemoryNode;
pub use stream::MemoryStream;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::address::PeerAddress;
use crate::error::NetError;
use crate::event::NetworkEvent;
use crate::network::{Network, NetworkFactory, NodeOptions, PeerId};

/// Shared broker routing connections between [`MemoryNode`]s
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    hub: Arc<Hub>,
}

#[derive(Debug, Default)]
struct Hub {
    online: Mutex<HashMap<PeerId, Arc<node::NodeShared>>>,
    next_connection: AtomicU64,
    ping_latency_ms: AtomicU64,
    fail_next_start: AtomicBool,
    fail_next_stop: AtomicBool,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an unstarted node attached to this hub
    pub fn node(&self, options: NodeOptions) -> MemoryNode {
        MemoryNode::new(self.clone(), options)
    }

    pub fn factory(&self) -> MemoryFactory {
        MemoryFactory {
            network: self.clone(),
        }
    }

    /// Simulated round-trip time reported by `ping`
    pub fn set_ping_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.hub.ping_latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Make the next `start` on any node of this hub fail
    pub fn fail_next_start(&self) {
        self.hub.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Make the next `stop` on any node of this hub fail
    pub fn fail_next_stop(&self) {
        self.hub.fail_next_stop.store(true, Ordering::SeqCst);
    }

    /// Deliver a discovery event for `peer` to the online node `to`
    pub fn announce(&self, to: &PeerId, peer: PeerId, addresses: Vec<PeerAddress>) -> bool {
        let Some(target) = self.lookup(to) else {
            return false;
        };
        target.discovered(peer, addresses);
        true
    }

    /// Peer ids of every node currently online
    pub fn online(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.lock_online().keys().copied().collect();
        peers.sort();
        peers
    }

    pub(crate) fn ping_latency(&self) -> Duration {
        Duration::from_millis(self.hub.ping_latency_ms.load(Ordering::SeqCst))
    }

    pub(crate) fn next_connection_id(&self) -> String {
        let n = self.hub.next_connection.fetch_add(1, Ordering::SeqCst) + 1;
        format!("mem-{n}")
    }

    pub(crate) fn take_start_failure(&self) -> bool {
        self.hub.fail_next_start.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_stop_failure(&self) -> bool {
        self.hub.fail_next_stop.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn lookup(&self, peer: &PeerId) -> Option<Arc<node::NodeShared>> {
        self.lock_online().get(peer).cloned()
    }

    /// Bring a node online, returning the nodes that were already there
    pub(crate) fn join(
        &self,
        shared: Arc<node::NodeShared>,
    ) -> Result<Vec<Arc<node::NodeShared>>, NetError> {
        let mut online = self.lock_online();
        if online.contains_key(&shared.peer) {
            return Err(NetError::Backend(format!(
                "peer {} is already online",
                shared.peer
            )));
        }
        let others = online.values().cloned().collect();
        online.insert(shared.peer, shared);
        Ok(others)
    }

    pub(crate) fn leave(&self, peer: &PeerId) {
        self.lock_online().remove(peer);
    }

    fn lock_online(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, Arc<node::NodeShared>>> {
        self.hub
            .online
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// [`NetworkFactory`] handing out [`MemoryNode`]s on one hub
#[derive(Clone, Debug)]
pub struct MemoryFactory {
    network: MemoryNetwork,
}

impl MemoryFactory {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait::async_trait]
impl NetworkFactory for MemoryFactory {
    async fn create(&self, options: NodeOptions) -> Result<Arc<dyn Network>, NetError> {
        let node = self.network.node(options);
        tracing::debug!(peer = %node.peer_id(), "memory node created");
        Ok(Arc::new(node))
    }
}

pub(crate) fn send_event(sender: &tokio::sync::broadcast::Sender<NetworkEvent>, event: NetworkEvent) {
    // No receivers is fine: nobody is listening yet.
    let _ = sender.send(event);
}
