//! The collaborator interface consumed by the coordination layer.
//!
//! Mirrors the shape of a libp2p-style node: dial/hang-up, a live
//! connection list, protocol stream handlers, pubsub, a peer store and an
//! event feed. Implementations own all transport state; callers only ever
//! hold derived snapshots ([`ConnectionInfo`], [`PeerRecord`]).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::address::{DialTarget, PeerAddress};
use crate::error::NetError;
use crate::event::NetworkEvent;
use crate::protocol::Protocol;

pub type PeerId = meshctl_id52::PublicKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Open,
    Closing,
    Closed,
}

/// Snapshot of one transport connection
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub peer: PeerId,
    pub remote_address: PeerAddress,
    pub protocols: Vec<String>,
    pub direction: Direction,
    pub status: ConnectionStatus,
    pub opened_at: chrono::DateTime<chrono::Utc>,
}

/// Peer store entry
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub peer: PeerId,
    pub addresses: Vec<PeerAddress>,
    pub protocols: Vec<String>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

/// One bidirectional byte channel bound to a protocol
///
/// Closing is done through `AsyncWriteExt::shutdown`; the remote side then
/// reads a clean EOF. [`BiStream::reset`] aborts instead, and the remote
/// side's next read past buffered data fails with
/// `std::io::ErrorKind::ConnectionReset`.
pub trait BiStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {
    fn remote_peer(&self) -> PeerId;

    fn protocol(&self) -> &Protocol;

    /// Abort the stream in both directions
    fn reset(self: Box<Self>);
}

pub type BoxStream = Box<dyn BiStream>;

/// Inbound stream handler registered with [`Network::handle`]
pub type StreamHandler =
    Arc<dyn Fn(BoxStream) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Box an async closure into a [`StreamHandler`]
pub fn stream_handler<F, Fut>(f: F) -> StreamHandler
where
    F: Fn(BoxStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |stream: BoxStream| -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(f(stream))
    })
}

/// Options for building a node
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Identity; a fresh one is generated when absent
    pub secret_key: Option<meshctl_id52::SecretKey>,
    /// Announce this node to the discovery mechanism on start
    pub discoverable: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            secret_key: None,
            discoverable: true,
        }
    }
}

#[async_trait::async_trait]
pub trait Network: Send + Sync + std::fmt::Debug {
    fn peer_id(&self) -> PeerId;

    fn listen_addresses(&self) -> Vec<PeerAddress>;

    /// Protocols this node has handlers for
    fn protocols(&self) -> Vec<Protocol>;

    /// Subscribe to the event feed. Events emitted before this call are not replayed.
    fn events(&self) -> tokio::sync::broadcast::Receiver<NetworkEvent>;

    async fn start(&self) -> Result<(), NetError>;

    async fn stop(&self) -> Result<(), NetError>;

    /// Open (or reuse) a connection
    async fn dial(&self, target: &DialTarget) -> Result<ConnectionInfo, NetError>;

    /// Close every connection to `peer`
    async fn hang_up(&self, peer: &PeerId) -> Result<(), NetError>;

    /// Complete list of current connections, optionally filtered by peer
    fn connections(&self, peer: Option<&PeerId>) -> Vec<ConnectionInfo>;

    /// Register (or replace) the handler for inbound streams of `protocol`
    fn handle(&self, protocol: Protocol, handler: StreamHandler);

    fn unhandle(&self, protocol: &Protocol);

    /// Open a new stream to `peer`, dialing first if needed
    async fn dial_protocol(&self, peer: &PeerId, protocol: Protocol) -> Result<BoxStream, NetError>;

    /// Round-trip liveness probe
    async fn ping(&self, peer: &PeerId) -> Result<Duration, NetError>;

    /// Publish to a topic, returning the peers it was delivered to
    async fn publish(&self, topic: &str, data: bytes::Bytes) -> Result<Vec<PeerId>, NetError>;

    async fn subscribe(&self, topic: &str) -> Result<(), NetError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), NetError>;

    /// Remote peers known to be subscribed to `topic`
    fn subscribers(&self, topic: &str) -> Vec<PeerId>;

    fn peer_record(&self, peer: &PeerId) -> Option<PeerRecord>;

    fn peer_records(&self) -> Vec<PeerRecord>;
}

/// Builds unstarted nodes; [`Network::start`] brings them online
#[async_trait::async_trait]
pub trait NetworkFactory: Send + Sync {
    async fn create(&self, options: NodeOptions) -> Result<Arc<dyn Network>, NetError>;
}
