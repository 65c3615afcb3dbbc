//! The operations exposed to the control plane.
//!
//! Tool names are plain strings only at the boundary: [`Command::from_name`]
//! turns them into a closed enum and [`CommandSurface::call`] dispatches on
//! it. Arguments and results are JSON objects with camelCase keys.
//!
//! Every command except the lifecycle ones and `get_node_status` needs a
//! running node and fails with `no_active_node` before touching the network
//! otherwise.

use std::sync::Arc;

use meshctl_net::NetworkFactory;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::Error;
use crate::lifecycle::{LifecycleCoordinator, LifecycleOptions, NodeHandle};
use crate::logging::LogLevelControl;
use crate::registry::Registry;

mod files;
mod messaging;
mod monitoring;
mod node;
mod peers;

pub use files::FileAnnouncement;
pub(crate) use node::node_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    CreateNode,
    StartNode,
    StopNode,
    NodeStatus,
    DiscoverPeers,
    ConnectPeer,
    DisconnectPeer,
    ListConnections,
    PeerInfo,
    PingPeer,
    SendGroupMessage,
    SendDirectMessage,
    SubscribeTopic,
    UnsubscribeTopic,
    MessageHistory,
    TopicSubscribers,
    ShareFile,
    RequestFile,
    ListSharedFiles,
    AnnounceFile,
    NetworkStats,
    Protocols,
    SetDebugLevel,
    PeerStore,
}

impl Command {
    pub const ALL: [Command; 24] = [
        Command::CreateNode,
        Command::StartNode,
        Command::StopNode,
        Command::NodeStatus,
        Command::DiscoverPeers,
        Command::ConnectPeer,
        Command::DisconnectPeer,
        Command::ListConnections,
        Command::PeerInfo,
        Command::PingPeer,
        Command::SendGroupMessage,
        Command::SendDirectMessage,
        Command::SubscribeTopic,
        Command::UnsubscribeTopic,
        Command::MessageHistory,
        Command::TopicSubscribers,
        Command::ShareFile,
        Command::RequestFile,
        Command::ListSharedFiles,
        Command::AnnounceFile,
        Command::NetworkStats,
        Command::Protocols,
        Command::SetDebugLevel,
        Command::PeerStore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::CreateNode => "create_libp2p_node",
            Command::StartNode => "start_libp2p_node",
            Command::StopNode => "stop_libp2p_node",
            Command::NodeStatus => "get_node_status",
            Command::DiscoverPeers => "discover_peers",
            Command::ConnectPeer => "connect_peer",
            Command::DisconnectPeer => "disconnect_peer",
            Command::ListConnections => "list_connections",
            Command::PeerInfo => "get_peer_info",
            Command::PingPeer => "ping_peer",
            Command::SendGroupMessage => "send_group_message",
            Command::SendDirectMessage => "send_direct_message",
            Command::SubscribeTopic => "subscribe_topic",
            Command::UnsubscribeTopic => "unsubscribe_topic",
            Command::MessageHistory => "get_message_history",
            Command::TopicSubscribers => "get_topic_subscribers",
            Command::ShareFile => "share_file",
            Command::RequestFile => "request_file",
            Command::ListSharedFiles => "list_shared_files",
            Command::AnnounceFile => "announce_file",
            Command::NetworkStats => "get_network_stats",
            Command::Protocols => "get_protocols",
            Command::SetDebugLevel => "set_debug_level",
            Command::PeerStore => "get_peer_store",
        }
    }

    pub fn from_name(name: &str) -> Option<Command> {
        Command::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::CreateNode => "Create and start the node (optional secretKey hex)",
            Command::StartNode => "Start the node; a no-op while it is running",
            Command::StopNode => "Stop the node and drop all connections",
            Command::NodeStatus => "Lifecycle phase, identity, addresses and uptime",
            Command::DiscoverPeers => "Collect discovery events until timeout (ms)",
            Command::ConnectPeer => "Dial a multiaddr or peer id",
            Command::DisconnectPeer => "Close all connections to a peer",
            Command::ListConnections => "Current connections",
            Command::PeerInfo => "Peer store entry and connections of one peer",
            Command::PingPeer => "Round-trip probe with timeout (ms)",
            Command::SendGroupMessage => "Publish a message on a topic",
            Command::SendDirectMessage => "Send a message straight to one peer",
            Command::SubscribeTopic => "Subscribe to a topic",
            Command::UnsubscribeTopic => "Unsubscribe from a topic",
            Command::MessageHistory => "Last messages of a topic or a peer",
            Command::TopicSubscribers => "Connected peers subscribed to a topic",
            Command::ShareFile => "Make content available for peers to fetch",
            Command::RequestFile => "Fetch a shared file from a peer",
            Command::ListSharedFiles => "Files held locally",
            Command::AnnounceFile => "Publish a shared file's metadata on a topic",
            Command::NetworkStats => "Traffic counters and totals",
            Command::Protocols => "Protocols this node handles",
            Command::SetDebugLevel => "Change the log filter at runtime",
            Command::PeerStore => "Everything the peer store knows",
        }
    }

    /// Lifecycle commands and the status query work in any phase
    pub fn needs_running_node(self) -> bool {
        !matches!(
            self,
            Command::CreateNode | Command::StartNode | Command::StopNode | Command::NodeStatus
        )
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

pub fn tools() -> Vec<ToolDescriptor> {
    Command::ALL
        .into_iter()
        .map(|c| ToolDescriptor {
            name: c.name(),
            description: c.description(),
        })
        .collect()
}

/// Parse a JSON argument object; `null` counts as `{}`
pub(crate) fn parse<T: DeserializeOwned>(arguments: serde_json::Value) -> Result<T, Error> {
    let arguments = if arguments.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| Error::InvalidArguments(e.to_string()))
}

/// Entry point for every control-plane operation
pub struct CommandSurface {
    registry: Arc<Registry>,
    lifecycle: LifecycleCoordinator,
    config: Config,
    log_control: Option<Arc<dyn LogLevelControl>>,
}

impl std::fmt::Debug for CommandSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSurface")
            .field("lifecycle", &self.lifecycle)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CommandSurface {
    pub fn new(
        config: Config,
        factory: Arc<dyn NetworkFactory>,
        default_key: Option<meshctl_id52::SecretKey>,
    ) -> Self {
        let registry = Arc::new(Registry::new(config.discovery_cache_size));
        let lifecycle = LifecycleCoordinator::new(
            registry.clone(),
            factory,
            LifecycleOptions {
                default_key,
                max_frame_length: config.max_frame_length,
                discoverable: true,
            },
        );
        Self {
            registry,
            lifecycle,
            config,
            log_control: None,
        }
    }

    pub fn with_log_control(mut self, control: Arc<dyn LogLevelControl>) -> Self {
        self.log_control = Some(control);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &LifecycleCoordinator {
        &self.lifecycle
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn node(&self) -> Result<Arc<NodeHandle>, Error> {
        self.lifecycle.running()
    }

    /// Run the tool called `name`
    pub async fn call(&self, name: &str, arguments: serde_json::Value) -> Result<serde_json::Value, Error> {
        let command = Command::from_name(name).ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        self.execute(command, arguments).await
    }

    #[tracing::instrument(skip(self, arguments), fields(command = %command))]
    pub async fn execute(
        &self,
        command: Command,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, Error> {
        if command.needs_running_node() {
            self.node()?;
        }
        let result = match command {
            Command::CreateNode => self.create_node(parse(arguments)?).await,
            Command::StartNode => self.start_node(),
            Command::StopNode => self.stop_node().await,
            Command::NodeStatus => Ok(self.node_status()),
            Command::DiscoverPeers => self.discover_peers(parse(arguments)?).await,
            Command::ConnectPeer => self.connect_peer(parse(arguments)?).await,
            Command::DisconnectPeer => self.disconnect_peer(parse(arguments)?).await,
            Command::ListConnections => self.list_connections(),
            Command::PeerInfo => self.peer_info(parse(arguments)?),
            Command::PingPeer => self.ping_peer(parse(arguments)?).await,
            Command::SendGroupMessage => self.send_group_message(parse(arguments)?).await,
            Command::SendDirectMessage => self.send_direct_message(parse(arguments)?).await,
            Command::SubscribeTopic => self.subscribe_topic(parse(arguments)?).await,
            Command::UnsubscribeTopic => self.unsubscribe_topic(parse(arguments)?).await,
            Command::MessageHistory => self.message_history(parse(arguments)?),
            Command::TopicSubscribers => self.topic_subscribers(parse(arguments)?),
            Command::ShareFile => self.share_file(parse(arguments)?),
            Command::RequestFile => self.request_file(parse(arguments)?).await,
            Command::ListSharedFiles => self.list_shared_files(),
            Command::AnnounceFile => self.announce_file(parse(arguments)?).await,
            Command::NetworkStats => self.network_stats(),
            Command::Protocols => self.protocols(),
            Command::SetDebugLevel => self.set_debug_level(parse(arguments)?),
            Command::PeerStore => self.peer_store(),
        };
        if let Err(e) = &result {
            tracing::debug!(kind = ?e.kind(), error = %e, "command failed");
        }
        result
    }

    /// Read a `meshctl://` resource
    pub fn read_resource(&self, uri: &str) -> Result<serde_json::Value, Error> {
        crate::resources::Resource::parse(uri)?.read(self)
    }
}
