//! # meshctl
//!
//! Control-plane coordination for a single peer-to-peer node.
//!
//! The networking itself is a collaborator behind [`meshctl_net::Network`].
//! This crate keeps an authoritative view of what that node is doing and
//! exposes it through a small set of request/response operations:
//!
//! - [`registry`]: connections, message histories, subscriptions, shared
//!   files, counters and the lifecycle phase behind one lock
//! - [`adapter`]: turns network events into registry updates
//! - [`file_exchange`]: fetch-by-id file transfer over a framed stream
//! - [`messaging`]: group (pubsub) and direct messages
//! - [`lifecycle`]: race-free create/start/stop of the node
//! - [`commands`] and [`resources`]: the operations and read-only views
//!   offered to the control plane
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use meshctl::{CommandSurface, Config};
//! use meshctl_net::memory::MemoryNetwork;
//!
//! # async fn demo() -> Result<(), meshctl::Error> {
//! let network = MemoryNetwork::new();
//! let surface = CommandSurface::new(Config::default(), Arc::new(network.factory()), None);
//!
//! surface.call("create_libp2p_node", serde_json::json!({})).await?;
//! surface.call("subscribe_topic", serde_json::json!({"topic": "chat"})).await?;
//! let status = surface.call("get_node_status", serde_json::Value::Null).await?;
//! assert_eq!(status["phase"], "running");
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod commands;
pub mod config;
pub mod error;
pub mod file_exchange;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod resources;

pub use commands::{Command, CommandSurface};
pub use config::Config;
pub use error::{Error, ErrorBody, ErrorKind};
pub use lifecycle::{LifecycleCoordinator, NodeHandle};
pub use registry::{NodePhase, Registry};
