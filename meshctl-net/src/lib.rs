//! Network collaborator boundary for meshctl.
//!
//! The coordination layer in `meshctl` never talks to a transport directly.
//! Everything it needs from the peer-to-peer subsystem goes through the
//! [`Network`] trait defined here, and every node is built by a
//! [`NetworkFactory`].
//!
//! - [`protocol`]: stream protocol identifiers
//! - [`address`]: multiaddr-style peer addresses and dial targets
//! - [`framing`]: length-prefixed frames over a [`BiStream`]
//! - [`memory`]: in-process backend used by tests and the loopback daemon

pub mod address;
pub mod error;
pub mod event;
pub mod framing;
pub mod memory;
pub mod network;
pub mod protocol;

pub use address::{DialTarget, PeerAddress};
pub use error::NetError;
pub use event::{NetworkEvent, PubsubMessage};
pub use framing::FramedStream;
pub use network::{
    BiStream, BoxStream, ConnectionInfo, ConnectionStatus, Direction, Network, NetworkFactory,
    NodeOptions, PeerId, PeerRecord, StreamHandler, stream_handler,
};
pub use protocol::Protocol;
