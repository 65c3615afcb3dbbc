/// Errors raised by a [`crate::Network`] implementation
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("node is not running")]
    NotRunning,

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("peer {0} is unreachable")]
    Unreachable(String),

    #[error("peer {peer} does not support protocol {protocol}")]
    UnsupportedProtocol { peer: String, protocol: String },

    #[error("stream I/O failed: {source}")]
    Stream {
        #[from]
        source: std::io::Error,
    },

    #[error("{0}")]
    Backend(String),
}
