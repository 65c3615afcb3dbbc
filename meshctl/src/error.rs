//! Error types surfaced by the command surface.
//!
//! Every failure a caller can see carries a stable [`ErrorKind`] and a
//! human-readable message, serialised as `{"kind": .., "message": ..}`.

use meshctl_net::NetError;

use crate::registry::NodePhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoActiveNode,
    NodeAlreadyExists,
    UnknownTool,
    UnknownResource,
    InvalidArguments,
    Transport,
    FileNotFound,
    NoFileData,
    MalformedRequest,
    NotFound,
    LifecycleBusy,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no active node, create and start one first")]
    NoActiveNode,

    #[error("node {peer} already exists, stop it first")]
    NodeAlreadyExists { peer: String },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{operation} failed for {target}: {source}")]
    Transport {
        operation: &'static str,
        target: String,
        #[source]
        source: NetError,
    },

    #[error("file '{file_id}' not found on {peer}")]
    FileNotFound { file_id: String, peer: String },

    #[error("no file data received from {peer}")]
    NoFileData { peer: String },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    #[error("a lifecycle transition is in progress (phase {phase})")]
    LifecycleBusy { phase: NodePhase },
}

/// Wire form of an [`Error`]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoActiveNode => ErrorKind::NoActiveNode,
            Error::NodeAlreadyExists { .. } => ErrorKind::NodeAlreadyExists,
            Error::UnknownTool(_) => ErrorKind::UnknownTool,
            Error::UnknownResource(_) => ErrorKind::UnknownResource,
            Error::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::FileNotFound { .. } => ErrorKind::FileNotFound,
            Error::NoFileData { .. } => ErrorKind::NoFileData,
            Error::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::LifecycleBusy { .. } => ErrorKind::LifecycleBusy,
        }
    }

    /// `map_err` adapter wrapping a collaborator failure with its context
    pub fn transport(
        operation: &'static str,
        target: impl std::fmt::Display,
    ) -> impl FnOnce(NetError) -> Error {
        let target = target.to_string();
        move |source| Error::Transport {
            operation,
            target,
            source,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidArguments(e.to_string())
    }
}
