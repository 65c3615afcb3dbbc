//! Node lifecycle: `stopped -> starting -> running -> stopping -> stopped`.
//!
//! The phase lives in the [`Registry`] and only changes through a
//! compare-and-set there, so two lifecycle calls can never run their
//! transitions at the same time; the loser gets `lifecycle_busy`. The
//! [`NodeHandle`] itself sits in the coordinator and exists exactly while a
//! node has been created and not yet successfully stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use meshctl_id52::SecretKey;
use meshctl_net::{Network, NetworkFactory, NodeOptions, PeerId, Protocol};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::adapter::Adapter;
use crate::error::Error;
use crate::registry::{NodePhase, PhaseConflict, Registry};

/// The one live participant. Dropping the last reference stops its adapter.
pub struct NodeHandle {
    network: Arc<dyn Network>,
    created_at: DateTime<Utc>,
    adapter: CancellationToken,
    _adapter_guard: DropGuard,
    file_responder: AtomicBool,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("peer", &self.network.peer_id())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl NodeHandle {
    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn peer_id(&self) -> PeerId {
        self.network.peer_id()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Register the file-exchange responder unless it already is.
    ///
    /// Returns true on the call that installed it.
    pub fn ensure_file_responder(&self, registry: &Arc<Registry>, max_frame_length: usize) -> bool {
        if self.file_responder.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.network.handle(
            Protocol::FileExchange,
            crate::file_exchange::responder(registry.clone(), max_frame_length),
        );
        true
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Identity used when `create` is not given one
    pub default_key: Option<SecretKey>,
    pub max_frame_length: usize,
    pub discoverable: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            default_key: None,
            max_frame_length: meshctl_net::framing::DEFAULT_MAX_FRAME_LENGTH,
            discoverable: true,
        }
    }
}

pub struct LifecycleCoordinator {
    registry: Arc<Registry>,
    factory: Arc<dyn NetworkFactory>,
    options: LifecycleOptions,
    handle: Mutex<Option<Arc<NodeHandle>>>,
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("phase", &self.registry.phase())
            .field("handle", &self.current())
            .finish_non_exhaustive()
    }
}

fn busy(conflict: PhaseConflict) -> Error {
    Error::LifecycleBusy {
        phase: conflict.phase,
    }
}

impl LifecycleCoordinator {
    pub fn new(
        registry: Arc<Registry>,
        factory: Arc<dyn NetworkFactory>,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            registry,
            factory,
            options,
            handle: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<NodeHandle>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The node handle in whatever phase it is
    pub fn current(&self) -> Option<Arc<NodeHandle>> {
        self.slot().clone()
    }

    /// The node handle, only while the node is running
    pub fn running(&self) -> Result<Arc<NodeHandle>, Error> {
        if self.registry.lifecycle() != (NodePhase::Running, false) {
            return Err(Error::NoActiveNode);
        }
        self.current().ok_or(Error::NoActiveNode)
    }

    /// Build, wire up and start a node. At most one node exists at a time.
    #[tracing::instrument(skip_all)]
    pub async fn create(&self, secret_key: Option<SecretKey>) -> Result<Arc<NodeHandle>, Error> {
        if let Some(existing) = self.current() {
            return Err(Error::NodeAlreadyExists {
                peer: existing.peer_id().to_string(),
            });
        }
        self.registry
            .begin_transition(&[NodePhase::Stopped], NodePhase::Starting)
            .map_err(|conflict| match self.current() {
                Some(existing) if !conflict.in_flight => Error::NodeAlreadyExists {
                    peer: existing.peer_id().to_string(),
                },
                _ => busy(conflict),
            })?;

        match self.build(secret_key).await {
            Ok(handle) => {
                *self.slot() = Some(handle.clone());
                self.registry.finish_transition(NodePhase::Running);
                tracing::info!(peer = %handle.peer_id(), "node running");
                Ok(handle)
            }
            Err(e) => {
                self.registry.finish_transition(NodePhase::Stopped);
                tracing::warn!(error = %e, "node creation failed");
                Err(e)
            }
        }
    }

    async fn build(&self, secret_key: Option<SecretKey>) -> Result<Arc<NodeHandle>, Error> {
        let options = NodeOptions {
            secret_key: secret_key.or_else(|| self.options.default_key.clone()),
            discoverable: self.options.discoverable,
        };
        let network = self
            .factory
            .create(options)
            .await
            .map_err(Error::transport("create node", "local node"))?;

        // Wiring goes in before start so no event is missed; the guard stops
        // the adapter again if anything below fails.
        let adapter = CancellationToken::new();
        let guard = adapter.clone().drop_guard();
        Adapter::new(self.registry.clone(), network.clone()).spawn(network.events(), adapter.clone());
        network.handle(
            Protocol::DirectMessage,
            crate::messaging::inbound_handler(self.registry.clone(), self.options.max_frame_length),
        );
        // Files shared by an earlier node stay fetchable.
        let serving_files = !self.registry.files().is_empty();
        if serving_files {
            network.handle(
                Protocol::FileExchange,
                crate::file_exchange::responder(self.registry.clone(), self.options.max_frame_length),
            );
        }

        network
            .start()
            .await
            .map_err(Error::transport("start node", network.peer_id()))?;

        for topic in self.registry.subscriptions() {
            if let Err(e) = network.subscribe(&topic).await {
                tracing::warn!(%topic, error = %e, "failed to restore subscription");
            }
        }
        self.registry.replace_connections(network.connections(None));

        Ok(Arc::new(NodeHandle {
            network,
            created_at: Utc::now(),
            adapter,
            _adapter_guard: guard,
            file_responder: AtomicBool::new(serving_files),
        }))
    }

    /// Idempotent while running; otherwise a precondition or busy error
    pub fn start(&self) -> Result<Arc<NodeHandle>, Error> {
        let (phase, in_flight) = self.registry.lifecycle();
        if in_flight {
            return Err(Error::LifecycleBusy { phase });
        }
        match phase {
            NodePhase::Running => self.current().ok_or(Error::NoActiveNode),
            NodePhase::Stopped => Err(Error::NoActiveNode),
            NodePhase::Starting | NodePhase::Stopping => Err(Error::LifecycleBusy { phase }),
        }
    }

    /// Shut the node down. A failed shutdown leaves the phase at `stopping`
    /// with the handle kept, and may be retried.
    #[tracing::instrument(skip_all)]
    pub async fn stop(&self) -> Result<PeerId, Error> {
        let Some(handle) = self.current() else {
            return Err(Error::NoActiveNode);
        };
        self.registry
            .begin_transition(&[NodePhase::Running, NodePhase::Stopping], NodePhase::Stopping)
            .map_err(busy)?;

        let peer = handle.peer_id();
        match handle.network.stop().await {
            Ok(()) => {
                handle.adapter.cancel();
                self.slot().take();
                self.registry.replace_connections(Vec::new());
                self.registry.finish_transition(NodePhase::Stopped);
                tracing::info!(%peer, "node stopped");
                Ok(peer)
            }
            Err(e) => {
                self.registry.finish_transition(NodePhase::Stopping);
                tracing::warn!(%peer, error = %e, "node shutdown failed");
                Err(Error::transport("stop node", peer)(e))
            }
        }
    }
}
