use serde_json::{Value, json};

use super::CommandSurface;
use crate::error::Error;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DebugLevelArgs {
    namespace: Option<String>,
    level: String,
}

impl CommandSurface {
    pub(super) fn network_stats(&self) -> Result<Value, Error> {
        let node = self.node()?;
        let snapshot = self.registry.snapshot();
        let mut stats = json!(snapshot.counters);
        stats["uptimeMs"] = json!(snapshot.uptime_ms());
        stats["connections"] = json!(snapshot.connections.len());
        stats["topics"] = json!(snapshot.subscriptions.len());
        stats["knownPeers"] = json!(node.network().peer_records().len());
        stats["discoveredPeers"] = json!(snapshot.discovered.len());
        stats["sharedFiles"] = json!(snapshot.files.len());
        Ok(stats)
    }

    pub(super) fn protocols(&self) -> Result<Value, Error> {
        let node = self.node()?;
        let protocols: Vec<String> = node
            .network()
            .protocols()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        Ok(json!({ "protocols": protocols }))
    }

    pub(super) fn set_debug_level(&self, args: DebugLevelArgs) -> Result<Value, Error> {
        self.node()?;
        let directive = crate::logging::directive(args.namespace.as_deref(), &args.level)?;
        let applied = match &self.log_control {
            Some(control) => {
                control
                    .apply(&directive)
                    .map_err(|e| Error::InvalidArguments(format!("{e:#}")))?;
                true
            }
            None => false,
        };
        Ok(json!({ "directive": directive, "applied": applied }))
    }

    pub(super) fn peer_store(&self) -> Result<Value, Error> {
        let node = self.node()?;
        let peers = node.network().peer_records();
        Ok(json!({ "peers": peers, "count": peers.len() }))
    }
}
