use serde_json::{Value, json};

use super::CommandSurface;
use crate::error::Error;
use crate::lifecycle::NodeHandle;
use crate::registry::uptime_ms;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(super) struct CreateArgs {
    secret_key: Option<String>,
}

pub(crate) fn node_info(node: &NodeHandle) -> Value {
    let network = node.network();
    json!({
        "peerId": node.peer_id(),
        "addresses": network.listen_addresses(),
        "protocols": network.protocols().iter().map(|p| p.id().to_string()).collect::<Vec<_>>(),
        "createdAt": node.created_at(),
    })
}

impl CommandSurface {
    pub(super) async fn create_node(&self, args: CreateArgs) -> Result<Value, Error> {
        let key = args
            .secret_key
            .map(|hex| {
                hex.parse::<meshctl_id52::SecretKey>()
                    .map_err(|e| Error::InvalidArguments(format!("secretKey: {e}")))
            })
            .transpose()?;
        let node = self.lifecycle.create(key).await?;
        let mut info = node_info(&node);
        info["phase"] = json!(self.registry.phase());
        Ok(info)
    }

    pub(super) fn start_node(&self) -> Result<Value, Error> {
        let node = self.lifecycle.start()?;
        let mut info = node_info(&node);
        info["phase"] = json!(self.registry.phase());
        Ok(info)
    }

    pub(super) async fn stop_node(&self) -> Result<Value, Error> {
        let peer = self.lifecycle.stop().await?;
        Ok(json!({ "stopped": true, "peerId": peer }))
    }

    pub(super) fn node_status(&self) -> Value {
        let (phase, _) = self.registry.lifecycle();
        let node = self.lifecycle.current();
        json!({
            "phase": phase,
            "peerId": node.as_ref().map(|n| n.peer_id()),
            "addresses": node.as_ref().map(|n| n.network().listen_addresses()).unwrap_or_default(),
            "uptimeMs": uptime_ms(self.registry.started_at()),
            "connections": self.registry.connections().len(),
        })
    }
}
