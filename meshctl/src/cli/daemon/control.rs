//! Control socket server for handling client requests
//!
//! Clients write one JSON request per line and read one JSON response per
//! line back. A connection may carry any number of requests.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use meshctl::{CommandSurface, Error};

/// Client request types
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    #[serde(rename = "call-tool")]
    CallTool {
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    #[serde(rename = "read-resource")]
    ReadResource { uri: String },
    #[serde(rename = "list-tools")]
    ListTools,
    #[serde(rename = "list-resources")]
    ListResources,
}

/// JSON response format to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientResponse {
    /// Success status: true for ok, false for error
    pub success: bool,
    /// Response data or the error body
    pub data: serde_json::Value,
}

impl ClientResponse {
    fn from_result(result: Result<serde_json::Value, Error>) -> Self {
        match result {
            Ok(data) => ClientResponse {
                success: true,
                data,
            },
            Err(e) => ClientResponse {
                success: false,
                data: serde_json::json!(e.body()),
            },
        }
    }
}

/// Run the control socket server
pub async fn run(socket_path: PathBuf, surface: Arc<CommandSurface>) -> eyre::Result<()> {
    // Remove existing socket if it exists
    if socket_path.exists() {
        tokio::fs::remove_file(&socket_path).await?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    println!("🎧 Control socket listening on: {}", socket_path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let surface = surface.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, surface).await {
                        tracing::warn!(error = %e, "control client failed");
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "error accepting control connection");
            }
        }
    }
}

async fn handle_client(
    stream: tokio::net::UnixStream,
    surface: Arc<CommandSurface>,
) -> eyre::Result<()> {
    tracing::debug!("client connected to control socket");

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request_json = line.trim();
        if request_json.is_empty() {
            continue;
        }

        let response = respond(&surface, request_json).await;
        let mut response_json = serde_json::to_vec(&response)?;
        response_json.push(b'\n');
        writer.write_all(&response_json).await?;
    }

    tracing::debug!("client disconnected");
    Ok(())
}

/// Answer one request line
pub async fn respond(surface: &CommandSurface, request_json: &str) -> ClientResponse {
    let request: ClientRequest = match serde_json::from_str(request_json) {
        Ok(request) => request,
        Err(e) => {
            return ClientResponse::from_result(Err(Error::MalformedRequest(e.to_string())));
        }
    };

    let result = match request {
        ClientRequest::CallTool { name, arguments } => {
            tracing::debug!(tool = %name, "control request");
            surface.call(&name, arguments).await
        }
        ClientRequest::ReadResource { uri } => {
            tracing::debug!(uri = %uri, "control request");
            surface.read_resource(&uri)
        }
        ClientRequest::ListTools => Ok(serde_json::json!({ "tools": meshctl::commands::tools() })),
        ClientRequest::ListResources => Ok(serde_json::json!({
            "resources": meshctl::resources::resources()
        })),
    };
    ClientResponse::from_result(result)
}
