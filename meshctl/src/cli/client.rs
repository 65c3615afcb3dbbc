//! Client side of the control socket

use std::path::Path;
use std::path::PathBuf;

use eyre::WrapErr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::daemon::control::{ClientRequest, ClientResponse};

/// Send one request to the daemon in `meshctl_home` and wait for its answer
pub async fn send(meshctl_home: &Path, request: &ClientRequest) -> eyre::Result<ClientResponse> {
    let socket_path = meshctl_home.join(super::CONTROL_SOCKET);
    if !socket_path.exists() {
        eyre::bail!(
            "Daemon not running. Socket not found: {}. Start with: meshctl daemon",
            socket_path.display()
        );
    }

    let stream = UnixStream::connect(&socket_path)
        .await
        .wrap_err_with(|| format!("failed to connect to {}", socket_path.display()))?;
    let (reader, mut writer) = stream.into_split();

    let mut request_json = serde_json::to_vec(request)?;
    request_json.push(b'\n');
    writer.write_all(&request_json).await?;

    let mut line = String::new();
    if BufReader::new(reader).read_line(&mut line).await? == 0 {
        eyre::bail!("daemon closed the connection without answering");
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// Like [`send`], but a failure response becomes an error
async fn send_ok(meshctl_home: &Path, request: &ClientRequest) -> eyre::Result<serde_json::Value> {
    let response = send(meshctl_home, request).await?;
    if response.success {
        return Ok(response.data);
    }
    let kind = response.data["kind"].as_str().unwrap_or("unknown");
    let message = response.data["message"].as_str().unwrap_or("no message");
    Err(eyre::eyre!("{kind}: {message}"))
}

fn print_json(value: &serde_json::Value) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn call(meshctl_home: PathBuf, name: String, arguments: String) -> eyre::Result<()> {
    let arguments: serde_json::Value =
        serde_json::from_str(&arguments).wrap_err("arguments must be a JSON object")?;
    let data = send_ok(&meshctl_home, &ClientRequest::CallTool { name, arguments }).await?;
    print_json(&data)
}

pub async fn read(meshctl_home: PathBuf, uri: String) -> eyre::Result<()> {
    let data = send_ok(&meshctl_home, &ClientRequest::ReadResource { uri }).await?;
    print_json(&data)
}

pub async fn tools(meshctl_home: PathBuf) -> eyre::Result<()> {
    let tools = send_ok(&meshctl_home, &ClientRequest::ListTools).await?;
    let resources = send_ok(&meshctl_home, &ClientRequest::ListResources).await?;

    println!("🔧 Tools:");
    for tool in tools["tools"].as_array().into_iter().flatten() {
        println!(
            "   {:<24} {}",
            tool["name"].as_str().unwrap_or_default(),
            tool["description"].as_str().unwrap_or_default()
        );
    }
    println!();
    println!("📚 Resources:");
    for resource in resources["resources"].as_array().into_iter().flatten() {
        println!(
            "   {:<34} {}",
            resource["uri"].as_str().unwrap_or_default(),
            resource["description"].as_str().unwrap_or_default()
        );
    }
    Ok(())
}
