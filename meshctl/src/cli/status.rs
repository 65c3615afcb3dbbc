//! Status command for showing daemon and node information

use std::path::{Path, PathBuf};

use super::daemon::control::ClientRequest;

/// Show daemon and node status
pub async fn show_status(meshctl_home: PathBuf) -> eyre::Result<()> {
    println!("📊 meshctl Status");
    println!("📁 MESHCTL_HOME: {}", meshctl_home.display());
    println!();

    let daemon_status = check_daemon_status(&meshctl_home);
    println!("🚀 Daemon: {daemon_status}");

    show_lock_status(&meshctl_home).await?;
    println!();

    show_node_status(&meshctl_home).await;
    Ok(())
}

fn check_daemon_status(meshctl_home: &Path) -> &'static str {
    let socket_path = meshctl_home.join(super::CONTROL_SOCKET);
    let lock_path = meshctl_home.join(super::LOCK_FILE);

    if socket_path.exists() && lock_path.exists() {
        "🟢 Running (control socket + lock file present)"
    } else if lock_path.exists() {
        "🟡 Lock file exists but no control socket (starting up or crashed?)"
    } else {
        "🔴 Not running"
    }
}

async fn show_lock_status(meshctl_home: &Path) -> eyre::Result<()> {
    let lock_path = meshctl_home.join(super::LOCK_FILE);

    if lock_path.exists() {
        let modified = tokio::fs::metadata(&lock_path).await?.modified()?;
        let age = std::time::SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        println!(
            "🔒 Lock file: {} (created {} seconds ago)",
            lock_path.display(),
            age.as_secs()
        );
    } else {
        println!("🔓 No lock file found");
    }
    Ok(())
}

async fn show_node_status(meshctl_home: &Path) {
    let request = ClientRequest::CallTool {
        name: "get_node_status".to_string(),
        arguments: serde_json::Value::Null,
    };
    match super::client::send(meshctl_home, &request).await {
        Ok(response) if response.success => {
            let status = response.data;
            println!("🛰️  Node: {}", status["phase"].as_str().unwrap_or("unknown"));
            if let Some(peer_id) = status["peerId"].as_str() {
                println!("   Peer ID: {peer_id}");
                println!("   Connections: {}", status["connections"]);
                println!("   Uptime: {} ms", status["uptimeMs"]);
                for address in status["addresses"].as_array().into_iter().flatten() {
                    println!("   Listening: {}", address.as_str().unwrap_or_default());
                }
            }
        }
        Ok(response) => println!("⚠️  Node status unavailable: {}", response.data),
        Err(e) => println!("📭 Node status unavailable: {e}"),
    }
}
