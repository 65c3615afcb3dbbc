//! Daemon functionality for meshctl
//!
//! The daemon holds the exclusive home lock, builds the command surface on
//! the in-process network backend and serves the control socket until it
//! receives SIGINT or SIGTERM.

use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::WrapErr;
use meshctl::{CommandSurface, Config};

pub mod control;

/// Key file prefix inside MESHCTL_HOME
const NODE_KEY_PREFIX: &str = "node";

/// Daemon context containing runtime state and lock
#[derive(Debug)]
pub struct DaemonContext {
    pub node_key: meshctl_id52::SecretKey,
    pub meshctl_home: PathBuf,
    pub config: Config,
    pub _lock_file: std::fs::File, // Keep lock file open to maintain exclusive access
}

/// Run the meshctl daemon until a shutdown signal arrives
pub async fn run(meshctl_home: PathBuf, start: bool) -> eyre::Result<()> {
    let context = initialize_daemon(&meshctl_home).await?;

    let log_handle = meshctl::logging::init(&context.config.log_filter)?;
    tracing::info!(home = %context.meshctl_home.display(), "daemon starting");

    let network = meshctl_net::memory::MemoryNetwork::new();
    let surface = Arc::new(
        CommandSurface::new(
            context.config.clone(),
            Arc::new(network.factory()),
            Some(context.node_key.clone()),
        )
        .with_log_control(Arc::new(log_handle)),
    );

    if start {
        let info = surface
            .call("create_libp2p_node", serde_json::json!({}))
            .await
            .wrap_err("failed to start node")?;
        println!("🟢 Node running: {}", info["peerId"]);
    }

    let socket_path = context.meshctl_home.join(super::CONTROL_SOCKET);
    tokio::select! {
        result = control::run(socket_path.clone(), surface.clone()) => result?,
        _ = shutdown_signal() => println!("🛑 Shutdown signal received"),
    }

    if surface.lifecycle().current().is_some() {
        if let Err(e) = surface.lifecycle().stop().await {
            eprintln!("⚠️  Node did not stop cleanly: {e}");
        }
    }
    if socket_path.exists() {
        tokio::fs::remove_file(&socket_path).await?;
    }
    println!("👋 Daemon stopped");
    Ok(())
}

/// Initialize daemon environment with singleton lock protection
async fn initialize_daemon(meshctl_home: &Path) -> eyre::Result<DaemonContext> {
    // Ensure MESHCTL_HOME directory exists
    tokio::fs::create_dir_all(meshctl_home)
        .await
        .wrap_err_with(|| format!("failed to create {}", meshctl_home.display()))?;

    // Create/open lock file for singleton protection
    let lock_path = meshctl_home.join(super::LOCK_FILE);
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)?;

    // Try to acquire exclusive lock - fail immediately if another daemon running
    if let Err(e) = lock_file.try_lock_exclusive() {
        eyre::bail!(
            "❌ Another daemon is already running (lock file: {})\n   Error: {}\n   Shutdown the existing daemon first.",
            lock_path.display(),
            e
        );
    }

    println!("🔒 Acquired exclusive daemon lock: {}", lock_path.display());

    let config = Config::load(meshctl_home)?;
    let node_key = get_or_create_node_key(meshctl_home);
    println!("🔑 Node identity: {}", node_key.public_key().id52());

    Ok(DaemonContext {
        node_key,
        meshctl_home: meshctl_home.to_path_buf(),
        config,
        _lock_file: lock_file, // Keep file open to maintain lock
    })
}

/// Load `<home>/node.private-key`, creating it on first run
fn get_or_create_node_key(meshctl_home: &Path) -> meshctl_id52::SecretKey {
    match meshctl_id52::SecretKey::load_from_dir(meshctl_home, NODE_KEY_PREFIX) {
        Ok((_id52, key)) => {
            println!("🔑 Loaded node key from: {}", meshctl_home.display());
            return key;
        }
        Err(meshctl_id52::KeyFileError::NotFound(_)) => {}
        Err(e) => println!("⚠️  Could not load node key ({e}), generating a new one"),
    }

    let key = meshctl_id52::SecretKey::generate();
    match key.save_to_dir(meshctl_home, NODE_KEY_PREFIX) {
        Ok(()) => println!("🔑 Generated and saved node key to: {}", meshctl_home.display()),
        Err(e) => {
            println!("⚠️  Could not save node key ({e})");
            println!("   Using temporary key - node ID will change on restart");
        }
    }
    key
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
