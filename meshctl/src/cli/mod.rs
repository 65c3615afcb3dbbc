//! CLI module for the meshctl daemon and its clients

use std::path::PathBuf;

pub mod client;
pub mod daemon;
pub mod status;

pub const CONTROL_SOCKET: &str = "control.sock";
pub const LOCK_FILE: &str = "lock.file";

/// Get the MESHCTL_HOME directory from clap args, environment variable, or default
pub fn get_meshctl_home(custom_home: Option<PathBuf>) -> eyre::Result<PathBuf> {
    if let Some(home) = custom_home {
        return Ok(home);
    }

    // Fallback to ~/.meshctl if no MESHCTL_HOME env var or --home flag
    let home_dir = directories::UserDirs::new()
        .ok_or_else(|| eyre::eyre!("Could not determine user home directory"))?
        .home_dir()
        .to_path_buf();

    Ok(home_dir.join(".meshctl"))
}
