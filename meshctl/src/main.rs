//! meshctl: node daemon and control client
//!
//! The daemon owns one node and answers JSON requests on a Unix domain
//! socket in its home directory; every other subcommand is a client of that
//! socket.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "meshctl")]
#[command(about = "Peer-to-peer node daemon and control client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Daemon {
        /// Custom MESHCTL_HOME directory (defaults to MESHCTL_HOME env var or ~/.meshctl)
        #[arg(long, env = "MESHCTL_HOME")]
        home: Option<PathBuf>,
        /// Create and start the node right away
        #[arg(long)]
        start: bool,
    },
    /// Invoke a tool on the daemon
    Call {
        /// Tool name, e.g. get_node_status
        name: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
        /// Custom MESHCTL_HOME directory (defaults to MESHCTL_HOME env var or ~/.meshctl)
        #[arg(long, env = "MESHCTL_HOME")]
        home: Option<PathBuf>,
    },
    /// Read a meshctl:// resource
    Read {
        /// Resource URI, e.g. meshctl://stats/network
        uri: String,
        /// Custom MESHCTL_HOME directory (defaults to MESHCTL_HOME env var or ~/.meshctl)
        #[arg(long, env = "MESHCTL_HOME")]
        home: Option<PathBuf>,
    },
    /// List the tools and resources the daemon offers
    Tools {
        /// Custom MESHCTL_HOME directory (defaults to MESHCTL_HOME env var or ~/.meshctl)
        #[arg(long, env = "MESHCTL_HOME")]
        home: Option<PathBuf>,
    },
    /// Show daemon and node status
    Status {
        /// Custom MESHCTL_HOME directory (defaults to MESHCTL_HOME env var or ~/.meshctl)
        #[arg(long, env = "MESHCTL_HOME")]
        home: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon { home, start } => {
            let meshctl_home = cli::get_meshctl_home(home)?;
            println!("🚀 Starting meshctl daemon");
            println!("📁 MESHCTL_HOME: {}", meshctl_home.display());
            cli::daemon::run(meshctl_home, start).await
        }
        Commands::Call {
            name,
            arguments,
            home,
        } => {
            let meshctl_home = cli::get_meshctl_home(home)?;
            cli::client::call(meshctl_home, name, arguments).await
        }
        Commands::Read { uri, home } => {
            let meshctl_home = cli::get_meshctl_home(home)?;
            cli::client::read(meshctl_home, uri).await
        }
        Commands::Tools { home } => {
            let meshctl_home = cli::get_meshctl_home(home)?;
            cli::client::tools(meshctl_home).await
        }
        Commands::Status { home } => {
            let meshctl_home = cli::get_meshctl_home(home)?;
            cli::status::show_status(meshctl_home).await
        }
    }
}
