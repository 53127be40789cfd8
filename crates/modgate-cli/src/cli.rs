//! CLI argument definitions for modgate.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use modgate_core::{OperationKind, Platform};

/// modgate -- sandboxed module execution and disassembly behind a gateway.
#[derive(Parser)]
#[command(
    name = "modgate",
    version,
    about = "modgate -- run or disassemble untrusted modules in isolated workers",
    long_about = "Gateways accept modules over HTTP, apply admission control and relay each \
                  request to a fresh worker process. The dispatch client discovers gateways \
                  per platform and balances requests across them."
)]
pub struct Cli {
    /// Path to the configuration file. Defaults to `modgate.toml` when it
    /// exists.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway.
    Gateway {
        /// Address to bind the HTTP server to.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Worker host and worker process commands.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Send a module to a gateway and print the output.
    Dispatch {
        /// Target platform (x86, x64, arm32, arm64).
        #[arg(long, short)]
        platform: Platform,

        /// Disassemble instead of executing.
        #[arg(long)]
        asm: bool,

        /// Gateway base URL. Repeat to register several; replaces the
        /// configured list.
        #[arg(long = "backend", short)]
        backends: Vec<String>,

        /// Module file to send.
        file: PathBuf,
    },

    /// Discover gateways and list the platforms they serve.
    Platforms {
        /// Gateway base URL. Repeat to register several.
        #[arg(long = "backend", short)]
        backends: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum WorkerAction {
    /// Listen for gateway connections and start a worker process per
    /// connection.
    Serve {
        /// Operation kind to serve (run or asm).
        #[arg(long, short)]
        kind: OperationKind,

        /// Address to listen on. Defaults to the configured address for the
        /// kind.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Serve a single framed module from stdin. Started by `worker serve`.
    Exec {
        /// Operation kind to perform (run or asm).
        #[arg(long, short)]
        kind: OperationKind,
    },
}
