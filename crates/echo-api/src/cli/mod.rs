//! CLI command definitions for the `echo-server` binary.

pub mod check;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Real-time chat analysis server.
#[derive(Parser)]
#[command(name = "echo-server", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML config file (defaults to $ECHO_CONFIG, then ./echo.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP and WebSocket server.
    Serve {
        /// Port to listen on (overrides config and $PORT).
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (overrides config and $HOST).
        #[arg(long)]
        host: Option<String>,
    },

    /// Show the effective configuration and probe the remote cache.
    Check,
}
