//! Echo analysis server entry point.
//!
//! Binary name: `echo-server`
//!
//! Parses CLI arguments, sets up tracing, loads configuration, then runs the
//! server or the configuration check.

mod cli;
mod http;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use echo_infra::config::load_config;
use echo_observe::tracing_setup::{TracingOptions, filter_for_verbosity, init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        default_filter: filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
        json: cli.log_json,
        otel: cli.otel,
    };
    if let Err(err) = init_tracing(&options) {
        eprintln!("Warning: failed to initialize tracing: {err}");
    }

    let mut config = load_config(cli.config.as_deref()).await;

    let result = match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            cli::serve::serve(config, cli.quiet).await
        }
        Commands::Check => cli::check::check(&config, cli.json).await,
    };

    shutdown_tracing();
    result
}
