//! `echo-server serve` - run the HTTP and WebSocket server.

use tokio_util::sync::CancellationToken;

use echo_observe::attrs;
use echo_types::config::ServerConfig;

use crate::http::router::build_router;
use crate::state::AppState;

pub async fn serve(config: ServerConfig, quiet: bool) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let state = AppState::init(config, shutdown.clone()).await?;
    let reconciler = state.spawn_reconciler();

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        %addr,
        environment = %state.config.environment,
        { attrs::STORE_MODE } = %state.store.mode(),
        provider = %state.config.provider.base_url,
        "Server listening"
    );

    if !quiet {
        println!();
        println!(
            "  {} Echo analysis server listening on {}",
            console::style("⚡").bold(),
            console::style(format!("http://{addr}")).cyan()
        );
        println!(
            "  {} store: {}  environment: {}",
            console::style("•").dim(),
            console::style(state.store.mode()).yellow(),
            state.config.environment
        );
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Covers the case where serve returned without a signal.
    shutdown.cancel();
    if let Err(err) = reconciler.await {
        tracing::warn!(error = %err, "Store reconciler ended abnormally");
    }

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown` so open event
/// channels and the reconciler stop.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
