//! farmd - the AgentFarm coordinator server
//!
//! Binds the TCP listener, runs the coordinator actor, and wires shutdown so
//! that in-flight operations drain and peer streams close.

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use agentfarm::cli::Cli;
use agentfarm::config::{Config, LogLevel};
use agentfarm::coordinator::Coordinator;
use agentfarm::server::FarmServer;

fn setup_logging(level: LogLevel) {
    let level: tracing::Level = level.into();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    if let Some(host) = cli.host {
        config.listen_host = host;
    }
    if cli.verbose {
        config.log_level = LogLevel::Debug;
    }
    config.validate().context("Invalid configuration")?;

    setup_logging(config.log_level);

    let coordinator = Coordinator::new(&config.coordinator);
    let handle = coordinator.handle();
    let coord_task = tokio::spawn(coordinator.run());
    info!("coordinator started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = FarmServer::bind(
        &config.address(),
        handle.clone(),
        config.coordinator.clone(),
        shutdown_rx,
    )
    .await?;

    info!(addr = %config.address(), "agentfarm server running");
    info!("agents register over TCP with their role; try: nc {}", config.address());

    let server_task = tokio::spawn(server.run());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    warn!("shutdown signal received");

    // Stop accepting, close peer streams, drain the coordinator.
    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "coordinator already stopped");
    }

    server_task.await.context("Server task panicked")??;
    coord_task.await.context("Coordinator task panicked")?;

    info!("agentfarm server stopped");
    Ok(())
}
