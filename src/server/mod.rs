//! TCP server
//!
//! Accepts peer connections and spawns one handler task per stream. Each
//! stream gets a fresh connection id; the coordinator uses the id to tell a
//! live binding from a displaced one.

mod connection;

use std::net::SocketAddr;

use eyre::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::coordinator::{CoordinatorConfig, CoordinatorHandle};

/// Listener front-end for the coordinator.
pub struct FarmServer {
    listener: TcpListener,
    handle: CoordinatorHandle,
    config: CoordinatorConfig,
    shutdown: watch::Receiver<bool>,
}

impl FarmServer {
    /// Bind the listen socket.
    pub async fn bind(
        addr: &str,
        handle: CoordinatorHandle,
        config: CoordinatorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context(format!("Failed to bind listener on {addr}"))?;
        info!(addr = %addr, "server listening");
        Ok(Self {
            listener,
            handle,
            config,
            shutdown,
        })
    }

    /// Actual bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Accept connections until the shutdown signal flips.
    ///
    /// Handlers get their own clone of the shutdown receiver so they can
    /// drain and close their streams; a panic inside one handler task cannot
    /// take down the listener or other peers.
    pub async fn run(mut self) -> Result<()> {
        let mut next_conn_id: u64 = 0;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            next_conn_id += 1;
                            let conn_id = next_conn_id;
                            tokio::spawn(connection::handle_connection(
                                stream,
                                peer,
                                conn_id,
                                self.handle.clone(),
                                self.config.clone(),
                                self.shutdown.clone(),
                            ));
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
