//! CoordinatorHandle - client interface to the coordinator actor
//!
//! Cloneable; connection handlers and CLIs hold one of these. Every method
//! sends a command and, where a reply is expected, awaits a oneshot. The
//! outer `Result` is plumbing (actor gone); the inner one is the domain
//! verdict, which callers relay to peers as `ERROR` without closing anything.

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::domain::DomainError;
use crate::protocol::Outbound;

use super::messages::{AgentDetail, CoordRequest, RegisterOutcome, StatusSnapshot};

/// Handle for talking to a running [`super::Coordinator`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordRequest>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>) -> Self {
        Self { tx }
    }

    /// Register `role`, binding `tx` as its notification stream.
    pub async fn register(
        &self,
        role: &str,
        capabilities: Vec<String>,
        conn_id: u64,
        tx: mpsc::Sender<Outbound>,
    ) -> Result<Result<RegisterOutcome, DomainError>> {
        debug!(role = %role, conn_id, "CoordinatorHandle::register");
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Register {
                role: role.to_string(),
                capabilities,
                conn_id,
                tx,
                reply,
            })
            .await
            .map_err(|_| eyre!("coordinator channel closed"))?;

        reply_rx
            .await
            .map_err(|_| eyre!("coordinator shut down before replying"))
    }

    /// Ask the coordinator to transfer the barrel.
    pub async fn yield_barrel(
        &self,
        from_role: &str,
        to_role: &str,
        payload: &str,
    ) -> Result<Result<(), DomainError>> {
        debug!(from_role = %from_role, to_role = %to_role, "CoordinatorHandle::yield_barrel");
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Yield {
                from_role: from_role.to_string(),
                to_role: to_role.to_string(),
                payload: payload.to_string(),
                reply,
            })
            .await
            .map_err(|_| eyre!("coordinator channel closed"))?;

        reply_rx
            .await
            .map_err(|_| eyre!("coordinator shut down before replying"))
    }

    /// Explicitly remove a role.
    pub async fn deregister(&self, role: &str) -> Result<Result<(), DomainError>> {
        debug!(role = %role, "CoordinatorHandle::deregister");
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Deregister {
                role: role.to_string(),
                reply,
            })
            .await
            .map_err(|_| eyre!("coordinator channel closed"))?;

        reply_rx
            .await
            .map_err(|_| eyre!("coordinator shut down before replying"))
    }

    /// Report a closed peer stream. Fire and forget; the coordinator decides
    /// whether the binding is still current.
    pub async fn connection_closed(&self, role: &str, conn_id: u64) -> Result<()> {
        debug!(role = %role, conn_id, "CoordinatorHandle::connection_closed");
        self.tx
            .send(CoordRequest::ConnectionClosed {
                role: role.to_string(),
                conn_id,
            })
            .await
            .map_err(|_| eyre!("coordinator channel closed"))
    }

    /// Current status snapshot.
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::QueryStatus { reply })
            .await
            .map_err(|_| eyre!("coordinator channel closed"))?;

        reply_rx
            .await
            .map_err(|_| eyre!("coordinator shut down before replying"))
    }

    /// Details for every registered agent.
    pub async fn agent_details(&self) -> Result<Vec<AgentDetail>> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::QueryAgents { reply })
            .await
            .map_err(|_| eyre!("coordinator channel closed"))?;

        reply_rx
            .await
            .map_err(|_| eyre!("coordinator shut down before replying"))
    }

    /// Request coordinator shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        debug!("CoordinatorHandle::shutdown");
        self.tx
            .send(CoordRequest::Shutdown)
            .await
            .map_err(|_| eyre!("coordinator channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_reports_closed_coordinator() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = CoordinatorHandle::new(tx);

        let err = handle.status().await.unwrap_err();
        assert!(err.to_string().contains("coordinator channel closed"));
    }
}
