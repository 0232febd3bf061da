//! Command and reply types for the coordinator actor

use std::collections::BTreeMap;

use tokio::sync::{mpsc, oneshot};

use crate::domain::{AgentState, DomainError};
use crate::protocol::Outbound;

/// Outcome of a `REGISTER` command.
///
/// When the barrel was already parked on the registering role (the previous
/// instance crashed mid-work), `resumed` is true and the caller must deliver
/// an `ACTIVATE` carrying `resume_payload`, attributed to `resume_from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub resumed: bool,
    pub resume_payload: String,
    pub resume_from: String,
}

impl RegisterOutcome {
    pub(crate) fn fresh() -> Self {
        Self {
            resumed: false,
            resume_payload: String::new(),
            resume_from: String::new(),
        }
    }
}

/// One agent's details, as reported to `QUERY_AGENTS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDetail {
    pub role: String,
    pub capabilities: Vec<String>,
    pub state: AgentState,
    pub connected: bool,
}

/// Snapshot of the collective, as reported to `QUERY_STATUS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub barrel_holder: String,
    pub registered_agents: Vec<String>,
    pub agent_states: BTreeMap<String, AgentState>,
    pub connected_agents: BTreeMap<String, bool>,
}

/// Requests to the coordinator actor
#[derive(Debug)]
pub enum CoordRequest {
    /// Register a role, binding its peer stream for notifications
    Register {
        role: String,
        capabilities: Vec<String>,
        conn_id: u64,
        tx: mpsc::Sender<Outbound>,
        reply: oneshot::Sender<Result<RegisterOutcome, DomainError>>,
    },

    /// Transfer the barrel from its holder to a target role
    Yield {
        from_role: String,
        to_role: String,
        payload: String,
        reply: oneshot::Sender<Result<(), DomainError>>,
    },

    /// Explicitly remove a role from the collective
    Deregister {
        role: String,
        reply: oneshot::Sender<Result<(), DomainError>>,
    },

    /// A peer stream hit EOF; deregister its role only if the binding still
    /// points at that stream
    ConnectionClosed { role: String, conn_id: u64 },

    /// Full status snapshot
    QueryStatus {
        reply: oneshot::Sender<StatusSnapshot>,
    },

    /// Per-agent details
    QueryAgents {
        reply: oneshot::Sender<Vec<AgentDetail>>,
    },

    /// Shut down the coordinator actor
    Shutdown,
}
