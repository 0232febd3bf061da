//! Per-role agent records
//!
//! An agent record tracks one registered role: its capabilities, its
//! idle/active state, and its connection metadata. Connectedness is
//! orthogonal to state - an active agent whose stream drops stays active
//! until it reconnects or is replaced.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// The two states of an agent record.
///
/// Exactly one registered agent may be `Active` at any time; that invariant
/// is enforced by the coordinator, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Active,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Idle => write!(f, "idle"),
            AgentState::Active => write!(f, "active"),
        }
    }
}

/// A registered worker in the collective.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    role: String,
    capabilities: Vec<String>,
    state: AgentState,
    connected: bool,
    created_at: DateTime<Utc>,
    last_connected_at: Option<DateTime<Utc>>,
    last_message: String,
    last_message_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    /// Create a new record in the idle, disconnected state.
    pub fn new(role: impl Into<String>, capabilities: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            role: role.into(),
            capabilities,
            state: AgentState::Idle,
            connected: false,
            created_at: now,
            last_connected_at: None,
            last_message: String::new(),
            last_message_at: None,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == AgentState::Active
    }

    pub fn is_idle(&self) -> bool {
        self.state == AgentState::Idle
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        self.last_connected_at
    }

    /// Last activation directive delivered to this agent.
    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_message_at
    }

    /// Update the connection flag, stamping the connect time on connect.
    pub fn set_connected(&mut self, connected: bool, now: DateTime<Utc>) {
        self.connected = connected;
        if connected {
            self.last_connected_at = Some(now);
        }
    }

    /// Drop the connection flag without touching timestamps.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    /// Transition idle -> active, recording `payload` as the last message.
    pub fn activate(&mut self, payload: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.state != AgentState::Idle {
            return Err(DomainError::InvalidTransition {
                from: self.state,
                to: AgentState::Active,
            });
        }
        self.state = AgentState::Active;
        self.last_message = payload.to_string();
        self.last_message_at = Some(now);
        Ok(())
    }

    /// Transition active -> idle: the agent has handed the barrel on.
    pub fn yield_barrel(&mut self) -> Result<(), DomainError> {
        if self.state != AgentState::Active {
            return Err(DomainError::InvalidTransition {
                from: self.state,
                to: AgentState::Idle,
            });
        }
        self.state = AgentState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record() -> AgentRecord {
        AgentRecord::new("developer", vec!["rust".to_string()], t(0))
    }

    #[test]
    fn test_new_record_is_idle_and_disconnected() {
        let rec = record();
        assert_eq!(rec.role(), "developer");
        assert_eq!(rec.capabilities(), ["rust".to_string()]);
        assert!(rec.is_idle());
        assert!(!rec.is_connected());
        assert_eq!(rec.last_message(), "");
        assert!(rec.last_connected_at().is_none());
    }

    #[test]
    fn test_activate_then_yield() {
        let mut rec = record();
        rec.activate("build the thing", t(1)).unwrap();
        assert!(rec.is_active());
        assert_eq!(rec.last_message(), "build the thing");
        assert_eq!(rec.last_message_at(), Some(t(1)));

        rec.yield_barrel().unwrap();
        assert!(rec.is_idle());
        // yield does not clear the last activation directive
        assert_eq!(rec.last_message(), "build the thing");
    }

    #[test]
    fn test_double_activate_rejected() {
        let mut rec = record();
        rec.activate("a", t(1)).unwrap();
        let err = rec.activate("b", t(2)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: AgentState::Active,
                to: AgentState::Active,
            }
        );
        assert_eq!(rec.last_message(), "a");
    }

    #[test]
    fn test_yield_while_idle_rejected() {
        let mut rec = record();
        let err = rec.yield_barrel().unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: AgentState::Idle,
                to: AgentState::Idle,
            }
        );
    }

    #[test]
    fn test_connectedness_is_orthogonal_to_state() {
        let mut rec = record();
        rec.set_connected(true, t(1));
        rec.activate("work", t(2)).unwrap();

        // connection drop does not change the state machine
        rec.set_connected(false, t(3));
        assert!(rec.is_active());
        assert_eq!(rec.last_connected_at(), Some(t(1)));

        rec.set_connected(true, t(4));
        assert_eq!(rec.last_connected_at(), Some(t(4)));
        assert!(rec.is_active());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AgentState::Idle.to_string(), "idle");
        assert_eq!(AgentState::Active.to_string(), "active");
    }
}
