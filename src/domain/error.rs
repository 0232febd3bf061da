//! Typed domain errors
//!
//! Every error the coordinator can report to a peer has a stable variant
//! here. The `Display` text is what ends up in the wire-level `ERROR`
//! message, so the phrasing is part of the observable contract.

use thiserror::Error;

use super::agent::AgentState;

/// Errors from domain and coordinator operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },

    #[error("'people' is a reserved role and cannot be registered as an agent")]
    ReservedRole,

    #[error("agent cannot yield to itself: {role}")]
    SelfYield { role: String },

    #[error("cannot transfer barrel to its current holder: {role}")]
    TransferToHolder { role: String },

    #[error("only the current barrel holder can yield (current holder: {holder}, requester: {requester})")]
    NotHolder { holder: String, requester: String },

    #[error("target agent '{role}' not found")]
    UnknownTarget { role: String },

    #[error("target agent '{role}' is not connected")]
    TargetDisconnected { role: String },

    #[error("agent with role '{role}' not found")]
    UnknownRole { role: String },

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: AgentState, to: AgentState },

    #[error("agent state inconsistency: agent '{role}' {detail}")]
    StateInconsistency { role: String, detail: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = DomainError::NotHolder {
            holder: "developer".to_string(),
            requester: "tester".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("current barrel holder"));
        assert!(text.contains("developer"));
        assert!(text.contains("tester"));
    }

    #[test]
    fn test_empty_field_names_the_field() {
        let err = DomainError::EmptyField { field: "to_role" };
        assert_eq!(err.to_string(), "to_role cannot be empty");
    }

    #[test]
    fn test_transition_message() {
        let err = DomainError::InvalidTransition {
            from: AgentState::Idle,
            to: AgentState::Idle,
        };
        assert_eq!(err.to_string(), "invalid state transition from idle to idle");
    }
}
