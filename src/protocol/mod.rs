//! Wire protocol
//!
//! Newline-delimited UTF-8 JSON, one message per line, so that even `nc` can
//! drive the coordinator. Inbound and outbound messages are tagged sum types;
//! the parser probes the `type` field first so a malformed frame, an unknown
//! type, and a bad shape each get their own error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::AgentState;

/// Inbound message types, by wire tag.
const KNOWN_INBOUND: &[&str] = &["REGISTER", "YIELD", "QUERY_AGENTS", "QUERY_STATUS"];

/// Errors produced while decoding a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid JSON frame: {0}")]
    Malformed(String),

    #[error("message is missing the 'type' field")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid {msg_type} message: {detail}")]
    InvalidShape { msg_type: String, detail: String },
}

/// Commands a peer may send to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    #[serde(rename = "REGISTER")]
    Register {
        role: String,
        #[serde(default)]
        capabilities: Vec<String>,
    },

    #[serde(rename = "YIELD")]
    Yield {
        from_role: String,
        to_role: String,
        payload: String,
    },

    #[serde(rename = "QUERY_AGENTS")]
    QueryAgents,

    #[serde(rename = "QUERY_STATUS")]
    QueryStatus,
}

/// Registration acknowledgment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// One entry in an `AGENT_DETAILS` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDetailInfo {
    pub role: String,
    pub capabilities: Vec<String>,
    pub state: AgentState,
    pub connected: bool,
}

/// Notifications and replies the coordinator sends to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    #[serde(rename = "ACK_REGISTER")]
    AckRegister { status: AckStatus, message: String },

    #[serde(rename = "ACTIVATE")]
    Activate { from_role: String, payload: String },

    #[serde(rename = "AGENT_DETAILS")]
    AgentDetails { agent_details: Vec<AgentDetailInfo> },

    #[serde(rename = "STATUS")]
    Status {
        barrel_holder: String,
        registered_agents: Vec<String>,
        agent_states: BTreeMap<String, AgentState>,
        connected_agents: BTreeMap<String, bool>,
    },

    #[serde(rename = "ERROR")]
    Error { message: String },
}

impl Outbound {
    /// Shorthand for an `ERROR` reply.
    pub fn error(message: impl ToString) -> Self {
        Outbound::Error {
            message: message.to_string(),
        }
    }
}

/// Parse one frame (a single line, newline already stripped).
///
/// Unknown fields inside a known message are ignored; an unknown `type` is
/// its own error so the caller can keep the stream open.
pub fn parse_inbound(line: &str) -> Result<Inbound, ProtocolError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let msg_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !KNOWN_INBOUND.contains(&msg_type.as_str()) {
        return Err(ProtocolError::UnknownType(msg_type));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidShape {
        msg_type,
        detail: e.to_string(),
    })
}

/// Encode a message as a single JSON line, newline included.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}
