//! The barrel - the single work permit
//!
//! One barrel exists per coordinator. Whoever holds it is the only party
//! authorized to work; everyone else waits. The barrel is a dumb ownership
//! cell with an append-only transfer log: authorization policy lives in the
//! coordinator, not here.

use chrono::{DateTime, Utc};

use super::PEOPLE_ROLE;
use super::error::DomainError;

/// A single barrel transfer in the handoff history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub from_role: String,
    pub to_role: String,
    pub payload: String,
    pub at: DateTime<Utc>,
}

/// The work permit: current holder plus the payload of the last transfer.
#[derive(Debug, Clone)]
pub struct Barrel {
    holder: String,
    last_payload: String,
    last_transfer_at: DateTime<Utc>,
    history: Vec<TransferRecord>,
}

impl Barrel {
    /// Create a new barrel, initially held by the people.
    pub fn new(now: DateTime<Utc>) -> Self {
        let initial = TransferRecord {
            from_role: String::new(),
            to_role: PEOPLE_ROLE.to_string(),
            payload: "initial barrel creation".to_string(),
            at: now,
        };
        Self {
            holder: PEOPLE_ROLE.to_string(),
            last_payload: initial.payload.clone(),
            last_transfer_at: now,
            history: vec![initial],
        }
    }

    /// Role that currently holds the barrel.
    pub fn current_holder(&self) -> &str {
        &self.holder
    }

    pub fn is_held_by(&self, role: &str) -> bool {
        self.holder == role
    }

    /// Payload carried by the most recent transfer.
    pub fn last_payload(&self) -> &str {
        &self.last_payload
    }

    pub fn last_transfer_at(&self) -> DateTime<Utc> {
        self.last_transfer_at
    }

    /// Most recent entry in the transfer log.
    ///
    /// The log always contains at least the creation entry.
    pub fn last_transfer(&self) -> &TransferRecord {
        self.history
            .last()
            .expect("barrel history always has the creation entry")
    }

    /// Move the barrel to `to_role`, recording the transfer.
    ///
    /// Rejects an empty target and a transfer to the current holder. Whether
    /// the caller is *allowed* to transfer is not checked here.
    pub fn transfer_to(
        &mut self,
        to_role: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if to_role.is_empty() {
            return Err(DomainError::EmptyField { field: "to_role" });
        }
        if to_role == self.holder {
            return Err(DomainError::TransferToHolder {
                role: to_role.to_string(),
            });
        }

        let record = TransferRecord {
            from_role: std::mem::replace(&mut self.holder, to_role.to_string()),
            to_role: to_role.to_string(),
            payload: payload.to_string(),
            at: now,
        };
        self.last_payload = payload.to_string();
        self.last_transfer_at = now;
        self.history.push(record);
        Ok(())
    }

    /// Snapshot copy of the complete transfer history.
    pub fn history(&self) -> Vec<TransferRecord> {
        self.history.clone()
    }
}
