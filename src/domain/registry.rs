//! Agent registry
//!
//! Owns the `role -> record` mapping. A role has at most one record; a new
//! registration for an existing role evicts the old record. Eviction is the
//! only reliable recovery signal when a holder crashes silently, so insert
//! never rejects a duplicate role.

use std::collections::HashMap;

use super::PEOPLE_ROLE;
use super::agent::AgentRecord;
use super::error::DomainError;

/// Registry of agent records, keyed by role.
#[derive(Debug, Default)]
pub struct Registry {
    agents: HashMap<String, AgentRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing record for the same role.
    ///
    /// The evicted record, marked disconnected, is returned so the caller can
    /// tear down its peer stream. Fails on an empty or reserved role.
    pub fn insert(&mut self, record: AgentRecord) -> Result<Option<AgentRecord>, DomainError> {
        if record.role().is_empty() {
            return Err(DomainError::EmptyField { field: "role" });
        }
        if record.role() == PEOPLE_ROLE {
            return Err(DomainError::ReservedRole);
        }

        let role = record.role().to_string();
        let evicted = self.agents.insert(role, record).map(|mut old| {
            old.mark_disconnected();
            old
        });
        Ok(evicted)
    }

    pub fn get(&self, role: &str) -> Option<&AgentRecord> {
        self.agents.get(role)
    }

    pub fn get_mut(&mut self, role: &str) -> Option<&mut AgentRecord> {
        self.agents.get_mut(role)
    }

    pub fn exists(&self, role: &str) -> bool {
        self.agents.contains_key(role)
    }

    /// All registered roles, sorted for stable output.
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.agents.keys().cloned().collect();
        roles.sort();
        roles
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AgentRecord)> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Remove a role's record. Fails if the role is unknown.
    pub fn remove(&mut self, role: &str) -> Result<AgentRecord, DomainError> {
        self.agents.remove(role).ok_or_else(|| DomainError::UnknownRole {
            role: role.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn connected_record(role: &str, at: i64) -> AgentRecord {
        let mut rec = AgentRecord::new(role, vec![], t(at));
        rec.set_connected(true, t(at));
        rec
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());

        let replaced = registry.insert(connected_record("developer", 0)).unwrap();
        assert!(replaced.is_none());
        assert!(registry.exists("developer"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("developer").unwrap().role(), "developer");
        assert!(registry.get("tester").is_none());
    }

    #[test]
    fn test_insert_replaces_and_disconnects_old_record() {
        let mut registry = Registry::new();
        registry.insert(connected_record("developer", 0)).unwrap();

        let evicted = registry
            .insert(connected_record("developer", 5))
            .unwrap()
            .expect("second insert should evict the first record");

        assert!(!evicted.is_connected());
        assert_eq!(evicted.created_at(), t(0));

        // exactly one record remains, and it is the new one
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("developer").unwrap().created_at(), t(5));
        assert!(registry.get("developer").unwrap().is_connected());
    }

    #[test]
    fn test_empty_role_rejected() {
        let mut registry = Registry::new();
        let err = registry.insert(AgentRecord::new("", vec![], t(0))).unwrap_err();
        assert_eq!(err, DomainError::EmptyField { field: "role" });
    }

    #[test]
    fn test_reserved_role_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .insert(AgentRecord::new("people", vec![], t(0)))
            .unwrap_err();
        assert_eq!(err, DomainError::ReservedRole);
        assert!(!registry.exists("people"));
    }

    #[test]
    fn test_remove_unknown_role_fails() {
        let mut registry = Registry::new();
        let err = registry.remove("ghost").unwrap_err();
        assert_eq!(
            err,
            DomainError::UnknownRole {
                role: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_roles_sorted() {
        let mut registry = Registry::new();
        registry.insert(connected_record("tester", 0)).unwrap();
        registry.insert(connected_record("developer", 0)).unwrap();
        registry.insert(connected_record("architect", 0)).unwrap();

        assert_eq!(registry.roles(), ["architect", "developer", "tester"]);
    }
}
