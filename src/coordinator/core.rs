//! Coordinator actor
//!
//! One task owns the barrel, the registry, and the role->stream bindings.
//! Commands arrive on an mpsc channel and are handled to completion one at a
//! time, which is the system's entire serialization story: no operation ever
//! observes a half-applied transition. Notifications to peers are pushed into
//! per-peer channels only after the owning state change is done.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{
    AgentRecord, Barrel, Clock, DomainError, PEOPLE_ROLE, Registry, SystemClock,
};
use crate::protocol::Outbound;

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{AgentDetail, CoordRequest, RegisterOutcome, StatusSnapshot};
use super::validator;

/// Current peer stream for a role.
///
/// Dropping the binding closes its channel, which tells the connection task
/// to tear the stream down.
struct Binding {
    conn_id: u64,
    tx: mpsc::Sender<Outbound>,
}

/// The coordinator's entire mutable state.
///
/// Methods take `now` explicitly; the actor loop stamps each command with the
/// injected clock.
struct FarmState {
    barrel: Barrel,
    registry: Registry,
    bindings: HashMap<String, Binding>,
}

impl FarmState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            barrel: Barrel::new(now),
            registry: Registry::new(),
            bindings: HashMap::new(),
        }
    }

    /// Register a role, replacing any prior instance, and resume its work if
    /// the barrel was parked on it.
    fn register(
        &mut self,
        role: String,
        capabilities: Vec<String>,
        conn_id: u64,
        tx: mpsc::Sender<Outbound>,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome, DomainError> {
        let mut record = AgentRecord::new(role.clone(), capabilities, now);
        record.set_connected(true, now);

        if self.registry.insert(record)?.is_some() {
            debug!(role = %role, "replaced existing registration");
        }

        // Rebind the stream; a displaced binding drops here, closing the old
        // peer's channel and with it the old stream.
        if let Some(old) = self.bindings.insert(role.clone(), Binding { conn_id, tx }) {
            debug!(role = %role, old_conn_id = old.conn_id, "displaced prior peer stream");
        }

        if self.barrel.is_held_by(&role) {
            // Work was assigned to this role before; the previous instance is
            // gone. Hand the assignment straight back.
            let payload = self.barrel.last_payload().to_string();
            let from = self.barrel.last_transfer().from_role.clone();
            if let Some(rec) = self.registry.get_mut(&role) {
                rec.activate(&payload, now)?;
            }
            info!(role = %role, "holder reconnected, resuming work");
            return Ok(RegisterOutcome {
                resumed: true,
                resume_payload: payload,
                resume_from: from,
            });
        }

        Ok(RegisterOutcome::fresh())
    }

    /// Validate and apply a yield. Returns the activation to deliver, if the
    /// target is an agent.
    fn yield_barrel(
        &mut self,
        from_role: &str,
        to_role: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Outbound>, DomainError> {
        validator::validate_yield(&self.registry, &self.barrel, from_role, to_role)?;

        // Park whoever holds the barrel now. For an agent yield that is the
        // sender; for a people override it is the displaced holder.
        let holder = self.barrel.current_holder().to_string();
        if let Some(rec) = self.registry.get_mut(&holder)
            && rec.is_active()
        {
            rec.yield_barrel()?;
        }

        self.barrel.transfer_to(to_role, payload, now)?;

        if to_role == PEOPLE_ROLE {
            return Ok(None);
        }

        if let Some(rec) = self.registry.get_mut(to_role) {
            rec.activate(payload, now)?;
        }
        Ok(Some(Outbound::Activate {
            from_role: from_role.to_string(),
            payload: payload.to_string(),
        }))
    }

    /// Remove a role. If it holds the barrel, the barrel goes back to the
    /// people with a synthesized handoff payload.
    fn deregister(&mut self, role: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.registry.exists(role) {
            return Err(DomainError::UnknownRole {
                role: role.to_string(),
            });
        }

        if self.barrel.is_held_by(role) {
            let payload = format!("agent '{role}' deregistered, returning barrel to people");
            self.barrel.transfer_to(PEOPLE_ROLE, &payload, now)?;
            info!(role = %role, "holder deregistered, barrel returned to people");
        }

        self.registry.remove(role)?;
        self.bindings.remove(role);
        Ok(())
    }

    fn status(&self) -> StatusSnapshot {
        let mut agent_states = std::collections::BTreeMap::new();
        let mut connected_agents = std::collections::BTreeMap::new();
        for (role, rec) in self.registry.iter() {
            agent_states.insert(role.clone(), rec.state());
            connected_agents.insert(role.clone(), rec.is_connected());
        }
        StatusSnapshot {
            barrel_holder: self.barrel.current_holder().to_string(),
            registered_agents: self.registry.roles(),
            agent_states,
            connected_agents,
        }
    }

    fn agent_details(&self) -> Vec<AgentDetail> {
        let mut details: Vec<AgentDetail> = self
            .registry
            .iter()
            .map(|(role, rec)| AgentDetail {
                role: role.clone(),
                capabilities: rec.capabilities().to_vec(),
                state: rec.state(),
                connected: rec.is_connected(),
            })
            .collect();
        details.sort_by(|a, b| a.role.cmp(&b.role));
        details
    }

    /// Push a notification to a role's bound stream, if any.
    ///
    /// Delivery failure never rolls state back; recovery happens when the
    /// role's next instance registers.
    fn notify(&self, role: &str, msg: Outbound) {
        match self.bindings.get(role) {
            Some(binding) => {
                if let Err(e) = binding.tx.try_send(msg) {
                    warn!(role = %role, error = %e, "failed to deliver notification");
                }
            }
            None => {
                warn!(role = %role, "no stream bound for notification, dropping");
            }
        }
    }
}

/// The coordinator task. Owns all shared state; see module docs.
pub struct Coordinator {
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    /// Create a new coordinator with the wall clock.
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a coordinator with an injected clock (used by tests).
    pub fn with_clock(config: &CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        Self { tx, rx, clock }
    }

    /// Create a handle for talking to this coordinator.
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone())
    }

    /// Run the coordinator task.
    ///
    /// Consumes the coordinator and runs until `Shutdown` is received or
    /// every handle is dropped.
    pub async fn run(mut self) {
        let mut state = FarmState::new(self.clock.now());

        info!(holder = PEOPLE_ROLE, "coordinator started");

        while let Some(req) = self.rx.recv().await {
            match req {
                CoordRequest::Register {
                    role,
                    capabilities,
                    conn_id,
                    tx,
                    reply,
                } => {
                    debug!(role = %role, conn_id, "registering agent");
                    let result = state.register(role, capabilities, conn_id, tx, self.clock.now());
                    let _ = reply.send(result);
                }

                CoordRequest::Yield {
                    from_role,
                    to_role,
                    payload,
                    reply,
                } => {
                    debug!(from_role = %from_role, to_role = %to_role, "processing yield");
                    match state.yield_barrel(&from_role, &to_role, &payload, self.clock.now()) {
                        Ok(activation) => {
                            info!(from_role = %from_role, to_role = %to_role, "barrel transferred");
                            // state is committed; only now does the target
                            // hear about it
                            if let Some(msg) = activation {
                                state.notify(&to_role, msg);
                            }
                            let _ = reply.send(Ok(()));
                        }
                        Err(e) => {
                            debug!(from_role = %from_role, error = %e, "yield rejected");
                            let _ = reply.send(Err(e));
                        }
                    }
                }

                CoordRequest::Deregister { role, reply } => {
                    debug!(role = %role, "deregistering agent");
                    let _ = reply.send(state.deregister(&role, self.clock.now()));
                }

                CoordRequest::ConnectionClosed { role, conn_id } => {
                    let is_current = state
                        .bindings
                        .get(&role)
                        .is_some_and(|binding| binding.conn_id == conn_id);
                    if is_current {
                        debug!(role = %role, conn_id, "peer stream closed, deregistering");
                        if let Err(e) = state.deregister(&role, self.clock.now()) {
                            warn!(role = %role, error = %e, "deregister on disconnect failed");
                        }
                    } else {
                        // a later REGISTER already displaced this stream
                        debug!(role = %role, conn_id, "stale stream closed, ignoring");
                    }
                }

                CoordRequest::QueryStatus { reply } => {
                    let _ = reply.send(state.status());
                }

                CoordRequest::QueryAgents { reply } => {
                    let _ = reply.send(state.agent_details());
                }

                CoordRequest::Shutdown => {
                    info!("coordinator shutting down");
                    break;
                }
            }
        }

        info!("coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentState;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn peer() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(8)
    }

    /// Build a state with registered roles, returning the peer receivers so
    /// their channels stay open for notify().
    fn state_with(roles: &[&str]) -> (FarmState, Vec<mpsc::Receiver<Outbound>>) {
        let mut state = FarmState::new(t(0));
        let mut receivers = Vec::new();
        for (i, role) in roles.iter().enumerate() {
            let (tx, rx) = peer();
            receivers.push(rx);
            state
                .register(role.to_string(), vec![], i as u64 + 1, tx, t(1))
                .unwrap();
        }
        (state, receivers)
    }

    fn active_roles(state: &FarmState) -> Vec<String> {
        state
            .registry
            .iter()
            .filter(|(_, rec)| rec.is_active())
            .map(|(role, _)| role.clone())
            .collect()
    }

    #[test]
    fn test_fresh_register_stays_idle() {
        let mut state = FarmState::new(t(0));
        let (tx, _rx) = peer();
        let outcome = state
            .register("developer".to_string(), vec!["rust".to_string()], 1, tx, t(1))
            .unwrap();

        assert!(!outcome.resumed);
        let rec = state.registry.get("developer").unwrap();
        assert!(rec.is_idle());
        assert!(rec.is_connected());
        assert_eq!(state.barrel.current_holder(), "people");
    }

    #[test]
    fn test_register_reserved_role_rejected() {
        let mut state = FarmState::new(t(0));
        let (tx, _rx) = peer();
        let err = state
            .register("people".to_string(), vec![], 1, tx, t(1))
            .unwrap_err();
        assert_eq!(err, DomainError::ReservedRole);
        assert!(state.bindings.is_empty());
    }

    #[test]
    fn test_register_resumes_when_holder_reconnects() {
        let (mut state, _peers) = state_with(&["developer"]);
        state
            .yield_barrel("people", "developer", "impl feature", t(2))
            .unwrap();

        // second instance of the same role registers
        let (tx, _rx) = peer();
        let outcome = state
            .register("developer".to_string(), vec![], 2, tx, t(3))
            .unwrap();

        assert!(outcome.resumed);
        assert_eq!(outcome.resume_payload, "impl feature");
        assert_eq!(outcome.resume_from, "people");

        let rec = state.registry.get("developer").unwrap();
        assert!(rec.is_active());
        assert_eq!(rec.last_message(), "impl feature");
        assert_eq!(state.bindings.get("developer").unwrap().conn_id, 2);
    }

    #[test]
    fn test_yield_chain_keeps_single_active_agent() {
        let (mut state, _peers) = state_with(&["developer", "tester"]);

        state.yield_barrel("people", "developer", "build", t(2)).unwrap();
        assert_eq!(state.barrel.current_holder(), "developer");
        assert_eq!(active_roles(&state), ["developer"]);

        let activation = state
            .yield_barrel("developer", "tester", "ready", t(3))
            .unwrap();
        assert_eq!(
            activation,
            Some(Outbound::Activate {
                from_role: "developer".to_string(),
                payload: "ready".to_string(),
            })
        );
        assert_eq!(state.barrel.current_holder(), "tester");
        assert_eq!(active_roles(&state), ["tester"]);
        assert!(state.registry.get("developer").unwrap().is_idle());
    }

    #[test]
    fn test_yield_to_people_activates_nobody() {
        let (mut state, _peers) = state_with(&["developer"]);
        state.yield_barrel("people", "developer", "go", t(2)).unwrap();

        let activation = state
            .yield_barrel("developer", "people", "done", t(3))
            .unwrap();
        assert_eq!(activation, None);
        assert_eq!(state.barrel.current_holder(), "people");
        assert!(active_roles(&state).is_empty());
    }

    #[test]
    fn test_unauthorized_yield_leaves_state_unchanged() {
        let (mut state, _peers) = state_with(&["developer", "tester"]);
        state.yield_barrel("people", "developer", "go", t(2)).unwrap();

        let err = state
            .yield_barrel("tester", "people", "x", t(3))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotHolder { .. }));

        assert_eq!(state.barrel.current_holder(), "developer");
        assert_eq!(active_roles(&state), ["developer"]);
        assert_eq!(state.barrel.history().len(), 2);
    }

    #[test]
    fn test_people_override_parks_the_displaced_holder() {
        let (mut state, _peers) = state_with(&["developer", "tester"]);
        state.yield_barrel("people", "tester", "test it", t(2)).unwrap();

        // people re-route: tester must go idle even though it never yielded
        state.yield_barrel("people", "developer", "pivot", t(3)).unwrap();

        assert_eq!(state.barrel.current_holder(), "developer");
        assert_eq!(active_roles(&state), ["developer"]);
        assert!(state.registry.get("tester").unwrap().is_idle());
    }

    #[test]
    fn test_deregister_of_holder_returns_barrel() {
        let (mut state, _peers) = state_with(&["developer"]);
        state.yield_barrel("people", "developer", "go", t(2)).unwrap();

        state.deregister("developer", t(3)).unwrap();

        assert_eq!(state.barrel.current_holder(), "people");
        assert!(!state.registry.exists("developer"));
        assert!(!state.bindings.contains_key("developer"));
        assert!(state.barrel.last_payload().contains("deregistered"));
    }

    #[test]
    fn test_deregister_unknown_role_fails() {
        let mut state = FarmState::new(t(0));
        let err = state.deregister("ghost", t(1)).unwrap_err();
        assert!(matches!(err, DomainError::UnknownRole { .. }));
    }

    #[test]
    fn test_status_snapshot() {
        let (mut state, _peers) = state_with(&["developer", "tester"]);
        state.yield_barrel("people", "tester", "go", t(2)).unwrap();

        let status = state.status();
        assert_eq!(status.barrel_holder, "tester");
        assert_eq!(status.registered_agents, ["developer", "tester"]);
        assert_eq!(status.agent_states["developer"], AgentState::Idle);
        assert_eq!(status.agent_states["tester"], AgentState::Active);
        assert!(status.connected_agents["developer"]);

        // no intervening mutation: a second snapshot is identical
        assert_eq!(state.status(), status);
    }

    #[tokio::test]
    async fn test_actor_register_and_yield_delivers_activation() {
        let coordinator = Coordinator::new(&CoordinatorConfig::default());
        let handle = coordinator.handle();
        let coord_task = tokio::spawn(coordinator.run());

        let (tx, mut rx) = mpsc::channel(8);
        let outcome = handle
            .register("developer", vec![], 1, tx)
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.resumed);

        handle
            .yield_barrel("people", "developer", "impl feature")
            .await
            .unwrap()
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(
            msg,
            Outbound::Activate {
                from_role: "people".to_string(),
                payload: "impl feature".to_string(),
            }
        );

        let status = handle.status().await.unwrap();
        assert_eq!(status.barrel_holder, "developer");

        handle.shutdown().await.unwrap();
        coord_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_replacement_closes_old_channel() {
        let coordinator = Coordinator::new(&CoordinatorConfig::default());
        let handle = coordinator.handle();
        let coord_task = tokio::spawn(coordinator.run());

        let (tx1, mut rx1) = mpsc::channel(8);
        handle
            .register("developer", vec![], 1, tx1)
            .await
            .unwrap()
            .unwrap();

        let (tx2, _rx2) = mpsc::channel(8);
        handle
            .register("developer", vec![], 2, tx2)
            .await
            .unwrap()
            .unwrap();

        // the displaced binding was dropped, so the first channel closes
        assert_eq!(rx1.recv().await, None);

        // stale EOF for the first stream must not deregister the new record
        handle.connection_closed("developer", 1).await.unwrap();
        let details = handle.agent_details().await.unwrap();
        assert_eq!(details.len(), 1);
        assert!(details[0].connected);

        handle.shutdown().await.unwrap();
        coord_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_connection_closed_deregisters_current_stream() {
        let coordinator = Coordinator::new(&CoordinatorConfig::default());
        let handle = coordinator.handle();
        let coord_task = tokio::spawn(coordinator.run());

        let (tx, _rx) = mpsc::channel(8);
        handle
            .register("developer", vec![], 7, tx)
            .await
            .unwrap()
            .unwrap();
        handle
            .yield_barrel("people", "developer", "go")
            .await
            .unwrap()
            .unwrap();

        handle.connection_closed("developer", 7).await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.barrel_holder, "people");
        assert!(status.registered_agents.is_empty());

        handle.shutdown().await.unwrap();
        coord_task.await.unwrap();
    }
}
