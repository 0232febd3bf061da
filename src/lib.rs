//! AgentFarm - Serialized execution coordinator
//!
//! AgentFarm enforces strictly serialized execution across a fleet of
//! long-lived agent processes connected over TCP. A single work permit (the
//! barrel) is held by exactly one role at a time; the holder performs work
//! while every other agent waits. Handoff is an explicit yield that moves the
//! barrel, parks the yielding agent, and activates the target.
//!
//! # Core Concepts
//!
//! - **One Barrel**: exactly one holder at any moment, initially `people`
//! - **Reactive Only**: no timers drive state; every change is a command
//! - **Crash Recovery**: a reconnecting holder resumes its last assignment
//! - **Actor Core**: all state mutation is serialized through one task
//!
//! # Modules
//!
//! - [`domain`] - Barrel, agent records, registry, and the typed errors
//! - [`coordinator`] - The serialized decision core and its client handle
//! - [`protocol`] - Newline-delimited JSON wire messages
//! - [`server`] - TCP listener and per-peer connection handlers
//! - [`client`] - Line-oriented client used by the operator and agent CLIs
//! - [`config`] - Configuration types and loading

pub mod cli;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use config::{Config, LogLevel};
pub use coordinator::{
    AgentDetail, CoordRequest, Coordinator, CoordinatorConfig, CoordinatorHandle, RegisterOutcome,
    StatusSnapshot,
};
pub use domain::{
    AgentRecord, AgentState, Barrel, Clock, DomainError, PEOPLE_ROLE, Registry, SystemClock,
    TransferRecord,
};
pub use protocol::{Inbound, Outbound, ProtocolError};
pub use server::FarmServer;
