//! Domain model for the collective
//!
//! Pure state: the barrel (work permit), per-role agent records, and the
//! registry that owns them. Policy lives in the coordinator; these types only
//! reject transitions that are illegal at the data-structure level.

mod agent;
mod barrel;
mod clock;
mod error;
mod registry;

pub use agent::{AgentRecord, AgentState};
pub use barrel::{Barrel, TransferRecord};
pub use clock::{Clock, SystemClock};
pub use error::DomainError;
pub use registry::Registry;

/// Reserved role naming the external controller.
///
/// Never backed by an agent record, always a valid yield source and target,
/// and the initial barrel holder.
pub const PEOPLE_ROLE: &str = "people";
