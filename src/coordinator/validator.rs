//! Yield validation
//!
//! Pure functions over read-only views of the registry and barrel. Keeping
//! validation free of back-references lets the coordinator borrow its own
//! state for the check and mutate only after every rule has passed.

use crate::domain::{Barrel, DomainError, PEOPLE_ROLE, Registry};

/// Validate a yield request end to end. No state is mutated.
///
/// Checks, in order: message shape, holder rights, target validity, and
/// sender state consistency. The `people` role is an unconditional override
/// for holder rights and skips the consistency check.
pub fn validate_yield(
    registry: &Registry,
    barrel: &Barrel,
    from_role: &str,
    to_role: &str,
) -> Result<(), DomainError> {
    validate_shape(from_role, to_role)?;
    validate_holder_rights(barrel, from_role)?;
    validate_target(registry, to_role)?;
    if from_role != PEOPLE_ROLE {
        validate_state_consistency(registry, barrel, from_role)?;
    }
    Ok(())
}

/// Roles must be non-empty and distinct.
fn validate_shape(from_role: &str, to_role: &str) -> Result<(), DomainError> {
    if from_role.is_empty() {
        return Err(DomainError::EmptyField { field: "from_role" });
    }
    if to_role.is_empty() {
        return Err(DomainError::EmptyField { field: "to_role" });
    }
    if from_role == to_role {
        return Err(DomainError::SelfYield {
            role: from_role.to_string(),
        });
    }
    Ok(())
}

/// Only the current holder may yield; the people always may.
fn validate_holder_rights(barrel: &Barrel, from_role: &str) -> Result<(), DomainError> {
    if from_role == PEOPLE_ROLE {
        return Ok(());
    }
    if !barrel.is_held_by(from_role) {
        return Err(DomainError::NotHolder {
            holder: barrel.current_holder().to_string(),
            requester: from_role.to_string(),
        });
    }
    Ok(())
}

/// The target must be the people, or a registered and connected agent.
///
/// A disconnected target is rejected rather than parking the barrel on a
/// role whose peer will never see the activation.
fn validate_target(registry: &Registry, to_role: &str) -> Result<(), DomainError> {
    if to_role == PEOPLE_ROLE {
        return Ok(());
    }
    let Some(record) = registry.get(to_role) else {
        return Err(DomainError::UnknownTarget {
            role: to_role.to_string(),
        });
    };
    if !record.is_connected() {
        return Err(DomainError::TargetDisconnected {
            role: to_role.to_string(),
        });
    }
    Ok(())
}

/// The sender's record, if present, must be active iff it holds the barrel.
///
/// This catches internal bugs, not peer misuse; a mismatch means the state
/// machine itself went wrong somewhere.
fn validate_state_consistency(
    registry: &Registry,
    barrel: &Barrel,
    role: &str,
) -> Result<(), DomainError> {
    let Some(record) = registry.get(role) else {
        return Ok(());
    };

    let holds_barrel = barrel.is_held_by(role);
    let is_active = record.is_active();

    if holds_barrel && !is_active {
        return Err(DomainError::StateInconsistency {
            role: role.to_string(),
            detail: "holds the barrel but is idle",
        });
    }
    if !holds_barrel && is_active {
        return Err(DomainError::StateInconsistency {
            role: role.to_string(),
            detail: "is active but does not hold the barrel",
        });
    }
    Ok(())
}
