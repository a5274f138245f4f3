//! Error taxonomy for the ECS runtime.
//!
//! Structural failures (pool exhaustion, registry misses, worker faults) are
//! surfaced to the calling system as [`EcsError`] values. Field-level access
//! to a component an entity does not have is *not* checked here - that is a
//! contract violation on the caller's side, and the storage layer performs
//! no validation for it.
//!
//! Ring overflow is deliberately absent from this taxonomy: a query that
//! falls behind the event ring observes a bounded resync window and
//! continues (see [`Ring`](crate::event::Ring)). It is a degradation, not
//! an error.

use std::error::Error;
use std::fmt;

/// Errors surfaced by runtime operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// `create_entity` was called with no free identifiers remaining.
    /// The pool capacity is fixed at world construction.
    EntityPoolExhausted,

    /// A component or singleton was addressed by a name that was never
    /// registered with the world.
    ComponentNotRegistered {
        /// The name that failed to resolve.
        name: String,
    },

    /// A worker replica failed to report ready before its first execute.
    WorkerInitFailure {
        /// The worker system's name.
        system: String,
        /// Human-readable failure detail.
        detail: String,
    },

    /// A worker replica reported an error while executing a tick.
    WorkerExecuteFailure {
        /// The worker system's name.
        system: String,
        /// The error string reported by the replica.
        detail: String,
    },
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityPoolExhausted => {
                write!(f, "entity pool exhausted")
            }
            EcsError::ComponentNotRegistered { name } => {
                write!(f, "component not registered: {}", name)
            }
            EcsError::WorkerInitFailure { system, detail } => {
                write!(f, "worker system '{}' failed to initialize: {}", system, detail)
            }
            EcsError::WorkerExecuteFailure { system, detail } => {
                write!(f, "worker system '{}' failed to execute: {}", system, detail)
            }
        }
    }
}

impl Error for EcsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_failure() {
        assert_eq!(
            EcsError::EntityPoolExhausted.to_string(),
            "entity pool exhausted"
        );
        assert_eq!(
            EcsError::ComponentNotRegistered {
                name: "Pos".to_string()
            }
            .to_string(),
            "component not registered: Pos"
        );
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(EcsError::EntityPoolExhausted, EcsError::EntityPoolExhausted);
        assert_ne!(
            EcsError::EntityPoolExhausted,
            EcsError::ComponentNotRegistered {
                name: "Pos".to_string()
            }
        );
    }
}
