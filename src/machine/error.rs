//! Errors raised while ticking a machine.

use crate::registry::MachineId;
use thiserror::Error;

/// Integrity errors surfaced by [`crate::Registry::step`].
///
/// These signal a misconfigured rule set and are deliberately not caught
/// inside the scheduler: fail fast on misconfiguration.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Machine {0} is not registered")]
    UnknownMachine(MachineId),

    #[error("'{machine}': transition from '{state}' targets the previous state, but none was ever recorded")]
    UnresolvedPreviousTarget { machine: String, state: String },

    #[error("'{machine}': two transitions out of '{state}' match at the same priority {priority}")]
    AmbiguousTransition {
        machine: String,
        state: String,
        priority: i32,
    },
}
