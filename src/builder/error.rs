//! Build errors for the declarative graph builder.

use crate::registry::MachineId;
use thiserror::Error;

/// Errors raised while declaring or compiling a rule set.
///
/// Grammar violations are recorded at the offending call and surfaced
/// when the builder is compiled, so fluent chains never panic mid-flight.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No initial state flagged. Call .initial(state) before .build()")]
    MissingInitialState,

    #[error("More than one initial state flagged ('{first}' and '{second}')")]
    MultipleInitialStates { first: String, second: String },

    #[error("No rules declared. Add at least one .in_state(..) rule")]
    NoRules,

    #[error("Rule opened with an empty state list")]
    EmptyRule,

    #[error("'{verb}' called before .in_state(..) opened a rule")]
    NoOpenRule { verb: &'static str },

    #[error("'{verb}' called with no transition in the open rule. Call .if_(..), .if_not(..) or .else_() first")]
    NoOpenTransition { verb: &'static str },

    #[error("'{verb}' called on a transition that already has a target")]
    TargetAlreadyBound { verb: &'static str },

    #[error("Transition in rule for '{rule}' never received a target. Call .then(state)")]
    DanglingTransition { rule: String },

    #[error("Rule already has an else transition")]
    DuplicateElse,

    #[error("Wait state name '{0}' collides with an existing state")]
    WaitNameCollision(String),

    #[error("'{verb}' cannot attach hooks to a wildcard (.in_any()) rule")]
    WildcardHooks { verb: &'static str },

    #[error("'{verb}' given a state id that does not belong to this builder")]
    UnknownState { verb: &'static str },

    #[error("Parent machine {0} is not registered")]
    UnknownParent(MachineId),

    #[error("Machine {0} is not registered")]
    UnknownChild(MachineId),
}
