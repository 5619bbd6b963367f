//! Graph primitives: the compiled, immutable-after-setup data model.
//!
//! - [`State`]: named nodes with hooks and exit gating
//! - [`Transition`]: guarded, prioritized edges
//! - [`Rule`]: a transition list shared by a set of states
//! - [`StateHistory`]: bounded record of entered states

mod history;
mod rule;
mod state;
mod transition;

pub use history::{HistoryRecord, StateHistory, DEFAULT_HISTORY_CAPACITY};
pub use rule::{Rule, Source};
pub use state::{ExitPolicy, HookContext, State, StateHook, StateId};
pub use transition::{Condition, Target, Transition, DEFAULT_PRIORITY};
