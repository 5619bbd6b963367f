//! Transitions: guarded, prioritized edge candidates.

use super::state::StateId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Priority assigned when a transition is not annotated explicitly.
/// Lower numeric values win.
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Where a transition lands. `Previous` is resolved at commit time to the
/// current state's back-reference; modeling it as a variant (rather than
/// a sentinel state object) keeps the special case exhaustive.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Target {
    State(StateId),
    Previous,
}

/// A guarded condition, shared between the clones of a transition that
/// end up in several per-state transition lists.
pub type Condition = Rc<dyn Fn() -> bool>;

/// A directed edge candidate. The condition is evaluated fresh on every
/// tick; nothing is memoized.
#[derive(Clone)]
pub struct Transition {
    pub(crate) name: Option<String>,
    pub(crate) condition: Condition,
    pub(crate) target: Target,
    pub(crate) priority: i32,
    pub(crate) is_else: bool,
}

impl Transition {
    pub fn new(condition: impl Fn() -> bool + 'static, target: Target) -> Self {
        Self {
            name: None,
            condition: Rc::new(condition),
            target,
            priority: DEFAULT_PRIORITY,
            is_else: false,
        }
    }

    /// An unconditional transition, used to chain wait states.
    pub fn always(target: Target) -> Self {
        Self::new(|| true, target)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Fallback transition, consulted only when no ordinary one matched.
    pub fn is_else(&self) -> bool {
        self.is_else
    }

    pub(crate) fn matches(&self) -> bool {
        (self.condition)()
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("priority", &self.priority)
            .field("is_else", &self.is_else)
            .finish()
    }
}
