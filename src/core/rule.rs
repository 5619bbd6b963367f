//! Rules: a transition list shared by a set of co-located states.

use super::state::StateId;
use super::transition::Transition;

/// Which states a rule's transitions hang off.
///
/// `Any` is the wildcard source: at compile time its transitions are
/// appended to every state's list.
#[derive(Clone, Debug)]
pub enum Source {
    States(Vec<StateId>),
    Any,
}

impl Source {
    pub fn contains(&self, id: StateId) -> bool {
        match self {
            Source::States(ids) => ids.contains(&id),
            Source::Any => true,
        }
    }
}

/// An ordered transition list applying to all states in `source`.
/// Multiple rules may reference the same state; the compiler merges
/// their transitions.
pub struct Rule {
    pub(crate) source: Source,
    pub(crate) transitions: Vec<Transition>,
}

impl Rule {
    pub fn new(source: Source, transitions: Vec<Transition>) -> Self {
        Self {
            source,
            transitions,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transition::Target;

    #[test]
    fn source_membership() {
        let states = Source::States(vec![StateId(0), StateId(2)]);
        assert!(states.contains(StateId(0)));
        assert!(!states.contains(StateId(1)));
        assert!(Source::Any.contains(StateId(7)));
    }

    #[test]
    fn rule_keeps_transition_order() {
        let rule = Rule::new(
            Source::States(vec![StateId(0)]),
            vec![
                Transition::always(Target::State(StateId(1))),
                Transition::always(Target::State(StateId(2))),
            ],
        );
        assert_eq!(rule.transitions().len(), 2);
        assert_eq!(rule.transitions()[0].target(), Target::State(StateId(1)));
        assert_eq!(rule.transitions()[1].target(), Target::State(StateId(2)));
    }
}
