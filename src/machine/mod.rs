//! The compiled runtime representation and the tick algorithm.
//!
//! A [`StateMachine`] owns the states its rules reference and a per-state
//! transition table sorted by priority. The table is the only structure
//! consulted while ticking: resolving a tick is one O(k) scan over the
//! current state's candidates.

pub mod error;

pub use error::StepError;

use crate::builder::BuildError;
use crate::core::{
    ExitPolicy, HistoryRecord, HookContext, Rule, Source, State, StateHistory, StateHook, StateId,
    Target, Transition,
};
use crate::debug::BreakPosition;
use crate::registry::{MachineId, Registry};
use chrono::Utc;
use std::time::Duration;

/// One synchronous evaluation step, driven by the host.
///
/// `now` is simulated monotonic time supplied by the host, which keeps
/// timeout behavior deterministic under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    pub frame: u64,
    pub now: Duration,
}

/// Event handed to machine-level transition hooks when a commit happens.
pub struct TransitionEvent<'a> {
    pub machine: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub transition: Option<&'a str>,
    pub frame: u64,
}

/// Machine-level hook fired before a state's own enter hooks.
pub type MachineHook = Box<dyn FnMut(&HookContext)>;
/// Machine-level hook fired on every committed transition.
pub type TransitionHook = Box<dyn FnMut(&TransitionEvent)>;

/// Compiled output of a [`crate::Builder`], consumed by
/// [`crate::Registry::create`].
pub struct MachineSpec {
    pub(crate) name: String,
    pub(crate) parent: Option<MachineId>,
    pub(crate) priority: i32,
    pub(crate) states: Vec<State>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) on_state_enter: Vec<MachineHook>,
    pub(crate) on_transition: Vec<TransitionHook>,
}

impl MachineSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<MachineId> {
        self.parent
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// A child slot on a parent machine. Siblings are kept sorted by
/// descending priority so higher-priority children step first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildRef {
    pub id: MachineId,
    pub priority: i32,
}

enum Phase {
    Enter,
    Execute,
    Exit,
}

/// A compiled, registered state machine.
pub struct StateMachine {
    pub(crate) id: MachineId,
    pub(crate) name: String,
    pub(crate) parent: Option<MachineId>,
    pub(crate) priority: i32,
    pub(crate) states: Vec<State>,
    table: Vec<Vec<Transition>>,
    pub(crate) current: StateId,
    pub(crate) start: StateId,
    pub(crate) history: StateHistory,
    pub(crate) children: Vec<ChildRef>,
    pub(crate) is_cycle_complete: bool,
    pub(crate) step_counter: u32,
    pub(crate) max_step_counter: u32,
    on_state_enter: Vec<MachineHook>,
    on_transition: Vec<TransitionHook>,
}

impl StateMachine {
    /// Compile a spec: merge rules into the per-state transition table,
    /// check the unique start state, append wildcard transitions to every
    /// state's list and sort each list ascending by priority.
    pub(crate) fn compile(
        id: MachineId,
        spec: MachineSpec,
        history_capacity: usize,
    ) -> Result<Self, BuildError> {
        let MachineSpec {
            name,
            parent,
            priority,
            states,
            rules,
            on_state_enter,
            on_transition,
        } = spec;

        if rules.is_empty() {
            return Err(BuildError::NoRules);
        }

        let mut start = None;
        for state in &states {
            if state.is_start {
                match start {
                    None => start = Some(state.id),
                    Some(first) => {
                        return Err(BuildError::MultipleInitialStates {
                            first: states[first.index()].name.clone(),
                            second: state.name.clone(),
                        })
                    }
                }
            }
        }
        let Some(start) = start else {
            return Err(BuildError::MissingInitialState);
        };

        let mut table: Vec<Vec<Transition>> = (0..states.len()).map(|_| Vec::new()).collect();
        let mut wildcard: Vec<Transition> = Vec::new();
        for rule in &rules {
            match &rule.source {
                Source::States(ids) => {
                    for state in ids {
                        table[state.index()].extend(rule.transitions.iter().cloned());
                    }
                }
                Source::Any => wildcard.extend(rule.transitions.iter().cloned()),
            }
        }
        for row in &mut table {
            row.extend(wildcard.iter().cloned());
            // Stable, so declaration order breaks priority ties.
            row.sort_by_key(|t| t.priority);
        }

        Ok(Self {
            id,
            name,
            parent,
            priority,
            states,
            table,
            current: start,
            start,
            history: StateHistory::new(history_capacity),
            children: Vec::new(),
            is_cycle_complete: false,
            step_counter: 0,
            max_step_counter: 0,
            on_state_enter,
            on_transition,
        })
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<MachineId> {
        self.parent
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn current_state(&self) -> &State {
        &self.states[self.current.index()]
    }

    pub fn start_state(&self) -> &State {
        &self.states[self.start.index()]
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Look up a state by name within this machine.
    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    /// The compiled, priority-sorted outgoing transitions of a state.
    pub fn transitions_of(&self, state: StateId) -> &[Transition] {
        &self.table[state.index()]
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    /// True from the moment a transition lands on the start state until
    /// the next transition.
    pub fn is_cycle_complete(&self) -> bool {
        self.is_cycle_complete
    }

    pub fn step_counter(&self) -> u32 {
        self.step_counter
    }

    /// High-water mark of consecutive non-quiescent ticks.
    pub fn max_step_counter(&self) -> u32 {
        self.max_step_counter
    }

    pub fn children(&self) -> impl Iterator<Item = MachineId> + '_ {
        self.children.iter().map(|c| c.id)
    }

    /// One tick. Returns whether the caller should step again before the
    /// external frame ends (a transition just committed, or a descendant
    /// wants another tick).
    pub(crate) fn step(&mut self, tick: Tick, registry: &mut Registry) -> Result<bool, StepError> {
        let frame = tick.frame;
        let cur = self.current;

        // Enter-once: on the first tick in a state, record history and
        // fire enter hooks before anything else sees the state.
        if !self.states[cur.index()].is_reentry {
            if !self.gate(registry, cur, BreakPosition::BeforeEnter) {
                return Ok(false);
            }
            self.history.push(HistoryRecord {
                frame,
                at: Utc::now(),
                sim_time: tick.now,
                state: self.states[cur.index()].name.clone(),
            });
            self.fire_machine_enter(cur, frame);
            self.fire_hooks(cur, Phase::Enter, frame, None);
            self.states[cur.index()].enter(tick.now);
        }

        if !self.gate(registry, cur, BreakPosition::BeforeExecute) {
            return Ok(false);
        }
        self.fire_hooks(cur, Phase::Execute, frame, None);
        self.states[cur.index()].refresh_can_exit(tick.now);
        let dependencies_complete = match &self.states[cur.index()].exit_policy {
            ExitPolicy::DependsOn(deps) => Some(
                deps.iter()
                    .all(|dep| registry.machine_is_cycle_complete(*dep)),
            ),
            _ => None,
        };
        if let Some(complete) = dependencies_complete {
            self.states[cur.index()].can_exit = complete;
        }

        // One scan over the sorted candidates: the first match wins unless
        // a later candidate carries a strictly better priority and also
        // matches. Same-priority double matches are ambiguous and rejected
        // in debug builds.
        let mut matched: Option<(usize, i32)> = None;
        let mut else_candidate: Option<usize> = None;
        for (index, transition) in self.table[cur.index()].iter().enumerate() {
            if transition.is_else {
                if else_candidate.is_none() {
                    else_candidate = Some(index);
                }
                continue;
            }
            match matched {
                None => {
                    if transition.matches() {
                        matched = Some((index, transition.priority));
                    }
                }
                Some((_, best)) => {
                    if transition.priority < best {
                        if transition.matches() {
                            matched = Some((index, transition.priority));
                        }
                    } else if cfg!(debug_assertions)
                        && transition.priority == best
                        && transition.matches()
                    {
                        return Err(StepError::AmbiguousTransition {
                            machine: self.name.clone(),
                            state: self.states[cur.index()].name.clone(),
                            priority: best,
                        });
                    }
                }
            }
        }
        let chosen = matched.map(|(index, _)| index).or(else_candidate);

        let mut transitioned = false;
        if let Some(index) = chosen {
            if self.states[cur.index()].can_exit {
                let (target, transition_name) = {
                    let transition = &self.table[cur.index()][index];
                    (transition.target, transition.name.clone())
                };
                let next = match target {
                    Target::State(id) => id,
                    Target::Previous => match self.states[cur.index()].previous {
                        Some(id) => id,
                        None => {
                            return Err(StepError::UnresolvedPreviousTarget {
                                machine: self.name.clone(),
                                state: self.states[cur.index()].name.clone(),
                            })
                        }
                    },
                };
                if !self.gate(registry, cur, BreakPosition::BeforeExit) {
                    return Ok(false);
                }
                let next_name = self.states[next.index()].name.clone();
                self.fire_hooks(cur, Phase::Exit, frame, Some(&next_name));
                self.states[cur.index()].exit();
                self.states[next.index()].reset_reentry();
                self.is_cycle_complete = next == self.start;
                self.fire_transition_hooks(cur, next, transition_name.as_deref(), frame);
                self.states[next.index()].previous = Some(cur);
                self.current = next;
                transitioned = true;
            }
        }
        if !transitioned {
            let state = &mut self.states[cur.index()];
            state.is_reentry = true;
            state.reentry_count += 1;
        }

        // Children step after the machine itself, in priority order.
        // Child add/remove requested meanwhile is queued by the registry
        // and applied once this loop is done.
        let mut children_step_again = false;
        for child in &self.children {
            children_step_again |= registry.step_child(child.id, tick)?;
        }

        if transitioned || children_step_again {
            self.step_counter += 1;
            if self.step_counter > registry.step_ceiling() {
                tracing::error!(
                    machine = %self.name,
                    state = %self.states[self.current.index()].name,
                    steps = self.step_counter,
                    "step ceiling exceeded, runaway transition loop suspected"
                );
                tracing::error!(
                    machine = %self.name,
                    fatal = true,
                    "state machine is not reaching quiescence"
                );
            }
        } else {
            self.step_counter = 1;
        }
        self.max_step_counter = self.max_step_counter.max(self.step_counter);

        Ok(!self.states[self.current.index()].is_reentry || children_step_again)
    }

    fn gate(&self, registry: &mut Registry, state: StateId, position: BreakPosition) -> bool {
        registry.debug_gate(
            self.states[state.index()].debug_break,
            position,
            &self.name,
            &self.states[state.index()].name,
        )
    }

    fn fire_machine_enter(&mut self, state: StateId, frame: u64) {
        if self.on_state_enter.is_empty() {
            return;
        }
        let mut hooks = std::mem::take(&mut self.on_state_enter);
        {
            let state = &self.states[state.index()];
            let ctx = HookContext {
                state: &state.name,
                state_id: state.id,
                reentry_count: state.reentry_count,
                frame,
                next_state: None,
            };
            for hook in hooks.iter_mut() {
                hook(&ctx);
            }
        }
        self.on_state_enter = hooks;
    }

    fn fire_hooks(&self, state: StateId, phase: Phase, frame: u64, next_state: Option<&str>) {
        let state = &self.states[state.index()];
        let hooks: Vec<StateHook> = match phase {
            Phase::Enter => state.on_enter.clone(),
            Phase::Execute => state.on_execute.clone(),
            Phase::Exit => state.on_exit.clone(),
        };
        if hooks.is_empty() {
            return;
        }
        let ctx = HookContext {
            state: &state.name,
            state_id: state.id,
            reentry_count: state.reentry_count,
            frame,
            next_state,
        };
        for hook in &hooks {
            (hook.borrow_mut())(&ctx);
        }
    }

    fn fire_transition_hooks(
        &mut self,
        from: StateId,
        to: StateId,
        transition: Option<&str>,
        frame: u64,
    ) {
        if self.on_transition.is_empty() {
            return;
        }
        let mut hooks = std::mem::take(&mut self.on_transition);
        {
            let event = TransitionEvent {
                machine: &self.name,
                from: &self.states[from.index()].name,
                to: &self.states[to.index()].name,
                transition,
                frame,
            };
            for hook in hooks.iter_mut() {
                hook(&event);
            }
        }
        self.on_transition = hooks;
    }
}
