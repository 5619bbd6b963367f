//! Declarative graph builder.
//!
//! The builder is the write-only front-end of the engine: callers intern
//! states by name, open rules over sets of co-located states and chain
//! guarded transitions onto them, then compile the whole thing into a
//! registered machine. The chain grammar is
//! `in_state → if_/if_not → then/wait → transition_name/priority → else_`;
//! violations are captured at the offending call and reported when the
//! builder is compiled.
//!
//! ```rust
//! use framestate::{Builder, Registry, Tick, Wait};
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let mut registry = Registry::new();
//! let mut b = Builder::new("lamp");
//! let off = b.state("Off");
//! let on = b.state("On");
//! b.initial(off);
//!
//! let switch = Rc::new(Cell::new(false));
//! let sensed = Rc::clone(&switch);
//! b.in_state(off)
//!     .if_(move || sensed.replace(false)) // one-shot flip request
//!     .then(on)
//!     .transition_name("flip");
//! b.in_state(on).else_().then(off);
//!
//! let lamp = b.build(&mut registry).unwrap();
//! switch.set(true);
//! registry
//!     .run_frame(lamp, Tick { frame: 1, now: Duration::ZERO })
//!     .unwrap();
//! // The else fallback immediately swings On back to Off, so one drained
//! // frame lands where it started.
//! assert_eq!(registry.current_state_name(lamp), Some("Off"));
//! let _ = Wait::Delay(Duration::from_secs(1));
//! ```

pub mod error;

pub use error::BuildError;

use crate::core::{
    ExitPolicy, HookContext, Rule, Source, State, StateHook, StateId, Target, Transition,
};
use crate::machine::{MachineHook, MachineSpec, TransitionEvent, TransitionHook};
use crate::registry::{MachineId, Registry};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// What a synthetic wait state waits for.
pub enum Wait {
    /// A fixed sim-time delay.
    Delay(Duration),
    /// A timeout recomputed every tick; `None` means "no timeout".
    Dynamic(Box<dyn Fn() -> Option<Duration>>),
    /// Completion of every listed machine's cycle.
    Machines(Vec<MachineId>),
}

struct TransitionStatement {
    name: Option<String>,
    condition: Rc<dyn Fn() -> bool>,
    target: Option<Target>,
    priority: i32,
    is_else: bool,
    waits: Vec<StateId>,
}

struct RuleStatement {
    source: Source,
    transitions: Vec<TransitionStatement>,
    has_else: bool,
}

/// Fluent, write-only builder producing a [`MachineSpec`].
///
/// All chaining methods return `&mut Self`; the first grammar violation
/// is remembered and returned from [`Builder::into_spec`] /
/// [`Builder::build`].
pub struct Builder {
    name: String,
    parent: Option<MachineId>,
    priority: i32,
    states: Vec<State>,
    index: HashMap<String, StateId>,
    statements: Vec<RuleStatement>,
    on_state_enter: Vec<MachineHook>,
    on_transition: Vec<TransitionHook>,
    error: Option<BuildError>,
    wait_counter: u32,
}

impl Builder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            priority: 0,
            states: Vec::new(),
            index: HashMap::new(),
            statements: Vec::new(),
            on_state_enter: Vec::new(),
            on_transition: Vec::new(),
            error: None,
            wait_counter: 0,
        }
    }

    /// Register the compiled machine as a child of `parent`.
    pub fn parent(&mut self, parent: MachineId) -> &mut Self {
        self.parent = Some(parent);
        self
    }

    /// Sibling ordering priority of the compiled machine (higher steps first).
    pub fn machine_priority(&mut self, priority: i32) -> &mut Self {
        self.priority = priority;
        self
    }

    /// Intern a state by name. Names are unique within one builder, so
    /// repeated calls with the same name return the same id.
    pub fn state(&mut self, name: &str) -> StateId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = StateId(self.states.len() as u32);
        self.states.push(State::new(name, id));
        self.index.insert(name.to_string(), id);
        id
    }

    /// Flag the machine's start state. Exactly one state must be flagged
    /// across all rules.
    pub fn initial(&mut self, state: StateId) -> &mut Self {
        if self.check_state(state, "initial") {
            self.states[state.index()].is_start = true;
        }
        self
    }

    /// Open a rule over a single state.
    pub fn in_state(&mut self, state: StateId) -> &mut Self {
        self.in_states(&[state])
    }

    /// Open a rule over a set of co-located states.
    pub fn in_states(&mut self, states: &[StateId]) -> &mut Self {
        if states.is_empty() {
            return self.fail(BuildError::EmptyRule);
        }
        for &id in states {
            if !self.check_state(id, "in_states") {
                return self;
            }
        }
        self.statements.push(RuleStatement {
            source: Source::States(states.to_vec()),
            transitions: Vec::new(),
            has_else: false,
        });
        self
    }

    /// Open a wildcard rule: its transitions apply to every state.
    pub fn in_any(&mut self) -> &mut Self {
        self.statements.push(RuleStatement {
            source: Source::Any,
            transitions: Vec::new(),
            has_else: false,
        });
        self
    }

    /// Append a guarded transition to the open rule.
    pub fn if_(&mut self, condition: impl Fn() -> bool + 'static) -> &mut Self {
        self.push_transition(Rc::new(condition), false, "if_")
    }

    /// Append a transition guarded by the negated predicate.
    pub fn if_not(&mut self, condition: impl Fn() -> bool + 'static) -> &mut Self {
        self.push_transition(Rc::new(move || !condition()), false, "if_not")
    }

    /// Append the rule's fallback transition, taken only when no ordinary
    /// transition matched. At most one per rule.
    pub fn else_(&mut self) -> &mut Self {
        let Some(has_else) = self.statements.last().map(|rule| rule.has_else) else {
            return self.fail(BuildError::NoOpenRule { verb: "else_" });
        };
        if has_else {
            return self.fail(BuildError::DuplicateElse);
        }
        if let Some(rule) = self.statements.last_mut() {
            rule.has_else = true;
        }
        self.push_transition(Rc::new(|| true), true, "else_")
    }

    /// Bind the most recent transition's target.
    pub fn then(&mut self, target: StateId) -> &mut Self {
        if !self.check_state(target, "then") {
            return self;
        }
        self.bind_target(Target::State(target), "then")
    }

    /// Bind the most recent transition to the previous-state sentinel,
    /// resolved at commit time to the exited state's back-reference.
    pub fn then_previous(&mut self) -> &mut Self {
        self.bind_target(Target::Previous, "then_previous")
    }

    /// Insert a synthetic wait state between the most recent transition's
    /// condition and its target. Several waits chain in declaration order.
    pub fn wait(&mut self, wait: Wait) -> &mut Self {
        let name = format!("{}.Wait{}", self.name, self.wait_counter);
        self.wait_counter += 1;
        self.insert_wait(name, wait)
    }

    /// Like [`Builder::wait`], with an explicit state name so hooks or
    /// extra rules can be attached to the wait state. The name must not
    /// be one already interned by [`Builder::state`].
    pub fn wait_named(&mut self, name: &str, wait: Wait) -> &mut Self {
        self.wait_counter += 1;
        self.insert_wait(name.to_string(), wait)
    }

    /// Name the most recent transition (diagnostics only).
    pub fn transition_name(&mut self, name: &str) -> &mut Self {
        if let Some(transition) = self.open_transition("transition_name") {
            transition.name = Some(name.to_string());
        }
        self
    }

    /// Set the most recent transition's priority. Lower values win.
    pub fn priority(&mut self, priority: i32) -> &mut Self {
        if let Some(transition) = self.open_transition("priority") {
            transition.priority = priority;
        }
        self
    }

    pub fn transition_name_and_priority(&mut self, name: &str, priority: i32) -> &mut Self {
        self.transition_name(name).priority(priority)
    }

    /// Attach an enter hook to every state of the open rule.
    pub fn on_enter_do(&mut self, hook: impl FnMut(&HookContext) + 'static) -> &mut Self {
        self.attach_hook(hook, HookSlot::Enter, "on_enter_do")
    }

    /// Attach an execute hook (fired every tick) to every state of the
    /// open rule.
    pub fn always_do(&mut self, hook: impl FnMut(&HookContext) + 'static) -> &mut Self {
        self.attach_hook(hook, HookSlot::Execute, "always_do")
    }

    /// Attach an exit hook to every state of the open rule.
    pub fn on_exit_do(&mut self, hook: impl FnMut(&HookContext) + 'static) -> &mut Self {
        self.attach_hook(hook, HookSlot::Exit, "on_exit_do")
    }

    /// Give a state a fixed exit timeout.
    pub fn timeout(&mut self, state: StateId, timeout: Duration) -> &mut Self {
        if self.check_state(state, "timeout") {
            self.states[state.index()].exit_policy = ExitPolicy::After(timeout);
        }
        self
    }

    /// Give a state a dynamic timeout, re-evaluated every tick.
    pub fn timeout_fn(
        &mut self,
        state: StateId,
        timeout: impl Fn() -> Option<Duration> + 'static,
    ) -> &mut Self {
        if self.check_state(state, "timeout_fn") {
            self.states[state.index()].exit_policy = ExitPolicy::Dynamic(Box::new(timeout));
        }
        self
    }

    /// Make a state exitable only once every listed machine has completed
    /// a cycle.
    pub fn depends_on(&mut self, state: StateId, machines: Vec<MachineId>) -> &mut Self {
        if self.check_state(state, "depends_on") {
            self.states[state.index()].exit_policy = ExitPolicy::DependsOn(machines);
        }
        self
    }

    /// Flag a state for the debugger's breakpoint gate.
    pub fn debug_break(&mut self, state: StateId) -> &mut Self {
        if self.check_state(state, "debug_break") {
            self.states[state.index()].debug_break = true;
        }
        self
    }

    /// Machine-level hook fired before any state's own enter hooks.
    pub fn machine_on_enter(&mut self, hook: impl FnMut(&HookContext) + 'static) -> &mut Self {
        self.on_state_enter.push(Box::new(hook));
        self
    }

    /// Machine-level hook fired whenever a transition commits.
    pub fn machine_on_transition(
        &mut self,
        hook: impl FnMut(&TransitionEvent) + 'static,
    ) -> &mut Self {
        self.on_transition.push(Box::new(hook));
        self
    }

    /// Rewrite every already-declared transition targeting `old` to point
    /// at `new` instead. Used for late rewiring of generic targets.
    pub fn replace_target(&mut self, old: StateId, new: StateId) -> &mut Self {
        if !self.check_state(old, "replace_target") || !self.check_state(new, "replace_target") {
            return self;
        }
        for rule in &mut self.statements {
            for transition in &mut rule.transitions {
                if transition.target == Some(Target::State(old)) {
                    transition.target = Some(Target::State(new));
                }
            }
        }
        self
    }

    /// Flatten the declared statements into a [`MachineSpec`],
    /// materializing wait-state chains. Consumes the builder.
    pub fn into_spec(mut self) -> Result<MachineSpec, BuildError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if self.statements.is_empty() {
            return Err(BuildError::NoRules);
        }

        let statements = std::mem::take(&mut self.statements);
        let mut rules = Vec::new();
        let mut wait_rules = Vec::new();
        for statement in statements {
            let RuleStatement {
                source,
                transitions,
                ..
            } = statement;
            let mut compiled = Vec::new();
            for ts in transitions {
                let target = match ts.target {
                    Some(target) => target,
                    None => {
                        return Err(BuildError::DanglingTransition {
                            rule: describe_source(&source, &self.states),
                        })
                    }
                };
                if ts.waits.is_empty() {
                    compiled.push(Transition {
                        name: ts.name,
                        condition: ts.condition,
                        target,
                        priority: ts.priority,
                        is_else: ts.is_else,
                    });
                } else {
                    // The guarded hop lands on the first wait state; the
                    // chain continues unconditionally to the real target.
                    compiled.push(Transition {
                        name: ts.name,
                        condition: ts.condition,
                        target: Target::State(ts.waits[0]),
                        priority: ts.priority,
                        is_else: ts.is_else,
                    });
                    for pair in ts.waits.windows(2) {
                        wait_rules.push(Rule::new(
                            Source::States(vec![pair[0]]),
                            vec![Transition::always(Target::State(pair[1]))],
                        ));
                    }
                    let last = ts.waits[ts.waits.len() - 1];
                    wait_rules.push(Rule::new(
                        Source::States(vec![last]),
                        vec![Transition::always(target)],
                    ));
                }
            }
            rules.push(Rule::new(source, compiled));
        }
        rules.extend(wait_rules);

        Ok(MachineSpec {
            name: self.name,
            parent: self.parent,
            priority: self.priority,
            states: self.states,
            rules,
            on_state_enter: self.on_state_enter,
            on_transition: self.on_transition,
        })
    }

    /// Compile and register the machine with the given registry.
    pub fn build(self, registry: &mut Registry) -> Result<MachineId, BuildError> {
        let spec = self.into_spec()?;
        registry.create(spec)
    }

    fn fail(&mut self, error: BuildError) -> &mut Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    fn check_state(&mut self, id: StateId, verb: &'static str) -> bool {
        if id.index() < self.states.len() {
            true
        } else {
            self.fail(BuildError::UnknownState { verb });
            false
        }
    }

    fn push_transition(
        &mut self,
        condition: Rc<dyn Fn() -> bool>,
        is_else: bool,
        verb: &'static str,
    ) -> &mut Self {
        let Some(rule) = self.statements.last_mut() else {
            return self.fail(BuildError::NoOpenRule { verb });
        };
        rule.transitions.push(TransitionStatement {
            name: None,
            condition,
            target: None,
            priority: crate::core::DEFAULT_PRIORITY,
            is_else,
            waits: Vec::new(),
        });
        self
    }

    fn bind_target(&mut self, target: Target, verb: &'static str) -> &mut Self {
        enum Bind {
            Missing,
            Taken,
            Bound,
        }
        let outcome = match self.open_transition(verb) {
            None => Bind::Missing,
            Some(transition) => {
                if transition.target.is_some() {
                    Bind::Taken
                } else {
                    transition.target = Some(target);
                    Bind::Bound
                }
            }
        };
        if let Bind::Taken = outcome {
            self.fail(BuildError::TargetAlreadyBound { verb });
        }
        self
    }

    fn insert_wait(&mut self, name: String, wait: Wait) -> &mut Self {
        if self.open_transition("wait").is_none() {
            return self;
        }
        // A wait state must be fresh; reusing an interned state would
        // silently overwrite its exit policy.
        if self.index.contains_key(&name) {
            return self.fail(BuildError::WaitNameCollision(name));
        }
        let id = self.state(&name);
        self.states[id.index()].exit_policy = match wait {
            Wait::Delay(timeout) => ExitPolicy::After(timeout),
            Wait::Dynamic(timeout_fn) => ExitPolicy::Dynamic(timeout_fn),
            Wait::Machines(machines) => ExitPolicy::DependsOn(machines),
        };
        if let Some(transition) = self.open_transition("wait") {
            transition.waits.push(id);
        }
        self
    }

    fn attach_hook(
        &mut self,
        hook: impl FnMut(&HookContext) + 'static,
        slot: HookSlot,
        verb: &'static str,
    ) -> &mut Self {
        let source = self.statements.last().map(|rule| match &rule.source {
            Source::Any => None,
            Source::States(ids) => Some(ids.clone()),
        });
        let ids = match source {
            None => return self.fail(BuildError::NoOpenRule { verb }),
            Some(None) => return self.fail(BuildError::WildcardHooks { verb }),
            Some(Some(ids)) => ids,
        };
        let hook: StateHook = Rc::new(RefCell::new(hook));
        for id in ids {
            let state = &mut self.states[id.index()];
            match slot {
                HookSlot::Enter => state.on_enter.push(Rc::clone(&hook)),
                HookSlot::Execute => state.on_execute.push(Rc::clone(&hook)),
                HookSlot::Exit => state.on_exit.push(Rc::clone(&hook)),
            }
        }
        self
    }

    fn open_transition(&mut self, verb: &'static str) -> Option<&mut TransitionStatement> {
        if self.statements.last().is_none() {
            self.fail(BuildError::NoOpenRule { verb });
            return None;
        }
        let has_transition = self
            .statements
            .last()
            .is_some_and(|rule| !rule.transitions.is_empty());
        if !has_transition {
            self.fail(BuildError::NoOpenTransition { verb });
            return None;
        }
        self.statements
            .last_mut()
            .and_then(|rule| rule.transitions.last_mut())
    }
}

#[derive(Clone, Copy)]
enum HookSlot {
    Enter,
    Execute,
    Exit,
}

fn describe_source(source: &Source, states: &[State]) -> String {
    match source {
        Source::Any => "any state".to_string(),
        Source::States(ids) => ids
            .first()
            .map(|id| states[id.index()].name().to_string())
            .unwrap_or_else(|| "empty rule".to_string()),
    }
}
