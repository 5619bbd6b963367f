//! States: named nodes with enter/execute/exit hooks and exit gating.
//!
//! A `State` belongs to exactly one machine. Its identity is a dense
//! [`StateId`] assigned in first-seen order while the builder interns
//! names, which keeps id assignment deterministic across runs.

use crate::registry::MachineId;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Dense per-machine state index. Stable for the machine's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct StateId(pub(crate) u32);

impl StateId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Context handed to every state hook when it fires.
///
/// Hooks run inside the scheduler's tick, so they see the state by
/// identity rather than by reference; anything else the hook needs it
/// captures itself.
pub struct HookContext<'a> {
    /// Name of the state the hook is attached to.
    pub state: &'a str,
    /// Dense id of that state.
    pub state_id: StateId,
    /// Ticks spent idling in this state since the last entry.
    pub reentry_count: u32,
    /// Host frame number of the current tick.
    pub frame: u64,
    /// For exit hooks, the name of the state being transitioned to.
    pub next_state: Option<&'a str>,
}

/// A registered state hook. Hooks fire in registration order; one hook
/// may be shared by several states (rule-level registration), hence the
/// `Rc<RefCell<..>>`.
pub type StateHook = Rc<RefCell<dyn FnMut(&HookContext)>>;

/// When a state allows the scheduler to leave it.
///
/// `Dynamic` is re-evaluated on every tick; a `None` result means "no
/// timeout" and the state is exitable immediately (the moral equivalent
/// of a negative timespan in timeline-driven hosts).
pub enum ExitPolicy {
    /// Exitable from the moment it is entered.
    Immediate,
    /// Exitable once the given sim-time duration has elapsed since entry.
    After(Duration),
    /// Timeout recomputed every tick.
    Dynamic(Box<dyn Fn() -> Option<Duration>>),
    /// Exitable once every referenced machine reports a complete cycle.
    DependsOn(Vec<MachineId>),
}

/// A named node in a compiled machine.
///
/// Mutable run flags (`is_reentry`, `can_exit`, ...) are owned by the
/// scheduler; hosts observe them read-only through the accessors.
pub struct State {
    pub(crate) name: String,
    pub(crate) id: StateId,
    pub(crate) on_enter: Vec<StateHook>,
    pub(crate) on_execute: Vec<StateHook>,
    pub(crate) on_exit: Vec<StateHook>,
    pub(crate) exit_policy: ExitPolicy,
    pub(crate) is_start: bool,
    pub(crate) is_reentry: bool,
    pub(crate) reentry_count: u32,
    pub(crate) entry_count: u32,
    pub(crate) can_exit: bool,
    pub(crate) entered: bool,
    pub(crate) is_cycle_complete: bool,
    pub(crate) was_timeout_forced: bool,
    pub(crate) entered_at: Option<Duration>,
    pub(crate) previous: Option<StateId>,
    pub(crate) debug_break: bool,
}

impl State {
    pub fn new(name: impl Into<String>, id: StateId) -> Self {
        Self {
            name: name.into(),
            id,
            on_enter: Vec::new(),
            on_execute: Vec::new(),
            on_exit: Vec::new(),
            exit_policy: ExitPolicy::Immediate,
            is_start: false,
            is_reentry: false,
            reentry_count: 0,
            entry_count: 0,
            can_exit: false,
            entered: false,
            is_cycle_complete: false,
            was_timeout_forced: false,
            entered_at: None,
            previous: None,
            debug_break: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    /// True on any tick after the first entry, until the state is exited.
    pub fn is_reentry(&self) -> bool {
        self.is_reentry
    }

    pub fn reentry_count(&self) -> u32 {
        self.reentry_count
    }

    pub fn can_exit(&self) -> bool {
        self.can_exit
    }

    pub fn entered(&self) -> bool {
        self.entered
    }

    /// Flips true on every second entry ("came back around").
    pub fn is_cycle_complete(&self) -> bool {
        self.is_cycle_complete
    }

    pub fn was_timeout_forced(&self) -> bool {
        self.was_timeout_forced
    }

    /// The state a transition most recently arrived from.
    pub fn previous(&self) -> Option<StateId> {
        self.previous
    }

    pub fn debug_break(&self) -> bool {
        self.debug_break
    }

    /// Entry bookkeeping: stamps the entry instant and computes the
    /// initial exitability from the exit policy.
    pub(crate) fn enter(&mut self, now: Duration) {
        self.entered = true;
        self.is_reentry = true;
        self.entered_at = Some(now);
        self.was_timeout_forced = false;
        self.entry_count = self.entry_count.wrapping_add(1);
        self.is_cycle_complete = self.entry_count % 2 == 0;
        self.can_exit = match &self.exit_policy {
            ExitPolicy::Immediate => true,
            ExitPolicy::After(timeout) => timeout.is_zero(),
            ExitPolicy::Dynamic(timeout_fn) => timeout_fn().is_none_or(|t| t.is_zero()),
            ExitPolicy::DependsOn(_) => false,
        };
    }

    /// Re-evaluates timeout expiry. Runs every tick so dynamic timeout
    /// functions are honored even when they change after entry.
    /// Dependency gating is resolved by the scheduler, which can see the
    /// referenced machines.
    pub(crate) fn refresh_can_exit(&mut self, now: Duration) {
        let elapsed = self
            .entered_at
            .map(|at| now.saturating_sub(at))
            .unwrap_or_default();
        match &self.exit_policy {
            ExitPolicy::Immediate => self.can_exit = true,
            ExitPolicy::After(timeout) => {
                if elapsed >= *timeout {
                    if !self.can_exit && !timeout.is_zero() {
                        self.was_timeout_forced = true;
                    }
                    self.can_exit = true;
                }
            }
            ExitPolicy::Dynamic(timeout_fn) => match timeout_fn() {
                None => self.can_exit = true,
                Some(timeout) => {
                    let expired = elapsed >= timeout;
                    if expired && !self.can_exit && !timeout.is_zero() {
                        self.was_timeout_forced = true;
                    }
                    self.can_exit = expired;
                }
            },
            ExitPolicy::DependsOn(_) => {}
        }
    }

    pub(crate) fn exit(&mut self) {
        self.is_reentry = false;
        self.entered = false;
        self.entered_at = None;
    }

    /// Applied to a transition's target the moment the transition commits.
    pub(crate) fn reset_reentry(&mut self) {
        self.is_reentry = false;
        self.reentry_count = 0;
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("entered", &self.entered)
            .field("is_reentry", &self.is_reentry)
            .field("can_exit", &self.can_exit)
            .field("is_cycle_complete", &self.is_cycle_complete)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_clean_flags() {
        let state = State::new("Idle", StateId(0));
        assert_eq!(state.name(), "Idle");
        assert_eq!(state.id(), StateId(0));
        assert!(!state.entered());
        assert!(!state.is_reentry());
        assert!(!state.can_exit());
        assert!(!state.is_cycle_complete());
        assert_eq!(state.previous(), None);
    }

    #[test]
    fn immediate_policy_is_exitable_on_entry() {
        let mut state = State::new("Idle", StateId(0));
        state.enter(Duration::ZERO);
        assert!(state.can_exit());
        assert!(state.entered());
        assert!(state.is_reentry());
    }

    #[test]
    fn zero_timeout_is_exitable_on_entry() {
        let mut state = State::new("Wait", StateId(0));
        state.exit_policy = ExitPolicy::After(Duration::ZERO);
        state.enter(Duration::ZERO);
        assert!(state.can_exit());
        assert!(!state.was_timeout_forced());
    }

    #[test]
    fn fixed_timeout_expires_with_sim_time() {
        let mut state = State::new("Wait", StateId(0));
        state.exit_policy = ExitPolicy::After(Duration::from_secs(1));
        state.enter(Duration::from_secs(10));
        assert!(!state.can_exit());

        state.refresh_can_exit(Duration::from_millis(10_500));
        assert!(!state.can_exit());

        state.refresh_can_exit(Duration::from_secs(11));
        assert!(state.can_exit());
        assert!(state.was_timeout_forced());
    }

    #[test]
    fn dynamic_none_means_no_timeout() {
        let mut state = State::new("Wait", StateId(0));
        state.exit_policy = ExitPolicy::Dynamic(Box::new(|| None));
        state.enter(Duration::ZERO);
        assert!(state.can_exit());
    }

    #[test]
    fn dynamic_timeout_is_reevaluated_every_tick() {
        let timeout = Rc::new(std::cell::Cell::new(Duration::from_secs(5)));
        let seen = Rc::clone(&timeout);
        let mut state = State::new("Wait", StateId(0));
        state.exit_policy = ExitPolicy::Dynamic(Box::new(move || Some(seen.get())));

        state.enter(Duration::ZERO);
        assert!(!state.can_exit());

        // Shrinking the timeout mid-flight takes effect on the next tick.
        timeout.set(Duration::from_secs(1));
        state.refresh_can_exit(Duration::from_secs(2));
        assert!(state.can_exit());

        // Growing it back revokes exitability.
        timeout.set(Duration::from_secs(10));
        state.refresh_can_exit(Duration::from_secs(3));
        assert!(!state.can_exit());
    }

    #[test]
    fn cycle_complete_flips_on_alternate_entries() {
        let mut state = State::new("Idle", StateId(0));
        state.enter(Duration::ZERO);
        assert!(!state.is_cycle_complete());
        state.exit();
        state.enter(Duration::ZERO);
        assert!(state.is_cycle_complete());
        state.exit();
        state.enter(Duration::ZERO);
        assert!(!state.is_cycle_complete());
    }

    #[test]
    fn exit_clears_entry_flags() {
        let mut state = State::new("Idle", StateId(0));
        state.enter(Duration::ZERO);
        state.exit();
        assert!(!state.entered());
        assert!(!state.is_reentry());
        assert_eq!(state.entered_at, None);
    }
}
