//! Machine ownership, identity and frame scheduling.
//!
//! The registry is the single context object the host holds. It owns
//! every compiled machine, hands out dense [`MachineId`]s, drives ticks
//! down the parent/child hierarchy, and absorbs structural mutations
//! (attach, detach, destroy) requested while a machine is mid-step so
//! the hierarchy never changes under an active child loop.

use crate::builder::BuildError;
use crate::debug::{BreakPosition, Debugger};
use crate::machine::{ChildRef, MachineSpec, StateMachine, StepError, Tick};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Opaque handle to a registered machine. Ids are assigned densely in
/// creation order and never reused within a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineId(pub(crate) u64);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Tunables shared by every machine in a registry.
#[derive(Clone, Copy, Debug)]
pub struct RegistryConfig {
    /// Consecutive non-quiescent ticks tolerated before the runaway
    /// diagnostic fires. The machine keeps running either way.
    pub step_ceiling: u32,
    /// Ring size of each machine's state history.
    pub history_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            step_ceiling: 100,
            history_capacity: crate::core::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

enum PendingOp {
    Attach {
        parent: MachineId,
        child: MachineId,
        priority: i32,
    },
    Detach {
        parent: MachineId,
        child: MachineId,
    },
}

enum HandleOp {
    Destroy(MachineId),
}

/// Cheap clonable handle for requesting registry mutations from inside
/// hooks, where no `&mut Registry` can be had. Requests are applied once
/// the outermost step returns.
#[derive(Clone)]
pub struct RegistryHandle {
    ops: Rc<RefCell<Vec<HandleOp>>>,
}

impl RegistryHandle {
    /// Queue a machine (and its subtree) for destruction.
    pub fn destroy(&self, id: MachineId) {
        self.ops.borrow_mut().push(HandleOp::Destroy(id));
    }
}

pub struct Registry {
    config: RegistryConfig,
    // A vacant slot means the machine is currently taken out for stepping.
    machines: HashMap<MachineId, Option<StateMachine>>,
    roots: Vec<MachineId>,
    next_id: u64,
    debugger: Debugger,
    pending: Vec<PendingOp>,
    ops: Rc<RefCell<Vec<HandleOp>>>,
    step_depth: u32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            machines: HashMap::new(),
            roots: Vec::new(),
            next_id: 0,
            debugger: Debugger::new(),
            pending: Vec::new(),
            ops: Rc::new(RefCell::new(Vec::new())),
            step_depth: 0,
        }
    }

    /// Compile a spec and register the resulting machine. Machines with a
    /// parent are slotted into the parent's child list by priority; if the
    /// parent is mid-step the attach is deferred until its tick completes.
    pub fn create(&mut self, spec: MachineSpec) -> Result<MachineId, BuildError> {
        if let Some(parent) = spec.parent {
            if !self.machines.contains_key(&parent) {
                return Err(BuildError::UnknownParent(parent));
            }
        }
        let parent = spec.parent;
        let priority = spec.priority;
        let id = MachineId(self.next_id);
        let machine = StateMachine::compile(id, spec, self.config.history_capacity)?;
        // claimed only once compilation succeeds, so ids stay dense
        self.next_id += 1;
        self.machines.insert(id, Some(machine));
        match parent {
            None => self.roots.push(id),
            Some(parent) => match self.machines.get_mut(&parent) {
                Some(Some(machine)) => {
                    insert_child_sorted(&mut machine.children, ChildRef { id, priority })
                }
                _ => self.pending.push(PendingOp::Attach {
                    parent,
                    child: id,
                    priority,
                }),
            },
        }
        Ok(id)
    }

    /// Remove a machine and its whole subtree. Hooks request this through
    /// a [`RegistryHandle`] instead, which defers the removal until the
    /// outermost step returns, so a machine may destroy itself from its
    /// own hooks. Returns `false` if the id is unknown.
    pub fn destroy(&mut self, id: MachineId) -> bool {
        if !self.machines.contains_key(&id) {
            return false;
        }
        self.detach_from_owner(id);
        self.remove_subtree(id);
        true
    }

    /// Re-home an existing machine under a new parent at the given child
    /// priority.
    pub fn attach_child(
        &mut self,
        parent: MachineId,
        child: MachineId,
        priority: i32,
    ) -> Result<(), BuildError> {
        if !self.machines.contains_key(&parent) {
            return Err(BuildError::UnknownParent(parent));
        }
        if !self.machines.contains_key(&child) {
            return Err(BuildError::UnknownChild(child));
        }
        self.detach_from_owner(child);
        if let Some(Some(machine)) = self.machines.get_mut(&child) {
            machine.parent = Some(parent);
        }
        match self.machines.get_mut(&parent) {
            Some(Some(machine)) => {
                insert_child_sorted(&mut machine.children, ChildRef { id: child, priority })
            }
            _ => self.pending.push(PendingOp::Attach {
                parent,
                child,
                priority,
            }),
        }
        Ok(())
    }

    /// Detach a machine from its parent and promote it to a root.
    pub fn detach_child(&mut self, child: MachineId) -> Result<(), BuildError> {
        if !self.machines.contains_key(&child) {
            return Err(BuildError::UnknownChild(child));
        }
        self.detach_from_owner(child);
        if let Some(Some(machine)) = self.machines.get_mut(&child) {
            machine.parent = None;
        }
        if !self.roots.contains(&child) {
            self.roots.push(child);
        }
        Ok(())
    }

    /// One tick of a machine and, recursively, its children. Returns
    /// whether the machine asks to be stepped again this frame.
    pub fn step(&mut self, id: MachineId, tick: Tick) -> Result<bool, StepError> {
        let Some(slot) = self.machines.get_mut(&id) else {
            return Err(StepError::UnknownMachine(id));
        };
        let Some(mut machine) = slot.take() else {
            // already on the step stack, never re-entered
            return Ok(false);
        };
        self.step_depth += 1;
        let result = machine.step(tick, self);
        self.step_depth -= 1;
        self.put_back(machine);
        if self.step_depth == 0 {
            self.drain_handle_ops();
        }
        result
    }

    /// Step a machine repeatedly until it reports quiescence for this
    /// frame's tick.
    pub fn run_frame(&mut self, root: MachineId, tick: Tick) -> Result<(), StepError> {
        while self.step(root, tick)? {}
        Ok(())
    }

    /// Drain a frame across every root machine.
    pub fn run_frame_all(&mut self, tick: Tick) -> Result<(), StepError> {
        let roots = self.roots.clone();
        for root in roots {
            if self.machines.contains_key(&root) {
                self.run_frame(root, tick)?;
            }
        }
        Ok(())
    }

    /// Tear everything down, logging any machine the host forgot to
    /// destroy first.
    pub fn shutdown(&mut self) {
        for (id, slot) in &self.machines {
            if let Some(machine) = slot {
                tracing::error!(machine = %machine.name(), id = %id, "machine still registered at shutdown");
            }
        }
        self.machines.clear();
        self.roots.clear();
        self.pending.clear();
        self.ops.borrow_mut().clear();
    }

    /// Borrow a registered machine. Returns `None` while the machine is
    /// mid-step or after it was destroyed.
    pub fn machine(&self, id: MachineId) -> Option<&StateMachine> {
        self.machines.get(&id).and_then(|slot| slot.as_ref())
    }

    pub fn current_state_name(&self, id: MachineId) -> Option<&str> {
        self.machine(id).map(|m| m.current_state().name())
    }

    /// Cycle flag of a machine; `false` for unknown or mid-step machines.
    pub fn machine_is_cycle_complete(&self, id: MachineId) -> bool {
        self.machine(id).is_some_and(|m| m.is_cycle_complete())
    }

    pub fn roots(&self) -> &[MachineId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle {
            ops: Rc::clone(&self.ops),
        }
    }

    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut self.debugger
    }

    /// Flag or clear a breakpoint on one state of one machine. Returns
    /// `false` if the machine or state does not exist.
    pub fn set_debug_break(&mut self, machine: MachineId, state: &str, on: bool) -> bool {
        let Some(Some(machine)) = self.machines.get_mut(&machine) else {
            return false;
        };
        let Some(state) = machine.states.iter_mut().find(|s| s.name() == state) else {
            return false;
        };
        state.debug_break = on;
        true
    }

    pub(crate) fn step_ceiling(&self) -> u32 {
        self.config.step_ceiling
    }

    pub(crate) fn debug_gate(
        &mut self,
        flagged: bool,
        position: BreakPosition,
        machine: &str,
        state: &str,
    ) -> bool {
        self.debugger.gate(flagged, position, machine, state)
    }

    /// Child-loop stepping: a child destroyed earlier in the same pass is
    /// skipped, not an error.
    pub(crate) fn step_child(&mut self, id: MachineId, tick: Tick) -> Result<bool, StepError> {
        if !self.machines.contains_key(&id) {
            return Ok(false);
        }
        self.step(id, tick)
    }

    fn put_back(&mut self, mut machine: StateMachine) {
        let id = machine.id;
        self.apply_pending_for(&mut machine);
        // drops the machine if its slot was removed while it stepped
        if let Some(slot) = self.machines.get_mut(&id) {
            *slot = Some(machine);
        }
    }

    fn remove_subtree(&mut self, id: MachineId) {
        if let Some(Some(machine)) = self.machines.remove(&id) {
            for child in &machine.children {
                self.remove_subtree(child.id);
            }
        }
        if let Some(pos) = self.roots.iter().position(|&r| r == id) {
            self.roots.remove(pos);
        }
        // queued ops naming a removed machine must not outlive it
        self.pending.retain(|op| match op {
            PendingOp::Attach { parent, child, .. } => *parent != id && *child != id,
            PendingOp::Detach { parent, child } => *parent != id && *child != id,
        });
    }

    fn detach_from_owner(&mut self, child: MachineId) {
        if let Some(pos) = self.roots.iter().position(|&r| r == child) {
            self.roots.remove(pos);
            return;
        }
        let parent = match self.machines.get(&child) {
            Some(Some(machine)) => machine.parent,
            _ => None,
        };
        let Some(parent) = parent else { return };
        match self.machines.get_mut(&parent) {
            Some(Some(machine)) => machine.children.retain(|c| c.id != child),
            Some(None) => self.pending.push(PendingOp::Detach { parent, child }),
            None => {}
        }
    }

    fn apply_pending_for(&mut self, machine: &mut StateMachine) {
        if self.pending.is_empty() {
            return;
        }
        let id = machine.id;
        let mut kept = Vec::with_capacity(self.pending.len());
        for op in self.pending.drain(..) {
            match op {
                PendingOp::Attach {
                    parent,
                    child,
                    priority,
                } if parent == id => {
                    if self.machines.contains_key(&child) {
                        insert_child_sorted(&mut machine.children, ChildRef { id: child, priority });
                    }
                }
                PendingOp::Detach { parent, child } if parent == id => {
                    machine.children.retain(|c| c.id != child);
                }
                other => kept.push(other),
            }
        }
        self.pending = kept;
    }

    fn drain_handle_ops(&mut self) {
        loop {
            let ops: Vec<HandleOp> = self.ops.borrow_mut().drain(..).collect();
            if ops.is_empty() {
                break;
            }
            for op in ops {
                match op {
                    HandleOp::Destroy(id) => {
                        self.destroy(id);
                    }
                }
            }
        }
    }
}

/// Siblings stay sorted descending by priority; equal priorities keep
/// insertion order.
fn insert_child_sorted(children: &mut Vec<ChildRef>, child: ChildRef) {
    let pos = children
        .iter()
        .position(|c| c.priority < child.priority)
        .unwrap_or(children.len());
    children.insert(pos, child);
}
