//! Read-only serializable captures of registry state.
//!
//! Snapshots exist for inspection and diagnostics. They carry no
//! closures, so they serialize cleanly with `serde_json`, and they are
//! not a persistence format: a snapshot cannot be loaded back.

use crate::core::HistoryRecord;
use crate::machine::StateMachine;
use crate::registry::{MachineId, Registry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capture of a single machine and, recursively, its children.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub id: MachineId,
    pub name: String,
    pub priority: i32,
    pub current_state: String,
    pub start_state: String,
    pub is_cycle_complete: bool,
    pub step_counter: u32,
    pub max_step_counter: u32,
    pub states: Vec<String>,
    pub history: Vec<HistoryRecord>,
    pub children: Vec<MachineSnapshot>,
}

/// Capture of every machine tree in a registry at one instant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub machines: Vec<MachineSnapshot>,
}

impl Registry {
    /// Capture the full registry. Machines currently mid-step are skipped.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            machines: self
                .roots()
                .iter()
                .filter_map(|&root| self.snapshot_machine(root))
                .collect(),
        }
    }

    fn snapshot_machine(&self, id: MachineId) -> Option<MachineSnapshot> {
        let machine: &StateMachine = self.machine(id)?;
        Some(MachineSnapshot {
            id,
            name: machine.name().to_owned(),
            priority: machine.priority(),
            current_state: machine.current_state().name().to_owned(),
            start_state: machine.start_state().name().to_owned(),
            is_cycle_complete: machine.is_cycle_complete(),
            step_counter: machine.step_counter(),
            max_step_counter: machine.max_step_counter(),
            states: machine.states().iter().map(|s| s.name().to_owned()).collect(),
            history: machine.history().records().cloned().collect(),
            children: machine
                .children()
                .filter_map(|child| self.snapshot_machine(child))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::machine::Tick;
    use std::time::Duration;

    #[test]
    fn snapshot_mirrors_the_hierarchy() {
        let mut registry = Registry::new();

        let mut b = Builder::new("parent");
        let idle = b.state("Idle");
        let busy = b.state("Busy");
        b.initial(idle);
        b.in_state(idle).if_(|| true).then(busy);
        let parent = b.build(&mut registry).unwrap();

        let mut b = Builder::new("child");
        let a = b.state("A");
        let z = b.state("Z");
        b.initial(a);
        b.parent(parent);
        b.in_state(a).if_(|| false).then(z);
        b.build(&mut registry).unwrap();

        registry
            .step(
                parent,
                Tick {
                    frame: 1,
                    now: Duration::ZERO,
                },
            )
            .unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.machines.len(), 1);
        let root = &snapshot.machines[0];
        assert_eq!(root.name, "parent");
        assert_eq!(root.current_state, "Busy");
        assert_eq!(root.history.len(), 1);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "child");
        assert_eq!(root.children[0].current_state, "A");
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut registry = Registry::new();
        let mut b = Builder::new("solo");
        let a = b.state("A");
        let z = b.state("Z");
        b.initial(a);
        b.in_state(a).if_(|| false).then(z);
        b.build(&mut registry).unwrap();

        let snapshot = registry.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, snapshot.id);
        assert_eq!(parsed.machines.len(), 1);
        assert_eq!(parsed.machines[0].states, vec!["A", "Z"]);
    }
}
