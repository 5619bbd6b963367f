//! Property-based checks over compiled tables and long idle runs.

use framestate::{Builder, Registry, RegistryConfig, Tick};
use proptest::prelude::*;
use std::time::Duration;

fn tick(frame: u64) -> Tick {
    Tick {
        frame,
        now: Duration::ZERO,
    }
}

proptest! {
    #[test]
    fn compiled_tables_stay_priority_sorted(
        priorities in prop::collection::vec(-1_000i32..1_000, 1..20),
        wildcards in prop::collection::vec(-1_000i32..1_000, 0..5),
    ) {
        let mut registry = Registry::new();
        let mut b = Builder::new("m");
        let a = b.state("A");
        let z = b.state("Z");
        b.initial(a);
        for &priority in &priorities {
            b.in_state(a).if_(|| false).then(z).priority(priority);
        }
        for &priority in &wildcards {
            b.in_any().if_(|| false).then(z).priority(priority);
        }
        let id = b.build(&mut registry).unwrap();

        let machine = registry.machine(id).unwrap();
        let compiled: Vec<i32> = machine
            .transitions_of(a)
            .iter()
            .map(|t| t.priority())
            .collect();
        prop_assert_eq!(compiled.len(), priorities.len() + wildcards.len());
        prop_assert!(compiled.windows(2).all(|w| w[0] <= w[1]));
        // Wildcard transitions also land on states with no rules of their own.
        prop_assert_eq!(machine.transitions_of(z).len(), wildcards.len());
    }

    #[test]
    fn idle_machines_accumulate_exactly_one_reentry_per_frame(frames in 1u64..60) {
        let mut registry = Registry::new();
        let mut b = Builder::new("m");
        let idle = b.state("Idle");
        let run = b.state("Run");
        b.initial(idle);
        b.in_state(idle).if_(|| false).then(run);
        let id = b.build(&mut registry).unwrap();

        for frame in 1..=frames {
            registry.run_frame(id, tick(frame)).unwrap();
        }

        let machine = registry.machine(id).unwrap();
        prop_assert_eq!(machine.current_state().name(), "Idle");
        prop_assert_eq!(machine.current_state().reentry_count(), frames as u32);
        prop_assert_eq!(machine.history().len(), 1);
    }

    #[test]
    fn history_is_bounded_by_its_configured_capacity(
        capacity in 1usize..10,
        steps in 1u64..60,
    ) {
        let mut registry = Registry::with_config(RegistryConfig {
            history_capacity: capacity,
            ..RegistryConfig::default()
        });
        let mut b = Builder::new("m");
        let a = b.state("A");
        let z = b.state("Z");
        b.initial(a);
        b.in_state(a).if_(|| true).then(z);
        b.in_state(z).if_(|| true).then(a);
        let id = b.build(&mut registry).unwrap();

        // One entry is recorded per step because every step transitions.
        for frame in 1..=steps {
            registry.step(id, tick(frame)).unwrap();
        }

        let machine = registry.machine(id).unwrap();
        prop_assert_eq!(machine.history().len(), (steps as usize).min(capacity));
        let expected = if machine.current_state().name() == "A" { "Z" } else { "A" };
        prop_assert_eq!(machine.history().last().unwrap().state.as_str(), expected);
    }
}
