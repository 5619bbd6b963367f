//! Framestate is an embeddable, frame-driven hierarchical state machine
//! engine. Machines are declared through a fluent [`Builder`], compiled
//! into priority-sorted transition tables and registered with a
//! [`Registry`] that the host ticks once per frame. Conditions and hooks
//! are plain closures; time is simulated and supplied by the host, which
//! keeps every run deterministic.
//!
//! # Quick start
//!
//! ```rust
//! use framestate::{Builder, Registry, Tick};
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let mut registry = Registry::new();
//! let mut b = Builder::new("door");
//! let closed = b.state("Closed");
//! let open = b.state("Open");
//! b.initial(closed);
//!
//! let requested = Rc::new(Cell::new(false));
//! let sensed = Rc::clone(&requested);
//! b.in_state(closed)
//!     .if_(move || sensed.take())
//!     .then(open)
//!     .transition_name("open the door");
//!
//! let door = b.build(&mut registry).unwrap();
//! let tick = |frame| Tick { frame, now: Duration::ZERO };
//!
//! registry.run_frame(door, tick(1)).unwrap();
//! assert_eq!(registry.current_state_name(door), Some("Closed"));
//!
//! requested.set(true);
//! registry.run_frame(door, tick(2)).unwrap();
//! assert_eq!(registry.current_state_name(door), Some("Open"));
//! ```
//!
//! # Hierarchy
//!
//! Machines compose: a child built with [`Builder::parent`] (or attached
//! later via [`Registry::attach_child`]) steps inside its parent's tick,
//! after the parent, ordered by child priority. States can gate their
//! exit on descendant machines completing a cycle, on fixed or dynamic
//! sim-time timeouts, or on nothing at all.
//!
//! # Observability
//!
//! Every machine keeps a bounded entry history, a [`Debugger`] can halt
//! flagged states at enter, execute or exit, and [`Registry::snapshot`]
//! captures the whole tree as plain serializable data. Runaway
//! transition loops are detected against a configurable step ceiling and
//! reported through `tracing` without stopping the machine.

pub mod builder;
pub mod core;
pub mod debug;
pub mod machine;
pub mod registry;
pub mod snapshot;

pub use builder::{BuildError, Builder, Wait};
pub use crate::core::{
    ExitPolicy, HistoryRecord, HookContext, Source, State, StateHistory, StateId, Target,
    Transition, DEFAULT_HISTORY_CAPACITY, DEFAULT_PRIORITY,
};
pub use debug::{BreakHit, BreakMode, BreakPosition, Debugger};
pub use machine::{MachineSpec, StateMachine, StepError, Tick, TransitionEvent};
pub use registry::{MachineId, Registry, RegistryConfig, RegistryHandle};
pub use snapshot::{MachineSnapshot, RegistrySnapshot};
