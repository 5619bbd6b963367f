//! Breakpoint gate polled by the scheduler.
//!
//! A [`Debugger`] lives on the registry and is consulted before every
//! enter, execute and exit of a state flagged with a breakpoint. While a
//! break is held the machine makes no progress; each call to
//! [`Debugger::request_step`] arms exactly one gate crossing.

/// Whether breakpoints are honored at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BreakMode {
    #[default]
    Off,
    On,
}

/// Phase of the tick at which a break can trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakPosition {
    BeforeEnter,
    BeforeExecute,
    BeforeExit,
}

/// The last gate that refused passage, for inspection by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakHit {
    pub machine: String,
    pub state: String,
    pub position: BreakPosition,
}

#[derive(Default)]
pub struct Debugger {
    mode: BreakMode,
    // None breaks at every position
    position: Option<BreakPosition>,
    step_armed: bool,
    last_hit: Option<BreakHit>,
}

impl Debugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> BreakMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BreakMode) {
        self.mode = mode;
    }

    pub fn position(&self) -> Option<BreakPosition> {
        self.position
    }

    /// Restrict breaks to one tick phase; `None` breaks at all three.
    pub fn set_position(&mut self, position: Option<BreakPosition>) {
        self.position = position;
    }

    /// Arm a single crossing of the next tripped gate.
    pub fn request_step(&mut self) {
        self.step_armed = true;
    }

    pub fn last_hit(&self) -> Option<&BreakHit> {
        self.last_hit.as_ref()
    }

    pub fn clear_hit(&mut self) {
        self.last_hit = None;
    }

    /// Returns whether the scheduler may proceed past this point.
    pub(crate) fn gate(
        &mut self,
        state_flagged: bool,
        position: BreakPosition,
        machine: &str,
        state: &str,
    ) -> bool {
        if self.mode == BreakMode::Off || !state_flagged {
            return true;
        }
        if self.position.is_some_and(|p| p != position) {
            return true;
        }
        if self.step_armed {
            self.step_armed = false;
            return true;
        }
        self.last_hit = Some(BreakHit {
            machine: machine.to_owned(),
            state: state.to_owned(),
            position,
        });
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_is_open_while_mode_is_off() {
        let mut debugger = Debugger::new();
        assert!(debugger.gate(true, BreakPosition::BeforeEnter, "m", "A"));
        assert!(debugger.last_hit().is_none());
    }

    #[test]
    fn flagged_state_blocks_and_records_the_hit() {
        let mut debugger = Debugger::new();
        debugger.set_mode(BreakMode::On);
        assert!(!debugger.gate(true, BreakPosition::BeforeExecute, "m", "A"));
        let hit = debugger.last_hit().unwrap();
        assert_eq!(hit.machine, "m");
        assert_eq!(hit.state, "A");
        assert_eq!(hit.position, BreakPosition::BeforeExecute);
    }

    #[test]
    fn unflagged_states_pass_even_while_broken() {
        let mut debugger = Debugger::new();
        debugger.set_mode(BreakMode::On);
        assert!(debugger.gate(false, BreakPosition::BeforeEnter, "m", "A"));
    }

    #[test]
    fn position_filter_narrows_where_breaks_trip() {
        let mut debugger = Debugger::new();
        debugger.set_mode(BreakMode::On);
        debugger.set_position(Some(BreakPosition::BeforeExit));
        assert!(debugger.gate(true, BreakPosition::BeforeEnter, "m", "A"));
        assert!(debugger.gate(true, BreakPosition::BeforeExecute, "m", "A"));
        assert!(!debugger.gate(true, BreakPosition::BeforeExit, "m", "A"));
    }

    #[test]
    fn request_step_opens_exactly_one_crossing() {
        let mut debugger = Debugger::new();
        debugger.set_mode(BreakMode::On);
        debugger.request_step();
        assert!(debugger.gate(true, BreakPosition::BeforeEnter, "m", "A"));
        assert!(!debugger.gate(true, BreakPosition::BeforeExecute, "m", "A"));
    }
}
