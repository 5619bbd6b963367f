//! Bounded history of the states a machine has entered.
//!
//! The ring keeps the most recent entries only; the default capacity is
//! small because this exists for inspector tooling, not auditing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of records a machine retains.
pub const DEFAULT_HISTORY_CAPACITY: usize = 15;

/// One state entry as observed by the scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Host frame number of the tick that entered the state.
    pub frame: u64,
    /// Wall-clock capture time.
    pub at: DateTime<Utc>,
    /// Simulated time of the tick.
    pub sim_time: Duration,
    /// Name of the entered state.
    pub state: String,
}

/// Ring buffer of [`HistoryRecord`]s, oldest first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateHistory {
    capacity: usize,
    records: VecDeque<HistoryRecord>,
}

impl Default for StateHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl StateHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub(crate) fn push(&mut self, record: HistoryRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryRecord> {
        self.records.back()
    }

    /// The retained state names in entry order.
    pub fn path(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.state.as_str()).collect()
    }
}
