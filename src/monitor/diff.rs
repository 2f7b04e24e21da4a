//! Cycle-over-cycle change detection.
//!
//! The detector holds two snapshots keyed by (course, date): the committed
//! previous cycle and the cycle being assembled. It is owned exclusively by
//! the monitor task and never shared.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

/// Snapshot key: one course on one date.
pub type SlotKey = (String, NaiveDate);

/// Seat map for one (course, date): `HH:MM -> seats`.
pub type SeatMap = BTreeMap<String, u32>;

/// What changed for one (course, date) between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotDelta {
    /// Times absent last cycle.
    pub added: Vec<(String, u32)>,
    /// Times absent this cycle.
    pub removed: Vec<(String, u32)>,
    /// Times whose seat count strictly grew: (hhmm, old, new).
    pub increased: Vec<(String, u32, u32)>,
}

impl SlotDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.increased.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: HashMap<SlotKey, SeatMap>,
    current: HashMap<SlotKey, SeatMap>,
    /// False until the first commit, which suppresses the spurious
    /// "everything is new" diff on startup.
    primed: bool,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record this cycle's seat map for one (course, date).
    pub fn ingest(&mut self, course_key: impl Into<String>, date: NaiveDate, seats: SeatMap) {
        self.current.insert((course_key.into(), date), seats);
    }

    /// Compare the current cycle against the committed one. Empty on the
    /// first cycle.
    pub fn diff(&self) -> HashMap<SlotKey, SlotDelta> {
        if !self.primed {
            return HashMap::new();
        }

        let mut deltas: HashMap<SlotKey, SlotDelta> = HashMap::new();

        for (key, seats) in &self.current {
            let previous = self.previous.get(key);
            let mut delta = SlotDelta::default();

            for (hhmm, &count) in seats {
                match previous.and_then(|p| p.get(hhmm)) {
                    None => delta.added.push((hhmm.clone(), count)),
                    Some(&old) if count > old => delta.increased.push((hhmm.clone(), old, count)),
                    Some(_) => {}
                }
            }
            if let Some(previous) = previous {
                for (hhmm, &old) in previous {
                    if !seats.contains_key(hhmm) {
                        delta.removed.push((hhmm.clone(), old));
                    }
                }
            }

            if !delta.is_empty() {
                deltas.insert(key.clone(), delta);
            }
        }

        // Keys that vanished entirely this cycle.
        for (key, previous) in &self.previous {
            if !self.current.contains_key(key) {
                let removed: Vec<_> = previous.iter().map(|(h, &s)| (h.clone(), s)).collect();
                if !removed.is_empty() {
                    deltas.insert(
                        key.clone(),
                        SlotDelta {
                            removed,
                            ..SlotDelta::default()
                        },
                    );
                }
            }
        }

        deltas
    }

    /// Promote the current cycle to the baseline and start a fresh one.
    pub fn commit(&mut self) {
        self.previous = std::mem::take(&mut self.current);
        self.primed = true;
    }
}
