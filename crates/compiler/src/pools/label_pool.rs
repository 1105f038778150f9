//! Label pool (C3, spec §4.3): assigns globally unique random 32-bit state
//! ids to bytecode labels and synthetic states, one pool per method (spec
//! §5: "the label pool is per-method").

use std::collections::{HashMap, HashSet};

use nv_core::SplitMix64;

use crate::bytecode::LabelId;

pub struct LabelPool {
    rng: SplitMix64,
    assigned: HashMap<LabelId, i32>,
    used: HashSet<i32>,
}

impl LabelPool {
    pub fn new(seed: u64) -> Self {
        LabelPool {
            rng: SplitMix64::new(seed),
            assigned: HashMap::new(),
            used: HashSet::new(),
        }
    }

    fn draw_unused(&mut self) -> i32 {
        loop {
            let candidate = self.rng.next_i32();
            if self.used.insert(candidate) {
                return candidate;
            }
        }
    }

    /// Returns the state id for `label`, creating a new random one on first
    /// reference (spec §4.3: "creates a new random 32-bit id if absent").
    pub fn name_of(&mut self, label: LabelId) -> i32 {
        if let Some(&id) = self.assigned.get(&label) {
            return id;
        }
        let id = self.draw_unused();
        self.assigned.insert(label, id);
        id
    }

    /// Forces `label`'s state id, used after the pre-pass that walks every
    /// instruction position so that a label instruction takes the same id
    /// as the position it marks (spec §4.3).
    pub fn set_state(&mut self, label: LabelId, id: i32) {
        self.used.insert(id);
        self.assigned.insert(label, id);
    }

    /// Mint a fresh id with no associated label, for synthetic blocks: the
    /// post-end sentinel, catch landing pads, flattener helpers.
    pub fn new_standalone_state(&mut self) -> i32 {
        self.draw_unused()
    }

    pub fn get(&self, label: LabelId) -> Option<i32> {
        self.assigned.get(&label).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_label_returns_same_id() {
        let mut pool = LabelPool::new(1);
        let a = pool.name_of(LabelId(0));
        let b = pool.name_of(LabelId(0));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_labels_get_distinct_ids() {
        let mut pool = LabelPool::new(1);
        let a = pool.name_of(LabelId(0));
        let b = pool.name_of(LabelId(1));
        assert_ne!(a, b);
    }

    #[test]
    fn standalone_states_never_collide_with_assigned_labels() {
        let mut pool = LabelPool::new(9);
        let label_id = pool.name_of(LabelId(0));
        for _ in 0..50 {
            let standalone = pool.new_standalone_state();
            assert_ne!(standalone, label_id);
        }
    }

    #[test]
    fn set_state_pins_a_label_to_a_chosen_id() {
        let mut pool = LabelPool::new(3);
        pool.set_state(LabelId(5), 12345);
        assert_eq!(pool.get(LabelId(5)), Some(12345));
        assert_eq!(pool.name_of(LabelId(5)), 12345);
    }
}
