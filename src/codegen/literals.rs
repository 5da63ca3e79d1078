/*!
 * Literal Hoisting
 *
 * Constants appearing in a query's expressions are emitted once into a
 * per-device literal buffer; row functions load them by index instead of
 * carrying immediates. The buffer is deduplicated by slot value.
 */

use ahash::RandomState;
use std::collections::HashMap;

/// Literal buffer under construction during lowering
#[derive(Debug, Default)]
pub struct LiteralBuffer {
    slots: Vec<i64>,
    dedup: HashMap<i64, usize, RandomState>,
}

impl LiteralBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            dedup: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Intern a slot value, returning its stable index
    pub fn intern(&mut self, slot: i64) -> usize {
        if let Some(&idx) = self.dedup.get(&slot) {
            return idx;
        }
        let idx = self.slots.len();
        self.slots.push(slot);
        self.dedup.insert(slot, idx);
        idx
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Freeze into the per-device blob handed to kernels
    #[must_use]
    pub fn finalize(self) -> Vec<i64> {
        self.slots
    }
}
