/*!
 * Output Buffer
 *
 * A kernel's typed output region: quad slots pre-initialized with the
 * descriptor's empty values, plus the count-distinct accumulator arena
 * addressed by slot-held indexes.
 */

use super::descriptor::{HashKind, QueryMemoryDescriptor};
use crate::core::limits::EMPTY_KEY_64;
use crate::runtime::CountDistinctSet;
use std::sync::Arc;

/// Owned output buffer for one kernel invocation.
///
/// Allocated and initialized before launch, written only by its kernel,
/// then owned by the result set. Count-distinct slots hold indexes into
/// the arena rather than pointers so teardown order is irrelevant.
#[derive(Debug)]
pub struct OutputBuffer {
    qmd: Arc<QueryMemoryDescriptor>,
    buf: Vec<i64>,
    distinct_sets: Vec<CountDistinctSet>,
    /// Valid row prefix for the projection layout
    matched_rows: usize,
}

impl OutputBuffer {
    #[must_use]
    pub fn new(qmd: Arc<QueryMemoryDescriptor>) -> Self {
        let mut buf = qmd.init_states();
        let n_distinct = qmd.distinct_target_count();
        let mut distinct_sets = Vec::with_capacity(qmd.entry_count * n_distinct);
        if n_distinct > 0 {
            for entry in 0..qmd.entry_count {
                for (target_idx, slot) in qmd.target_slots.iter().enumerate() {
                    if let Some(ordinal) = slot.distinct_ordinal {
                        let desc = qmd.count_distinct_descriptors[target_idx]
                            .expect("distinct ordinal without descriptor");
                        let arena_idx = entry * n_distinct + ordinal;
                        distinct_sets.push(desc.make_set());
                        buf[qmd.slot_index(entry, slot.slot_idx)] = arena_idx as i64;
                    }
                }
            }
        }
        Self {
            qmd,
            buf,
            distinct_sets,
            matched_rows: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn qmd(&self) -> &Arc<QueryMemoryDescriptor> {
        &self.qmd
    }

    #[inline]
    #[must_use]
    pub fn slots(&self) -> &[i64] {
        &self.buf
    }

    #[inline]
    pub fn slots_mut(&mut self) -> &mut [i64] {
        &mut self.buf
    }

    /// Split borrow for aggregate updates that touch both the slot array
    /// and the distinct arena.
    #[inline]
    pub fn slots_and_sets(&mut self) -> (&mut [i64], &mut [CountDistinctSet]) {
        (&mut self.buf, &mut self.distinct_sets)
    }

    #[inline]
    #[must_use]
    pub fn slot(&self, entry: usize, slot: usize) -> i64 {
        self.buf[self.qmd.slot_index(entry, slot)]
    }

    #[inline]
    #[must_use]
    pub fn key(&self, entry: usize, k: usize) -> i64 {
        self.buf[self.qmd.key_index(entry, k)]
    }

    #[inline]
    #[must_use]
    pub fn matched_rows(&self) -> usize {
        self.matched_rows
    }

    pub fn set_matched_rows(&mut self, rows: usize) {
        self.matched_rows = rows;
    }

    #[inline]
    #[must_use]
    pub fn distinct_set(&self, arena_idx: usize) -> &CountDistinctSet {
        &self.distinct_sets[arena_idx]
    }

    #[must_use]
    pub fn distinct_sets(&self) -> &[CountDistinctSet] {
        &self.distinct_sets
    }

    /// Whether an entry holds no group
    #[must_use]
    pub fn entry_is_empty(&self, entry: usize) -> bool {
        match self.qmd.hash_kind {
            HashKind::None => false,
            HashKind::Projection => entry >= self.matched_rows,
            _ => {
                if self.qmd.keyless {
                    match self.qmd.keyless_count_slot {
                        Some(slot) => self.slot(entry, slot) == 0,
                        None => false,
                    }
                } else {
                    self.key(entry, 0) == EMPTY_KEY_64
                }
            }
        }
    }

    /// Occupied entry indexes in buffer order
    pub fn occupied_entries(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.qmd.entry_count).filter(move |&e| !self.entry_is_empty(e))
    }

    /// Replace the slot contents, for GPU shared-memory write-back
    pub fn overwrite(&mut self, data: Vec<i64>) {
        debug_assert_eq!(data.len(), self.buf.len());
        self.buf = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{TypeDesc, TypeKind};
    use crate::ir::agg::{AggKind, TargetExpr};
    use crate::ir::expr::Expr;
    use crate::layout::distinct::CountDistinctDescriptor;

    fn make_qmd(distinct: bool) -> Arc<QueryMemoryDescriptor> {
        let col = Expr::col(1, 0, TypeDesc::new(TypeKind::Int, false));
        let targets = vec![
            TargetExpr::count_star(),
            if distinct {
                TargetExpr::aggregate(AggKind::CountDistinct, col)
            } else {
                TargetExpr::aggregate(AggKind::Sum, col)
            },
        ];
        let descs: Vec<_> = targets
            .iter()
            .map(|t| match t.agg {
                Some(AggKind::CountDistinct) => {
                    Some(CountDistinctDescriptor::choose(Some((0, 63)), false))
                }
                _ => None,
            })
            .collect();
        let (infos, slots, slot_count) = QueryMemoryDescriptor::assign_slots(&targets, &descs);
        Arc::new(QueryMemoryDescriptor {
            hash_kind: HashKind::PerfectHashOneCol,
            key_count: 1,
            entry_count: 4,
            min_val: 0,
            max_val: 3,
            bucket: 1,
            keyless: false,
            keyless_count_slot: None,
            multi_key_ranges: Vec::new(),
            output_columnar: false,
            use_streaming_top_n: false,
            targets: infos,
            target_slots: slots,
            slot_count,
            count_distinct_descriptors: descs,
            warp_count: 1,
            blocks_share_memory: false,
        })
    }

    #[test]
    fn test_fresh_buffer_is_all_empty() {
        let out = OutputBuffer::new(make_qmd(false));
        assert_eq!(out.occupied_entries().count(), 0);
    }

    #[test]
    fn test_distinct_arena_wiring() {
        let out = OutputBuffer::new(make_qmd(true));
        // each entry's distinct slot holds its arena index
        for entry in 0..4 {
            let arena_idx = out.slot(entry, 1) as usize;
            assert_eq!(arena_idx, entry);
            assert_eq!(out.distinct_set(arena_idx).size(), 0);
        }
    }

    #[test]
    fn test_entry_becomes_occupied_when_key_written() {
        let mut out = OutputBuffer::new(make_qmd(false));
        let qmd = Arc::clone(out.qmd());
        out.slots_mut()[qmd.key_index(2, 0)] = 42;
        let occupied: Vec<_> = out.occupied_entries().collect();
        assert_eq!(occupied, vec![2]);
    }
}
