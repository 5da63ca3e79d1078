/*!
 * Terminal Sort
 *
 * Applies ORDER BY / LIMIT / OFFSET to a reduced result set. Single
 * fixed-width integer keys take a radix path; everything else falls back
 * to a comparator. Limited queries below the streaming threshold use a
 * bounded heap instead of sorting the full output.
 */

use super::result_set::{ResultSet, TargetValue};
use crate::core::limits::STREAMING_TOP_N_MAX;
use crate::ir::unit::{OrderEntry, SortInfo};
use crate::layout::descriptor::TargetSlot;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::debug;

/// Compare two key tuples under the order specification
fn compare_keys(a: &[TargetValue], b: &[TargetValue], order: &[OrderEntry]) -> Ordering {
    for (entry, (av, bv)) in order.iter().zip(a.iter().zip(b)) {
        let ord = match (av, bv) {
            (TargetValue::Null, TargetValue::Null) => Ordering::Equal,
            (TargetValue::Null, _) => {
                if entry.nulls_first {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (_, TargetValue::Null) => {
                if entry.nulls_first {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (TargetValue::Str(x), TargetValue::Str(y)) => x.cmp(y),
            (x, y) => {
                let xf = x.as_f64().unwrap_or(f64::NAN);
                let yf = y.as_f64().unwrap_or(f64::NAN);
                xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
            }
        };
        let ord = if entry.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

struct HeapItem {
    keys: Vec<TargetValue>,
    pos: (usize, usize),
    order: Arc<[OrderEntry]>,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.keys, &other.keys, &self.order)
    }
}

/// Whether a single-key order can take the radix path
fn radix_eligible(rs: &ResultSet, order: &[OrderEntry]) -> Option<(usize, TargetSlot)> {
    if order.len() != 1 {
        return None;
    }
    let target_idx = order[0].target_idx;
    let info = rs.qmd().targets.get(target_idx)?;
    if info.agg.is_some() {
        // aggregate values need decoding (AVG pairs, distinct sets)
        return None;
    }
    let ty = info.ty;
    if ty.kind.is_fp() || ty.kind.is_string() || ty.dict_id.is_some() {
        return None;
    }
    Some((target_idx, rs.qmd().target_slots[target_idx]))
}

/// Order-preserving u64 transform of an i64 sort key
#[inline]
fn radix_key(v: i64, ascending: bool) -> u64 {
    let k = (v ^ i64::MIN) as u64;
    if ascending {
        k
    } else {
        !k
    }
}

/// LSD radix sort of (key, payload) pairs
fn radix_sort(mut items: Vec<(u64, (usize, usize))>) -> Vec<(u64, (usize, usize))> {
    let mut scratch = vec![(0u64, (0usize, 0usize)); items.len()];
    for pass in 0..8 {
        let shift = pass * 8;
        let mut counts = [0usize; 256];
        for (k, _) in &items {
            counts[((k >> shift) & 0xff) as usize] += 1;
        }
        let mut offsets = [0usize; 256];
        let mut running = 0;
        for (i, c) in counts.iter().enumerate() {
            offsets[i] = running;
            running += c;
        }
        for item in &items {
            let bucket = ((item.0 >> shift) & 0xff) as usize;
            scratch[offsets[bucket]] = *item;
            offsets[bucket] += 1;
        }
        std::mem::swap(&mut items, &mut scratch);
    }
    items
}

/// Sort a reduced result set in place and apply its window
pub fn sort_result_set(rs: &mut ResultSet, sort_info: &SortInfo) {
    if sort_info.is_empty() {
        rs.apply_window(sort_info.offset, sort_info.limit);
        return;
    }
    let entries = rs.entries_unwindowed();
    let order: Arc<[OrderEntry]> = sort_info.order_entries.clone().into();

    let use_heap = sort_info
        .top_n()
        .map_or(false, |n| n <= STREAMING_TOP_N_MAX && n < entries.len());

    let sorted: Vec<(usize, usize)> = if let Some((target_idx, _slot)) = radix_eligible(rs, &order)
    {
        debug!(rows = entries.len(), "radix sort path");
        let ascending = order[0].ascending;
        let nulls_first = order[0].nulls_first;
        let mut nulls = Vec::new();
        let mut keyed = Vec::with_capacity(entries.len());
        for (b, e) in entries {
            match rs.target_value(b, e, target_idx) {
                TargetValue::Null => nulls.push((b, e)),
                TargetValue::Int(v) => keyed.push((radix_key(v, ascending), (b, e))),
                other => {
                    // stats lied about the type; comparator fallback
                    debug!(?other, "unexpected radix key value");
                    keyed.push((radix_key(0, ascending), (b, e)));
                }
            }
        }
        let sorted_keys = radix_sort(keyed);
        let mut result = Vec::with_capacity(sorted_keys.len() + nulls.len());
        if nulls_first {
            result.extend(nulls.iter().copied());
        }
        result.extend(sorted_keys.into_iter().map(|(_, pos)| pos));
        if !nulls_first {
            result.extend(nulls);
        }
        result
    } else if use_heap {
        let n = sort_info.top_n().unwrap_or(entries.len());
        debug!(rows = entries.len(), n, "bounded heap top-n path");
        let mut heap: BinaryHeap<HeapItem> = BinaryHeap::with_capacity(n + 1);
        for (b, e) in entries {
            let keys: Vec<TargetValue> = order
                .iter()
                .map(|o| rs.target_value(b, e, o.target_idx))
                .collect();
            // skip entries worse than the current in-heap worst
            if heap.len() == n {
                if let Some(worst) = heap.peek() {
                    if compare_keys(&keys, &worst.keys, &order) != Ordering::Less {
                        continue;
                    }
                }
            }
            heap.push(HeapItem {
                keys,
                pos: (b, e),
                order: Arc::clone(&order),
            });
            if heap.len() > n {
                heap.pop();
            }
        }
        heap.into_sorted_vec().into_iter().map(|i| i.pos).collect()
    } else {
        debug!(rows = entries.len(), "comparator sort path");
        let mut keyed: Vec<(Vec<TargetValue>, (usize, usize))> = entries
            .into_iter()
            .map(|(b, e)| {
                let keys = order
                    .iter()
                    .map(|o| rs.target_value(b, e, o.target_idx))
                    .collect();
                (keys, (b, e))
            })
            .collect();
        keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, &order));
        keyed.into_iter().map(|(_, pos)| pos).collect()
    };

    rs.set_order(sorted);
    rs.apply_window(sort_info.offset, sort_info.limit);
}
