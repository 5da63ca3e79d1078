/*!
 * Result Set
 *
 * Typed, iterable view over one or more kernel output buffers plus
 * their shared query memory descriptor. Iteration skips empty entries,
 * resolves two-slot aggregates, count-distinct accumulators, and
 * dictionary-encoded strings.
 */

use crate::core::types::{slot_null_value, slot_to_fp, TypeDesc, TypeKind};
use crate::ir::agg::AggKind;
use crate::layout::descriptor::QueryMemoryDescriptor;
use crate::layout::output::OutputBuffer;
use crate::storage::provider::SchemaProvider;
use std::sync::Arc;

/// One materialized output value
#[derive(Debug, Clone, PartialEq)]
pub enum TargetValue {
    Null,
    Int(i64),
    Double(f64),
    Str(String),
}

impl TargetValue {
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, TargetValue::Null)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TargetValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TargetValue::Double(v) => Some(*v),
            TargetValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// A query's materialized output
pub struct ResultSet {
    buffers: Vec<OutputBuffer>,
    qmd: Arc<QueryMemoryDescriptor>,
    schema: Option<Arc<dyn SchemaProvider>>,
    /// Sorted entry order, when a terminal sort ran
    order: Option<Vec<(usize, usize)>>,
    offset: usize,
    limit: Option<usize>,
}

impl ResultSet {
    #[must_use]
    pub fn new(buffers: Vec<OutputBuffer>, qmd: Arc<QueryMemoryDescriptor>) -> Self {
        Self {
            buffers,
            qmd,
            schema: None,
            order: None,
            offset: 0,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Arc<dyn SchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    #[inline]
    #[must_use]
    pub fn qmd(&self) -> &Arc<QueryMemoryDescriptor> {
        &self.qmd
    }

    #[must_use]
    pub fn buffers(&self) -> &[OutputBuffer] {
        &self.buffers
    }

    #[must_use]
    pub fn target_types(&self) -> Vec<TypeDesc> {
        self.qmd.targets.iter().map(|t| t.ty).collect()
    }

    /// Occupied (buffer, entry) pairs in presentation order, before the
    /// offset/limit window.
    pub(crate) fn entries_unwindowed(&self) -> Vec<(usize, usize)> {
        match &self.order {
            Some(order) => order.clone(),
            None => self
                .buffers
                .iter()
                .enumerate()
                .flat_map(|(b, buf)| buf.occupied_entries().map(move |e| (b, e)))
                .collect(),
        }
    }

    pub(crate) fn entries_windowed(&self) -> Vec<(usize, usize)> {
        let mut entries = self.entries_unwindowed();
        let end = self
            .limit
            .map_or(entries.len(), |l| (self.offset + l).min(entries.len()));
        let start = self.offset.min(entries.len());
        entries.truncate(end);
        entries.drain(..start);
        entries
    }

    pub(crate) fn set_order(&mut self, order: Vec<(usize, usize)>) {
        self.order = Some(order);
    }

    /// Apply the terminal offset/limit window
    pub fn apply_window(&mut self, offset: usize, limit: Option<usize>) {
        self.offset = offset;
        self.limit = limit;
    }

    /// Number of result rows after windowing
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.entries_windowed().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Materialize every row
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<TargetValue>> {
        self.entries_windowed()
            .into_iter()
            .map(|(b, e)| self.row_at(b, e))
            .collect()
    }

    pub(crate) fn row_at(&self, buffer: usize, entry: usize) -> Vec<TargetValue> {
        (0..self.qmd.targets.len())
            .map(|t| self.target_value(buffer, entry, t))
            .collect()
    }

    /// Decode one target of one entry
    #[must_use]
    pub fn target_value(&self, buffer: usize, entry: usize, target_idx: usize) -> TargetValue {
        let buf = &self.buffers[buffer];
        let info = &self.qmd.targets[target_idx];
        let slot_desc = self.qmd.target_slots[target_idx];
        let slot = buf.slot(entry, slot_desc.slot_idx);

        match info.agg {
            Some(AggKind::Avg) => {
                let count = buf.slot(entry, slot_desc.slot_idx + 1);
                if count == 0 {
                    return TargetValue::Null;
                }
                let arg_fp = info.arg_ty.map_or(false, |t| t.kind.is_fp());
                let sum = if arg_fp { slot_to_fp(slot) } else { slot as f64 };
                TargetValue::Double(sum / count as f64)
            }
            Some(AggKind::CountDistinct) | Some(AggKind::ApproxCountDistinct) => {
                TargetValue::Int(buf.distinct_set(slot as usize).size())
            }
            _ => self.decode_slot(slot, &info.ty),
        }
    }

    fn decode_slot(&self, slot: i64, ty: &TypeDesc) -> TargetValue {
        if slot == slot_null_value(ty) {
            return TargetValue::Null;
        }
        if ty.kind.is_fp() {
            return TargetValue::Double(slot_to_fp(slot));
        }
        if let Some(dict_id) = ty.dict_id {
            if let Some(schema) = &self.schema {
                if let Some(dict) = schema.dictionary(dict_id) {
                    return match dict.get_string(slot as i32) {
                        Some(s) => TargetValue::Str(s),
                        None => TargetValue::Null,
                    };
                }
            }
            return TargetValue::Int(slot);
        }
        if ty.kind == TypeKind::Decimal && ty.scale > 0 {
            return TargetValue::Double(slot as f64 / 10f64.powi(ty.scale));
        }
        TargetValue::Int(slot)
    }

}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("buffers", &self.buffers.len())
            .field("hash_kind", &self.qmd.hash_kind)
            .field("rows", &self.row_count())
            .finish()
    }
}
