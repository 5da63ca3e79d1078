/*!
 * Columnar Exchange Format
 *
 * Converts a result set into a columnar tabular representation:
 * per-column fixed-width buffers at the declared type width, offset
 * buffers reserved for variable-length columns, and (id, dictionary)
 * pairs for dictionary-encoded strings. Lossless for fixed-width types.
 */

use super::result_set::{ResultSet, TargetValue};
use crate::core::types::{inline_int_null_value, DictId, TypeDesc, NULL_DOUBLE, NULL_FLOAT};
use crate::ir::agg::AggKind;

/// One exchanged column
#[derive(Debug, Clone)]
pub struct ColumnarColumn {
    pub ty: TypeDesc,
    /// Fixed-width little-endian values at the declared width
    pub buffer: Vec<u8>,
    /// Offsets into a payload region, for variable-length columns
    pub offsets: Option<Vec<i32>>,
    /// Dictionary handle for dictionary-encoded strings
    pub dict_id: Option<DictId>,
}

/// Columnar view of a result set
#[derive(Debug, Clone)]
pub struct ColumnarResults {
    pub row_count: usize,
    pub columns: Vec<ColumnarColumn>,
}

fn push_narrowed(buffer: &mut Vec<u8>, slot: i64, width: usize) {
    buffer.extend_from_slice(&slot.to_le_bytes()[..width]);
}

impl ColumnarResults {
    /// Materialize the columnar form of a result set
    #[must_use]
    pub fn from_result_set(rs: &ResultSet) -> Self {
        let types = rs.target_types();
        let rows = rs.rows_raw();
        let row_count = rows.len();

        let columns = types
            .iter()
            .enumerate()
            .map(|(t, ty)| {
                let width = ty.byte_width();
                let mut buffer = Vec::with_capacity(row_count * width);
                for row in &rows {
                    match &row[t] {
                        RawValue::Slot(slot) => {
                            if ty.kind.is_fp() {
                                let v = f64::from_bits(*slot as u64);
                                if width == 4 {
                                    let narrowed = if v == NULL_DOUBLE {
                                        NULL_FLOAT
                                    } else {
                                        v as f32
                                    };
                                    buffer.extend_from_slice(&narrowed.to_le_bytes());
                                } else {
                                    buffer.extend_from_slice(&v.to_le_bytes());
                                }
                            } else {
                                push_narrowed(&mut buffer, *slot, width);
                            }
                        }
                        RawValue::SlotNull => {
                            if ty.kind.is_fp() {
                                if width == 4 {
                                    buffer.extend_from_slice(&NULL_FLOAT.to_le_bytes());
                                } else {
                                    buffer.extend_from_slice(&NULL_DOUBLE.to_le_bytes());
                                }
                            } else {
                                push_narrowed(&mut buffer, inline_int_null_value(width), width);
                            }
                        }
                        RawValue::Computed(value) => match value {
                            TargetValue::Double(v) => {
                                buffer.extend_from_slice(&v.to_le_bytes());
                            }
                            TargetValue::Int(v) => push_narrowed(&mut buffer, *v, width),
                            _ => push_narrowed(&mut buffer, inline_int_null_value(width), width),
                        },
                    }
                }
                ColumnarColumn {
                    ty: *ty,
                    buffer,
                    offsets: ty.kind.is_varlen().then(Vec::new),
                    dict_id: ty.dict_id,
                }
            })
            .collect();

        Self { row_count, columns }
    }
}

/// A value on its way into the exchange buffer: either the raw slot
/// (sentinel-preserving, byte-exact after narrowing) or a computed
/// aggregate that has no slot form.
pub(super) enum RawValue {
    Slot(i64),
    SlotNull,
    Computed(TargetValue),
}

impl ResultSet {
    /// Rows in exchange form: raw slots where possible, computed values
    /// for AVG and count-distinct targets.
    pub(super) fn rows_raw(&self) -> Vec<Vec<RawValue>> {
        let qmd = std::sync::Arc::clone(self.qmd());
        self.entries_windowed()
            .into_iter()
            .map(|(b, e)| {
                (0..qmd.targets.len())
                    .map(|t| {
                        let info = &qmd.targets[t];
                        match info.agg {
                            Some(AggKind::Avg)
                            | Some(AggKind::CountDistinct)
                            | Some(AggKind::ApproxCountDistinct) => {
                                RawValue::Computed(self.target_value(b, e, t))
                            }
                            _ => {
                                let slot =
                                    self.buffers()[b].slot(e, qmd.target_slots[t].slot_idx);
                                if slot == crate::core::types::slot_null_value(&info.ty) {
                                    RawValue::SlotNull
                                } else {
                                    RawValue::Slot(slot)
                                }
                            }
                        }
                    })
                    .collect()
            })
            .collect()
    }
}
