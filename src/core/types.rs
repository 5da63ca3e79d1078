/*!
 * Core Types
 * Scalar type system and null sentinel conventions shared across the engine
 */

use serde::{Deserialize, Serialize};

/// Table identifier
pub type TableId = u32;

/// Column identifier within a table
pub type ColumnId = u32;

/// Fragment identifier within a table
pub type FragmentId = u32;

/// String dictionary identifier
pub type DictId = u32;

/// Null sentinel for 8-byte signed integers (and epoch-encoded temporals)
pub const NULL_BIGINT: i64 = i64::MIN;

/// Null sentinel for 4-byte signed integers
pub const NULL_INT: i32 = i32::MIN;

/// Null sentinel for 2-byte signed integers
pub const NULL_SMALLINT: i16 = i16::MIN;

/// Null sentinel for 1-byte signed integers and booleans
pub const NULL_TINYINT: i8 = i8::MIN;

/// Null sentinel for 4-byte floats (most negative finite value)
pub const NULL_FLOAT: f32 = f32::MIN;

/// Null sentinel for 8-byte floats (most negative finite value)
pub const NULL_DOUBLE: f64 = f64::MIN;

/// Inline null sentinel for a signed integer of the given byte width,
/// widened to i64. Decoders widen stored values without remapping the
/// sentinel, so null checks compare against the width's own minimum.
#[inline(always)]
#[must_use]
pub const fn inline_int_null_value(byte_width: usize) -> i64 {
    match byte_width {
        1 => NULL_TINYINT as i64,
        2 => NULL_SMALLINT as i64,
        4 => NULL_INT as i64,
        _ => NULL_BIGINT,
    }
}

/// Inline null sentinel for a float of the given byte width, widened to f64
#[inline(always)]
#[must_use]
pub fn inline_fp_null_value(byte_width: usize) -> f64 {
    if byte_width == 4 {
        NULL_FLOAT as f64
    } else {
        NULL_DOUBLE
    }
}

/// Scalar type kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    /// Fixed-point decimal: i64 mantissa plus a scale carried by the type
    Decimal,
    Date,
    Time,
    Timestamp,
    Interval,
    /// Fixed-length character string
    Char,
    /// Variable-length text, raw or dictionary-encoded as an i32 id
    Text,
    /// Fixed-length array of a scalar element
    FixedArray,
    /// Variable-length array of a scalar element
    Array,
}

impl TypeKind {
    /// Physical width in bytes for fixed-width kinds; var-length kinds
    /// report the width of their inline representation (dictionary id or
    /// offset word).
    #[inline]
    #[must_use]
    pub const fn byte_width(self) -> usize {
        match self {
            TypeKind::Boolean | TypeKind::TinyInt => 1,
            TypeKind::SmallInt => 2,
            TypeKind::Int | TypeKind::Float => 4,
            TypeKind::BigInt
            | TypeKind::Double
            | TypeKind::Decimal
            | TypeKind::Date
            | TypeKind::Time
            | TypeKind::Timestamp
            | TypeKind::Interval => 8,
            TypeKind::Char | TypeKind::Text => 4,
            TypeKind::FixedArray | TypeKind::Array => 8,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            TypeKind::Boolean
                | TypeKind::TinyInt
                | TypeKind::SmallInt
                | TypeKind::Int
                | TypeKind::BigInt
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_fp(self) -> bool {
        matches!(self, TypeKind::Float | TypeKind::Double)
    }

    #[inline]
    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            TypeKind::Date | TypeKind::Time | TypeKind::Timestamp | TypeKind::Interval
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_string(self) -> bool {
        matches!(self, TypeKind::Char | TypeKind::Text)
    }

    #[inline]
    #[must_use]
    pub const fn is_varlen(self) -> bool {
        matches!(self, TypeKind::Array)
    }
}

/// Full type descriptor: kind plus nullability and encoding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TypeDesc {
    pub kind: TypeKind,
    pub nullable: bool,
    /// Decimal scale (digits right of the point); zero otherwise
    pub scale: i32,
    /// Dictionary id for dictionary-encoded text
    pub dict_id: Option<DictId>,
}

impl TypeDesc {
    #[inline]
    #[must_use]
    pub const fn new(kind: TypeKind, nullable: bool) -> Self {
        Self {
            kind,
            nullable,
            scale: 0,
            dict_id: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn decimal(scale: i32, nullable: bool) -> Self {
        Self {
            kind: TypeKind::Decimal,
            nullable,
            scale,
            dict_id: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn dict_text(dict_id: DictId, nullable: bool) -> Self {
        Self {
            kind: TypeKind::Text,
            nullable,
            scale: 0,
            dict_id: Some(dict_id),
        }
    }

    /// Physical width of a stored value of this type
    #[inline]
    #[must_use]
    pub const fn byte_width(&self) -> usize {
        self.kind.byte_width()
    }

    /// Null sentinel in the widened i64 slot domain.
    /// Dictionary-encoded text uses the i32 id sentinel.
    #[inline]
    #[must_use]
    pub fn null_slot_value(&self) -> i64 {
        if self.kind.is_fp() {
            fp_to_slot(inline_fp_null_value(self.byte_width()))
        } else {
            inline_int_null_value(self.byte_width())
        }
    }

    /// Null sentinel in the f64 domain, for floating-point operands
    #[inline]
    #[must_use]
    pub fn null_fp_value(&self) -> f64 {
        inline_fp_null_value(self.byte_width())
    }
}

/// Null sentinel in the engine's internal 8-byte slot domain.
///
/// Once a value is decoded into a slot, width-specific sentinels are
/// normalized: floating-point slots carry `NULL_DOUBLE` bits, booleans
/// keep the tinyint sentinel, and every other kind uses `NULL_BIGINT`.
/// Output buffers, the evaluator, and result iteration all share this
/// convention.
#[inline]
#[must_use]
pub fn slot_null_value(ty: &TypeDesc) -> i64 {
    if ty.kind.is_fp() {
        fp_to_slot(NULL_DOUBLE)
    } else if ty.kind == TypeKind::Boolean {
        NULL_TINYINT as i64
    } else {
        NULL_BIGINT
    }
}

/// Reinterpret an f64 as its i64 slot representation
#[inline(always)]
#[must_use]
pub fn fp_to_slot(value: f64) -> i64 {
    value.to_bits() as i64
}

/// Reinterpret an i64 slot as the f64 it carries
#[inline(always)]
#[must_use]
pub fn slot_to_fp(slot: i64) -> f64 {
    f64::from_bits(slot as u64)
}

/// A scalar constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    Null,
    Int(i64),
    Double(f64),
    /// Scaled decimal mantissa
    Decimal(i64),
    Str(String),
}

impl Datum {
    /// Normalized i64 slot representation for a value of the given type.
    /// Dictionary-encoded string literals are translated to transient ids
    /// before lowering and arrive here as `Datum::Int`.
    #[must_use]
    pub fn to_slot(&self, ty: &TypeDesc) -> i64 {
        match self {
            Datum::Null => ty.null_slot_value(),
            Datum::Int(v) => {
                if ty.kind.is_fp() {
                    fp_to_slot(*v as f64)
                } else {
                    *v
                }
            }
            Datum::Double(v) => {
                if ty.kind.is_fp() {
                    fp_to_slot(*v)
                } else {
                    *v as i64
                }
            }
            Datum::Decimal(mantissa) => *mantissa,
            Datum::Str(_) => NULL_INT as i64,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_null_values_by_width() {
        assert_eq!(inline_int_null_value(1), i8::MIN as i64);
        assert_eq!(inline_int_null_value(2), i16::MIN as i64);
        assert_eq!(inline_int_null_value(4), i32::MIN as i64);
        assert_eq!(inline_int_null_value(8), i64::MIN);
    }

    #[test]
    fn test_fp_slot_round_trip() {
        for v in [0.0, -1.5, f64::MAX, NULL_DOUBLE] {
            assert_eq!(slot_to_fp(fp_to_slot(v)), v);
        }
    }

    #[test]
    fn test_null_slot_value_tracks_width() {
        let int_ty = TypeDesc::new(TypeKind::Int, true);
        assert_eq!(int_ty.null_slot_value(), NULL_INT as i64);

        let double_ty = TypeDesc::new(TypeKind::Double, true);
        assert_eq!(slot_to_fp(double_ty.null_slot_value()), NULL_DOUBLE);
    }

    #[test]
    fn test_datum_to_slot_widens() {
        let ty = TypeDesc::new(TypeKind::Double, true);
        assert_eq!(slot_to_fp(Datum::Int(3).to_slot(&ty)), 3.0);
        assert_eq!(slot_to_fp(Datum::Null.to_slot(&ty)), NULL_DOUBLE);
    }
}
