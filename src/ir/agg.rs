/*!
 * Aggregate Targets
 * Aggregate kinds and output target expressions
 */

use super::expr::Expr;
use crate::core::types::{TypeDesc, TypeKind};
use std::hash::{Hash, Hasher};

/// Aggregate function kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    /// First value encountered wins; later rows are ignored
    Sample,
    /// Like Sample, but a second distinct value is a runtime error
    SingleValue,
    CountDistinct,
    ApproxCountDistinct,
}

impl AggKind {
    /// Number of 8-byte output slots the aggregate occupies
    #[inline]
    #[must_use]
    pub const fn slot_count(self) -> usize {
        match self {
            AggKind::Avg => 2,
            _ => 1,
        }
    }

    /// Whether partial results merge with a commutative, associative
    /// operator (everything except the write-once aggregates, whose
    /// cross-kernel choice is first-non-null).
    #[inline]
    #[must_use]
    pub const fn is_order_independent(self) -> bool {
        !matches!(self, AggKind::Sample | AggKind::SingleValue)
    }
}

/// An output column of the query: a projected expression or an aggregate
/// over one.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetExpr {
    pub agg: Option<AggKind>,
    pub expr: Expr,
    pub ty: TypeDesc,
}

impl TargetExpr {
    /// Plain projection target
    #[must_use]
    pub fn projected(expr: Expr) -> Self {
        let ty = expr.type_desc();
        Self {
            agg: None,
            expr,
            ty,
        }
    }

    /// Aggregate target with the standard result type rules
    #[must_use]
    pub fn aggregate(agg: AggKind, expr: Expr) -> Self {
        let arg_ty = expr.type_desc();
        let ty = match agg {
            AggKind::Count | AggKind::CountDistinct | AggKind::ApproxCountDistinct => {
                TypeDesc::new(TypeKind::BigInt, false)
            }
            AggKind::Avg => TypeDesc::new(TypeKind::Double, true),
            AggKind::Sum => {
                if arg_ty.kind.is_fp() {
                    TypeDesc::new(TypeKind::Double, true)
                } else {
                    let mut ty = TypeDesc::new(TypeKind::BigInt, true);
                    ty.scale = arg_ty.scale;
                    ty
                }
            }
            AggKind::Min | AggKind::Max | AggKind::Sample | AggKind::SingleValue => {
                let mut ty = arg_ty;
                ty.nullable = true;
                ty
            }
        };
        Self {
            agg: Some(agg),
            expr,
            ty,
        }
    }

    /// COUNT(*): counts rows regardless of nulls
    #[must_use]
    pub fn count_star() -> Self {
        Self {
            agg: Some(AggKind::Count),
            expr: Expr::lit_i64(1),
            ty: TypeDesc::new(TypeKind::BigInt, false),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_agg(&self) -> bool {
        self.agg.is_some()
    }

    /// Whether this target is COUNT(*) (argument is a constant, so null
    /// skipping never applies).
    #[must_use]
    pub fn is_count_star(&self) -> bool {
        matches!(self.agg, Some(AggKind::Count)) && matches!(self.expr, Expr::Literal(..))
    }

    /// Structural fingerprint for cache keys
    pub fn fingerprint<H: Hasher>(&self, state: &mut H) {
        self.agg.hash(state);
        self.expr.fingerprint(state);
        self.ty.hash(state);
    }
}
