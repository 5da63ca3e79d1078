/*!
 * Expression IR
 * Typed expression trees consumed by the code generator
 */

use crate::core::types::{ColumnId, Datum, TableId, TypeDesc, TypeKind};
use std::hash::{Hash, Hasher};

/// Binary operator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOpKind {
    #[inline]
    #[must_use]
    pub const fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOpKind::Add | BinOpKind::Sub | BinOpKind::Mul | BinOpKind::Div | BinOpKind::Mod
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOpKind::Eq | BinOpKind::Ne | BinOpKind::Lt | BinOpKind::Le | BinOpKind::Gt | BinOpKind::Ge
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_logic(self) -> bool {
        matches!(self, BinOpKind::And | BinOpKind::Or)
    }
}

/// Unary operator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOpKind {
    Not,
    Neg,
    IsNull,
    /// Width/kind conversion to the expression's result type
    Cast,
}

/// A typed expression tree.
///
/// Column references carry the nesting level of the table they resolve
/// into: level 0 is the outer (driving) table, higher levels are join
/// inner tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Datum, TypeDesc),
    ColumnRef {
        table: TableId,
        column: ColumnId,
        nest_level: usize,
        ty: TypeDesc,
    },
    BinOp {
        op: BinOpKind,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: TypeDesc,
    },
    Unary {
        op: UnaryOpKind,
        arg: Box<Expr>,
        ty: TypeDesc,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        else_expr: Box<Expr>,
        ty: TypeDesc,
    },
    /// Call into a whitelisted external function
    ExtCall {
        name: String,
        args: Vec<Expr>,
        ty: TypeDesc,
    },
}

impl Expr {
    /// Literal constructor
    #[must_use]
    pub fn lit(datum: Datum, ty: TypeDesc) -> Self {
        Expr::Literal(datum, ty)
    }

    /// Integer literal shorthand
    #[must_use]
    pub fn lit_i64(value: i64) -> Self {
        Expr::Literal(Datum::Int(value), TypeDesc::new(TypeKind::BigInt, false))
    }

    /// Outer-table column reference shorthand
    #[must_use]
    pub fn col(table: TableId, column: ColumnId, ty: TypeDesc) -> Self {
        Expr::ColumnRef {
            table,
            column,
            nest_level: 0,
            ty,
        }
    }

    /// Column reference at an explicit join nesting level
    #[must_use]
    pub fn col_at(table: TableId, column: ColumnId, nest_level: usize, ty: TypeDesc) -> Self {
        Expr::ColumnRef {
            table,
            column,
            nest_level,
            ty,
        }
    }

    /// Binary operation with inferred result type: comparisons and logic
    /// produce a non-null boolean slot, arithmetic takes the wider operand
    /// type and operand nullability.
    #[must_use]
    pub fn bin_op(op: BinOpKind, lhs: Expr, rhs: Expr) -> Self {
        let ty = if op.is_comparison() || op.is_logic() {
            TypeDesc::new(
                TypeKind::Boolean,
                lhs.type_desc().nullable || rhs.type_desc().nullable,
            )
        } else {
            let lt = lhs.type_desc();
            let rt = rhs.type_desc();
            let kind = if lt.kind.is_fp() || rt.kind.is_fp() {
                TypeKind::Double
            } else if lt.kind == TypeKind::Decimal || rt.kind == TypeKind::Decimal {
                TypeKind::Decimal
            } else if lt.byte_width() >= rt.byte_width() {
                lt.kind
            } else {
                rt.kind
            };
            let mut ty = TypeDesc::new(kind, lt.nullable || rt.nullable);
            ty.scale = lt.scale.max(rt.scale);
            ty
        };
        Expr::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    /// IS NULL predicate
    #[must_use]
    pub fn is_null(arg: Expr) -> Self {
        Expr::Unary {
            op: UnaryOpKind::IsNull,
            arg: Box::new(arg),
            ty: TypeDesc::new(TypeKind::Boolean, false),
        }
    }

    /// Cast to a target type
    #[must_use]
    pub fn cast(arg: Expr, target: TypeDesc) -> Self {
        Expr::Unary {
            op: UnaryOpKind::Cast,
            arg: Box::new(arg),
            ty: target,
        }
    }

    /// Call a whitelisted external function
    #[must_use]
    pub fn ext_call(name: impl Into<String>, args: Vec<Expr>, ty: TypeDesc) -> Self {
        Expr::ExtCall {
            name: name.into(),
            args,
            ty,
        }
    }

    /// Result type of this expression
    #[must_use]
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Expr::Literal(_, ty)
            | Expr::ColumnRef { ty, .. }
            | Expr::BinOp { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Case { ty, .. }
            | Expr::ExtCall { ty, .. } => *ty,
        }
    }

    /// Collect every literal in evaluation order, for hoisting
    pub fn collect_literals<'a>(&'a self, out: &mut Vec<(&'a Datum, TypeDesc)>) {
        match self {
            Expr::Literal(datum, ty) => out.push((datum, *ty)),
            Expr::ColumnRef { .. } => {}
            Expr::BinOp { lhs, rhs, .. } => {
                lhs.collect_literals(out);
                rhs.collect_literals(out);
            }
            Expr::Unary { arg, .. } => arg.collect_literals(out),
            Expr::Case {
                branches,
                else_expr,
                ..
            } => {
                for (when, then) in branches {
                    when.collect_literals(out);
                    then.collect_literals(out);
                }
                else_expr.collect_literals(out);
            }
            Expr::ExtCall { args, .. } => {
                for arg in args {
                    arg.collect_literals(out);
                }
            }
        }
    }

    /// If this qual has the sargable shape `col OP literal`, return its
    /// parts for fragment-level min/max skipping.
    #[must_use]
    pub fn as_sargable(&self) -> Option<(ColumnId, BinOpKind, &Datum)> {
        if let Expr::BinOp { op, lhs, rhs, .. } = self {
            if !op.is_comparison() {
                return None;
            }
            if let (Expr::ColumnRef { column, nest_level: 0, .. }, Expr::Literal(datum, _)) =
                (lhs.as_ref(), rhs.as_ref())
            {
                return Some((*column, *op, datum));
            }
        }
        None
    }

    /// Feed a structural fingerprint of this expression into a hasher.
    /// Equal trees produce equal fingerprints; used for code cache keys.
    pub fn fingerprint<H: Hasher>(&self, state: &mut H) {
        match self {
            Expr::Literal(datum, ty) => {
                0u8.hash(state);
                match datum {
                    Datum::Null => 0u8.hash(state),
                    Datum::Int(v) => {
                        1u8.hash(state);
                        v.hash(state);
                    }
                    Datum::Double(v) => {
                        2u8.hash(state);
                        v.to_bits().hash(state);
                    }
                    Datum::Decimal(v) => {
                        3u8.hash(state);
                        v.hash(state);
                    }
                    Datum::Str(s) => {
                        4u8.hash(state);
                        s.hash(state);
                    }
                }
                ty.hash(state);
            }
            Expr::ColumnRef {
                table,
                column,
                nest_level,
                ty,
            } => {
                1u8.hash(state);
                table.hash(state);
                column.hash(state);
                nest_level.hash(state);
                ty.hash(state);
            }
            Expr::BinOp { op, lhs, rhs, ty } => {
                2u8.hash(state);
                op.hash(state);
                lhs.fingerprint(state);
                rhs.fingerprint(state);
                ty.hash(state);
            }
            Expr::Unary { op, arg, ty } => {
                3u8.hash(state);
                op.hash(state);
                arg.fingerprint(state);
                ty.hash(state);
            }
            Expr::Case {
                branches,
                else_expr,
                ty,
            } => {
                4u8.hash(state);
                branches.len().hash(state);
                for (when, then) in branches {
                    when.fingerprint(state);
                    then.fingerprint(state);
                }
                else_expr.fingerprint(state);
                ty.hash(state);
            }
            Expr::ExtCall { name, args, ty } => {
                5u8.hash(state);
                name.hash(state);
                args.len().hash(state);
                for arg in args {
                    arg.fingerprint(state);
                }
                ty.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TypeKind;

    fn int_col() -> Expr {
        Expr::col(1, 0, TypeDesc::new(TypeKind::Int, true))
    }

    #[test]
    fn test_comparison_yields_boolean() {
        let e = Expr::bin_op(BinOpKind::Lt, int_col(), Expr::lit_i64(10));
        assert_eq!(e.type_desc().kind, TypeKind::Boolean);
    }

    #[test]
    fn test_arithmetic_widens_to_double() {
        let d = Expr::col(1, 1, TypeDesc::new(TypeKind::Double, false));
        let e = Expr::bin_op(BinOpKind::Add, int_col(), d);
        assert_eq!(e.type_desc().kind, TypeKind::Double);
        assert!(e.type_desc().nullable);
    }

    #[test]
    fn test_sargable_detection() {
        let qual = Expr::bin_op(BinOpKind::Le, int_col(), Expr::lit_i64(7));
        let (col, op, datum) = qual.as_sargable().unwrap();
        assert_eq!(col, 0);
        assert_eq!(op, BinOpKind::Le);
        assert_eq!(datum, &Datum::Int(7));

        let non_sargable = Expr::bin_op(BinOpKind::Add, int_col(), Expr::lit_i64(7));
        assert!(non_sargable.as_sargable().is_none());
    }

    #[test]
    fn test_fingerprint_stability() {
        use std::hash::BuildHasher;
        let build = ahash::RandomState::with_seeds(1, 2, 3, 4);
        let fp = |e: &Expr| {
            let mut h = build.build_hasher();
            e.fingerprint(&mut h);
            h.finish()
        };
        let a = Expr::bin_op(BinOpKind::Lt, int_col(), Expr::lit_i64(10));
        let b = Expr::bin_op(BinOpKind::Lt, int_col(), Expr::lit_i64(10));
        let c = Expr::bin_op(BinOpKind::Lt, int_col(), Expr::lit_i64(11));
        assert_eq!(fp(&a), fp(&b));
        assert_ne!(fp(&a), fp(&c));
    }
}
