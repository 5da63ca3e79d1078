/*!
 * Expression Lowering
 *
 * Compiles expression trees into slot-valued evaluators composed over
 * the runtime intrinsic library. All values travel as normalized 8-byte
 * slots: integer kinds carry the bigint null sentinel, floating-point
 * slots carry double-null bits, booleans the tinyint sentinel. The
 * nullability of each operand picks the intrinsic variant at compile
 * time, never per row.
 */

use crate::core::types::{
    fp_to_slot, slot_null_value, slot_to_fp, Datum, TypeDesc, TypeKind, NULL_BIGINT, NULL_DOUBLE,
    NULL_FLOAT,
};
use crate::ir::expr::{BinOpKind, Expr, UnaryOpKind};
use crate::runtime::arith;
use crate::runtime::decode::{decode_double, decode_fixed_width_int, decode_float};
use crate::runtime::decimal::{scale_decimal_down, scale_decimal_up};
use crate::runtime::errors::{record_error_code, ERR_DIV_BY_ZERO, ERR_OVERFLOW};
use crate::storage::buffer::Encoding;
use crate::storage::provider::SchemaProvider;
use std::sync::Arc;
use thiserror::Error;

use super::extensions::{ExtensionFnRegistry, MAX_EXTENSION_ARGS};
use super::literals::LiteralBuffer;

/// Codegen result
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Compile-time lowering failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("Unsupported expression: {0}")]
    UnsupportedExpr(String),

    #[error("No dictionary registered under id {0}")]
    MissingDictionary(u32),

    #[error("Unsupported plan shape: {0}")]
    UnsupportedPlan(String),

    #[error("Extension function {0:?} is not whitelisted")]
    UnknownExtensionFn(String),

    #[error("Extension function {name:?} takes {expected} arguments, got {got}")]
    ExtensionArity {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// A column chunk view handed to the row function
#[derive(Debug, Clone, Copy)]
pub struct ColumnSlice<'a> {
    pub bytes: &'a [u8],
    pub encoding: Encoding,
}

/// Decoded inner-table columns, broadcast to every kernel of the query
#[derive(Debug, Clone, Default)]
pub struct InnerTableView {
    /// Normalized slots per column id
    pub columns: Vec<Vec<i64>>,
}

/// Per-row evaluation context
pub struct RowCtx<'a> {
    /// Outer fragment columns, by column id
    pub outer: &'a [ColumnSlice<'a>],
    /// Inner tables by join nest level (index 0 = nest level 1)
    pub inner_tables: &'a [InnerTableView],
    /// Matched inner row per join level; the miss value marks the null
    /// side of a left join
    pub inner_rows: &'a [i64],
    /// Hoisted literal buffer
    pub literals: &'a [i64],
    /// Current row within the outer fragment
    pub row: usize,
}

/// A compiled, slot-valued expression evaluator
pub type CompiledExpr = Arc<dyn Fn(&RowCtx<'_>, &mut i32) -> i64 + Send + Sync>;

/// Normalize a width-decoded integer slot to the internal sentinel
#[inline(always)]
fn normalize_int(v: i64, width_null: i64, internal_null: i64) -> i64 {
    if v == width_null {
        internal_null
    } else {
        v
    }
}

fn compile_column_ref(
    column: u32,
    nest_level: usize,
    ty: TypeDesc,
) -> CompiledExpr {
    let internal_null = slot_null_value(&ty);
    if nest_level > 0 {
        let level = nest_level - 1;
        let column = column as usize;
        return Arc::new(move |ctx, _err| {
            let inner_row = ctx.inner_rows[level];
            if inner_row < 0 {
                // null side of a left join
                return internal_null;
            }
            ctx.inner_tables[level].columns[column][inner_row as usize]
        });
    }

    let column = column as usize;
    if ty.kind.is_fp() {
        if ty.byte_width() == 4 {
            Arc::new(move |ctx, _err| {
                let slice = &ctx.outer[column];
                let v = decode_float(slice.bytes, ctx.row);
                if v == NULL_FLOAT {
                    fp_to_slot(NULL_DOUBLE)
                } else {
                    fp_to_slot(v as f64)
                }
            })
        } else {
            Arc::new(move |ctx, _err| {
                let slice = &ctx.outer[column];
                fp_to_slot(decode_double(slice.bytes, ctx.row))
            })
        }
    } else {
        Arc::new(move |ctx, _err| {
            let slice = &ctx.outer[column];
            let width = slice.encoding.byte_width();
            let width_null = crate::core::types::inline_int_null_value(width);
            let v = match slice.encoding {
                Encoding::DiffFixedWidth { baseline, .. } => {
                    crate::runtime::decode::decode_diff(slice.bytes, width, baseline, ctx.row)
                }
                _ => decode_fixed_width_int(slice.bytes, width, ctx.row),
            };
            if ty.nullable {
                normalize_int(v, width_null, internal_null)
            } else {
                v
            }
        })
    }
}

/// Coerce a compiled operand to the f64 domain
fn as_f64(expr: CompiledExpr, ty: TypeDesc) -> Arc<dyn Fn(&RowCtx<'_>, &mut i32) -> f64 + Send + Sync> {
    if ty.kind.is_fp() {
        Arc::new(move |ctx, err| slot_to_fp(expr(ctx, err)))
    } else {
        let decimal_scale = if ty.kind == TypeKind::Decimal {
            10f64.powi(ty.scale)
        } else {
            1.0
        };
        Arc::new(move |ctx, err| {
            let v = expr(ctx, err);
            if v == NULL_BIGINT {
                NULL_DOUBLE
            } else {
                v as f64 / decimal_scale
            }
        })
    }
}

fn compile_fp_bin_op(
    op: BinOpKind,
    lhs: CompiledExpr,
    lhs_ty: TypeDesc,
    rhs: CompiledExpr,
    rhs_ty: TypeDesc,
) -> CompiledExpr {
    let l = as_f64(lhs, lhs_ty);
    let r = as_f64(rhs, rhs_ty);
    match op {
        BinOpKind::Add => Arc::new(move |ctx, err| {
            fp_to_slot(arith::add_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE))
        }),
        BinOpKind::Sub => Arc::new(move |ctx, err| {
            fp_to_slot(arith::sub_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE))
        }),
        BinOpKind::Mul => Arc::new(move |ctx, err| {
            fp_to_slot(arith::mul_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE))
        }),
        BinOpKind::Div => Arc::new(move |ctx, err| {
            let lv = l(ctx, err);
            let rv = r(ctx, err);
            if rv == 0.0 && lv != NULL_DOUBLE {
                record_error_code(ERR_DIV_BY_ZERO, err);
                return fp_to_slot(NULL_DOUBLE);
            }
            fp_to_slot(arith::div_double_nullable(lv, rv, NULL_DOUBLE))
        }),
        BinOpKind::Mod => Arc::new(move |ctx, err| {
            let lv = l(ctx, err);
            let rv = r(ctx, err);
            if lv == NULL_DOUBLE || rv == NULL_DOUBLE {
                return fp_to_slot(NULL_DOUBLE);
            }
            if rv == 0.0 {
                record_error_code(ERR_DIV_BY_ZERO, err);
                return fp_to_slot(NULL_DOUBLE);
            }
            fp_to_slot(lv % rv)
        }),
        BinOpKind::Eq => Arc::new(move |ctx, err| {
            arith::eq_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE)
        }),
        BinOpKind::Ne => Arc::new(move |ctx, err| {
            arith::ne_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE)
        }),
        BinOpKind::Lt => Arc::new(move |ctx, err| {
            arith::lt_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE)
        }),
        BinOpKind::Le => Arc::new(move |ctx, err| {
            arith::le_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE)
        }),
        BinOpKind::Gt => Arc::new(move |ctx, err| {
            arith::gt_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE)
        }),
        BinOpKind::Ge => Arc::new(move |ctx, err| {
            arith::ge_double_nullable(l(ctx, err), r(ctx, err), NULL_DOUBLE)
        }),
        BinOpKind::And | BinOpKind::Or => unreachable!("logic ops are integer domain"),
    }
}

fn compile_int_bin_op(op: BinOpKind, lhs: CompiledExpr, rhs: CompiledExpr) -> CompiledExpr {
    match op {
        BinOpKind::Add => Arc::new(move |ctx, err| {
            let lv = lhs(ctx, err);
            let rv = rhs(ctx, err);
            if lv == NULL_BIGINT || rv == NULL_BIGINT {
                return NULL_BIGINT;
            }
            match arith::checked_add_i64(lv, rv) {
                Some(v) => v,
                None => {
                    record_error_code(ERR_OVERFLOW, err);
                    NULL_BIGINT
                }
            }
        }),
        BinOpKind::Sub => Arc::new(move |ctx, err| {
            let lv = lhs(ctx, err);
            let rv = rhs(ctx, err);
            if lv == NULL_BIGINT || rv == NULL_BIGINT {
                return NULL_BIGINT;
            }
            match arith::checked_sub_i64(lv, rv) {
                Some(v) => v,
                None => {
                    record_error_code(ERR_OVERFLOW, err);
                    NULL_BIGINT
                }
            }
        }),
        BinOpKind::Mul => Arc::new(move |ctx, err| {
            let lv = lhs(ctx, err);
            let rv = rhs(ctx, err);
            if lv == NULL_BIGINT || rv == NULL_BIGINT {
                return NULL_BIGINT;
            }
            match arith::checked_mul_i64(lv, rv) {
                Some(v) => v,
                None => {
                    record_error_code(ERR_OVERFLOW, err);
                    NULL_BIGINT
                }
            }
        }),
        BinOpKind::Div => Arc::new(move |ctx, err| {
            let lv = lhs(ctx, err);
            let rv = rhs(ctx, err);
            if rv == 0 && lv != NULL_BIGINT {
                record_error_code(ERR_DIV_BY_ZERO, err);
                return NULL_BIGINT;
            }
            arith::div_i64_nullable(lv, rv, NULL_BIGINT)
        }),
        BinOpKind::Mod => Arc::new(move |ctx, err| {
            let lv = lhs(ctx, err);
            let rv = rhs(ctx, err);
            if rv == 0 && lv != NULL_BIGINT {
                record_error_code(ERR_DIV_BY_ZERO, err);
                return NULL_BIGINT;
            }
            arith::mod_i64_nullable(lv, rv, NULL_BIGINT)
        }),
        BinOpKind::Eq => {
            Arc::new(move |ctx, err| arith::eq_i64_nullable(lhs(ctx, err), rhs(ctx, err), NULL_BIGINT))
        }
        BinOpKind::Ne => {
            Arc::new(move |ctx, err| arith::ne_i64_nullable(lhs(ctx, err), rhs(ctx, err), NULL_BIGINT))
        }
        BinOpKind::Lt => {
            Arc::new(move |ctx, err| arith::lt_i64_nullable(lhs(ctx, err), rhs(ctx, err), NULL_BIGINT))
        }
        BinOpKind::Le => {
            Arc::new(move |ctx, err| arith::le_i64_nullable(lhs(ctx, err), rhs(ctx, err), NULL_BIGINT))
        }
        BinOpKind::Gt => {
            Arc::new(move |ctx, err| arith::gt_i64_nullable(lhs(ctx, err), rhs(ctx, err), NULL_BIGINT))
        }
        BinOpKind::Ge => {
            Arc::new(move |ctx, err| arith::ge_i64_nullable(lhs(ctx, err), rhs(ctx, err), NULL_BIGINT))
        }
        BinOpKind::And => {
            Arc::new(move |ctx, err| arith::logical_and(lhs(ctx, err), rhs(ctx, err)))
        }
        BinOpKind::Or => {
            Arc::new(move |ctx, err| arith::logical_or(lhs(ctx, err), rhs(ctx, err)))
        }
    }
}

/// Rescale a decimal operand to a common scale before arithmetic
fn rescale_decimal(expr: CompiledExpr, from_scale: i32, to_scale: i32) -> CompiledExpr {
    if from_scale == to_scale {
        return expr;
    }
    if to_scale > from_scale {
        let factor = 10i64.pow((to_scale - from_scale) as u32);
        Arc::new(move |ctx, err| {
            match scale_decimal_up(expr(ctx, err), factor, NULL_BIGINT) {
                Some(v) => v,
                None => {
                    record_error_code(ERR_OVERFLOW, err);
                    NULL_BIGINT
                }
            }
        })
    } else {
        let factor = 10i64.pow((from_scale - to_scale) as u32);
        Arc::new(move |ctx, err| scale_decimal_down(expr(ctx, err), factor, NULL_BIGINT))
    }
}

/// Expression compiler: holds the literal buffer being populated, the
/// schema handle for dictionary translation of string literals, and the
/// extension whitelist.
pub struct ExprCompiler<'a> {
    pub literals: &'a mut LiteralBuffer,
    pub schema: &'a dyn SchemaProvider,
    pub extensions: &'a ExtensionFnRegistry,
    pub hoist_literals: bool,
}

impl<'a> ExprCompiler<'a> {
    /// Lower an expression to its compiled evaluator
    pub fn compile(&mut self, expr: &Expr) -> CodegenResult<CompiledExpr> {
        match expr {
            Expr::Literal(datum, ty) => self.compile_literal(datum, ty),
            Expr::ColumnRef {
                column,
                nest_level,
                ty,
                ..
            } => Ok(compile_column_ref(*column, *nest_level, *ty)),
            Expr::BinOp { op, lhs, rhs, ty } => {
                let lhs_ty = lhs.type_desc();
                let rhs_ty = rhs.type_desc();
                let cl = self.compile(lhs)?;
                let cr = self.compile(rhs)?;
                if lhs_ty.kind.is_fp() || rhs_ty.kind.is_fp() {
                    Ok(compile_fp_bin_op(*op, cl, lhs_ty, cr, rhs_ty))
                } else if (lhs_ty.kind == TypeKind::Decimal || rhs_ty.kind == TypeKind::Decimal)
                    && op.is_arithmetic()
                {
                    let scale = ty.scale.max(lhs_ty.scale).max(rhs_ty.scale);
                    let cl = rescale_decimal(cl, lhs_ty.scale, scale);
                    let cr = rescale_decimal(cr, rhs_ty.scale, scale);
                    Ok(compile_int_bin_op(*op, cl, cr))
                } else {
                    Ok(compile_int_bin_op(*op, cl, cr))
                }
            }
            Expr::Unary { op, arg, ty } => self.compile_unary(*op, arg, ty),
            Expr::Case {
                branches,
                else_expr,
                ..
            } => {
                let compiled: CodegenResult<Vec<(CompiledExpr, CompiledExpr)>> = branches
                    .iter()
                    .map(|(when, then)| Ok((self.compile(when)?, self.compile(then)?)))
                    .collect();
                let compiled = compiled?;
                let otherwise = self.compile(else_expr)?;
                Ok(Arc::new(move |ctx, err| {
                    for (when, then) in &compiled {
                        if when(ctx, err) == 1 {
                            return then(ctx, err);
                        }
                    }
                    otherwise(ctx, err)
                }))
            }
            Expr::ExtCall { name, args, .. } => {
                let function = self
                    .extensions
                    .lookup(name)
                    .ok_or_else(|| CodegenError::UnknownExtensionFn(name.clone()))?;
                if function.arg_types.len() != args.len() {
                    return Err(CodegenError::ExtensionArity {
                        name: name.clone(),
                        expected: function.arg_types.len(),
                        got: args.len(),
                    });
                }
                let compiled_args: CodegenResult<Vec<CompiledExpr>> =
                    args.iter().map(|a| self.compile(a)).collect();
                let compiled_args = compiled_args?;
                let body = Arc::clone(&function.body);
                Ok(Arc::new(move |ctx, err| {
                    let mut argv = [0i64; MAX_EXTENSION_ARGS];
                    for (i, arg) in compiled_args.iter().enumerate() {
                        argv[i] = arg(ctx, err);
                    }
                    body(&argv[..compiled_args.len()])
                }))
            }
        }
    }

    fn compile_literal(&mut self, datum: &Datum, ty: &TypeDesc) -> CodegenResult<CompiledExpr> {
        let slot = match datum {
            Datum::Null => slot_null_value(ty),
            Datum::Str(s) => {
                // dictionary-encoded comparison: intern as a transient id
                let dict_id = ty
                    .dict_id
                    .ok_or_else(|| CodegenError::UnsupportedExpr(format!("raw string literal {s:?}")))?;
                let dict = self
                    .schema
                    .dictionary(dict_id)
                    .ok_or(CodegenError::MissingDictionary(dict_id))?;
                dict.get_or_add_transient(s)
                    .map_err(|e| CodegenError::UnsupportedExpr(e.to_string()))?
                    as i64
            }
            other => other.to_slot(ty),
        };
        if self.hoist_literals {
            let idx = self.literals.intern(slot);
            Ok(Arc::new(move |ctx, _err| ctx.literals[idx]))
        } else {
            Ok(Arc::new(move |_ctx, _err| slot))
        }
    }

    fn compile_unary(
        &mut self,
        op: UnaryOpKind,
        arg: &Expr,
        ty: &TypeDesc,
    ) -> CodegenResult<CompiledExpr> {
        let arg_ty = arg.type_desc();
        let compiled = self.compile(arg)?;
        match op {
            UnaryOpKind::Not => Ok(Arc::new(move |ctx, err| arith::logical_not(compiled(ctx, err)))),
            UnaryOpKind::Neg => {
                if arg_ty.kind.is_fp() {
                    Ok(Arc::new(move |ctx, err| {
                        let v = slot_to_fp(compiled(ctx, err));
                        if v == NULL_DOUBLE {
                            fp_to_slot(NULL_DOUBLE)
                        } else {
                            fp_to_slot(-v)
                        }
                    }))
                } else {
                    Ok(Arc::new(move |ctx, err| {
                        let v = compiled(ctx, err);
                        if v == NULL_BIGINT {
                            NULL_BIGINT
                        } else {
                            -v
                        }
                    }))
                }
            }
            UnaryOpKind::IsNull => {
                let null_slot = slot_null_value(&arg_ty);
                Ok(Arc::new(move |ctx, err| (compiled(ctx, err) == null_slot) as i64))
            }
            UnaryOpKind::Cast => {
                let target = *ty;
                if target.kind.is_fp() && !arg_ty.kind.is_fp() {
                    let conv = as_f64(compiled, arg_ty);
                    Ok(Arc::new(move |ctx, err| fp_to_slot(conv(ctx, err))))
                } else if !target.kind.is_fp() && arg_ty.kind.is_fp() {
                    Ok(Arc::new(move |ctx, err| {
                        let v = slot_to_fp(compiled(ctx, err));
                        if v == NULL_DOUBLE {
                            NULL_BIGINT
                        } else {
                            v as i64
                        }
                    }))
                } else if target.kind == TypeKind::Decimal || arg_ty.kind == TypeKind::Decimal {
                    Ok(rescale_decimal(compiled, arg_ty.scale, target.scale))
                } else {
                    Ok(compiled)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::Expr;
    use crate::runtime::errors::ERR_NONE;
    use crate::storage::provider::MemTableProvider;

    fn eval(expr: &Expr, columns: &[ColumnSlice<'_>], row: usize) -> (i64, i32) {
        let provider = MemTableProvider::new();
        let registry = ExtensionFnRegistry::new();
        let mut literals = LiteralBuffer::new();
        let mut compiler = ExprCompiler {
            literals: &mut literals,
            schema: &provider,
            extensions: &registry,
            hoist_literals: true,
        };
        let compiled = compiler.compile(expr).unwrap();
        let lits = literals.finalize();
        let ctx = RowCtx {
            outer: columns,
            inner_tables: &[],
            inner_rows: &[],
            literals: &lits,
            row,
        };
        let mut err = ERR_NONE;
        (compiled(&ctx, &mut err), err)
    }

    fn int_column(values: &[i64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_column_plus_literal() {
        let bytes = int_column(&[10, 20]);
        let cols = [ColumnSlice {
            bytes: &bytes,
            encoding: Encoding::FixedWidth { byte_width: 8 },
        }];
        let expr = Expr::bin_op(
            BinOpKind::Add,
            Expr::col(1, 0, TypeDesc::new(TypeKind::BigInt, false)),
            Expr::lit_i64(5),
        );
        assert_eq!(eval(&expr, &cols, 0), (15, ERR_NONE));
        assert_eq!(eval(&expr, &cols, 1), (25, ERR_NONE));
    }

    #[test]
    fn test_width_null_normalizes() {
        let bytes: Vec<u8> = [7i32, i32::MIN, 9]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let cols = [ColumnSlice {
            bytes: &bytes,
            encoding: Encoding::FixedWidth { byte_width: 4 },
        }];
        let col = Expr::col(1, 0, TypeDesc::new(TypeKind::Int, true));
        let expr = Expr::bin_op(BinOpKind::Add, col, Expr::lit_i64(1));
        assert_eq!(eval(&expr, &cols, 0).0, 8);
        assert_eq!(eval(&expr, &cols, 1).0, NULL_BIGINT);
    }

    #[test]
    fn test_division_by_zero_records_error() {
        let expr = Expr::bin_op(BinOpKind::Div, Expr::lit_i64(10), Expr::lit_i64(0));
        let (v, err) = eval(&expr, &[], 0);
        assert_eq!(v, NULL_BIGINT);
        assert_eq!(err, ERR_DIV_BY_ZERO);
    }

    #[test]
    fn test_overflow_records_error() {
        let expr = Expr::bin_op(BinOpKind::Mul, Expr::lit_i64(i64::MAX), Expr::lit_i64(2));
        let (v, err) = eval(&expr, &[], 0);
        assert_eq!(v, NULL_BIGINT);
        assert_eq!(err, ERR_OVERFLOW);
    }

    #[test]
    fn test_mixed_int_fp_comparison() {
        let expr = Expr::bin_op(
            BinOpKind::Lt,
            Expr::lit_i64(3),
            Expr::lit(Datum::Double(3.5), TypeDesc::new(TypeKind::Double, false)),
        );
        assert_eq!(eval(&expr, &[], 0).0, 1);
    }

    #[test]
    fn test_is_null_on_fp() {
        let null_lit = Expr::lit(Datum::Null, TypeDesc::new(TypeKind::Double, true));
        let expr = Expr::is_null(null_lit);
        assert_eq!(eval(&expr, &[], 0).0, 1);
    }

    #[test]
    fn test_extension_call() {
        let provider = MemTableProvider::new();
        let registry = ExtensionFnRegistry::new();
        let ty = TypeDesc::new(TypeKind::BigInt, false);
        registry.register("plus_one", vec![ty], ty, Arc::new(|args: &[i64]| args[0] + 1));

        let mut literals = LiteralBuffer::new();
        let mut compiler = ExprCompiler {
            literals: &mut literals,
            schema: &provider,
            extensions: &registry,
            hoist_literals: false,
        };
        let call = Expr::ext_call("plus_one", vec![Expr::lit_i64(41)], ty);
        let compiled = compiler.compile(&call).unwrap();
        let ctx = RowCtx {
            outer: &[],
            inner_tables: &[],
            inner_rows: &[],
            literals: &[],
            row: 0,
        };
        let mut err = ERR_NONE;
        assert_eq!(compiled(&ctx, &mut err), 42);

        let missing = Expr::ext_call("absent", vec![], ty);
        assert!(matches!(
            compiler.compile(&missing),
            Err(CodegenError::UnknownExtensionFn(_))
        ));
    }

    #[test]
    fn test_case_expression() {
        let expr = Expr::Case {
            branches: vec![(
                Expr::bin_op(BinOpKind::Gt, Expr::lit_i64(2), Expr::lit_i64(1)),
                Expr::lit_i64(100),
            )],
            else_expr: Box::new(Expr::lit_i64(200)),
            ty: TypeDesc::new(TypeKind::BigInt, false),
        };
        assert_eq!(eval(&expr, &[], 0).0, 100);
    }
}
