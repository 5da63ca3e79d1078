/*!
 * Execution Unit
 * Normalized plan fragment fed to the layout chooser, codegen, and dispatcher
 */

use super::agg::TargetExpr;
use super::expr::Expr;
use crate::core::types::TableId;
use std::hash::{Hash, Hasher};

/// Join kinds supported by the row function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
}

/// One equi-join level: probe the hash table built over `inner_expr`'s
/// column with the value of `outer_expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub join_type: JoinType,
    pub outer_expr: Expr,
    pub inner_expr: Expr,
}

/// One ORDER BY entry, referencing an output target by index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderEntry {
    pub target_idx: usize,
    pub ascending: bool,
    pub nulls_first: bool,
}

/// Sort specification: order entries plus limit/offset
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortInfo {
    pub order_entries: Vec<OrderEntry>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SortInfo {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_entries.is_empty()
    }

    /// Rows that must survive the sort: limit + offset, when limited
    #[inline]
    #[must_use]
    pub fn top_n(&self) -> Option<usize> {
        self.limit.map(|l| l + self.offset)
    }
}

/// Input table descriptor. Order matters: index 0 is the outer (driving)
/// table, subsequent entries are join inner tables at increasing nest
/// levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputDesc {
    pub table: TableId,
}

/// A normalized plan fragment.
///
/// Immutable once handed to the engine: the layout chooser, the code
/// generator, and the dispatcher all read the same unit, and its
/// fingerprint keys the compiled-kernel cache.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionUnit {
    pub input_tables: Vec<InputDesc>,
    /// Sargable quals, usable for fragment skipping against min/max
    pub simple_quals: Vec<Expr>,
    /// Remaining general quals
    pub quals: Vec<Expr>,
    pub join_conditions: Vec<JoinCondition>,
    pub groupby_exprs: Vec<Expr>,
    pub target_exprs: Vec<TargetExpr>,
    pub sort_info: SortInfo,
    /// One kernel per input table, results concatenated
    pub union_all: bool,
    /// Stop scanning once this many rows matched (sample queries)
    pub scan_limit: Option<usize>,
}

impl ExecutionUnit {
    /// Unit scanning a single table
    #[must_use]
    pub fn for_table(table: TableId) -> Self {
        Self {
            input_tables: vec![InputDesc { table }],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_targets(mut self, targets: Vec<TargetExpr>) -> Self {
        self.target_exprs = targets;
        self
    }

    #[must_use]
    pub fn with_group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.groupby_exprs = exprs;
        self
    }

    #[must_use]
    pub fn with_quals(mut self, simple: Vec<Expr>, general: Vec<Expr>) -> Self {
        self.simple_quals = simple;
        self.quals = general;
        self
    }

    #[must_use]
    pub fn with_join(mut self, condition: JoinCondition, inner_table: TableId) -> Self {
        self.join_conditions.push(condition);
        self.input_tables.push(InputDesc { table: inner_table });
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort_info: SortInfo) -> Self {
        self.sort_info = sort_info;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_agg(&self) -> bool {
        !self.groupby_exprs.is_empty() || self.target_exprs.iter().any(TargetExpr::is_agg)
    }

    #[inline]
    #[must_use]
    pub fn outer_table(&self) -> TableId {
        self.input_tables[0].table
    }

    /// Stable structural fingerprint of the plan shape, for the compiled
    /// kernel cache. Two units with identical structure (including
    /// literals) collide intentionally.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        use std::hash::BuildHasher;
        let build = ahash::RandomState::with_seeds(
            0x9e37_79b9_7f4a_7c15,
            0x2545_f491_4f6c_dd1d,
            0x27d4_eb2f_1656_67c5,
            0x1657_667b_19e3_779f,
        );
        let mut state = build.build_hasher();
        self.input_tables.hash(&mut state);
        for q in &self.simple_quals {
            q.fingerprint(&mut state);
        }
        0xffu8.hash(&mut state);
        for q in &self.quals {
            q.fingerprint(&mut state);
        }
        0xffu8.hash(&mut state);
        for j in &self.join_conditions {
            j.join_type.hash(&mut state);
            j.outer_expr.fingerprint(&mut state);
            j.inner_expr.fingerprint(&mut state);
        }
        0xffu8.hash(&mut state);
        for g in &self.groupby_exprs {
            g.fingerprint(&mut state);
        }
        0xffu8.hash(&mut state);
        for t in &self.target_exprs {
            t.fingerprint(&mut state);
        }
        self.sort_info.order_entries.hash(&mut state);
        self.sort_info.limit.hash(&mut state);
        self.sort_info.offset.hash(&mut state);
        self.union_all.hash(&mut state);
        self.scan_limit.hash(&mut state);
        state.finish()
    }
}
