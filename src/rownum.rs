//! ROWNUM-to-LIMIT rewrite.
//!
//! A query level without LIMIT/OFFSET whose WHERE clause bounds `ROWNUM` from
//! above gets that bound as its LIMIT, and the ROWNUM conjuncts disappear from
//! WHERE. Anything the rewrite does not recognize leaves the level untouched.

use tracing::debug;

use crate::catalog::{Catalog, OperatorMeta};
use crate::coerce::const_int64;
use crate::query::{Const, Expr, Query};

/// What one ROWNUM conjunct contributes.
enum Bound {
    /// Always true once rows are numbered from 1.
    Ignore,
    Upper(i64),
    /// No row can qualify.
    Empty,
}

/// Rewrites one query level in place.
pub(crate) fn rewrite_rownum(catalog: &dyn Catalog, query: &mut Query) {
    if query.limit_offset.is_some() || query.limit_count.is_some() {
        return;
    }
    let Some(quals) = query.jointree.quals.as_ref() else {
        return;
    };
    if !quals.contains_rownum() {
        return;
    }

    let mut kept = vec![];
    let mut bound: Option<i64> = None;
    let mut empty = false;
    for conjunct in quals.clone().into_conjuncts() {
        if !conjunct.contains_rownum() {
            kept.push(conjunct);
            continue;
        }
        // The result is already known to be empty, remaining ROWNUM conjuncts are dropped.
        if empty {
            continue;
        }
        match classify(catalog, &conjunct) {
            Ok(Bound::Ignore) => {}
            Ok(Bound::Upper(_)) if bound.is_some() => {
                debug!(reason = "more than one upper bound", "ROWNUM rewrite aborted");
                return;
            }
            Ok(Bound::Upper(v)) => bound = Some(v),
            Ok(Bound::Empty) => {
                empty = true;
                bound = Some(0);
            }
            Err(reason) => {
                debug!(reason, "ROWNUM rewrite aborted");
                return;
            }
        }
    }

    query.jointree.quals = Expr::and_all(kept);
    query.limit_count = bound.map(|v| Expr::Const(Const::int8(v)));
    debug!(limit = ?bound, "ROWNUM predicate adopted as LIMIT");
}

fn classify(catalog: &dyn Catalog, conjunct: &Expr) -> Result<Bound, &'static str> {
    let (op, args) = match conjunct {
        Expr::Op(op) => (catalog.operator(op.opno), &op.args),
        Expr::Func(func) => (catalog.operator_for_function(func.funcid), &func.args),
        _ => return Err("ROWNUM outside a comparison"),
    };
    let op = op.ok_or("comparison operator not found")?;
    let [lhs, rhs] = args.as_slice() else {
        return Err("comparison is not binary");
    };

    let (op, bound): (OperatorMeta, &Expr) = match (lhs, rhs) {
        (Expr::Rownum(_), Expr::Rownum(_)) => {
            return if op.name == "=" { Ok(Bound::Ignore) } else { Err("ROWNUM compared with itself") };
        }
        (Expr::Rownum(_), rhs) => (op, rhs),
        (lhs, Expr::Rownum(_)) => (catalog.operator(op.commutator).ok_or("operator has no commutator")?, lhs),
        _ => return Err("ROWNUM nested inside an expression"),
    };
    if bound.contains_rownum() {
        return Err("ROWNUM on both sides");
    }

    match op.name.as_str() {
        "<=" | "<" => {
            if bound.contains_volatile_functions() {
                return Err("volatile bound");
            }
            let value = const_int64(bound).ok_or("bound is not an integer constant")?;
            let limit = if op.name == "<" { value.saturating_sub(1) } else { value };
            Ok(if limit <= 0 { Bound::Empty } else { Bound::Upper(limit) })
        }
        "<>" => {
            let value = const_int64(bound).ok_or("bound is not an integer constant")?;
            Ok(if value <= 0 { Bound::Ignore } else { Bound::Upper(value - 1) })
        }
        ">=" if const_int64(bound) == Some(1) => Ok(Bound::Ignore),
        ">" if const_int64(bound) == Some(0) => Ok(Bound::Ignore),
        ">=" | ">" => Err("lower bound other than the first row"),
        _ => Err("unsupported comparison"),
    }
}
