//! Stand-alone VALUES.

use crate::ast::{Node, SelectStmt};
use crate::clause::{next_resno, take_cte_list, transform_limit_clause, transform_sort_clause, transform_with_clause};
use crate::coerce::{coerce_to_common_type, select_common_type};
use crate::collation::{assign_query_collations, select_common_collation};
use crate::error::SqlState;
use crate::expr::transform_expr;
use crate::query::{CmdType, Expr, FromExpr, JoinTreeNode, Query, TargetEntry};
use crate::relation::expand_columns;
use crate::scope::{ExprKind, NamespaceItem, ParseState};
use crate::Result;

pub(crate) fn transform_values_clause(pstate: &mut ParseState, stmt: &SelectStmt) -> Result<Query> {
    let mut query = Query { command_type: CmdType::Select, ..Default::default() };

    if let Some(with) = &stmt.with_clause {
        query.has_recursive = with.recursive;
        transform_with_clause(pstate, with)?;
    }
    if let Some(into) = &stmt.into_clause {
        return Err(pstate.error(SqlState::SyntaxError, "SELECT ... INTO is not allowed here", into.rel.location));
    }
    if let Some(lock) = stmt.locking_clause.first() {
        return Err(pstate.error(SqlState::FeatureNotSupported, format!("{} cannot be applied to VALUES", lock.strength.as_str()), -1));
    }

    let rows = transform_values_rows(pstate, &stmt.values_lists, ExprKind::Values)?;

    // Unify each column across the rows.
    let width = rows.first().map_or(0, Vec::len);
    let mut columns: Vec<Vec<Expr>> = (0..width).map(|_| Vec::with_capacity(rows.len())).collect();
    for row in rows {
        for (column, expr) in columns.iter_mut().zip(row) {
            column.push(expr);
        }
    }
    let mut collations = Vec::with_capacity(width);
    for column in columns.iter_mut() {
        let refs: Vec<&Expr> = column.iter().collect();
        let common = select_common_type(pstate, &refs, "VALUES")?;
        let coerced = std::mem::take(column).into_iter().map(|e| coerce_to_common_type(pstate, e, common, "VALUES")).collect::<Result<Vec<_>>>()?;
        *column = coerced;
        collations.push(select_common_collation(pstate, column.iter_mut(), true)?);
    }
    let height = columns.first().map_or(0, Vec::len);
    let mut values_lists: Vec<Vec<Expr>> = (0..height).map(|_| Vec::with_capacity(width)).collect();
    for column in columns {
        for (row, expr) in values_lists.iter_mut().zip(column) {
            row.push(expr);
        }
    }

    let rtindex = pstate.add_values_rte(values_lists, collations, None, false, true)?;
    pstate.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));
    pstate.add_to_namespace(NamespaceItem::new(rtindex, true, true));

    let mut tlist = vec![];
    for (name, var) in expand_columns(pstate.rte(rtindex)?, rtindex, 0, -1) {
        let resno = next_resno(pstate);
        tlist.push(TargetEntry::new(Expr::Var(var), resno, Some(name), false));
    }
    query.sort_clause = transform_sort_clause(pstate, &stmt.sort_clause, &mut tlist)?;
    query.limit_offset = transform_limit_clause(pstate, stmt.limit_offset.as_ref(), ExprKind::Offset, "OFFSET")?;
    query.limit_count = transform_limit_clause(pstate, stmt.limit_count.as_ref(), ExprKind::Limit, "LIMIT")?;

    query.target_list = tlist;
    query.has_sub_links = pstate.has_sub_links;
    query.rtable = std::mem::take(&mut pstate.rtable);
    query.jointree = FromExpr { fromlist: std::mem::take(&mut pstate.joinlist), quals: None };
    query.cte_list = take_cte_list(pstate);
    query.has_modifying_cte = pstate.has_modifying_cte;
    assign_query_collations(pstate, &mut query)?;
    Ok(query)
}

/// Analyzes every row of a VALUES list, requiring them all to have the same width.
pub(crate) fn transform_values_rows(pstate: &mut ParseState, lists: &[Vec<Node>], kind: ExprKind) -> Result<Vec<Vec<Expr>>> {
    let mut rows: Vec<Vec<Expr>> = Vec::with_capacity(lists.len());
    for list in lists {
        let row = list.iter().map(|cell| transform_expr(pstate, cell, kind)).collect::<Result<Vec<_>>>()?;
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                let location = row.first().map_or(-1, Expr::location);
                return Err(pstate.error(SqlState::SyntaxError, "VALUES lists must all be the same length", location));
            }
        }
        rows.push(row);
    }
    Ok(rows)
}
