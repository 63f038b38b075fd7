//! Plain SELECT.

use crate::ast::SelectStmt;
use crate::clause::{
    check_grouping, take_cte_list, transform_distinct_clause, transform_distinct_on_clause, transform_from_clause, transform_group_clause,
    transform_limit_clause, transform_sort_clause, transform_target_list, transform_where_clause, transform_with_clause,
};
use crate::collation::assign_query_collations;
use crate::error::SqlState;
use crate::locking::transform_locking_clause;
use crate::outer_join::transform_outer_joins;
use crate::query::{CmdType, Expr, FromExpr, Query};
use crate::scope::{ExprKind, ParseState};
use crate::Result;

pub(crate) fn transform_select_stmt(pstate: &mut ParseState, stmt: &SelectStmt) -> Result<Query> {
    let mut query = Query { command_type: CmdType::Select, ..Default::default() };

    if let Some(with) = &stmt.with_clause {
        query.has_recursive = with.recursive;
        transform_with_clause(pstate, with)?;
    }

    if let Some(into) = &stmt.into_clause {
        return Err(pstate.error(SqlState::SyntaxError, "SELECT ... INTO is not allowed here", into.rel.location));
    }

    let quals = transform_from_and_where(pstate, stmt)?;

    let mut tlist = transform_target_list(pstate, &stmt.target_list, ExprKind::SelectTarget)?;
    let having = transform_where_clause(pstate, stmt.having_clause.as_ref(), ExprKind::Having, "HAVING")?;
    let sort_clause = transform_sort_clause(pstate, &stmt.sort_clause, &mut tlist)?;
    let group_clause = transform_group_clause(pstate, &stmt.group_clause, &mut tlist, &sort_clause)?;
    query.distinct_clause = match &stmt.distinct_clause {
        None => vec![],
        Some(on) if on.is_empty() => transform_distinct_clause(pstate, &mut tlist, &sort_clause)?,
        Some(on) => {
            query.has_distinct_on = true;
            transform_distinct_on_clause(pstate, on, &mut tlist, &sort_clause)?
        }
    };
    query.limit_offset = transform_limit_clause(pstate, stmt.limit_offset.as_ref(), ExprKind::Offset, "OFFSET")?;
    query.limit_count = transform_limit_clause(pstate, stmt.limit_count.as_ref(), ExprKind::Limit, "LIMIT")?;

    query.has_aggs = pstate.has_aggs;
    query.has_window_funcs = pstate.has_window_funcs;
    query.has_target_srfs = pstate.has_target_srfs;
    query.has_sub_links = pstate.has_sub_links;
    if pstate.has_aggs || !group_clause.is_empty() || having.is_some() {
        check_grouping(pstate, &tlist, having.as_ref(), &group_clause)?;
    }

    query.target_list = tlist;
    query.sort_clause = sort_clause;
    query.group_clause = group_clause;
    query.having_qual = having;
    query.rtable = std::mem::take(&mut pstate.rtable);
    query.jointree = FromExpr { fromlist: std::mem::take(&mut pstate.joinlist), quals };

    for clause in &stmt.locking_clause {
        transform_locking_clause(pstate, &mut query, clause, false)?;
    }

    query.cte_list = take_cte_list(pstate);
    query.has_modifying_cte = pstate.has_modifying_cte;
    assign_query_collations(pstate, &mut query)?;
    Ok(query)
}

/// FROM and WHERE, with `(+)` markers allowed and the outer joins they describe built.
fn transform_from_and_where(pstate: &mut ParseState, stmt: &SelectStmt) -> Result<Option<Expr>> {
    pstate.allow_join_markers = true;
    let quals = transform_from_clause(pstate, &stmt.from_clause)
        .and_then(|_| transform_where_clause(pstate, stmt.where_clause.as_ref(), ExprKind::Where, "WHERE"))
        .and_then(|quals| transform_outer_joins(pstate, quals));
    pstate.allow_join_markers = false;
    quals
}
