//! DELETE.

use crate::ast::DeleteStmt;
use crate::clause::{take_cte_list, transform_where_clause, transform_with_clause};
use crate::collation::assign_query_collations;
use crate::query::{AclMode, CmdType, FromExpr, Query};
use crate::scope::{ExprKind, ParseState};
use crate::transform::transform_returning_list;
use crate::transform::update::transform_from_beside_target;
use crate::Result;

pub(crate) fn transform_delete_stmt(pstate: &mut ParseState, stmt: &DeleteStmt) -> Result<Query> {
    let mut query = Query { command_type: CmdType::Delete, ..Default::default() };

    if let Some(with) = &stmt.with_clause {
        query.has_recursive = with.recursive;
        transform_with_clause(pstate, with)?;
    }

    let target = pstate.set_target_table(&stmt.relation, true, AclMode::DELETE)?;
    query.result_relation = Some(target);

    transform_from_beside_target(pstate, target, &stmt.using_clause)?;
    let quals = transform_where_clause(pstate, stmt.where_clause.as_ref(), ExprKind::Where, "WHERE")?;
    query.returning_list = transform_returning_list(pstate, &stmt.returning_list)?;

    query.has_sub_links = pstate.has_sub_links;
    query.rtable = std::mem::take(&mut pstate.rtable);
    query.jointree = FromExpr { fromlist: std::mem::take(&mut pstate.joinlist), quals };
    query.cte_list = take_cte_list(pstate);
    query.has_modifying_cte = pstate.has_modifying_cte;
    assign_query_collations(pstate, &mut query)?;
    Ok(query)
}
