//! UPDATE.

use crate::ast::{Node, UpdateStmt};
use crate::clause::{take_cte_list, transform_from_clause, transform_target_list, transform_where_clause, transform_with_clause};
use crate::coerce::{coerce_assignment, type_collation};
use crate::collation::assign_query_collations;
use crate::error::SqlState;
use crate::query::{AclMode, AttrNumber, CmdType, Expr, FromExpr, Index, Query};
use crate::scope::{ExprKind, ParseState};
use crate::transform::transform_returning_list;
use crate::{Error, Result};

pub(crate) fn transform_update_stmt(pstate: &mut ParseState, stmt: &UpdateStmt) -> Result<Query> {
    let mut query = Query { command_type: CmdType::Update, ..Default::default() };
    pstate.is_update = true;

    if let Some(with) = &stmt.with_clause {
        query.has_recursive = with.recursive;
        transform_with_clause(pstate, with)?;
    }

    let target = pstate.set_target_table(&stmt.relation, true, AclMode::UPDATE)?;
    query.result_relation = Some(target);

    transform_from_beside_target(pstate, target, &stmt.from_clause)?;
    let quals = transform_where_clause(pstate, stmt.where_clause.as_ref(), ExprKind::Where, "WHERE")?;
    query.returning_list = transform_returning_list(pstate, &stmt.returning_list)?;

    let tlist = transform_target_list(pstate, &stmt.target_list, ExprKind::UpdateSource)?;
    let natts = pstate.rte(target)?.columns.len() as AttrNumber;
    pstate.next_resno = pstate.next_resno.max(natts + 1);

    let mut assignments = stmt.target_list.iter();
    let mut target_list = Vec::with_capacity(tlist.len());
    for mut tle in tlist {
        if tle.resjunk {
            tle.resno = pstate.next_resno;
            tle.resname = None;
            pstate.next_resno += 1;
            target_list.push(tle);
            continue;
        }
        let Some(assignment) = assignments.next() else {
            return Err(Error::Internal("UPDATE target count mismatch --- internal error".to_string()));
        };
        let name = assignment.name.clone().unwrap_or_default();
        let rte = pstate.rte(target)?;
        let Some((i, column)) = rte.columns.iter().enumerate().find(|(_, c)| !c.dropped && c.name == name) else {
            return Err(pstate.error(
                SqlState::UndefinedColumn,
                format!("column \"{}\" of relation \"{}\" does not exist", name, stmt.relation.relname),
                assignment.location,
            ));
        };
        let attno = i as AttrNumber + 1;
        let (type_oid, typmod) = (column.type_oid, column.typmod);

        tle.expr = match tle.expr {
            Expr::SetToDefault(mut default) => {
                default.type_oid = type_oid;
                default.typmod = typmod;
                default.collation = type_collation(pstate, type_oid);
                Expr::SetToDefault(default)
            }
            expr => coerce_assignment(pstate, expr, type_oid, typmod, &name, assignment.location)?,
        };
        tle.resno = attno;
        tle.resname = Some(name);
        pstate.rte_mut(target)?.modified_cols.insert(attno);
        target_list.push(tle);
    }
    if assignments.next().is_some() {
        return Err(Error::Internal("UPDATE target count mismatch --- internal error".to_string()));
    }

    query.target_list = target_list;
    query.has_sub_links = pstate.has_sub_links;
    query.rtable = std::mem::take(&mut pstate.rtable);
    query.jointree = FromExpr { fromlist: std::mem::take(&mut pstate.joinlist), quals };
    query.cte_list = take_cte_list(pstate);
    query.has_modifying_cte = pstate.has_modifying_cte;
    assign_query_collations(pstate, &mut query)?;
    Ok(query)
}

/// Analyzes UPDATE's FROM or DELETE's USING. The target table is hidden from those items
/// and becomes ordinarily visible again afterwards.
pub(crate) fn transform_from_beside_target(pstate: &mut ParseState, target: Index, from_clause: &[Node]) -> Result<()> {
    let namespace = std::mem::take(&mut pstate.namespace);
    pstate.namespace = namespace.with_lateral(target, true, false);
    let result = transform_from_clause(pstate, from_clause);
    let namespace = std::mem::take(&mut pstate.namespace);
    pstate.namespace = namespace.with_lateral(target, false, true);
    result
}
