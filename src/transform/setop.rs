//! UNION / INTERSECT / EXCEPT.
//!
//! The statement tree is normalized into a [`SetOpTree`] whose leaves are
//! subquery range-table entries. Each internal node unifies the column types of
//! its two inputs. The top level then exposes the unified columns through Vars
//! on the leftmost leaf, so that ORDER BY, LIMIT and the output see one row shape.

use itertools::izip;

use crate::analyze::parse_sub_analyze;
use crate::ast::{Alias, JoinType, Node, SelectStmt, SetOperation};
use crate::catalog::{Oid, UNKNOWNOID};
use crate::clause::{next_resno, take_cte_list, transform_limit_clause, transform_sort_clause, transform_with_clause};
use crate::coerce::{coerce_to_common_type, select_common_type, type_name};
use crate::collation::{assign_query_collations, select_common_collation};
use crate::error::{Diagnostic, SqlState};
use crate::query::{
    CmdType, Expr, FromExpr, Index, Query, RteColumn, RteKind, SetOpTree, SetOperationStmt, SetToDefault, SortGroupClause, TargetEntry, Var,
};
use crate::scope::{ExprKind, Namespace, NamespaceItem, ParseState};
use crate::{Error, Result};

/// One output column of a set-operation subtree.
#[derive(Debug, Clone)]
struct SetOpColumn {
    expr: Expr,
    /// Leaf entry and target-list position the column comes from, for leaves only.
    origin: Option<(Index, usize)>,
}

pub(crate) fn transform_set_operation_stmt(pstate: &mut ParseState, stmt: &SelectStmt) -> Result<Query> {
    let mut query = Query { command_type: CmdType::Select, ..Default::default() };

    let leftmost = stmt.leftmost();
    if let Some(into) = &leftmost.into_clause {
        return Err(pstate.error(SqlState::SyntaxError, "SELECT ... INTO is not allowed here", into.rel.location));
    }
    if let Some(lock) = stmt.locking_clause.first() {
        return Err(pstate.error(SqlState::FeatureNotSupported, format!("{} is not allowed with UNION/INTERSECT/EXCEPT", lock.strength.as_str()), -1));
    }
    if let Some(with) = &stmt.with_clause {
        query.has_recursive = with.recursive;
        transform_with_clause(pstate, with)?;
    }

    let (tree, columns) = transform_set_operation_tree(pstate, stmt, true, 0)?;
    let SetOpTree::Op(op) = &tree else {
        return Err(Error::Internal("set operation tree without an operation".to_string()));
    };

    // Output columns are named after the leftmost SELECT and read from its entry.
    let leftmost_rti = leftmost_leaf(&tree);
    let leftmost_query = pstate.rte(leftmost_rti)?.subquery().ok_or_else(|| Error::Internal("leftmost set operation input is not a subquery".to_string()))?;
    let outputs: Vec<(String, i32)> =
        leftmost_query.visible_targets().map(|tle| (tle.resname.clone().unwrap_or_else(|| "?column?".to_string()), tle.expr.location())).collect();

    let mut tlist = Vec::with_capacity(columns.len());
    let mut join_columns = Vec::with_capacity(columns.len());
    let mut join_vars = Vec::with_capacity(columns.len());
    for (i, (name, location), &vartype, &vartypmod, &varcollid) in izip!(0.., outputs, &op.col_types, &op.col_typmods, &op.col_collations) {
        let var = Var { varno: leftmost_rti, varattno: i as i16 + 1, vartype, vartypmod, varcollid, varlevelsup: 0, location };
        join_columns.push(RteColumn { name: name.clone(), type_oid: var.vartype, typmod: var.vartypmod, collation: var.varcollid, dropped: false });
        join_vars.push(Expr::Var(var.clone()));
        let resno = next_resno(pstate);
        tlist.push(TargetEntry::new(Expr::Var(var), resno, Some(name), false));
    }

    // ORDER BY sees the result columns by name through a join entry that only it can use.
    let join_rti = pstate.add_join_rte(join_columns, join_vars, JoinType::Inner, None)?;
    let saved = std::mem::replace(&mut pstate.namespace, Namespace::new(vec![NamespaceItem::new(join_rti, false, true)]));
    let width = tlist.len();
    let sort_clause = transform_sort_clause(pstate, &stmt.sort_clause, &mut tlist);
    pstate.restore(saved);
    query.sort_clause = sort_clause?;
    if tlist.len() != width {
        return Err(Diagnostic::new(SqlState::FeatureNotSupported, "invalid UNION/INTERSECT/EXCEPT ORDER BY clause")
            .detail("Only result column names can be used, not expressions or functions.")
            .hint("Add the expression/function to every SELECT, or move the UNION into a FROM clause.")
            .position(pstate.errposition(tlist[width].expr.location()))
            .into());
    }

    query.limit_offset = transform_limit_clause(pstate, stmt.limit_offset.as_ref(), ExprKind::Offset, "OFFSET")?;
    query.limit_count = transform_limit_clause(pstate, stmt.limit_count.as_ref(), ExprKind::Limit, "LIMIT")?;

    query.target_list = tlist;
    query.set_operations = Some(tree);
    query.has_sub_links = pstate.has_sub_links;
    query.rtable = std::mem::take(&mut pstate.rtable);
    query.jointree = FromExpr { fromlist: std::mem::take(&mut pstate.joinlist), quals: None };
    query.cte_list = take_cte_list(pstate);
    query.has_modifying_cte = pstate.has_modifying_cte;
    assign_query_collations(pstate, &mut query)?;
    Ok(query)
}

fn leftmost_leaf(tree: &SetOpTree) -> Index {
    let mut node = tree;
    loop {
        match node {
            SetOpTree::Leaf(rti) => return *rti,
            SetOpTree::Op(op) => node = &op.larg,
        }
    }
}

fn is_unknown_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Const(c) => c.consttype == UNKNOWNOID,
        Expr::Param(p) => p.paramtype == UNKNOWNOID,
        _ => false,
    }
}

fn transform_set_operation_tree(pstate: &mut ParseState, stmt: &SelectStmt, is_top: bool, depth: usize) -> Result<(SetOpTree, Vec<SetOpColumn>)> {
    let max_depth = pstate.config().max_depth;
    if depth > max_depth {
        return Err(Error::TooComplex { depth: max_depth });
    }
    if let Some(into) = &stmt.into_clause {
        return Err(pstate.error(SqlState::SyntaxError, "INTO is only allowed on first SELECT of UNION/INTERSECT/EXCEPT", into.rel.location));
    }
    if let Some(lock) = stmt.locking_clause.first() {
        return Err(pstate.error(SqlState::FeatureNotSupported, format!("{} is not allowed with UNION/INTERSECT/EXCEPT", lock.strength.as_str()), -1));
    }

    let own_clauses = !stmt.sort_clause.is_empty()
        || stmt.limit_offset.is_some()
        || stmt.limit_count.is_some()
        || !stmt.locking_clause.is_empty()
        || stmt.with_clause.is_some();
    let (larg, rarg) = match (&stmt.larg, &stmt.rarg) {
        (Some(larg), Some(rarg)) if stmt.op != SetOperation::None && (is_top || !own_clauses) => (larg, rarg),
        _ => return transform_leaf(pstate, stmt),
    };

    let stack_size = pstate.config().stack_size;
    let (ltree, lcols) = stacker::maybe_grow(32 * 1024, stack_size, || transform_set_operation_tree(pstate, larg, false, depth + 1))?;

    // The non-recursive term of a recursive CTE fixes the CTE's columns before the recursive term is read.
    if is_top {
        if let Some(cte) = pstate.parent_cte.clone().filter(|cte| cte.recursive && cte.union_shaped) {
            let leftmost_rti = leftmost_leaf(&ltree);
            let names: Vec<String> = pstate
                .rte(leftmost_rti)?
                .subquery()
                .map(|q| q.visible_targets().map(|tle| tle.resname.clone().unwrap_or_else(|| "?column?".to_string())).collect())
                .unwrap_or_default();
            let columns = names
                .into_iter()
                .zip(&lcols)
                .map(|(name, col)| RteColumn { name, type_oid: col.expr.type_oid(), typmod: col.expr.typmod(), collation: col.expr.collation(), dropped: false })
                .collect();
            cte.set_columns(columns);
        }
    }

    let (rtree, rcols) = stacker::maybe_grow(32 * 1024, stack_size, || transform_set_operation_tree(pstate, rarg, false, depth + 1))?;

    let context = stmt.op.as_str();
    if lcols.len() != rcols.len() {
        let location = rcols.first().or(lcols.first()).map_or(-1, |c| c.expr.location());
        return Err(pstate.error(SqlState::SyntaxError, format!("each {} query must have the same number of columns", context), location));
    }

    let union_all = stmt.op == SetOperation::Union && stmt.all;
    let mut op = SetOperationStmt {
        op: stmt.op,
        all: stmt.all,
        larg: ltree,
        rarg: rtree,
        col_types: vec![],
        col_typmods: vec![],
        col_collations: vec![],
        group_clauses: vec![],
    };
    let mut outputs = Vec::with_capacity(lcols.len());
    for (lcol, rcol) in lcols.into_iter().zip(rcols) {
        let common = select_common_type(pstate, &[&lcol.expr, &rcol.expr], context)?;
        let typmod = if lcol.expr.type_oid() == rcol.expr.type_oid() && lcol.expr.typmod() == rcol.expr.typmod() { lcol.expr.typmod() } else { -1 };

        let mut lexpr = resolve_input(pstate, lcol, common, context)?;
        let mut rexpr = resolve_input(pstate, rcol, common, context)?;
        let collation = select_common_collation(pstate, [&mut lexpr, &mut rexpr], union_all)?;

        if !union_all {
            op.group_clauses.push(dedup_clause(pstate, common)?);
        }
        op.col_types.push(common);
        op.col_typmods.push(typmod);
        op.col_collations.push(collation);
        outputs.push(SetOpColumn { expr: Expr::SetToDefault(SetToDefault { type_oid: common, typmod, collation, location: lexpr.location() }), origin: None });
    }
    Ok((SetOpTree::Op(Box::new(op)), outputs))
}

/// Analyzes a leaf SELECT and adds it to the range table.
fn transform_leaf(pstate: &mut ParseState, stmt: &SelectStmt) -> Result<(SetOpTree, Vec<SetOpColumn>)> {
    let alias = Alias { aliasname: format!("*SELECT* {}", pstate.rtable.len() + 1), colnames: vec![] };
    let query = parse_sub_analyze(&Node::SelectStmt(Box::new(stmt.clone())), pstate, None)?;
    let rtindex = pstate.add_subquery_rte(query, &alias, false, false)?;
    let columns = pstate
        .rte(rtindex)?
        .subquery()
        .map(|q| {
            q.target_list
                .iter()
                .enumerate()
                .filter(|(_, tle)| !tle.resjunk)
                .map(|(i, tle)| SetOpColumn { expr: tle.expr.clone(), origin: Some((rtindex, i)) })
                .collect()
        })
        .unwrap_or_default();
    Ok((SetOpTree::Leaf(rtindex), columns))
}

/// Checks that an input column converts to the common type.
///
/// Untyped literals and parameters of a leaf take the common type in the leaf itself;
/// anything else is left as it is.
fn resolve_input(pstate: &mut ParseState, column: SetOpColumn, common: Oid, context: &str) -> Result<Expr> {
    let SetOpColumn { expr, origin } = column;
    if expr.type_oid() != UNKNOWNOID {
        return coerce_to_common_type(pstate, expr, common, context);
    }
    if !is_unknown_literal(&expr) {
        return Ok(expr);
    }
    let coerced = coerce_to_common_type(pstate, expr, common, context)?;
    if let Some((rtindex, position)) = origin {
        let rte = pstate.rte_mut(rtindex)?;
        let visible = match &mut rte.kind {
            RteKind::Subquery { subquery } => {
                let tle = subquery.target_list.get_mut(position).ok_or_else(|| Error::Internal("set operation input column out of range".to_string()))?;
                tle.expr = coerced.clone();
                subquery.target_list[..position].iter().filter(|tle| !tle.resjunk).count()
            }
            _ => return Err(Error::Internal("set operation input is not a subquery".to_string())),
        };
        if let Some(column) = rte.columns.get_mut(visible) {
            column.type_oid = coerced.type_oid();
            column.typmod = coerced.typmod();
            column.collation = coerced.collation();
        }
    }
    Ok(coerced)
}

fn dedup_clause(pstate: &ParseState, type_oid: Oid) -> Result<SortGroupClause> {
    let Some(ops) = pstate.catalog().sort_group_operators(type_oid) else {
        return Err(pstate.error(
            SqlState::UndefinedFunction,
            format!("could not identify an equality operator for type {}", type_name(pstate, type_oid)),
            -1,
        ));
    };
    Ok(SortGroupClause { tle_sort_group_ref: 0, eqop: ops.eq, sortop: ops.lt, nulls_first: false, hashable: ops.hashable })
}
