//! INSERT.
//!
//! The source is one of: a general SELECT (anything with its own ORDER BY, LIMIT,
//! locking or WITH, and every set operation), a multi-row VALUES list, a single
//! VALUES row, or DEFAULT VALUES. A general SELECT and a multi-row VALUES list
//! become range-table entries the target list reads from; a single row is used
//! directly.

use crate::analyze::parse_sub_analyze;
use crate::ast::{Alias, InsertStmt, Node, SelectStmt};
use crate::catalog::{Oid, UNKNOWNOID};
use crate::clause::{take_cte_list, transform_with_clause};
use crate::coerce::{coerce_assignment, type_collation};
use crate::collation::{assign_expr_collations, assign_query_collations};
use crate::error::{Diagnostic, SqlState};
use crate::query::{AclMode, AttrNumber, CmdType, Expr, FromExpr, Index, JoinTreeNode, Query, RteKind, TargetEntry};
use crate::relation::{expand_columns, make_var};
use crate::scope::{ExprKind, ParseState};
use crate::transform::transform_returning_list;
use crate::transform::values::transform_values_rows;
use crate::{Error, Result};

/// A column of the target table receiving a value.
#[derive(Debug, Clone)]
struct InsertColumn {
    attno: AttrNumber,
    name: String,
    type_oid: Oid,
    typmod: i32,
    location: i32,
}

pub(crate) fn transform_insert_stmt(pstate: &mut ParseState, stmt: &InsertStmt) -> Result<Query> {
    let mut query = Query { command_type: CmdType::Insert, ..Default::default() };
    pstate.is_insert = true;

    if let Some(with) = &stmt.with_clause {
        query.has_recursive = with.recursive;
        transform_with_clause(pstate, with)?;
    }

    let select = stmt.select_stmt.as_deref();
    let is_general_select = select.map_or(false, |s| {
        s.values_lists.is_empty()
            || !s.sort_clause.is_empty()
            || s.limit_offset.is_some()
            || s.limit_count.is_some()
            || !s.locking_clause.is_empty()
            || s.with_clause.is_some()
    });

    let target = pstate.set_target_table(&stmt.relation, false, AclMode::INSERT)?;
    query.result_relation = Some(target);
    let columns = insert_target_columns(pstate, stmt, target)?;
    let explicit = !stmt.cols.is_empty();

    let exprs = match select {
        None => vec![],
        Some(select) if is_general_select => {
            let (rtindex, exprs) = general_select_source(pstate, select)?;
            let exprs = prepare_row(pstate, exprs, &columns, explicit)?;
            settle_source_params(pstate, rtindex, &exprs)?;
            exprs
        }
        Some(select) if select.values_lists.len() > 1 => {
            let mut rows = vec![];
            for row in transform_values_rows(pstate, &select.values_lists, ExprKind::Values)? {
                let mut row = prepare_row(pstate, row, &columns, explicit)?;
                for expr in row.iter_mut() {
                    assign_expr_collations(pstate, expr)?;
                }
                rows.push(row);
            }
            let width = rows.first().map_or(0, Vec::len);
            let collations = columns.iter().take(width).map(|c| type_collation(pstate, c.type_oid)).collect();
            let rtindex = pstate.add_values_rte(rows, collations, None, false, true)?;
            pstate.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));
            expand_columns(pstate.rte(rtindex)?, rtindex, 0, -1).into_iter().map(|(_, var)| Expr::Var(var)).collect()
        }
        Some(select) => {
            let row = transform_values_rows(pstate, &select.values_lists, ExprKind::ValuesSingle)?.pop().unwrap_or_default();
            prepare_row(pstate, row, &columns, explicit)?
        }
    };

    let mut tlist = Vec::with_capacity(exprs.len());
    for (expr, column) in exprs.into_iter().zip(&columns) {
        tlist.push(TargetEntry::new(expr, column.attno, Some(column.name.clone()), false));
        pstate.rte_mut(target)?.modified_cols.insert(column.attno);
    }

    query.returning_list = transform_returning_list(pstate, &stmt.returning_list)?;

    query.target_list = tlist;
    query.has_sub_links = pstate.has_sub_links;
    query.rtable = std::mem::take(&mut pstate.rtable);
    query.jointree = FromExpr { fromlist: std::mem::take(&mut pstate.joinlist), quals: None };
    query.cte_list = take_cte_list(pstate);
    query.has_modifying_cte = pstate.has_modifying_cte;
    assign_query_collations(pstate, &mut query)?;
    Ok(query)
}

/// The columns values go to: the explicit column list, or every live column in order.
fn insert_target_columns(pstate: &ParseState, stmt: &InsertStmt, target: usize) -> Result<Vec<InsertColumn>> {
    let rte = pstate.rte(target)?;
    let live = rte.columns.iter().enumerate().filter(|(_, c)| !c.dropped);
    if stmt.cols.is_empty() {
        return Ok(live
            .map(|(i, c)| InsertColumn { attno: i as AttrNumber + 1, name: c.name.clone(), type_oid: c.type_oid, typmod: c.typmod, location: -1 })
            .collect());
    }

    let mut columns: Vec<InsertColumn> = vec![];
    for col in &stmt.cols {
        let name = col.name.clone().unwrap_or_default();
        let Some((i, c)) = live.clone().find(|(_, c)| c.name == name) else {
            return Err(pstate.error(
                SqlState::UndefinedColumn,
                format!("column \"{}\" of relation \"{}\" does not exist", name, stmt.relation.relname),
                col.location,
            ));
        };
        if columns.iter().any(|existing| existing.name == name) {
            return Err(pstate.error(SqlState::DuplicateColumn, format!("column \"{}\" specified more than once", name), col.location));
        }
        columns.push(InsertColumn { attno: i as AttrNumber + 1, name, type_oid: c.type_oid, typmod: c.typmod, location: col.location });
    }
    Ok(columns)
}

/// Analyzes INSERT ... SELECT's source as its own level and reads its outputs.
fn general_select_source(pstate: &mut ParseState, select: &SelectStmt) -> Result<(Index, Vec<Expr>)> {
    let source = parse_sub_analyze(&Node::SelectStmt(Box::new(select.clone())), pstate, None)?;
    if source.command_type != CmdType::Select || source.utility_stmt.is_some() {
        return Err(Error::Internal("unexpected non-SELECT command in INSERT ... SELECT".to_string()));
    }
    let alias = Alias { aliasname: "*SELECT*".to_string(), colnames: vec![] };
    let rtindex = pstate.add_subquery_rte(source, &alias, false, false)?;
    pstate.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));

    let rte = pstate.rte(rtindex)?;
    let Some(source) = rte.subquery() else {
        return Err(Error::Internal("INSERT source is not a subquery".to_string()));
    };
    // Untyped literals and parameters are copied so they can take the column types.
    let exprs = source
        .visible_targets()
        .enumerate()
        .map(|(i, tle)| match &tle.expr {
            Expr::Const(c) if c.consttype == UNKNOWNOID => tle.expr.clone(),
            Expr::Param(p) if p.paramtype == UNKNOWNOID => tle.expr.clone(),
            other => Expr::Var(make_var(rte, rtindex, i as AttrNumber + 1, 0, other.location())),
        })
        .collect();
    Ok((rtindex, exprs))
}

/// Gives untyped parameters the source passed through the type their target column deduced.
fn settle_source_params(pstate: &mut ParseState, rtindex: Index, exprs: &[Expr]) -> Result<()> {
    let rte = pstate.rte_mut(rtindex)?;
    let RteKind::Subquery { subquery } = &mut rte.kind else {
        return Err(Error::Internal("INSERT source is not a subquery".to_string()));
    };
    let visible = subquery.target_list.iter_mut().filter(|tle| !tle.resjunk);
    for ((tle, expr), column) in visible.zip(exprs).zip(rte.columns.iter_mut()) {
        let settled = match expr {
            Expr::Param(p) => p,
            Expr::Coerce(c) => match &c.arg {
                Expr::Param(p) => p,
                _ => continue,
            },
            _ => continue,
        };
        if matches!(&tle.expr, Expr::Param(p) if p.paramtype == UNKNOWNOID && p.paramid == settled.paramid) {
            tle.expr = Expr::Param(settled.clone());
            column.type_oid = settled.paramtype;
            column.collation = settled.paramcollid;
        }
    }
    Ok(())
}

/// Matches one row of source expressions to the target columns and coerces each to its column.
fn prepare_row(pstate: &ParseState, exprs: Vec<Expr>, columns: &[InsertColumn], explicit: bool) -> Result<Vec<Expr>> {
    if exprs.len() > columns.len() {
        return Err(pstate.error(SqlState::SyntaxError, "INSERT has more expressions than target columns", exprs[columns.len()].location()));
    }
    if explicit && exprs.len() < columns.len() {
        let mut diagnostic = Diagnostic::new(SqlState::SyntaxError, "INSERT has more target columns than expressions")
            .position(pstate.errposition(columns[exprs.len()].location));
        if let [Expr::Row(row)] = exprs.as_slice() {
            if row.args.len() == columns.len() {
                diagnostic = diagnostic.hint(
                    "The insertion source is a row expression containing the same number of columns expected by the INSERT. Did you accidentally use extra parentheses?",
                );
            }
        }
        return Err(diagnostic.into());
    }

    exprs
        .into_iter()
        .zip(columns)
        .map(|(expr, column)| match expr {
            Expr::SetToDefault(mut default) => {
                default.type_oid = column.type_oid;
                default.typmod = column.typmod;
                default.collation = type_collation(pstate, column.type_oid);
                Ok(Expr::SetToDefault(default))
            }
            expr => coerce_assignment(pstate, expr, column.type_oid, column.typmod, &column.name, column.location),
        })
        .collect()
}
