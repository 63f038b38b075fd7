//! Clause processing shared by the statement transformers.
//!
//! FROM items become range-table entries and join-tree nodes. WHERE, HAVING and
//! LIMIT become typed expressions. ORDER BY, GROUP BY and DISTINCT become
//! [`SortGroupClause`]s pointing at target entries; an expression that is not
//! already selected is added as a junk target.

use std::collections::HashSet;
use std::rc::Rc;

use crate::analyze::parse_sub_analyze;
use crate::ast::{self, AConstValue, JoinType, Node, ResTarget, SetOperation, SortByDir, SortByNulls, WithClause};
use crate::catalog::{Oid, INT8OID, INVALID_OID, TEXTOID, UNKNOWNOID};
use crate::coerce::{coerce_to_boolean, coerce_to_common_type, coerce_to_specific_type, const_int64, select_common_type, type_collation, type_name};
use crate::error::{Diagnostic, SqlState};
use crate::expr::{make_op, transform_expr};
use crate::outer_join::check_join_markers;
use crate::query::{
    AttrNumber, CmdType, CoalesceExpr, CommonTableExpr, Expr, Index, JoinExpr, JoinTreeNode, RteColumn, RteKind, SortGroupClause, TargetEntry, Var,
};
use crate::relation::expand_columns;
use crate::scope::{CteItem, ExprKind, Namespace, NamespaceItem, ParseState};
use crate::{Error, Result};

// ============================================================================
// FROM
// ============================================================================

/// A FROM item after analysis.
pub(crate) struct FromItem {
    pub node: JoinTreeNode,
    /// Entry whose columns the item exposes: the item itself, or the join's own entry.
    pub rtindex: Index,
    pub namespace: Namespace,
}

impl FromItem {
    fn leaf(rtindex: Index) -> Self {
        Self { node: JoinTreeNode::RangeTblRef(rtindex), rtindex, namespace: Namespace::new(vec![NamespaceItem::new(rtindex, true, true)]) }
    }
}

/// Adds every FROM item to the range table and the join list.
///
/// While an item is analyzed the earlier ones are visible only to LATERAL references.
pub(crate) fn transform_from_clause(pstate: &mut ParseState, from_clause: &[Node]) -> Result<()> {
    for node in from_clause {
        let item = transform_from_item(pstate, node)?;
        pstate.check_namespace_conflicts(&pstate.namespace, &item.namespace)?;
        let namespace = std::mem::take(&mut pstate.namespace);
        pstate.namespace = namespace.concat(item.namespace.with_all_lateral(true, true));
        pstate.joinlist.push(item.node);
    }
    let namespace = std::mem::take(&mut pstate.namespace);
    pstate.namespace = namespace.with_all_lateral(false, true);
    Ok(())
}

fn transform_from_item(pstate: &mut ParseState, node: &Node) -> Result<FromItem> {
    let stack_size = pstate.config().stack_size;
    stacker::maybe_grow(32 * 1024, stack_size, || match node {
        Node::RangeVar(rv) => {
            let cte = pstate.find_cte(&rv.relname).filter(|_| rv.schemaname.is_empty());
            let rtindex = match cte {
                Some((cte, levelsup)) => pstate.add_cte_rte(&cte, levelsup, rv, true)?,
                None => pstate.add_relation_rte(rv, true)?,
            };
            Ok(FromItem::leaf(rtindex))
        }
        Node::RangeSubselect(rs) => transform_range_subselect(pstate, rs),
        Node::RangeFunction(rf) => transform_range_function(pstate, rf),
        Node::JoinExpr(j) => transform_join(pstate, j),
        other => Err(Error::Internal(format!("unrecognized node type: {}", other.tag()))),
    })
}

fn transform_range_subselect(pstate: &mut ParseState, rs: &ast::RangeSubselect) -> Result<FromItem> {
    let Some(alias) = &rs.alias else {
        return Err(Diagnostic::new(SqlState::SyntaxError, "subquery in FROM must have an alias")
            .hint("For example, FROM (SELECT ...) [AS] foo.")
            .position(pstate.errposition(rs.subquery.location()))
            .into());
    };
    let saved = std::mem::replace(&mut pstate.lateral_active, rs.lateral);
    let query = parse_sub_analyze(&rs.subquery, pstate, None);
    pstate.lateral_active = saved;
    let query = query?;
    if query.command_type != CmdType::Select || query.utility_stmt.is_some() {
        return Err(Error::Internal("unexpected non-SELECT command in subquery in FROM".to_string()));
    }
    let rtindex = pstate.add_subquery_rte(query, alias, rs.lateral, true)?;
    Ok(FromItem::leaf(rtindex))
}

fn transform_range_function(pstate: &mut ParseState, rf: &ast::RangeFunction) -> Result<FromItem> {
    // Functions in FROM may always refer to earlier items.
    let call = Node::FuncCall(Box::new(rf.function.clone()));
    let saved = std::mem::replace(&mut pstate.lateral_active, true);
    let funcexpr = transform_expr(pstate, &call, ExprKind::FromFunction);
    pstate.lateral_active = saved;
    let funcexpr = funcexpr?;

    let lateral = rf.lateral || funcexpr.contains_local_vars();
    let name = rf.function.funcname.last().cloned().unwrap_or_default();
    let rtindex = pstate.add_function_rte(funcexpr, &name, rf.alias.as_ref(), lateral, rf.function.location)?;
    Ok(FromItem::leaf(rtindex))
}

fn transform_join(pstate: &mut ParseState, j: &ast::JoinExpr) -> Result<FromItem> {
    let left = transform_from_item(pstate, &j.larg)?;

    // The right side may refer to the left one through LATERAL, unless the left side can be null-extended.
    let lateral_ok = matches!(j.jointype, JoinType::Inner | JoinType::Left);
    let saved = pstate.snapshot();
    pstate.namespace = saved.clone().concat(left.namespace.clone().with_all_lateral(true, lateral_ok));
    let right = transform_from_item(pstate, &j.rarg);
    pstate.restore(saved);
    let right = right?;
    pstate.check_namespace_conflicts(&left.namespace, &right.namespace)?;

    let lcols = expand_columns(pstate.rte(left.rtindex)?, left.rtindex, 0, -1);
    let rcols = expand_columns(pstate.rte(right.rtindex)?, right.rtindex, 0, -1);

    let using: Vec<String> = if j.is_natural {
        lcols.iter().map(|(name, _)| name.clone()).filter(|name| rcols.iter().any(|(r, _)| r == name)).collect()
    } else {
        j.using_clause.clone()
    };

    let mut columns = vec![];
    let mut vars = vec![];
    let mut using_quals = vec![];
    let mut used_left = HashSet::new();
    let mut used_right = HashSet::new();
    for (i, name) in using.iter().enumerate() {
        if using[..i].contains(name) {
            return Err(pstate.error(SqlState::DuplicateColumn, format!("column name \"{}\" appears more than once in USING clause", name), j.location));
        }
        let l = using_column(pstate, &lcols, name, "left", j.location)?;
        let r = using_column(pstate, &rcols, name, "right", j.location)?;
        used_left.insert(l);
        used_right.insert(r);

        let lexpr = Expr::Var(lcols[l].1.clone());
        let rexpr = Expr::Var(rcols[r].1.clone());
        using_quals.push(make_op(pstate, "=", Some(lexpr.clone()), rexpr.clone(), j.location)?);

        let common = select_common_type(pstate, &[&lexpr, &rexpr], "JOIN/USING")?;
        let lexpr = coerce_to_common_type(pstate, lexpr, common, "JOIN/USING")?;
        let rexpr = coerce_to_common_type(pstate, rexpr, common, "JOIN/USING")?;
        let output = match j.jointype {
            JoinType::Inner | JoinType::Left => lexpr,
            JoinType::Right => rexpr,
            JoinType::Full => Expr::Coalesce(Box::new(CoalesceExpr { coalescetype: common, coalescecollid: INVALID_OID, args: vec![lexpr, rexpr], location: -1 })),
        };
        let collation = match &output {
            Expr::Var(v) => v.varcollid,
            _ => type_collation(pstate, common),
        };
        columns.push(RteColumn { name: name.clone(), type_oid: output.type_oid(), typmod: output.typmod(), collation, dropped: false });
        vars.push(output);
    }
    let rest = lcols.iter().enumerate().filter(|(i, _)| !used_left.contains(i)).chain(rcols.iter().enumerate().filter(|(i, _)| !used_right.contains(i)));
    for (_, (name, var)) in rest {
        columns.push(RteColumn { name: name.clone(), type_oid: var.vartype, typmod: var.vartypmod, collation: var.varcollid, dropped: false });
        vars.push(Expr::Var(var.clone()));
    }

    let quals = match &j.quals {
        Some(on) => {
            // ON sees only the two sides of this join.
            let saved = pstate.snapshot();
            pstate.namespace = left.namespace.clone().concat(right.namespace.clone()).with_all_lateral(false, true);
            let on = transform_where_clause(pstate, Some(on), ExprKind::JoinOn, "JOIN/ON");
            pstate.restore(saved);
            let mut on = on?;
            if let Some(qual) = on.as_mut().filter(|q| q.contains_join_marker()) {
                check_join_markers(pstate, j.jointype, &left.node, &right.node, qual)?;
            }
            on
        }
        None => Expr::and_all(using_quals),
    };

    let alias = j.alias.as_ref();
    let rtindex = pstate.add_join_rte(columns, vars, j.jointype, alias)?;

    // An aliased join hides the tables inside it; otherwise they stay nameable but their columns are reached through the join.
    let children = left.namespace.concat(right.namespace);
    let namespace = if alias.is_some() { Namespace::default() } else { children.with_columns_hidden() };
    let namespace = namespace.concat(Namespace::new(vec![NamespaceItem::new(rtindex, alias.is_some(), true)]));

    let node = JoinTreeNode::Join(Box::new(JoinExpr {
        jointype: j.jointype,
        is_natural: j.is_natural,
        larg: left.node,
        rarg: right.node,
        using,
        quals,
        alias: alias.map(|a| a.aliasname.clone()),
        rtindex: Some(rtindex),
    }));
    Ok(FromItem { node, rtindex, namespace })
}

fn using_column(pstate: &ParseState, columns: &[(String, Var)], name: &str, side: &str, location: i32) -> Result<usize> {
    let mut matches = columns.iter().enumerate().filter(|(_, (n, _))| n == name).map(|(i, _)| i);
    match (matches.next(), matches.next()) {
        (Some(i), None) => Ok(i),
        (Some(_), Some(_)) => {
            Err(pstate.error(SqlState::AmbiguousColumn, format!("common column name \"{}\" appears more than once in {} table", name, side), location))
        }
        (None, _) => Err(pstate.error(
            SqlState::UndefinedColumn,
            format!("column \"{}\" specified in USING clause does not exist in {} table", name, side),
            location,
        )),
    }
}

// ============================================================================
// WHERE, HAVING, LIMIT
// ============================================================================

/// Analyzes a condition that must be boolean.
pub(crate) fn transform_where_clause(pstate: &mut ParseState, clause: Option<&Node>, kind: ExprKind, construct: &str) -> Result<Option<Expr>> {
    let Some(clause) = clause else {
        return Ok(None);
    };
    let expr = transform_expr(pstate, clause, kind)?;
    Ok(Some(coerce_to_boolean(pstate, expr, construct)?))
}

/// Analyzes a LIMIT or OFFSET argument: an int8 that does not depend on the rows of this level.
pub(crate) fn transform_limit_clause(pstate: &mut ParseState, clause: Option<&Node>, kind: ExprKind, construct: &str) -> Result<Option<Expr>> {
    let Some(clause) = clause else {
        return Ok(None);
    };
    let expr = transform_expr(pstate, clause, kind)?;
    let expr = coerce_to_specific_type(pstate, expr, INT8OID, construct)?;
    if expr.contains_local_vars() {
        return Err(pstate.error(SqlState::InvalidColumnReference, format!("argument of {} must not contain variables", construct), expr.location()));
    }
    if const_int64(&expr).map_or(false, |v| v < 0) {
        return Err(pstate.error(SqlState::InvalidRowCountInLimitClause, format!("{} must not be negative", construct), expr.location()));
    }
    Ok(Some(expr))
}

// ============================================================================
// Target list
// ============================================================================

pub(crate) fn next_resno(pstate: &mut ParseState) -> AttrNumber {
    let resno = pstate.next_resno;
    pstate.next_resno += 1;
    resno
}

/// Analyzes a SELECT list or RETURNING list, expanding `*` and `t.*`.
pub(crate) fn transform_target_list(pstate: &mut ParseState, targets: &[ResTarget], kind: ExprKind) -> Result<Vec<TargetEntry>> {
    let mut tlist = vec![];
    for target in targets {
        let Some(val) = &target.val else {
            return Err(Error::Internal("target list entry without a value".to_string()));
        };
        if let Node::ColumnRef(c) = val {
            if matches!(c.fields.last(), Some(Node::AStar(_))) {
                for (name, var) in expand_star(pstate, c)? {
                    let resno = next_resno(pstate);
                    let mut tle = TargetEntry::new(Expr::Var(var), resno, Some(name), false);
                    mark_target_origin(pstate, &mut tle);
                    tlist.push(tle);
                }
                continue;
            }
        }
        let expr = transform_expr(pstate, val, kind)?;
        let name = target.name.clone().unwrap_or_else(|| figure_colname(val));
        let resno = next_resno(pstate);
        let mut tle = TargetEntry::new(expr, resno, Some(name), false);
        mark_target_origin(pstate, &mut tle);
        tlist.push(tle);
    }
    Ok(tlist)
}

fn expand_star(pstate: &ParseState, c: &ast::ColumnRef) -> Result<Vec<(String, Var)>> {
    let names: Vec<&str> = c
        .fields
        .iter()
        .filter_map(|f| match f {
            Node::String(s) => Some(s.sval.as_str()),
            _ => None,
        })
        .collect();
    match names.as_slice() {
        [] => {
            let mut columns = vec![];
            for item in pstate.namespace.items().iter().filter(|item| item.cols_visible && pstate.item_visible(item)) {
                columns.extend(expand_columns(pstate.rte(item.rtindex)?, item.rtindex, 0, c.location));
            }
            if columns.is_empty() {
                return Err(pstate.error(SqlState::SyntaxError, "SELECT * with no tables specified is not valid", c.location));
            }
            Ok(columns)
        }
        [rel] => {
            let (rtindex, levelsup) = pstate.qualified_rte(None, rel, c.location)?;
            Ok(expand_columns(pstate.rte_at(rtindex, levelsup)?, rtindex, levelsup, c.location))
        }
        [schema, rel] => {
            let (rtindex, levelsup) = pstate.qualified_rte(Some(schema), rel, c.location)?;
            Ok(expand_columns(pstate.rte_at(rtindex, levelsup)?, rtindex, levelsup, c.location))
        }
        _ => Err(pstate.error(SqlState::SyntaxError, format!("improper qualified name (too many dotted names): {}.*", names.join(".")), c.location)),
    }
}

/// Records the table column a plain column target comes from.
fn mark_target_origin(pstate: &ParseState, tle: &mut TargetEntry) {
    if let Some((relid, attno)) = column_origin(pstate, &tle.expr, 0) {
        tle.resorigtbl = relid;
        tle.resorigcol = attno;
    }
}

fn column_origin(pstate: &ParseState, expr: &Expr, levels_out: u32) -> Option<(Oid, AttrNumber)> {
    let Expr::Var(var) = expr else {
        return None;
    };
    if var.varattno <= 0 {
        return None;
    }
    let levelsup = var.varlevelsup + levels_out;
    let rte = pstate.rte_at(var.varno, levelsup).ok()?;
    match &rte.kind {
        RteKind::Relation { relid, .. } => Some((*relid, var.varattno)),
        RteKind::Join { join_alias_vars, .. } => column_origin(pstate, join_alias_vars.get(var.varattno as usize - 1)?, levelsup),
        _ => None,
    }
}

/// Output column name for an unnamed target.
pub(crate) fn figure_colname(node: &Node) -> String {
    figure_colname_inner(node).unwrap_or_else(|| "?column?".to_string())
}

fn figure_colname_inner(node: &Node) -> Option<String> {
    let last_field = |fields: &[Node]| {
        fields.iter().rev().find_map(|f| match f {
            Node::String(s) => Some(s.sval.clone()),
            _ => None,
        })
    };
    match node {
        Node::ColumnRef(c) => last_field(&c.fields),
        Node::ColumnRefJoin(j) => last_field(&j.column.fields),
        Node::Rownum(_) => Some("rownum".to_string()),
        Node::FuncCall(f) => f.funcname.last().cloned(),
        Node::TypeCast(tc) => figure_colname_inner(&tc.arg).or_else(|| tc.type_name.names.last().cloned()),
        Node::CollateClause(c) => figure_colname_inner(&c.arg),
        Node::CaseExpr(_) => Some("case".to_string()),
        Node::CoalesceExpr(_) => Some("coalesce".to_string()),
        Node::RowExpr(_) => Some("row".to_string()),
        Node::SubLink(s) => match (s.sub_link_type, &s.subselect) {
            (ast::SubLinkType::Exists, _) => Some("exists".to_string()),
            (ast::SubLinkType::Expr, Node::SelectStmt(select)) => {
                let first = select.leftmost().target_list.first()?;
                first.name.clone().or_else(|| first.val.as_ref().and_then(figure_colname_inner))
            }
            _ => None,
        },
        _ => None,
    }
}

// ============================================================================
// ORDER BY, GROUP BY, DISTINCT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseKind {
    OrderBy,
    GroupBy,
    DistinctOn,
}

impl ClauseKind {
    fn name(self) -> &'static str {
        match self {
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::DistinctOn => "DISTINCT ON",
        }
    }

    fn expr_kind(self) -> ExprKind {
        match self {
            ClauseKind::OrderBy => ExprKind::OrderBy,
            ClauseKind::GroupBy => ExprKind::GroupBy,
            ClauseKind::DistinctOn => ExprKind::DistinctOn,
        }
    }
}

/// Finds the target a sort/group item refers to, adding a junk target when needed.
///
/// A bare name matches an output column name and an integer constant an output
/// position. Anything else is analyzed as an expression and matched against the
/// target list. GROUP BY prefers input columns over output names.
fn find_target_entry(pstate: &mut ParseState, node: &Node, tlist: &mut Vec<TargetEntry>, clause: ClauseKind) -> Result<usize> {
    match node {
        Node::ColumnRef(c) if c.fields.len() == 1 => {
            if let Node::String(s) = &c.fields[0] {
                let name = s.sval.as_str();
                let input_column = clause == ClauseKind::GroupBy && pstate.lookup_column(name, c.location)?.is_some();
                if !input_column {
                    let mut found: Option<usize> = None;
                    for (i, tle) in tlist.iter().enumerate().filter(|(_, tle)| !tle.resjunk && tle.resname.as_deref() == Some(name)) {
                        match found {
                            Some(prev) if !tlist[prev].expr.same_as(&tle.expr) => {
                                return Err(pstate.error(SqlState::AmbiguousColumn, format!("{} \"{}\" is ambiguous", clause.name(), name), c.location));
                            }
                            Some(_) => {}
                            None => found = Some(i),
                        }
                    }
                    if let Some(i) = found {
                        return Ok(i);
                    }
                }
            }
        }
        Node::AConst(c) => {
            let Some(AConstValue::Integer(position)) = &c.val else {
                return Err(pstate.error(SqlState::SyntaxError, format!("non-integer constant in {}", clause.name()), c.location));
            };
            let visible: Vec<usize> = tlist.iter().enumerate().filter(|(_, tle)| !tle.resjunk).map(|(i, _)| i).collect();
            return usize::try_from(position.ival)
                .ok()
                .and_then(|p| p.checked_sub(1))
                .and_then(|p| visible.get(p).copied())
                .ok_or_else(|| {
                    pstate.error(SqlState::InvalidColumnReference, format!("{} position {} is not in select list", clause.name(), position.ival), c.location)
                });
        }
        _ => {}
    }

    let expr = transform_expr(pstate, node, clause.expr_kind())?;
    if let Some(i) = tlist.iter().position(|tle| tle.expr.same_as(&expr)) {
        return Ok(i);
    }
    let resno = next_resno(pstate);
    tlist.push(TargetEntry::new(expr, resno, None, true));
    Ok(tlist.len() - 1)
}

fn assign_sort_group_ref(tlist: &mut [TargetEntry], index: usize) -> u32 {
    if tlist[index].ressortgroupref == 0 {
        let next = tlist.iter().map(|tle| tle.ressortgroupref).max().unwrap_or(0) + 1;
        tlist[index].ressortgroupref = next;
    }
    tlist[index].ressortgroupref
}

fn make_sort_group_clause(
    pstate: &ParseState,
    tlist: &mut [TargetEntry],
    index: usize,
    descending: bool,
    nulls_first: Option<bool>,
    grouping: bool,
    location: i32,
) -> Result<SortGroupClause> {
    // Sorting needs a real type; literals of unknown type sort as text.
    if tlist[index].expr.type_oid() == UNKNOWNOID {
        tlist[index].expr = coerce_to_common_type(pstate, tlist[index].expr.clone(), TEXTOID, "ORDER BY")?;
    }
    let type_oid = tlist[index].expr.type_oid();
    let Some(ops) = pstate.catalog().sort_group_operators(type_oid) else {
        let what = if grouping { "equality" } else { "ordering" };
        return Err(Diagnostic::new(SqlState::UndefinedFunction, format!("could not identify an {} operator for type {}", what, type_name(pstate, type_oid)))
            .hint("Use an explicit ordering operator or modify the query.")
            .position(pstate.errposition(location))
            .into());
    };
    let tle_sort_group_ref = assign_sort_group_ref(tlist, index);
    Ok(SortGroupClause {
        tle_sort_group_ref,
        eqop: ops.eq,
        sortop: if descending { ops.gt } else { ops.lt },
        nulls_first: nulls_first.unwrap_or(descending),
        hashable: ops.hashable,
    })
}

pub(crate) fn transform_sort_clause(pstate: &mut ParseState, sorts: &[ast::SortBy], tlist: &mut Vec<TargetEntry>) -> Result<Vec<SortGroupClause>> {
    let mut clauses: Vec<SortGroupClause> = vec![];
    for sort in sorts {
        let index = find_target_entry(pstate, &sort.node, tlist, ClauseKind::OrderBy)?;
        let descending = sort.sortby_dir == SortByDir::Desc;
        let nulls_first = match sort.sortby_nulls {
            SortByNulls::Default => None,
            SortByNulls::First => Some(true),
            SortByNulls::Last => Some(false),
        };
        let location = if sort.location >= 0 { sort.location } else { sort.node.location() };
        let clause = make_sort_group_clause(pstate, tlist, index, descending, nulls_first, false, location)?;
        if !clauses.iter().any(|c| c.tle_sort_group_ref == clause.tle_sort_group_ref) {
            clauses.push(clause);
        }
    }
    Ok(clauses)
}

pub(crate) fn transform_group_clause(
    pstate: &mut ParseState,
    nodes: &[Node],
    tlist: &mut Vec<TargetEntry>,
    sort_clause: &[SortGroupClause],
) -> Result<Vec<SortGroupClause>> {
    let mut clauses: Vec<SortGroupClause> = vec![];
    for node in nodes {
        let index = find_target_entry(pstate, node, tlist, ClauseKind::GroupBy)?;
        let existing = tlist[index].ressortgroupref;
        if existing != 0 && clauses.iter().any(|c| c.tle_sort_group_ref == existing) {
            continue;
        }
        // Grouping by a sorted column reuses the ORDER BY's operators.
        if let Some(sorted) = sort_clause.iter().find(|c| existing != 0 && c.tle_sort_group_ref == existing) {
            clauses.push(sorted.clone());
            continue;
        }
        clauses.push(make_sort_group_clause(pstate, tlist, index, false, None, true, node.location())?);
    }
    Ok(clauses)
}

/// Plain DISTINCT: the ORDER BY items first, then every other output column.
pub(crate) fn transform_distinct_clause(
    pstate: &ParseState,
    tlist: &mut [TargetEntry],
    sort_clause: &[SortGroupClause],
) -> Result<Vec<SortGroupClause>> {
    let mut clauses: Vec<SortGroupClause> = vec![];
    for sort in sort_clause {
        let junk = tlist.iter().any(|tle| tle.ressortgroupref == sort.tle_sort_group_ref && tle.resjunk);
        if junk {
            return Err(pstate.error(SqlState::InvalidColumnReference, "for SELECT DISTINCT, ORDER BY expressions must appear in select list", -1));
        }
        clauses.push(sort.clone());
    }
    for index in 0..tlist.len() {
        if tlist[index].resjunk {
            continue;
        }
        let existing = tlist[index].ressortgroupref;
        if existing != 0 && clauses.iter().any(|c| c.tle_sort_group_ref == existing) {
            continue;
        }
        let location = tlist[index].expr.location();
        clauses.push(make_sort_group_clause(pstate, tlist, index, false, None, true, location)?);
    }
    Ok(clauses)
}

/// DISTINCT ON: its expressions must lead the ORDER BY list.
pub(crate) fn transform_distinct_on_clause(
    pstate: &mut ParseState,
    nodes: &[Node],
    tlist: &mut Vec<TargetEntry>,
    sort_clause: &[SortGroupClause],
) -> Result<Vec<SortGroupClause>> {
    let mut refs: Vec<(usize, u32, i32)> = vec![];
    for node in nodes {
        let index = find_target_entry(pstate, node, tlist, ClauseKind::DistinctOn)?;
        let sortgroupref = assign_sort_group_ref(tlist, index);
        refs.push((index, sortgroupref, node.location()));
    }

    let mismatch = |pstate: &ParseState, location: i32| {
        pstate.error(SqlState::InvalidColumnReference, "SELECT DISTINCT ON expressions must match initial ORDER BY expressions", location)
    };
    let mut clauses: Vec<SortGroupClause> = vec![];
    let mut skipped_sort_item = false;
    for sort in sort_clause {
        match refs.iter().find(|(_, r, _)| *r == sort.tle_sort_group_ref) {
            Some((_, _, location)) if skipped_sort_item => return Err(mismatch(pstate, *location)),
            Some(_) => clauses.push(sort.clone()),
            None => skipped_sort_item = true,
        }
    }
    for (index, sortgroupref, location) in refs {
        if clauses.iter().any(|c| c.tle_sort_group_ref == sortgroupref) {
            continue;
        }
        if skipped_sort_item {
            return Err(mismatch(pstate, location));
        }
        clauses.push(make_sort_group_clause(pstate, tlist, index, false, None, true, location)?);
    }
    Ok(clauses)
}

// ============================================================================
// Grouping check
// ============================================================================

/// Rejects columns used outside aggregates that are not grouped.
pub(crate) fn check_grouping(pstate: &ParseState, tlist: &[TargetEntry], having: Option<&Expr>, group_clause: &[SortGroupClause]) -> Result<()> {
    let groups: Vec<&Expr> = group_clause
        .iter()
        .filter_map(|gc| tlist.iter().find(|tle| tle.ressortgroupref == gc.tle_sort_group_ref))
        .map(|tle| &tle.expr)
        .collect();
    for expr in tlist.iter().map(|tle| &tle.expr).chain(having) {
        check_ungrouped(pstate, expr, &groups)?;
    }
    Ok(())
}

fn check_ungrouped(pstate: &ParseState, expr: &Expr, groups: &[&Expr]) -> Result<()> {
    if groups.iter().any(|g| g.same_as(expr)) {
        return Ok(());
    }
    let stack_size = pstate.config().stack_size;
    stacker::maybe_grow(32 * 1024, stack_size, || match expr {
        Expr::Aggref(_) => Ok(()),
        Expr::Var(var) if var.varlevelsup == 0 => {
            let rte = pstate.rte(var.varno)?;
            let column = usize::try_from(var.varattno)
                .ok()
                .and_then(|attno| attno.checked_sub(1))
                .and_then(|i| rte.columns.get(i))
                .map(|c| c.name.as_str())
                .unwrap_or("*");
            Err(pstate.error(
                SqlState::GroupingError,
                format!("column \"{}.{}\" must appear in the GROUP BY clause or be used in an aggregate function", rte.refname, column),
                var.location,
            ))
        }
        _ => expr.children().into_iter().try_for_each(|child| check_ungrouped(pstate, child, groups)),
    })
}

// ============================================================================
// WITH
// ============================================================================

/// Analyzes a WITH clause and makes its queries visible to the rest of the statement.
///
/// Without RECURSIVE each query sees only the ones before it; with RECURSIVE all of
/// them see each other and are analyzed in dependency order.
pub(crate) fn transform_with_clause(pstate: &mut ParseState, with: &WithClause) -> Result<()> {
    let mut items: Vec<Rc<CteItem>> = vec![];
    for (i, cte) in with.ctes.iter().enumerate() {
        if with.ctes[..i].iter().any(|other| other.ctename == cte.ctename) {
            return Err(pstate.error(SqlState::DuplicateAlias, format!("WITH query name \"{}\" specified more than once", cte.ctename), cte.location));
        }
        let modifying = match &cte.ctequery {
            Node::SelectStmt(_) => false,
            Node::InsertStmt(_) | Node::UpdateStmt(_) | Node::DeleteStmt(_) => true,
            other => return Err(Error::Internal(format!("unrecognized node type: {}", other.tag()))),
        };
        if modifying {
            if pstate.parent.is_some() {
                return Err(pstate.error(
                    SqlState::FeatureNotSupported,
                    "WITH clause containing a data-modifying statement must be at the top level",
                    cte.location,
                ));
            }
            pstate.has_modifying_cte = true;
        }
        let union_shaped = matches!(&cte.ctequery, Node::SelectStmt(s) if s.op == SetOperation::Union);
        let item = CteItem::new(&cte.ctename, cte.aliascolnames.clone(), with.recursive, union_shaped, cte.location);
        item.state.borrow_mut().modifying = modifying;
        items.push(Rc::new(item));
    }

    if with.recursive {
        pstate.ctenamespace.extend(items.iter().cloned());
        for index in recursive_order(pstate, with)? {
            analyze_cte(pstate, &with.ctes[index], &items[index])?;
        }
    } else {
        for (cte, item) in with.ctes.iter().zip(items) {
            analyze_cte(pstate, cte, &item)?;
            pstate.ctenamespace.push(item);
        }
    }
    Ok(())
}

fn analyze_cte(pstate: &mut ParseState, cte: &ast::CommonTableExpr, item: &Rc<CteItem>) -> Result<()> {
    item.state.borrow_mut().analyzing = item.recursive;
    let query = parse_sub_analyze(&cte.ctequery, pstate, Some(item.clone()));
    item.state.borrow_mut().analyzing = false;
    let query = query?;

    let outputs = if query.command_type == CmdType::Select { &query.target_list } else { &query.returning_list };
    let columns: Vec<RteColumn> = outputs
        .iter()
        .filter(|tle| !tle.resjunk)
        .map(|tle| RteColumn {
            name: tle.resname.clone().unwrap_or_else(|| "?column?".to_string()),
            type_oid: tle.expr.type_oid(),
            typmod: tle.expr.typmod(),
            collation: tle.expr.collation(),
            dropped: false,
        })
        .collect();

    // A data-modifying query without RETURNING exposes no columns.
    if query.command_type == CmdType::Select || !query.returning_list.is_empty() {
        if cte.aliascolnames.len() > columns.len() {
            return Err(pstate.error(
                SqlState::InvalidColumnReference,
                format!("WITH query \"{}\" has {} columns available but {} columns specified", cte.ctename, columns.len(), cte.aliascolnames.len()),
                cte.location,
            ));
        }
        let (declared, self_referenced) = {
            let state = item.state.borrow();
            (state.columns.clone(), state.self_referenced)
        };
        if let Some(declared) = declared.filter(|_| self_referenced) {
            for (i, (before, after)) in declared.iter().zip(&columns).enumerate() {
                if before.type_oid != after.type_oid {
                    return Err(Diagnostic::new(
                        SqlState::DatatypeMismatch,
                        format!(
                            "recursive query \"{}\" column {} has type {} in non-recursive term but type {} overall",
                            cte.ctename,
                            i + 1,
                            type_name(pstate, before.type_oid),
                            type_name(pstate, after.type_oid)
                        ),
                    )
                    .hint("Cast the output of the non-recursive term to the correct type.")
                    .position(pstate.errposition(cte.location))
                    .into());
                }
            }
        }
        item.set_columns(columns);
    }
    item.state.borrow_mut().query = Some(query);
    Ok(())
}

/// Order in which WITH RECURSIVE queries are analyzed so that each one's dependencies come first.
fn recursive_order(pstate: &ParseState, with: &WithClause) -> Result<Vec<usize>> {
    let stack_size = pstate.config().stack_size;
    let count = with.ctes.len();
    let deps: Vec<Vec<usize>> = with
        .ctes
        .iter()
        .enumerate()
        .map(|(i, cte)| {
            let mut referenced = HashSet::new();
            collect_range_names(&cte.ctequery, &mut referenced, stack_size);
            with.ctes.iter().enumerate().filter(|(j, other)| *j != i && referenced.contains(&other.ctename)).map(|(j, _)| j).collect()
        })
        .collect();

    let mut done = vec![false; count];
    let mut order = Vec::with_capacity(count);
    while order.len() < count {
        let Some(next) = (0..count).find(|&i| !done[i] && deps[i].iter().all(|&d| done[d])) else {
            let stuck = (0..count).find(|&i| !done[i]).unwrap_or_default();
            return Err(pstate.error(SqlState::FeatureNotSupported, "mutual recursion between WITH items is not implemented", with.ctes[stuck].location));
        };
        done[next] = true;
        order.push(next);
    }
    Ok(order)
}

/// Unqualified relation names referenced anywhere in a raw statement.
fn collect_range_names(node: &Node, names: &mut HashSet<String>, stack_size: usize) {
    if let Node::RangeVar(rv) = node {
        if rv.schemaname.is_empty() {
            names.insert(rv.relname.clone());
        }
        return;
    }
    stacker::maybe_grow(32 * 1024, stack_size, || {
        let mut visit = |n: &Node| collect_range_names(n, names, stack_size);
        match node {
            Node::SelectStmt(s) => {
                let with = s.with_clause.iter().flat_map(|w| w.ctes.iter().map(|c| &c.ctequery));
                let targets = s.target_list.iter().filter_map(|t| t.val.as_ref());
                let sets: Vec<Node> = s.larg.iter().chain(s.rarg.iter()).map(|arm| Node::SelectStmt(arm.clone())).collect();
                with.chain(targets)
                    .chain(s.from_clause.iter())
                    .chain(s.where_clause.iter())
                    .chain(s.group_clause.iter())
                    .chain(s.having_clause.iter())
                    .chain(s.sort_clause.iter().map(|sort| &sort.node))
                    .chain(s.values_lists.iter().flatten())
                    .chain(sets.iter())
                    .for_each(&mut visit);
            }
            Node::InsertStmt(s) => {
                if let Some(select) = &s.select_stmt {
                    visit(&Node::SelectStmt(select.clone()));
                }
                s.with_clause.iter().flat_map(|w| w.ctes.iter().map(|c| &c.ctequery)).for_each(&mut visit);
                s.returning_list.iter().filter_map(|t| t.val.as_ref()).for_each(&mut visit);
            }
            Node::UpdateStmt(s) => {
                s.with_clause.iter().flat_map(|w| w.ctes.iter().map(|c| &c.ctequery)).for_each(&mut visit);
                s.target_list.iter().chain(&s.returning_list).filter_map(|t| t.val.as_ref()).for_each(&mut visit);
                s.from_clause.iter().chain(s.where_clause.iter()).for_each(&mut visit);
            }
            Node::DeleteStmt(s) => {
                s.with_clause.iter().flat_map(|w| w.ctes.iter().map(|c| &c.ctequery)).for_each(&mut visit);
                s.returning_list.iter().filter_map(|t| t.val.as_ref()).for_each(&mut visit);
                s.using_clause.iter().chain(s.where_clause.iter()).for_each(&mut visit);
            }
            Node::RangeSubselect(rs) => visit(&rs.subquery),
            Node::RangeFunction(rf) => rf.function.args.iter().for_each(&mut visit),
            Node::JoinExpr(j) => {
                visit(&j.larg);
                visit(&j.rarg);
                j.quals.iter().for_each(&mut visit);
            }
            Node::SubLink(s) => {
                visit(&s.subselect);
                s.testexpr.iter().for_each(&mut visit);
            }
            Node::AExpr(a) => a.lexpr.iter().chain(a.rexpr.iter()).for_each(&mut visit),
            Node::BoolExpr(b) => b.args.iter().for_each(&mut visit),
            Node::FuncCall(f) => f.args.iter().for_each(&mut visit),
            Node::TypeCast(tc) => visit(&tc.arg),
            Node::CollateClause(c) => visit(&c.arg),
            Node::NullTest(n) => visit(&n.arg),
            Node::BooleanTest(b) => visit(&b.arg),
            Node::CaseExpr(c) => {
                c.arg.iter().chain(c.defresult.iter()).for_each(&mut visit);
                c.args.iter().flat_map(|w| [&w.expr, &w.result]).for_each(&mut visit);
            }
            Node::CoalesceExpr(c) => c.args.iter().for_each(&mut visit),
            Node::RowExpr(r) => r.args.iter().for_each(&mut visit),
            Node::List(items) => items.iter().for_each(&mut visit),
            _ => {}
        }
    })
}

/// The WITH queries declared at this level, in declaration order.
pub(crate) fn take_cte_list(pstate: &ParseState) -> Vec<CommonTableExpr> {
    pstate
        .ctenamespace
        .iter()
        .filter_map(|item| {
            let mut state = item.state.borrow_mut();
            let query = state.query.take()?;
            let columns = state.columns.clone().unwrap_or_default();
            Some(CommonTableExpr {
                ctename: item.name.clone(),
                aliascolnames: item.aliascolnames.clone(),
                ctequery: Box::new(query),
                location: item.location,
                cterecursive: state.self_referenced,
                cterefcount: state.refcount,
                ctecolnames: columns.iter().map(|c| c.name.clone()).collect(),
                ctecoltypes: columns.iter().map(|c| c.type_oid).collect(),
                ctecoltypmods: columns.iter().map(|c| c.typmod).collect(),
                ctecolcollations: columns.iter().map(|c| c.collation).collect(),
            })
        })
        .collect()
}
