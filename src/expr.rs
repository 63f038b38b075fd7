//! Raw expression to typed [`Expr`].
//!
//! Column references resolve through the current [`ParseState`] and its parents,
//! operators and functions through the catalog. Whether aggregates, window
//! functions, set-returning functions, `DEFAULT` or `(+)` markers are allowed
//! depends on [`ExprKind`], the clause being analyzed.

use itertools::Itertools;

use crate::analyze::parse_sub_analyze;
use crate::ast::{self, AConstValue, AExprKind, BoolExprType, BoolTestType, Node, SubLinkType, TypeName};
use crate::catalog::{
    CoercionContext, FuncKind, FunctionMeta, Oid, OperatorMeta, ANYOID, BOOLOID, INT4OID, INVALID_OID, NUMERICOID, RECORDOID, TEXTOID, UNKNOWNOID,
    VARCHAROID, VARHDRSZ,
};
use crate::coerce::{coerce_to_boolean, coerce_to_common_type, coerce_to_target_type, select_common_type, type_collation, type_name};
use crate::error::{Diagnostic, SqlState};
use crate::query::{
    Aggref, BoolExpr, BooleanTest, CaseExpr, CaseWhen, CmdType, CoalesceExpr, CollateExpr, ColumnRefJoin, Const, Datum, Expr, FuncExpr, NullTest, OpExpr, Param,
    ParamKind, RowExpr, Rownum, SetToDefault, SubLink, Var, WindowFunc,
};
use crate::scope::{ExprKind, ParseState};
use crate::{Error, Result};

/// Analyzes `node` as part of the clause `kind`.
pub(crate) fn transform_expr(pstate: &mut ParseState, node: &Node, kind: ExprKind) -> Result<Expr> {
    pstate.with_expr_kind(kind, |pstate| transform(pstate, node))
}

fn transform(pstate: &mut ParseState, node: &Node) -> Result<Expr> {
    let stack_size = pstate.config().stack_size;
    stacker::maybe_grow(32 * 1024, stack_size, || transform_node(pstate, node))
}

fn transform_node(pstate: &mut ParseState, node: &Node) -> Result<Expr> {
    match node {
        Node::ColumnRef(c) => transform_column_ref(pstate, c),
        Node::ColumnRefJoin(j) => transform_join_marker(pstate, j),
        Node::Rownum(r) => Ok(Expr::Rownum(Rownum { location: r.location })),
        Node::ParamRef(p) => {
            let paramtype = pstate.param_type(p.number, p.location)?;
            Ok(Expr::Param(Param {
                kind: ParamKind::Extern,
                paramid: p.number,
                paramtype,
                paramtypmod: -1,
                paramcollid: type_collation(pstate, paramtype),
                location: p.location,
            }))
        }
        Node::AConst(c) => Ok(transform_const(c)),
        Node::TypeCast(tc) => transform_type_cast(pstate, tc),
        Node::CollateClause(c) => transform_collate(pstate, c),
        Node::AExpr(a) => match a.kind {
            AExprKind::Op => transform_aexpr_op(pstate, a),
            AExprKind::Like => {
                let left = transform_operand(pstate, a.lexpr.as_ref())?;
                let right = transform_operand(pstate, a.rexpr.as_ref())?;
                make_op(pstate, "~~", Some(left), right, a.location)
            }
            AExprKind::In => transform_in(pstate, a),
        },
        Node::FuncCall(f) => transform_func_call(pstate, f),
        Node::SubLink(s) => transform_sublink(pstate, s),
        Node::BoolExpr(b) => {
            let construct = match b.boolop {
                BoolExprType::And => "AND",
                BoolExprType::Or => "OR",
                BoolExprType::Not => "NOT",
            };
            let args = b
                .args
                .iter()
                .map(|arg| {
                    let arg = transform(pstate, arg)?;
                    coerce_to_boolean(pstate, arg, construct)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Expr::Bool(Box::new(BoolExpr { boolop: b.boolop, args, location: b.location })))
        }
        Node::NullTest(n) => {
            let arg = transform(pstate, &n.arg)?;
            Ok(Expr::NullTest(Box::new(NullTest { arg, nulltesttype: n.nulltesttype, location: n.location })))
        }
        Node::BooleanTest(b) => {
            let construct = match b.booltesttype {
                BoolTestType::IsTrue => "IS TRUE",
                BoolTestType::IsNotTrue => "IS NOT TRUE",
                BoolTestType::IsFalse => "IS FALSE",
                BoolTestType::IsNotFalse => "IS NOT FALSE",
                BoolTestType::IsUnknown => "IS UNKNOWN",
                BoolTestType::IsNotUnknown => "IS NOT UNKNOWN",
            };
            let arg = transform(pstate, &b.arg)?;
            let arg = coerce_to_boolean(pstate, arg, construct)?;
            Ok(Expr::BooleanTest(Box::new(BooleanTest { arg, booltesttype: b.booltesttype, location: b.location })))
        }
        Node::CaseExpr(c) => transform_case(pstate, c),
        Node::CoalesceExpr(c) => {
            let args = c.args.iter().map(|arg| transform(pstate, arg)).collect::<Result<Vec<_>>>()?;
            let coalescetype = select_common_type(pstate, &args.iter().collect_vec(), "COALESCE")?;
            let args = args.into_iter().map(|arg| coerce_to_common_type(pstate, arg, coalescetype, "COALESCE")).collect::<Result<Vec<_>>>()?;
            Ok(Expr::Coalesce(Box::new(CoalesceExpr { coalescetype, coalescecollid: INVALID_OID, args, location: c.location })))
        }
        Node::RowExpr(r) => {
            let args = r.args.iter().map(|arg| transform(pstate, arg)).collect::<Result<Vec<_>>>()?;
            Ok(Expr::Row(Box::new(RowExpr { args, location: r.location })))
        }
        Node::SetToDefault(d) => match pstate.expr_kind {
            ExprKind::Values | ExprKind::ValuesSingle if pstate.is_insert => {
                Ok(Expr::SetToDefault(SetToDefault { type_oid: UNKNOWNOID, typmod: -1, collation: INVALID_OID, location: d.location }))
            }
            ExprKind::UpdateSource if pstate.is_update => {
                Ok(Expr::SetToDefault(SetToDefault { type_oid: UNKNOWNOID, typmod: -1, collation: INVALID_OID, location: d.location }))
            }
            ExprKind::Values | ExprKind::ValuesSingle => {
                Err(pstate.error(SqlState::FeatureNotSupported, "DEFAULT can only appear in a VALUES list within INSERT", d.location))
            }
            _ => Err(pstate.error(SqlState::SyntaxError, "DEFAULT is not allowed in this context", d.location)),
        },
        other => Err(Error::Internal(format!("unrecognized node type: {}", other.tag()))),
    }
}

fn transform_operand(pstate: &mut ParseState, node: Option<&Node>) -> Result<Expr> {
    match node {
        Some(node) => transform(pstate, node),
        None => Err(Error::Internal("operator is missing an argument".to_string())),
    }
}

// ============================================================================
// Column references
// ============================================================================

fn transform_column_ref(pstate: &mut ParseState, c: &ast::ColumnRef) -> Result<Expr> {
    let fields: Vec<Option<&str>> = c
        .fields
        .iter()
        .map(|f| match f {
            Node::String(s) => Ok(Some(s.sval.as_str())),
            Node::AStar(_) => Ok(None),
            other => Err(Error::Internal(format!("unexpected node in column reference: {}", other.tag()))),
        })
        .collect::<Result<_>>()?;

    match fields.as_slice() {
        [Some(name)] => {
            if let Some(var) = pstate.lookup_column(name, c.location)? {
                return Ok(Expr::Var(var));
            }
            // A bare table name is a whole-row reference.
            if let Some((rtindex, levelsup)) = pstate.refname_lookup(None, name, c.location)? {
                return Ok(Expr::Var(whole_row_var(rtindex, levelsup, c.location)));
            }
            Err(pstate.error(SqlState::UndefinedColumn, format!("column \"{}\" does not exist", name), c.location))
        }
        [Some(rel), Some(col)] => Ok(Expr::Var(pstate.lookup_qualified_column(None, rel, col, c.location)?)),
        [Some(schema), Some(rel), Some(col)] => Ok(Expr::Var(pstate.lookup_qualified_column(Some(schema), rel, col, c.location)?)),
        fields if fields.last() == Some(&None) => {
            Err(pstate.error(SqlState::FeatureNotSupported, "row expansion via \"*\" is not supported here", c.location))
        }
        _ => Err(pstate.error(
            SqlState::SyntaxError,
            format!("improper qualified name (too many dotted names): {}", fields.iter().map(|f| f.unwrap_or("*")).join(".")),
            c.location,
        )),
    }
}

fn whole_row_var(rtindex: usize, levelsup: u32, location: i32) -> Var {
    Var { varno: rtindex, varattno: 0, vartype: RECORDOID, vartypmod: -1, varcollid: INVALID_OID, varlevelsup: levelsup, location }
}

fn transform_join_marker(pstate: &mut ParseState, j: &ast::ColumnRefJoin) -> Result<Expr> {
    let allowed = pstate.allow_join_markers && matches!(pstate.expr_kind, ExprKind::Where | ExprKind::JoinOn);
    if !allowed {
        return Err(pstate.error(SqlState::SyntaxError, "the (+) operator is only allowed in the WHERE clause", j.location));
    }
    match transform_column_ref(pstate, &j.column)? {
        Expr::Var(var) if var.varlevelsup == 0 && var.varattno > 0 => Ok(Expr::ColumnRefJoin(Box::new(ColumnRefJoin { var, location: j.location }))),
        _ => Err(pstate.error(SqlState::SyntaxError, "the (+) operator can only be applied to a column of a table in FROM", j.location)),
    }
}

// ============================================================================
// Literals and casts
// ============================================================================

fn transform_const(c: &ast::AConst) -> Expr {
    let (consttype, value) = match &c.val {
        _ if c.isnull => (UNKNOWNOID, Datum::Null),
        None => (UNKNOWNOID, Datum::Null),
        Some(AConstValue::Integer(i)) => (INT4OID, Datum::Int(i.ival as i64)),
        Some(AConstValue::Float(f)) => (NUMERICOID, Datum::Numeric(f.fval.clone())),
        Some(AConstValue::Boolean(b)) => (BOOLOID, Datum::Bool(b.boolval)),
        Some(AConstValue::String(s)) => (UNKNOWNOID, Datum::Text(s.sval.clone())),
    };
    Expr::Const(Const { consttype, consttypmod: -1, constcollid: INVALID_OID, value, location: c.location })
}

/// Resolves a type name and its modifier.
pub(crate) fn resolve_type_name(pstate: &ParseState, type_name: &TypeName) -> Result<(Oid, i32)> {
    let name = type_name.names.iter().join(".");
    let base = type_name.names.last().map(String::as_str).unwrap_or_default();
    let Some(meta) = pstate.catalog().type_by_name(base) else {
        return Err(pstate.error(SqlState::UndefinedObject, format!("type \"{}\" does not exist", name), type_name.location));
    };

    let mods: Vec<i32> = type_name
        .typmods
        .iter()
        .map(|m| match m {
            Node::AConst(c) => match &c.val {
                Some(AConstValue::Integer(i)) => Ok(i.ival),
                _ => Err(pstate.error(SqlState::SyntaxError, "type modifiers must be simple constants or identifiers", c.location)),
            },
            other => Err(pstate.error(SqlState::SyntaxError, "type modifiers must be simple constants or identifiers", other.location())),
        })
        .collect::<Result<_>>()?;

    let typmod = match (meta.oid, mods.as_slice()) {
        (_, []) => -1,
        (VARCHAROID, [n]) => n + VARHDRSZ,
        (NUMERICOID, [precision]) => (precision << 16) + VARHDRSZ,
        (NUMERICOID, [precision, scale]) => ((precision << 16) | scale) + VARHDRSZ,
        _ => return Err(pstate.error(SqlState::SyntaxError, format!("type modifier is not allowed for type \"{}\"", meta.name), type_name.location)),
    };
    Ok((meta.oid, typmod))
}

fn transform_type_cast(pstate: &mut ParseState, tc: &ast::TypeCast) -> Result<Expr> {
    let arg = transform(pstate, &tc.arg)?;
    let (target, typmod) = resolve_type_name(pstate, &tc.type_name)?;
    let source = arg.type_oid();
    let location = if tc.location >= 0 { tc.location } else { arg.location() };
    coerce_to_target_type(pstate, arg, target, typmod, CoercionContext::Explicit, location)?.ok_or_else(|| {
        pstate.error(SqlState::CannotCoerce, format!("cannot cast type {} to {}", type_name(pstate, source), type_name(pstate, target)), location)
    })
}

fn transform_collate(pstate: &mut ParseState, c: &ast::CollateClause) -> Result<Expr> {
    let mut arg = transform(pstate, &c.arg)?;
    if arg.type_oid() == UNKNOWNOID {
        arg = coerce_to_common_type(pstate, arg, TEXTOID, "COLLATE")?;
    }
    let name = c.collname.iter().join(".");
    let Some(coll_oid) = c.collname.last().and_then(|n| pstate.catalog().collation_by_name(n)) else {
        return Err(pstate.error(SqlState::UndefinedObject, format!("collation \"{}\" does not exist", name), c.location));
    };
    if type_collation(pstate, arg.type_oid()) == INVALID_OID {
        return Err(pstate.error(
            SqlState::DatatypeMismatch,
            format!("collations are not supported by type {}", type_name(pstate, arg.type_oid())),
            c.location,
        ));
    }
    Ok(Expr::Collate(Box::new(CollateExpr { arg, coll_oid, location: c.location })))
}

// ============================================================================
// Operators
// ============================================================================

fn transform_aexpr_op(pstate: &mut ParseState, a: &ast::AExpr) -> Result<Expr> {
    let name = a.name.last().map(String::as_str).unwrap_or_default();
    let left = match &a.lexpr {
        Some(l) => Some(transform(pstate, l)?),
        None => None,
    };
    let right = transform_operand(pstate, a.rexpr.as_ref())?;
    make_op(pstate, name, left, right, a.location)
}

/// `x IN (a, b)` becomes `x = a OR x = b`.
fn transform_in(pstate: &mut ParseState, a: &ast::AExpr) -> Result<Expr> {
    let name = a.name.last().map(String::as_str).unwrap_or("=");
    let left = transform_operand(pstate, a.lexpr.as_ref())?;
    let items = match &a.rexpr {
        Some(Node::List(items)) => items.as_slice(),
        Some(other) => std::slice::from_ref(other),
        None => &[],
    };
    let mut comparisons = items
        .iter()
        .map(|item| {
            let right = transform(pstate, item)?;
            make_op(pstate, name, Some(left.clone()), right, a.location)
        })
        .collect::<Result<Vec<_>>>()?;
    match comparisons.len() {
        0 => Err(pstate.error(SqlState::SyntaxError, "IN list must not be empty", a.location)),
        1 => Ok(comparisons.remove(0)),
        _ => Ok(Expr::Bool(Box::new(BoolExpr { boolop: BoolExprType::Or, args: comparisons, location: a.location }))),
    }
}

/// Builds an operator call, resolving the operator from the argument types.
pub(crate) fn make_op(pstate: &ParseState, name: &str, left: Option<Expr>, right: Expr, location: i32) -> Result<Expr> {
    let name = if name == "!=" { "<>" } else { name };
    let ltype = left.as_ref().map(Expr::type_oid).unwrap_or(INVALID_OID);
    let rtype = right.type_oid();
    let op = resolve_operator(pstate, name, ltype, rtype, location)?;

    let mut args = vec![];
    if let Some(left) = left {
        args.push(coerce_arg(pstate, left, op.left)?);
    }
    args.push(coerce_arg(pstate, right, op.right)?);

    Ok(Expr::Op(Box::new(OpExpr {
        opno: op.oid,
        opname: op.name,
        opfuncid: op.func,
        opresulttype: op.result,
        volatility: op.volatility,
        args,
        opcollid: INVALID_OID,
        inputcollid: INVALID_OID,
        location,
    })))
}

fn coerce_arg(pstate: &ParseState, arg: Expr, declared: Oid) -> Result<Expr> {
    let declared = if declared == ANYOID {
        if arg.type_oid() != UNKNOWNOID {
            return Ok(arg);
        }
        TEXTOID
    } else {
        declared
    };
    let location = arg.location();
    let source = arg.type_oid();
    coerce_to_target_type(pstate, arg, declared, -1, CoercionContext::Implicit, location)?
        .ok_or_else(|| Error::Internal(format!("could not coerce {} to {} for a resolved call", type_name(pstate, source), type_name(pstate, declared))))
}

fn resolve_operator(pstate: &ParseState, name: &str, ltype: Oid, rtype: Oid, location: i32) -> Result<OperatorMeta> {
    let prefix = ltype == INVALID_OID;
    let candidates: Vec<OperatorMeta> = pstate.catalog().operators(name).into_iter().filter(|op| (op.left == INVALID_OID) == prefix).collect();
    let signatures: Vec<Vec<Oid>> = candidates.iter().map(|op| if prefix { vec![op.right] } else { vec![op.left, op.right] }).collect();
    let actual: Vec<Oid> = if prefix { vec![rtype] } else { vec![ltype, rtype] };

    let describe = || {
        if prefix {
            format!("{} {}", name, type_name(pstate, rtype))
        } else {
            format!("{} {} {}", type_name(pstate, ltype), name, type_name(pstate, rtype))
        }
    };
    match choose_candidate(pstate, &signatures, &actual) {
        Choice::One(i) => Ok(candidates[i].clone()),
        Choice::None => Err(Diagnostic::new(SqlState::UndefinedFunction, format!("operator does not exist: {}", describe()))
            .hint("No operator matches the given name and argument type(s). You might need to add explicit type casts.")
            .position(pstate.errposition(location))
            .into()),
        Choice::Ambiguous => Err(Diagnostic::new(SqlState::AmbiguousFunction, format!("operator is not unique: {}", describe()))
            .hint("Could not choose a best candidate operator. You might need to add explicit type casts.")
            .position(pstate.errposition(location))
            .into()),
    }
}

enum Choice {
    None,
    One(usize),
    Ambiguous,
}

/// Picks the signature that best fits the actual argument types.
///
/// Unknown-typed arguments are assumed to share the type of the known ones when
/// those agree (text when everything is unknown). Among the signatures every
/// argument coerces to implicitly, the one with the most exact matches wins, then
/// the one with the most preferred types.
fn choose_candidate(pstate: &ParseState, signatures: &[Vec<Oid>], actual: &[Oid]) -> Choice {
    let known: Vec<Oid> = actual.iter().copied().filter(|t| *t != UNKNOWNOID).unique().collect();
    let assumed = match known.as_slice() {
        [] => TEXTOID,
        [only] => *only,
        _ => INVALID_OID,
    };
    let effective: Vec<Oid> = actual.iter().map(|t| if *t == UNKNOWNOID { assumed } else { *t }).collect();

    let catalog = pstate.catalog();
    let scored: Vec<(usize, (usize, usize))> = signatures
        .iter()
        .enumerate()
        .filter(|(_, declared)| declared.len() == actual.len())
        .filter(|(_, declared)| {
            declared
                .iter()
                .zip(actual)
                .all(|(d, a)| *d == ANYOID || *a == UNKNOWNOID || catalog.can_coerce(*a, *d, CoercionContext::Implicit))
        })
        .map(|(i, declared)| {
            let exact = declared.iter().zip(&effective).filter(|(d, e)| *d == *e).count();
            let preferred = declared.iter().filter(|d| catalog.type_by_oid(**d).map(|t| t.preferred).unwrap_or(false)).count();
            (i, (exact, preferred))
        })
        .collect();

    let Some(best) = scored.iter().map(|(_, score)| *score).max() else {
        return Choice::None;
    };
    let winners: Vec<usize> = scored.iter().filter(|(_, score)| *score == best).map(|(i, _)| *i).collect();
    match winners.as_slice() {
        [one] => Choice::One(*one),
        _ => Choice::Ambiguous,
    }
}

// ============================================================================
// Function calls
// ============================================================================

fn aggregates_allowed(kind: ExprKind) -> bool {
    matches!(kind, ExprKind::None | ExprKind::Other | ExprKind::SelectTarget | ExprKind::Having | ExprKind::OrderBy | ExprKind::DistinctOn)
}

fn windows_allowed(kind: ExprKind) -> bool {
    matches!(kind, ExprKind::None | ExprKind::Other | ExprKind::SelectTarget | ExprKind::OrderBy | ExprKind::DistinctOn)
}

fn contains_aggregate(exprs: &[Expr]) -> bool {
    exprs.iter().any(|e| e.any(&mut |e| matches!(e, Expr::Aggref(_))))
}

fn contains_window(exprs: &[Expr]) -> bool {
    exprs.iter().any(|e| e.any(&mut |e| matches!(e, Expr::WindowFunc(_))))
}

fn transform_func_call(pstate: &mut ParseState, f: &ast::FuncCall) -> Result<Expr> {
    let name = f.funcname.iter().join(".");
    let base = f.funcname.last().map(String::as_str).unwrap_or_default();
    let args = f.args.iter().map(|arg| transform(pstate, arg)).collect::<Result<Vec<_>>>()?;
    let actual: Vec<Oid> = args.iter().map(Expr::type_oid).collect();

    let candidates: Vec<FunctionMeta> = pstate.catalog().functions(base);
    let signatures: Vec<Vec<Oid>> = candidates.iter().map(|c| c.args.clone()).collect();
    let describe = || format!("{}({})", name, if f.agg_star { "*".to_string() } else { actual.iter().map(|t| type_name(pstate, *t)).join(", ") });
    let func = match choose_candidate(pstate, &signatures, &actual) {
        Choice::One(i) => candidates[i].clone(),
        Choice::None => {
            return Err(Diagnostic::new(SqlState::UndefinedFunction, format!("function {} does not exist", describe()))
                .hint("No function matches the given name and argument types. You might need to add explicit type casts.")
                .position(pstate.errposition(f.location))
                .into())
        }
        Choice::Ambiguous => {
            return Err(Diagnostic::new(SqlState::AmbiguousFunction, format!("function {} is not unique", describe()))
                .hint("Could not choose a best candidate function. You might need to add explicit type casts.")
                .position(pstate.errposition(f.location))
                .into())
        }
    };

    if f.agg_star && func.kind == FuncKind::Normal {
        return Err(pstate.error(SqlState::WrongObjectType, format!("{}(*) specified, but {} is not an aggregate function", name, name), f.location));
    }
    if f.agg_distinct && func.kind != FuncKind::Aggregate {
        return Err(pstate.error(SqlState::WrongObjectType, format!("DISTINCT specified, but {} is not an aggregate function", name), f.location));
    }

    let args = args.into_iter().zip(&func.args).map(|(arg, declared)| coerce_arg(pstate, arg, *declared)).collect::<Result<Vec<_>>>()?;
    let kind = pstate.expr_kind;

    if let Some(over) = &f.over {
        if func.kind == FuncKind::Normal {
            return Err(pstate.error(
                SqlState::WrongObjectType,
                format!("OVER specified, but {} is not a window function nor an aggregate function", name),
                f.location,
            ));
        }
        if !windows_allowed(kind) {
            return Err(pstate.error(SqlState::WindowingError, format!("window functions are not allowed in {}", kind.name()), f.location));
        }
        if contains_window(&args) {
            return Err(pstate.error(SqlState::WindowingError, "window function calls cannot be nested", f.location));
        }
        let partition = pstate.with_expr_kind(ExprKind::WindowPartition, |pstate| {
            over.partition_clause.iter().map(|node| transform(pstate, node)).collect::<Result<Vec<_>>>()
        })?;
        let order = pstate.with_expr_kind(ExprKind::WindowPartition, |pstate| {
            over.order_clause.iter().map(|sort| transform(pstate, &sort.node)).collect::<Result<Vec<_>>>()
        })?;
        if contains_window(&partition) || contains_window(&order) {
            return Err(pstate.error(SqlState::WindowingError, "window function calls cannot be nested", f.location));
        }
        pstate.has_window_funcs = true;
        return Ok(Expr::WindowFunc(Box::new(WindowFunc {
            winfnoid: func.oid,
            winname: func.name,
            wintype: func.result,
            args,
            partition,
            order,
            wincollid: INVALID_OID,
            inputcollid: INVALID_OID,
            location: f.location,
        })));
    }

    match func.kind {
        FuncKind::Window => Err(pstate.error(SqlState::WrongObjectType, format!("window function {} requires an OVER clause", name), f.location)),
        FuncKind::Aggregate => {
            if !aggregates_allowed(kind) {
                return Err(pstate.error(SqlState::GroupingError, format!("aggregate functions are not allowed in {}", kind.name()), f.location));
            }
            if contains_aggregate(&args) {
                return Err(pstate.error(SqlState::GroupingError, "aggregate function calls cannot be nested", f.location));
            }
            if contains_window(&args) {
                return Err(pstate.error(SqlState::GroupingError, "aggregate function calls cannot contain window function calls", f.location));
            }
            pstate.has_aggs = true;
            Ok(Expr::Aggref(Box::new(Aggref {
                aggfnoid: func.oid,
                aggname: func.name,
                aggtype: func.result,
                args,
                aggstar: f.agg_star,
                aggdistinct: f.agg_distinct,
                aggcollid: INVALID_OID,
                inputcollid: INVALID_OID,
                location: f.location,
            })))
        }
        FuncKind::Normal => {
            if func.returns_set {
                if matches!(kind, ExprKind::Where | ExprKind::JoinOn | ExprKind::Having) {
                    return Err(pstate.error(SqlState::FeatureNotSupported, format!("set-returning functions are not allowed in {}", kind.name()), f.location));
                }
                if kind == ExprKind::SelectTarget {
                    pstate.has_target_srfs = true;
                }
            }
            Ok(Expr::Func(Box::new(FuncExpr {
                funcid: func.oid,
                funcname: func.name,
                funcresulttype: func.result,
                funcretset: func.returns_set,
                volatility: func.volatility,
                args,
                funccollid: INVALID_OID,
                inputcollid: INVALID_OID,
                location: f.location,
            })))
        }
    }
}

// ============================================================================
// Sublinks
// ============================================================================

fn transform_sublink(pstate: &mut ParseState, s: &ast::SubLink) -> Result<Expr> {
    let query = parse_sub_analyze(&s.subselect, pstate, None)?;
    if query.command_type != CmdType::Select || query.utility_stmt.is_some() {
        return Err(Error::Internal("unexpected non-SELECT command in SubLink".to_string()));
    }
    pstate.has_sub_links = true;

    let outputs: Vec<(Oid, i32, Oid)> = query.visible_targets().map(|tle| (tle.expr.type_oid(), tle.expr.typmod(), tle.expr.collation())).collect();
    let (testexpr, result_type, result_collid) = match s.sub_link_type {
        SubLinkType::Exists => (None, BOOLOID, INVALID_OID),
        SubLinkType::Expr => match outputs.as_slice() {
            [(type_oid, _, collation)] => (None, *type_oid, *collation),
            _ => return Err(pstate.error(SqlState::SyntaxError, "subquery must return only one column", s.location)),
        },
        SubLinkType::Any | SubLinkType::All => {
            let left = transform_operand(pstate, s.testexpr.as_ref())?;
            let lefts = match left {
                Expr::Row(row) => row.args,
                single => vec![single],
            };
            if lefts.len() < outputs.len() {
                return Err(pstate.error(SqlState::SyntaxError, "subquery has too many columns", s.location));
            }
            if lefts.len() > outputs.len() {
                return Err(pstate.error(SqlState::SyntaxError, "subquery has too few columns", s.location));
            }
            let opname = s.oper_name.last().map(String::as_str).unwrap_or("=");
            let mut comparisons = vec![];
            for (i, (left, (paramtype, paramtypmod, paramcollid))) in lefts.into_iter().zip(outputs).enumerate() {
                let param = Expr::Param(Param {
                    kind: ParamKind::Sublink,
                    paramid: i as i32 + 1,
                    paramtype,
                    paramtypmod,
                    paramcollid,
                    location: -1,
                });
                let comparison = make_op(pstate, opname, Some(left), param, s.location)?;
                if comparison.type_oid() != BOOLOID {
                    return Err(pstate.error(
                        SqlState::DatatypeMismatch,
                        format!("operator {} must return type boolean, not type {}", opname, type_name(pstate, comparison.type_oid())),
                        s.location,
                    ));
                }
                comparisons.push(comparison);
            }
            (Expr::and_all(comparisons), BOOLOID, INVALID_OID)
        }
    };

    Ok(Expr::SubLink(Box::new(SubLink {
        sub_link_type: s.sub_link_type,
        testexpr,
        subselect: Box::new(query),
        result_type,
        result_collid,
        location: s.location,
    })))
}

// ============================================================================
// CASE
// ============================================================================

fn transform_case(pstate: &mut ParseState, c: &ast::CaseExpr) -> Result<Expr> {
    // A simple CASE is expanded into comparisons against the test value.
    let test = match &c.arg {
        Some(arg) => Some(transform(pstate, arg)?),
        None => None,
    };

    let mut conditions = vec![];
    let mut results = vec![];
    for when in &c.args {
        let raw = transform(pstate, &when.expr)?;
        let condition = match &test {
            Some(test) => make_op(pstate, "=", Some(test.clone()), raw, when.location)?,
            None => raw,
        };
        conditions.push(coerce_to_boolean(pstate, condition, "CASE/WHEN")?);
        results.push(transform(pstate, &when.result)?);
    }
    let defresult = match &c.defresult {
        Some(node) => transform(pstate, node)?,
        None => Expr::Const(Const { consttype: UNKNOWNOID, consttypmod: -1, constcollid: INVALID_OID, value: Datum::Null, location: -1 }),
    };

    let casetype = {
        let all: Vec<&Expr> = std::iter::once(&defresult).chain(results.iter()).collect();
        select_common_type(pstate, &all, "CASE")?
    };
    let args = conditions
        .into_iter()
        .zip(results)
        .map(|(expr, result)| Ok::<_, Error>(CaseWhen { expr, result: coerce_to_common_type(pstate, result, casetype, "CASE/WHEN")? }))
        .collect::<Result<Vec<_>>>()?;
    let defresult = coerce_to_common_type(pstate, defresult, casetype, "CASE/ELSE")?;

    Ok(Expr::Case(Box::new(CaseExpr { casetype, casecollid: INVALID_OID, arg: None, args, defresult: Some(defresult), location: c.location })))
}
