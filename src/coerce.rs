//! Type coercion and common-type resolution.

use crate::catalog::{CoercionContext, Oid, TypeCategory, BOOLOID, FLOAT8OID, INT2OID, INT4OID, INT8OID, INVALID_OID, NUMERICOID, TEXTOID, UNKNOWNOID};
use crate::error::{Diagnostic, SqlState};
use crate::query::{CoerceExpr, CoercionForm, Const, Datum, Expr, ParamKind};
use crate::scope::ParseState;
use crate::Result;

/// Display name of a type.
pub(crate) fn type_name(pstate: &ParseState, oid: Oid) -> String {
    pstate.catalog().type_by_oid(oid).map(|t| t.name).unwrap_or_else(|| oid.to_string())
}

/// Default collation of a type, `INVALID_OID` when it is not collatable.
pub(crate) fn type_collation(pstate: &ParseState, oid: Oid) -> Oid {
    pstate.catalog().type_by_oid(oid).map(|t| t.collation).unwrap_or(INVALID_OID)
}

fn category_of(pstate: &ParseState, oid: Oid) -> (TypeCategory, bool) {
    pstate.catalog().type_by_oid(oid).map(|t| (t.category, t.preferred)).unwrap_or((TypeCategory::User, false))
}

/// Chooses the type a set of expressions can all be converted to.
///
/// `context` names the construct in the error (`"UNION"`, `"CASE"`, `"VALUES"`, ...).
/// Literals of unknown type take whatever the others agree on; when everything is
/// unknown the result is `text`.
pub(crate) fn select_common_type(pstate: &ParseState, exprs: &[&Expr], context: &str) -> Result<Oid> {
    let Some(first) = exprs.first() else {
        return Ok(TEXTOID);
    };
    let mut ptype = first.type_oid();
    let (mut pcategory, mut ppreferred) = category_of(pstate, ptype);

    for expr in &exprs[1..] {
        let ntype = expr.type_oid();
        if ntype == UNKNOWNOID || ntype == ptype {
            continue;
        }
        let (ncategory, npreferred) = category_of(pstate, ntype);
        if ptype == UNKNOWNOID {
            ptype = ntype;
            pcategory = ncategory;
            ppreferred = npreferred;
        } else if ncategory != pcategory {
            return Err(pstate.error(
                SqlState::DatatypeMismatch,
                format!("{} types {} and {} cannot be matched", context, type_name(pstate, ptype), type_name(pstate, ntype)),
                expr.location(),
            ));
        } else if !ppreferred
            && pstate.catalog().can_coerce(ptype, ntype, CoercionContext::Implicit)
            && !pstate.catalog().can_coerce(ntype, ptype, CoercionContext::Implicit)
        {
            ptype = ntype;
            pcategory = ncategory;
            ppreferred = npreferred;
        }
    }

    Ok(if ptype == UNKNOWNOID { TEXTOID } else { ptype })
}

/// Converts `expr` to `target`, or returns `None` when no conversion exists in `context`.
///
/// Unknown-typed literals are re-typed in place and unknown parameters have their
/// type deduced; everything else is wrapped in a [`CoerceExpr`].
pub(crate) fn coerce_to_target_type(
    pstate: &ParseState,
    expr: Expr,
    target: Oid,
    typmod: i32,
    context: CoercionContext,
    location: i32,
) -> Result<Option<Expr>> {
    let source = expr.type_oid();
    if !pstate.catalog().can_coerce(source, target, context) {
        return Ok(None);
    }
    if source == target && (typmod < 0 || typmod == expr.typmod()) {
        return Ok(Some(expr));
    }

    let collation = type_collation(pstate, target);
    let coerced = match expr {
        Expr::Const(c) if c.consttype == UNKNOWNOID => {
            let value = convert_literal(pstate, c.value, target, c.location)?;
            let location = if context == CoercionContext::Explicit && location >= 0 { location } else { c.location };
            Expr::Const(Const { consttype: target, consttypmod: typmod, constcollid: collation, value, location })
        }
        Expr::Param(mut p) if p.kind == ParamKind::Extern && p.paramtype == UNKNOWNOID && pstate.deduce_param_type(p.paramid, target, p.location)? => {
            p.paramtype = target;
            p.paramtypmod = -1;
            p.paramcollid = collation;
            Expr::Param(p)
        }
        arg => {
            let format = if context == CoercionContext::Explicit { CoercionForm::Explicit } else { CoercionForm::Implicit };
            Expr::Coerce(Box::new(CoerceExpr { arg, resulttype: target, resulttypmod: typmod, resultcollid: collation, format, location }))
        }
    };
    Ok(Some(coerced))
}

/// Interprets the text of an unknown-typed literal as a value of `target`.
fn convert_literal(pstate: &ParseState, value: Datum, target: Oid, location: i32) -> Result<Datum> {
    let Datum::Text(text) = value else {
        return Ok(value);
    };
    let invalid = || {
        pstate.error(
            SqlState::InvalidTextRepresentation,
            format!("invalid input syntax for type {}: \"{}\"", type_name(pstate, target), text),
            location,
        )
    };
    let trimmed = text.trim();
    Ok(match target {
        INT2OID | INT4OID | INT8OID => Datum::Int(trimmed.parse::<i64>().map_err(|_| invalid())?),
        NUMERICOID | FLOAT8OID => {
            trimmed.parse::<f64>().map_err(|_| invalid())?;
            Datum::Numeric(trimmed.to_string())
        }
        BOOLOID => match trimmed.to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Datum::Bool(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Datum::Bool(false),
            _ => return Err(invalid()),
        },
        _ => Datum::Text(text),
    })
}

/// Converts one branch of a CASE/UNION/VALUES/... to the type chosen for it.
pub(crate) fn coerce_to_common_type(pstate: &ParseState, expr: Expr, target: Oid, context: &str) -> Result<Expr> {
    let source = expr.type_oid();
    if source == target {
        return Ok(expr);
    }
    let location = expr.location();
    coerce_to_target_type(pstate, expr, target, -1, CoercionContext::Implicit, location)?.ok_or_else(|| {
        pstate.error(
            SqlState::CannotCoerce,
            format!("{} could not convert type {} to {}", context, type_name(pstate, source), type_name(pstate, target)),
            location,
        )
    })
}

/// Requires a boolean condition, as in WHERE or HAVING.
pub(crate) fn coerce_to_boolean(pstate: &ParseState, expr: Expr, construct: &str) -> Result<Expr> {
    let source = expr.type_oid();
    let location = expr.location();
    let expr = if source == BOOLOID {
        expr
    } else {
        coerce_to_target_type(pstate, expr, BOOLOID, -1, CoercionContext::Assignment, location)?.ok_or_else(|| {
            pstate.error(
                SqlState::DatatypeMismatch,
                format!("argument of {} must be type boolean, not type {}", construct, type_name(pstate, source)),
                location,
            )
        })?
    };
    if matches!(&expr, Expr::Func(f) if f.funcretset) {
        return Err(pstate.error(SqlState::DatatypeMismatch, format!("argument of {} must not return a set", construct), location));
    }
    Ok(expr)
}

/// Requires a value of one particular type, as in LIMIT.
pub(crate) fn coerce_to_specific_type(pstate: &ParseState, expr: Expr, target: Oid, construct: &str) -> Result<Expr> {
    let source = expr.type_oid();
    if source == target {
        return Ok(expr);
    }
    let location = expr.location();
    coerce_to_target_type(pstate, expr, target, -1, CoercionContext::Assignment, location)?.ok_or_else(|| {
        pstate.error(
            SqlState::DatatypeMismatch,
            format!("argument of {} must be type {}, not type {}", construct, type_name(pstate, target), type_name(pstate, source)),
            location,
        )
    })
}

/// Converts a value being stored into column `colname`.
pub(crate) fn coerce_assignment(pstate: &ParseState, expr: Expr, target: Oid, typmod: i32, colname: &str, location: i32) -> Result<Expr> {
    let source = expr.type_oid();
    let expr_location = expr.location();
    match coerce_to_target_type(pstate, expr, target, typmod, CoercionContext::Assignment, expr_location)? {
        Some(expr) => Ok(expr),
        None => Err(Diagnostic::new(
            SqlState::DatatypeMismatch,
            format!("column \"{}\" is of type {} but expression is of type {}", colname, type_name(pstate, target), type_name(pstate, source)),
        )
        .hint("You will need to rewrite or cast the expression.")
        .position(pstate.errposition(if expr_location >= 0 { expr_location } else { location }))
        .into()),
    }
}

/// Folds an integer constant, looking through implicit integer widening.
pub(crate) fn const_int64(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Const(Const { consttype: INT2OID | INT4OID | INT8OID, value: Datum::Int(v), .. }) => Some(*v),
        Expr::Coerce(c) if matches!(c.resulttype, INT2OID | INT4OID | INT8OID) && c.format == CoercionForm::Implicit => const_int64(&c.arg),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::scope::{AnalyzeContext, ParamState};
    use crate::Analyzer;

    fn int4(v: i64) -> Expr {
        Expr::Const(Const { consttype: INT4OID, consttypmod: -1, constcollid: INVALID_OID, value: Datum::Int(v), location: -1 })
    }

    fn unknown(s: &str) -> Expr {
        Expr::Const(Const { consttype: UNKNOWNOID, consttypmod: -1, constcollid: INVALID_OID, value: Datum::Text(s.to_string()), location: 3 })
    }

    #[test]
    fn it_prefers_the_wider_numeric_type() {
        let catalog = MemoryCatalog::new();
        let analyzer = Analyzer::new(&catalog);
        let ctx = AnalyzeContext::new(&analyzer, "SELECT 1", ParamState::default());
        let pstate = ParseState::new(&ctx);
        let numeric = Expr::Const(Const { consttype: NUMERICOID, consttypmod: -1, constcollid: INVALID_OID, value: Datum::Numeric("1.5".into()), location: -1 });
        assert_eq!(select_common_type(&pstate, &[&int4(1), &numeric], "UNION").unwrap(), NUMERICOID);
        assert_eq!(select_common_type(&pstate, &[&unknown("a"), &unknown("b")], "UNION").unwrap(), TEXTOID);
        let err = select_common_type(&pstate, &[&int4(1), &Expr::Const(Const::int8(1)), &unknown("x"), &Expr::Const(Const {
            consttype: TEXTOID,
            consttypmod: -1,
            constcollid: INVALID_OID,
            value: Datum::Text("x".into()),
            location: -1,
        })], "CASE")
        .unwrap_err();
        assert_eq!(err.to_string(), "CASE types int8 and text cannot be matched");
    }

    #[test]
    fn it_retypes_unknown_literals() {
        let catalog = MemoryCatalog::new();
        let analyzer = Analyzer::new(&catalog);
        let ctx = AnalyzeContext::new(&analyzer, "SELECT '42'", ParamState::default());
        let pstate = ParseState::new(&ctx);
        let coerced = coerce_to_common_type(&pstate, unknown("42"), INT4OID, "VALUES").unwrap();
        assert_eq!(coerced, int4_at(42, 3));
        let err = coerce_to_common_type(&pstate, unknown("forty"), INT4OID, "VALUES").unwrap_err();
        assert_eq!(err.code(), SqlState::InvalidTextRepresentation);
        assert_eq!(const_int64(&Expr::Coerce(Box::new(CoerceExpr {
            arg: int4(7),
            resulttype: INT8OID,
            resulttypmod: -1,
            resultcollid: INVALID_OID,
            format: CoercionForm::Implicit,
            location: -1,
        }))), Some(7));
    }

    fn int4_at(v: i64, location: i32) -> Expr {
        Expr::Const(Const { consttype: INT4OID, consttypmod: -1, constcollid: INVALID_OID, value: Datum::Int(v), location })
    }
}
