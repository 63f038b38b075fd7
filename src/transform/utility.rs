//! Utility statements that embed an optimizable query: DECLARE CURSOR, EXPLAIN and CREATE TABLE AS.

use crate::ast::{AConstValue, CreateTableAsStmt, CursorOptions, DeclareCursorStmt, ExplainStmt, Node, ObjectType, RelPersistence};
use crate::error::{Diagnostic, SqlState};
use crate::query::{CmdType, CreateTableAs, Expr, IntoTarget, ParamKind, Query, RteKind, UtilityStmt};
use crate::scope::ParseState;
use crate::transform::{transform_stmt, transform_top_level_stmt};
use crate::{Error, Result};

pub(crate) fn transform_declare_cursor_stmt(pstate: &mut ParseState, stmt: &DeclareCursorStmt) -> Result<Query> {
    if stmt.options.contains(CursorOptions::SCROLL) && stmt.options.contains(CursorOptions::NO_SCROLL) {
        return Err(pstate.error(SqlState::InvalidCursorDefinition, "cannot specify both SCROLL and NO SCROLL", -1));
    }

    let mut query = transform_stmt(pstate, &stmt.query)?;
    if query.command_type != CmdType::Select || query.utility_stmt.is_some() {
        return Err(Error::Internal("unexpected non-SELECT command in DECLARE CURSOR".to_string()));
    }
    if query.has_modifying_cte {
        return Err(pstate.error(SqlState::FeatureNotSupported, "DECLARE CURSOR must not contain data-modifying statements in WITH", -1));
    }

    // Locked rows can only be read by a cursor that never revisits them.
    if let Some(mark) = query.row_marks.first() {
        let strength = mark.strength.as_str();
        let read_only = [
            (CursorOptions::HOLD, "DECLARE CURSOR WITH HOLD", "Holdable cursors must be READ ONLY."),
            (CursorOptions::SCROLL, "DECLARE SCROLL CURSOR", "Scrollable cursors must be READ ONLY."),
            (CursorOptions::INSENSITIVE, "DECLARE INSENSITIVE CURSOR", "Insensitive cursors must be READ ONLY."),
        ];
        if let Some((_, what, detail)) = read_only.iter().find(|(bit, _, _)| stmt.options.contains(*bit)) {
            return Err(Diagnostic::new(SqlState::FeatureNotSupported, format!("{} ... {} is not supported", what, strength)).detail(*detail).into());
        }
    }

    query.utility_stmt = Some(UtilityStmt::DeclareCursor { portalname: stmt.portalname.clone(), options: stmt.options });
    Ok(query)
}

pub(crate) fn transform_explain_stmt(pstate: &mut ParseState, stmt: &ExplainStmt) -> Result<Query> {
    let query = transform_top_level_stmt(pstate, &stmt.query)?;
    let options = stmt
        .options
        .iter()
        .map(|opt| match opt.arg.as_ref().and_then(def_value) {
            Some(value) => format!("{} {}", opt.defname, value),
            None => opt.defname.clone(),
        })
        .collect();
    Ok(Query { command_type: CmdType::Utility, utility_stmt: Some(UtilityStmt::Explain { query: Box::new(query), options }), ..Default::default() })
}

/// Text of an option argument.
fn def_value(node: &Node) -> Option<String> {
    match node {
        Node::String(s) => Some(s.sval.clone()),
        Node::Integer(i) => Some(i.ival.to_string()),
        Node::Float(f) => Some(f.fval.clone()),
        Node::Boolean(b) => Some(b.boolval.to_string()),
        Node::AConst(c) => match &c.val {
            Some(AConstValue::String(s)) => Some(s.sval.clone()),
            Some(AConstValue::Integer(i)) => Some(i.ival.to_string()),
            Some(AConstValue::Float(f)) => Some(f.fval.clone()),
            Some(AConstValue::Boolean(b)) => Some(b.boolval.to_string()),
            None => None,
        },
        _ => None,
    }
}

pub(crate) fn transform_create_table_as_stmt(pstate: &mut ParseState, stmt: &CreateTableAsStmt) -> Result<Query> {
    let query = transform_stmt(pstate, &stmt.query)?;
    let mut into = IntoTarget::from(stmt.into.clone());

    if stmt.objtype == ObjectType::MatView {
        let location = stmt.into.rel.location;
        if query.has_modifying_cte {
            return Err(pstate.error(SqlState::FeatureNotSupported, "materialized views must not use data-modifying statements in WITH", location));
        }
        if uses_temp_relation(&query) {
            return Err(pstate.error(SqlState::FeatureNotSupported, "materialized views must not use temporary tables or views", location));
        }
        if uses_extern_params(&query) {
            return Err(pstate.error(SqlState::FeatureNotSupported, "materialized views may not be defined using bound parameters", location));
        }
        if stmt.into.rel.relpersistence == RelPersistence::Unlogged {
            return Err(pstate.error(SqlState::FeatureNotSupported, "materialized views cannot be UNLOGGED", location));
        }
        into.view_query = Some(Box::new(query.clone()));
    }

    let ctas = CreateTableAs {
        query: Box::new(query),
        into,
        objtype: stmt.objtype,
        is_select_into: stmt.is_select_into,
        if_not_exists: stmt.if_not_exists,
    };
    Ok(Query { command_type: CmdType::Utility, utility_stmt: Some(UtilityStmt::CreateTableAs(Box::new(ctas))), ..Default::default() })
}

fn uses_temp_relation(query: &Query) -> bool {
    query.any_query(&mut |q| {
        q.rtable.iter().any(|rte| matches!(rte.kind, RteKind::Relation { persistence: RelPersistence::Temp, .. }))
    })
}

fn uses_extern_params(query: &Query) -> bool {
    query.any_query(&mut |q| q.exprs().into_iter().any(|e| e.any(&mut |e| matches!(e, Expr::Param(p) if p.kind == ParamKind::Extern))))
}
