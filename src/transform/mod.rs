//! Statement transformers.
//!
//! [`transform_stmt`] dispatches a raw statement to the transformer for its kind.
//! Each transformer fills a fresh [`Query`] from the clauses of one statement
//! level; nested statements recurse through the dispatcher with a child
//! [`ParseState`].

mod delete;
mod exec_direct;
mod insert;
mod select;
mod setop;
mod update;
mod utility;
mod values;

use tracing::debug;

use crate::ast::{CreateTableAsStmt, Node, ObjectType, ResTarget, SetOperation};
use crate::clause::transform_target_list;
use crate::query::{CmdType, Query, QuerySource, TargetEntry, UtilityStmt};
use crate::scope::{ExprKind, Namespace, NamespaceItem, ParseState};
use crate::{Error, Result};

/// Analyzes the statement at the top of a parse tree.
///
/// `SELECT ... INTO` is turned into the CREATE TABLE AS it stands for; everything
/// else goes straight to [`transform_stmt`].
pub(crate) fn transform_top_level_stmt(pstate: &mut ParseState, node: &Node) -> Result<Query> {
    if let Node::SelectStmt(stmt) = node {
        if stmt.leftmost().into_clause.is_some() {
            let mut stmt = stmt.clone();
            let into = stmt.leftmost_mut().into_clause.take();
            if let Some(into) = into {
                let ctas = CreateTableAsStmt {
                    query: Node::SelectStmt(stmt),
                    into,
                    objtype: ObjectType::Table,
                    is_select_into: true,
                    if_not_exists: false,
                };
                return transform_stmt(pstate, &Node::CreateTableAsStmt(Box::new(ctas)));
            }
        }
    }
    transform_stmt(pstate, node)
}

/// Analyzes one statement.
pub(crate) fn transform_stmt(pstate: &mut ParseState, node: &Node) -> Result<Query> {
    let stack_size = pstate.config().stack_size;
    let mut query = stacker::maybe_grow(32 * 1024, stack_size, || dispatch(pstate, node))?;
    query.query_source = QuerySource::Original;
    query.can_set_tag = true;
    Ok(query)
}

fn dispatch(pstate: &mut ParseState, node: &Node) -> Result<Query> {
    debug!(stmt = node.tag(), depth = pstate.depth, "transforming statement");
    match node {
        Node::InsertStmt(stmt) => insert::transform_insert_stmt(pstate, stmt),
        Node::DeleteStmt(stmt) => delete::transform_delete_stmt(pstate, stmt),
        Node::UpdateStmt(stmt) => update::transform_update_stmt(pstate, stmt),
        Node::SelectStmt(stmt) if !stmt.values_lists.is_empty() => values::transform_values_clause(pstate, stmt),
        Node::SelectStmt(stmt) if stmt.op == SetOperation::None => select::transform_select_stmt(pstate, stmt),
        Node::SelectStmt(stmt) => setop::transform_set_operation_stmt(pstate, stmt),
        Node::DeclareCursorStmt(stmt) => utility::transform_declare_cursor_stmt(pstate, stmt),
        Node::ExplainStmt(stmt) => utility::transform_explain_stmt(pstate, stmt),
        Node::CreateTableAsStmt(stmt) => utility::transform_create_table_as_stmt(pstate, stmt),
        Node::ExecDirectStmt(stmt) => exec_direct::transform_exec_direct_stmt(pstate, stmt),
        Node::CreateStmt(_)
        | Node::DropStmt(_)
        | Node::TransactionStmt(_)
        | Node::VariableSetStmt(_)
        | Node::VariableShowStmt(_)
        | Node::CreateTableSpaceStmt(_)
        | Node::DropTableSpaceStmt(_) => Ok(Query {
            command_type: CmdType::Utility,
            utility_stmt: Some(UtilityStmt::Command { tag: node.tag(), stmt: node.clone() }),
            ..Default::default()
        }),
        other => Err(Error::Internal(format!("unrecognized node type: {}", other.tag()))),
    }
}

/// Analyzes a RETURNING list; its entries are numbered from 1 independently of the main target list.
pub(crate) fn transform_returning_list(pstate: &mut ParseState, returning: &[ResTarget]) -> Result<Vec<TargetEntry>> {
    if returning.is_empty() {
        return Ok(vec![]);
    }
    let Some(target) = pstate.target_rte else {
        return Err(Error::Internal("RETURNING without a target table".to_string()));
    };
    // INSERT's source entries are not visible to RETURNING.
    if pstate.is_insert {
        pstate.namespace = Namespace::new(vec![NamespaceItem::new(target, true, true)]);
    }
    let saved = std::mem::replace(&mut pstate.next_resno, 1);
    let tlist = transform_target_list(pstate, returning, ExprKind::Returning);
    pstate.next_resno = saved;
    tlist
}
