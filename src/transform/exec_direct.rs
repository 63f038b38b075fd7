//! EXECUTE DIRECT ON (node) 'sql'.
//!
//! The embedded SQL is parsed and analyzed as a statement of its own; the result
//! carries where it has to run.

use tracing::debug;

use crate::ast::{ExecDirectStmt, Node};
use crate::config::NodeRole;
use crate::error::SqlState;
use crate::query::{CmdType, ExecDirectType, Query, RemoteExecType, RemoteQuery, UtilityStmt};
use crate::scope::ParseState;
use crate::{Error, Result};

pub(crate) fn transform_exec_direct_stmt(pstate: &mut ParseState, stmt: &ExecDirectStmt) -> Result<Query> {
    let config = pstate.config();
    if !config.is_coordinator() {
        return Err(pstate.error(SqlState::FeatureNotSupported, "EXECUTE DIRECT cannot be executed on a Datanode", stmt.location));
    }
    let nodename = match stmt.node_names.as_slice() {
        [name] => name,
        [] => return Err(Error::Internal("EXECUTE DIRECT without a target node".to_string())),
        _ => {
            return Err(pstate.error(
                SqlState::FeatureNotSupported,
                "Support for EXECUTE DIRECT on multiple nodes is not available yet",
                stmt.location,
            ))
        }
    };
    let Some(node) = pstate.catalog().node(nodename) else {
        return Err(pstate.error(SqlState::UndefinedObject, format!("PGXC Node {}: object not defined", nodename), stmt.location));
    };
    let is_local = node.role == NodeRole::Coordinator && node.index == config.node.index;

    let analyzer = pstate.ctx.analyzer;
    let Some(parser) = analyzer.parser() else {
        return Err(Error::Internal("EXECUTE DIRECT requires a SQL parser".to_string()));
    };
    let mut stmts = parser.parse(&stmt.query).map_err(Error::Parse)?;
    if stmts.len() > 1 {
        return Err(pstate.error(SqlState::FeatureNotSupported, "EXECUTE DIRECT cannot execute multiple queries", stmt.location));
    }
    let Some(inner) = stmts.pop() else {
        return Err(Error::Parse(format!("no statement in \"{}\"", stmt.query)));
    };
    let mut query = analyzer.parse_analyze(inner, &stmt.query, &[])?;

    let exec_direct_type = match (is_local, query.command_type) {
        (true, CmdType::Utility) => ExecDirectType::LocalUtility,
        (true, _) => ExecDirectType::Local,
        (false, CmdType::Utility) => ExecDirectType::Utility,
        (false, CmdType::Select) => ExecDirectType::Select,
        (false, CmdType::Insert) => ExecDirectType::Insert,
        (false, CmdType::Update) => ExecDirectType::Update,
        (false, CmdType::Delete) => ExecDirectType::Delete,
    };

    if !config.maintenance_mode {
        let message = match exec_direct_type {
            ExecDirectType::Insert | ExecDirectType::Update | ExecDirectType::Delete => Some("EXECUTE DIRECT cannot execute DML queries"),
            ExecDirectType::Utility if !allowed_remote_utility(query.utility_stmt.as_ref()) => Some("EXECUTE DIRECT cannot execute this utility query"),
            ExecDirectType::LocalUtility => Some("EXECUTE DIRECT cannot execute locally this utility query"),
            _ => None,
        };
        if let Some(message) = message {
            return Err(pstate.error(SqlState::FeatureNotSupported, message, stmt.location));
        }
    }

    debug!(node = %nodename, is_local, kind = ?exec_direct_type, "routing EXECUTE DIRECT");
    query.remote = Some(RemoteQuery {
        sql_statement: stmt.query.clone(),
        exec_nodes: vec![node.index],
        exec_type: match node.role {
            NodeRole::Coordinator => RemoteExecType::OnCoordinators,
            NodeRole::Datanode => RemoteExecType::OnDatanodes,
        },
        exec_direct_type,
        is_local,
        read_only: true,
    });
    Ok(query)
}

/// Only tablespace management may run on a single remote node.
fn allowed_remote_utility(utility: Option<&UtilityStmt>) -> bool {
    match utility {
        None => true,
        Some(UtilityStmt::Command { stmt, .. }) => matches!(stmt, Node::CreateTableSpaceStmt(_) | Node::DropTableSpaceStmt(_)),
        Some(_) => false,
    }
}
