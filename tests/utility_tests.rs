#![cfg(test)]

use pg_analyze::ast::{
    build, CreateTableAsStmt, CreateTableSpaceStmt, CursorOptions, DeclareCursorStmt, DefElem, ExecDirectStmt, ExplainStmt, IntoClause, LockClauseStrength,
    Node, ObjectType, RelPersistence, SelectStmt, VariableShowStmt,
};
use pg_analyze::catalog::INT4OID;
use pg_analyze::config::{AnalyzerConfig, NodeConfig, NodeRole};
use pg_analyze::query::{CmdType, ExecDirectType, RemoteExecType, UtilityStmt};
use pg_analyze::{Analyzer, Error, Query, Result, SqlState};

#[macro_use]
mod support;
use support::*;

// ============================================================================
// DECLARE CURSOR
// ============================================================================

fn declare(options: u32, query: Node) -> Node {
    Node::DeclareCursorStmt(Box::new(DeclareCursorStmt { portalname: "c".to_string(), options: CursorOptions(options), query }))
}

fn select_for_update() -> Node {
    Node::SelectStmt(Box::new(SelectStmt {
        locking_clause: vec![build::locking(LockClauseStrength::ForUpdate, &[])],
        ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")])
    }))
}

#[test]
fn it_declares_a_cursor() {
    let query = analyze(declare(CursorOptions::NO_SCROLL, select_cols(&["a"], &["t"])), "DECLARE c NO SCROLL CURSOR FOR SELECT a FROM t");
    assert_eq!(query.command_type, CmdType::Select);
    let Some(UtilityStmt::DeclareCursor { portalname, options }) = &query.utility_stmt else {
        panic!("expected a cursor, got {:?}", query.utility_stmt);
    };
    assert_eq!(portalname, "c");
    assert!(options.contains(CursorOptions::NO_SCROLL));
    assert_eq!(query.target_list.len(), 1);
}

#[test]
fn it_rejects_scroll_and_no_scroll_together() {
    let err = analyze_err(declare(CursorOptions::SCROLL | CursorOptions::NO_SCROLL, select_cols(&["a"], &["t"])), "DECLARE c SCROLL NO SCROLL CURSOR FOR SELECT a FROM t");
    assert_eq!(err.to_string(), "cannot specify both SCROLL and NO SCROLL");
    assert_eq!(err.code(), SqlState::InvalidCursorDefinition);
}

#[test]
fn it_only_locks_rows_through_read_only_cursors() {
    let query = analyze(declare(0, select_for_update()), "DECLARE c CURSOR FOR SELECT a FROM t FOR UPDATE");
    assert!(query.has_for_update);

    let err = analyze_err(declare(CursorOptions::SCROLL, select_for_update()), "DECLARE c SCROLL CURSOR FOR SELECT a FROM t FOR UPDATE");
    assert_eq!(err.to_string(), "DECLARE SCROLL CURSOR ... FOR UPDATE is not supported");
    assert_eq!(err.diagnostic().and_then(|d| d.detail.as_deref()), Some("Scrollable cursors must be READ ONLY."));
    assert_eq!(err.code(), SqlState::FeatureNotSupported);

    let err = analyze_err(declare(CursorOptions::HOLD, select_for_update()), "DECLARE c CURSOR WITH HOLD FOR SELECT a FROM t FOR UPDATE");
    assert_eq!(err.to_string(), "DECLARE CURSOR WITH HOLD ... FOR UPDATE is not supported");
}

// ============================================================================
// EXPLAIN
// ============================================================================

#[test]
fn it_explains_the_analyzed_query() {
    let node = Node::ExplainStmt(Box::new(ExplainStmt {
        query: select_cols(&["a"], &["t"]),
        options: vec![
            DefElem { defname: "analyze".to_string(), arg: None, location: -1 },
            DefElem { defname: "format".to_string(), arg: Some(build::string("json")), location: -1 },
        ],
    }));
    let query = analyze(node, "EXPLAIN (ANALYZE, FORMAT JSON) SELECT a FROM t");
    assert_eq!(query.command_type, CmdType::Utility);
    let Some(UtilityStmt::Explain { query: explained, options }) = &query.utility_stmt else {
        panic!("expected EXPLAIN, got {:?}", query.utility_stmt);
    };
    assert_eq!(options, &vec!["analyze".to_string(), "format json".to_string()]);
    assert_eq!(explained.command_type, CmdType::Select);
    assert_eq!(explained.rtable[0].refname, "t");
}

// ============================================================================
// CREATE TABLE AS / materialized views
// ============================================================================

fn create_as(objtype: ObjectType, relname: &str, persistence: RelPersistence, query: Node) -> Node {
    let mut rel = build::range_var(relname);
    rel.relpersistence = persistence;
    Node::CreateTableAsStmt(Box::new(CreateTableAsStmt {
        query,
        into: IntoClause { rel, ..Default::default() },
        objtype,
        is_select_into: false,
        if_not_exists: false,
    }))
}

fn ctas(query: &Query) -> &pg_analyze::query::CreateTableAs {
    match &query.utility_stmt {
        Some(UtilityStmt::CreateTableAs(ctas)) => ctas,
        other => panic!("expected CREATE TABLE AS, got {:?}", other),
    }
}

#[test]
fn it_creates_a_table_from_a_query() {
    let node = create_as(ObjectType::Table, "copy", RelPersistence::Temp, select_cols(&["id"], &["scratch"]));
    let query = analyze(node, "CREATE TEMP TABLE copy AS SELECT id FROM scratch");
    assert_eq!(query.command_type, CmdType::Utility);
    let ctas = ctas(&query);
    assert_eq!(ctas.into.relname, "copy");
    assert_eq!(ctas.into.persistence, RelPersistence::Temp);
    assert!(ctas.into.view_query.is_none());
    assert_eq!(ctas.query.target_list.len(), 1);
}

#[test]
fn it_keeps_the_defining_query_of_a_materialized_view() {
    let node = create_as(ObjectType::MatView, "mv", RelPersistence::Permanent, select_cols(&["a"], &["t"]));
    let query = analyze(node, "CREATE MATERIALIZED VIEW mv AS SELECT a FROM t");
    let ctas = ctas(&query);
    assert_eq!(ctas.objtype, ObjectType::MatView);
    assert_eq!(ctas.into.view_query.as_deref(), Some(ctas.query.as_ref()));
}

#[test]
fn it_restricts_what_materialized_views_may_use() {
    let node = create_as(ObjectType::MatView, "mv", RelPersistence::Permanent, select_cols(&["id"], &["scratch"]));
    let err = analyze_err(node, "CREATE MATERIALIZED VIEW mv AS SELECT id FROM scratch");
    assert_eq!(err.to_string(), "materialized views must not use temporary tables or views");
    assert_eq!(err.code(), SqlState::FeatureNotSupported);

    let node = create_as(ObjectType::MatView, "mv", RelPersistence::Unlogged, select_cols(&["a"], &["t"]));
    let err = analyze_err(node, "CREATE UNLOGGED MATERIALIZED VIEW mv AS SELECT a FROM t");
    assert_eq!(err.to_string(), "materialized views cannot be UNLOGGED");

    let catalog = catalog();
    let query = build::select_where(vec![build::target(build::col("a"))], vec![build::table("t")], build::op("=", build::col("a"), build::param(1)));
    let node = create_as(ObjectType::MatView, "mv", RelPersistence::Permanent, query);
    let err = Analyzer::new(&catalog).parse_analyze(node, "CREATE MATERIALIZED VIEW mv AS SELECT a FROM t WHERE a = $1", &[INT4OID]).unwrap_err();
    assert_eq!(err.to_string(), "materialized views may not be defined using bound parameters");
}

#[test]
fn it_allows_parameters_in_plain_tables() {
    let catalog = catalog();
    let query = build::select_where(vec![build::target(build::col("a"))], vec![build::table("t")], build::op("=", build::col("a"), build::param(1)));
    let node = create_as(ObjectType::Table, "copy", RelPersistence::Permanent, query);
    let query = Analyzer::new(&catalog).parse_analyze(node, "CREATE TABLE copy AS SELECT a FROM t WHERE a = $1", &[INT4OID]).unwrap();
    assert_eq!(ctas(&query).objtype, ObjectType::Table);
}

// ============================================================================
// EXECUTE DIRECT
// ============================================================================

const REMOTE_SQL: &str = "SELECT a FROM t";

fn exec_direct(node_names: &[&str], sql: &str) -> Node {
    Node::ExecDirectStmt(Box::new(ExecDirectStmt { node_names: node_names.iter().map(|n| n.to_string()).collect(), query: sql.to_string(), location: 0 }))
}

fn parser() -> CannedParser {
    CannedParser::default()
        .with(REMOTE_SQL, vec![select_cols(&["a"], &["t"])])
        .with("SELECT 1; SELECT 2", vec![select_cols(&["a"], &["t"]), select_cols(&["b"], &["t"])])
        .with("DELETE FROM t", vec![Node::DeleteStmt(Box::new(build::delete("t")))])
        .with("INSERT INTO t VALUES (1, 2)", vec![Node::InsertStmt(Box::new(build::insert("t", &[], Some(build::values_stmt(vec![vec![build::int(1), build::int(2)]])))))])
        .with(
            "CREATE TABLESPACE ts LOCATION '/data'",
            vec![Node::CreateTableSpaceStmt(Box::new(CreateTableSpaceStmt { tablespacename: "ts".to_string(), location: "/data".to_string() }))],
        )
        .with("SHOW work_mem", vec![Node::VariableShowStmt(Box::new(VariableShowStmt { name: "work_mem".to_string() }))])
}

fn run(config: AnalyzerConfig, node_names: &[&str], sql: &str) -> Result<Query> {
    let catalog = catalog();
    let parser = parser();
    let statement = format!("EXECUTE DIRECT ON ({}) '{}'", node_names.join(", "), sql);
    let result = Analyzer::new(&catalog).with_config(config).with_parser(&parser).parse_analyze(exec_direct(node_names, sql), &statement, &[]);
    result
}

fn coordinator() -> AnalyzerConfig {
    AnalyzerConfig::default()
}

#[test]
fn it_runs_locally_on_its_own_coordinator() {
    let query = run(coordinator(), &["coord1"], REMOTE_SQL).unwrap();
    assert_eq!(query.command_type, CmdType::Select);
    let remote = query.remote.unwrap();
    assert_eq!(remote.exec_direct_type, ExecDirectType::Local);
    assert!(remote.is_local);
    assert_eq!(remote.exec_type, RemoteExecType::OnCoordinators);
    assert_eq!(remote.sql_statement, REMOTE_SQL);
}

#[test]
fn it_routes_queries_to_other_nodes() {
    let query = run(coordinator(), &["dn1"], REMOTE_SQL).unwrap();
    let remote = query.remote.as_ref().unwrap();
    assert_eq!(remote.exec_direct_type, ExecDirectType::Select);
    assert_eq!(remote.exec_type, RemoteExecType::OnDatanodes);
    assert_eq!(remote.exec_nodes, vec![0]);
    assert!(!remote.is_local);
    assert!(remote.read_only);
    assert_eq!(query.rtable[0].refname, "t");

    let query = run(coordinator(), &["coord2"], REMOTE_SQL).unwrap();
    let remote = query.remote.unwrap();
    assert_eq!((remote.exec_type, remote.exec_nodes), (RemoteExecType::OnCoordinators, vec![1]));
    assert!(!remote.is_local);
}

#[test]
fn it_only_runs_on_coordinators() {
    let config = AnalyzerConfig { node: NodeConfig { role: NodeRole::Datanode, index: 0 }, ..Default::default() };
    let err = run(config, &["dn1"], REMOTE_SQL).unwrap_err();
    assert_eq!(err.to_string(), "EXECUTE DIRECT cannot be executed on a Datanode");
    assert_eq!(err.code(), SqlState::FeatureNotSupported);
}

#[test]
fn it_targets_exactly_one_known_node() {
    let err = run(coordinator(), &["dn1", "coord2"], REMOTE_SQL).unwrap_err();
    assert_eq!(err.to_string(), "Support for EXECUTE DIRECT on multiple nodes is not available yet");

    let err = run(coordinator(), &["dn9"], REMOTE_SQL).unwrap_err();
    assert_eq!(err.to_string(), "PGXC Node dn9: object not defined");
    assert_eq!(err.code(), SqlState::UndefinedObject);
}

#[test]
fn it_needs_a_parser_for_the_embedded_statement() {
    let catalog = catalog();
    let err = Analyzer::new(&catalog).parse_analyze(exec_direct(&["dn1"], REMOTE_SQL), "EXECUTE DIRECT ON (dn1) 'SELECT a FROM t'", &[]).unwrap_err();
    assert!(matches!(err, Error::Internal(_)));

    let err = run(coordinator(), &["dn1"], "SELEC a").unwrap_err();
    assert!(matches!(err, Error::Parse(ref message) if message == "syntax error at or near \"SELEC a\""));

    let err = run(coordinator(), &["dn1"], "SELECT 1; SELECT 2").unwrap_err();
    assert_eq!(err.to_string(), "EXECUTE DIRECT cannot execute multiple queries");
}

#[test]
fn it_rejects_dml_outside_maintenance_mode() {
    let err = run(coordinator(), &["dn1"], "DELETE FROM t").unwrap_err();
    assert_eq!(err.to_string(), "EXECUTE DIRECT cannot execute DML queries");
    assert_eq!(err.code(), SqlState::FeatureNotSupported);

    let config = AnalyzerConfig { maintenance_mode: true, ..Default::default() };
    let query = run(config, &["dn1"], "INSERT INTO t VALUES (1, 2)").unwrap();
    assert_eq!(query.command_type, CmdType::Insert);
    assert_eq!(query.remote.unwrap().exec_direct_type, ExecDirectType::Insert);
}

#[test]
fn it_limits_utility_statements() {
    let query = run(coordinator(), &["dn1"], "CREATE TABLESPACE ts LOCATION '/data'").unwrap();
    assert_eq!(query.remote.as_ref().unwrap().exec_direct_type, ExecDirectType::Utility);
    assert!(matches!(query.utility_stmt, Some(UtilityStmt::Command { stmt: Node::CreateTableSpaceStmt(_), .. })));

    let err = run(coordinator(), &["dn1"], "SHOW work_mem").unwrap_err();
    assert_eq!(err.to_string(), "EXECUTE DIRECT cannot execute this utility query");

    let err = run(coordinator(), &["coord1"], "SHOW work_mem").unwrap_err();
    assert_eq!(err.to_string(), "EXECUTE DIRECT cannot execute locally this utility query");

    let config = AnalyzerConfig { maintenance_mode: true, ..Default::default() };
    let query = run(config, &["coord1"], "SHOW work_mem").unwrap();
    assert_eq!(query.remote.unwrap().exec_direct_type, ExecDirectType::LocalUtility);
}
