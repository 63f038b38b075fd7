#![cfg(test)]

use pg_analyze::ast::{build, LockClauseStrength, LockWaitPolicy, LockingClause, Node, SelectStmt};
use pg_analyze::query::{AclMode, RowMarkClause};
use pg_analyze::SqlState;

#[macro_use]
mod support;
use support::*;

fn locked(select: SelectStmt, clauses: Vec<LockingClause>) -> Node {
    Node::SelectStmt(Box::new(SelectStmt { locking_clause: clauses, ..select }))
}

fn mark(rti: usize, strength: LockClauseStrength, wait_policy: LockWaitPolicy, pushed_down: bool) -> RowMarkClause {
    RowMarkClause { rti, strength, wait_policy, pushed_down }
}

// ============================================================================
// Row marks
// ============================================================================

#[test]
fn it_locks_every_table_when_none_is_named() {
    let select = build::select_stmt(vec![build::target(build::col("t1.a"))], vec![build::table("t1"), build::table("t2")]);
    let query = analyze(locked(select, vec![build::locking(LockClauseStrength::ForUpdate, &[])]), "SELECT t1.a FROM t1, t2 FOR UPDATE");
    assert!(query.has_for_update);
    assert_eq!(query.row_marks, vec![
        mark(1, LockClauseStrength::ForUpdate, LockWaitPolicy::Block, false),
        mark(2, LockClauseStrength::ForUpdate, LockWaitPolicy::Block, false),
    ]);
    for rte in &query.rtable {
        assert!(rte.required_perms.contains(AclMode::SELECT_FOR_UPDATE));
        assert!(rte.required_perms.contains(AclMode::SELECT));
    }
}

#[test]
fn it_locks_only_named_tables() {
    let select = build::select_stmt(vec![build::target(build::col("t1.a"))], vec![build::table("t1"), build::table("t2")]);
    let query = analyze(locked(select, vec![build::locking(LockClauseStrength::ForShare, &["t2"])]), "SELECT t1.a FROM t1, t2 FOR SHARE OF t2");
    assert_eq!(query.row_marks, vec![mark(2, LockClauseStrength::ForShare, LockWaitPolicy::Block, false)]);
    assert!(query.row_mark(1).is_none());
    assert!(!query.rtable[0].required_perms.contains(AclMode::SELECT_FOR_UPDATE));
}

#[test]
fn it_merges_clauses_on_the_same_table() {
    let select = build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]);
    let skip = LockingClause { wait_policy: LockWaitPolicy::Skip, ..build::locking(LockClauseStrength::ForKeyShare, &["t"]) };
    let node = locked(select, vec![build::locking(LockClauseStrength::ForNoKeyUpdate, &["t"]), skip]);
    let query = analyze(node, "SELECT a FROM t FOR NO KEY UPDATE OF t FOR KEY SHARE OF t SKIP LOCKED");
    assert_eq!(query.row_marks, vec![mark(1, LockClauseStrength::ForNoKeyUpdate, LockWaitPolicy::Skip, false)]);
}

#[test]
fn it_pushes_locks_down_into_subqueries() {
    let inner = build::select(vec![build::target(build::col("a"))], vec![build::table("t")]);
    let select = build::select_stmt(vec![build::target(build::col("s.a"))], vec![build::subselect(inner, "s")]);
    let query = analyze(locked(select, vec![build::locking(LockClauseStrength::ForUpdate, &["s"])]), "SELECT s.a FROM (SELECT a FROM t) s FOR UPDATE OF s");

    assert!(query.has_for_update);
    assert_eq!(query.row_marks, vec![mark(1, LockClauseStrength::ForUpdate, LockWaitPolicy::Block, false)]);

    let sub = query.rtable[0].subquery().unwrap();
    assert!(!sub.has_for_update);
    assert_eq!(sub.row_marks, vec![mark(1, LockClauseStrength::ForUpdate, LockWaitPolicy::Block, true)]);
    assert!(sub.rtable[0].required_perms.contains(AclMode::SELECT_FOR_UPDATE));
}

#[test]
fn it_leaves_joins_and_functions_alone_when_locking_everything() {
    let join = build::join(pg_analyze::ast::JoinType::Inner, build::table("t1"), build::table("t2"), Some(build::op("=", build::col("t1.a"), build::col("t2.a"))));
    let series = build::range_function("generate_series", vec![build::int(1), build::int(3)], "g");
    let select = build::select_stmt(vec![build::target(build::col("t1.a"))], vec![join, series]);
    let query = analyze(locked(select, vec![build::locking(LockClauseStrength::ForUpdate, &[])]), "SELECT t1.a FROM t1 JOIN t2 ON t1.a = t2.a, generate_series(1, 3) g FOR UPDATE");
    let locked: Vec<_> = query.row_marks.iter().map(|rm| query.rtable[rm.rti - 1].refname.as_str()).collect();
    assert_eq!(locked, vec!["t1", "t2"]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn it_rejects_locks_on_tables_not_in_from() {
    let select = build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]);
    let err = analyze_err(locked(select, vec![build::locking(LockClauseStrength::ForUpdate, &["zz"])]), "SELECT a FROM t FOR UPDATE OF zz");
    assert_eq!(err.to_string(), "relation \"zz\" in FOR UPDATE clause not found in FROM clause");
    assert_eq!(err.code(), SqlState::UndefinedTable);
}

#[test]
fn it_requires_unqualified_names() {
    let select = build::select_stmt(vec![build::target(build::col("x"))], vec![build::table("s.events")]);
    let err = analyze_err(locked(select, vec![build::locking(LockClauseStrength::ForShare, &["s.events"])]), "SELECT x FROM s.events FOR SHARE OF s.events");
    assert_eq!(err.to_string(), "FOR SHARE must specify unqualified relation names");
}

#[test]
fn it_rejects_locks_on_functions() {
    let series = build::range_function("generate_series", vec![build::int(1), build::int(3)], "g");
    let select = build::select_stmt(vec![build::target(build::star())], vec![series]);
    let err = analyze_err(locked(select, vec![build::locking(LockClauseStrength::ForUpdate, &["g"])]), "SELECT * FROM generate_series(1, 3) g FOR UPDATE OF g");
    assert_eq!(err.to_string(), "FOR UPDATE cannot be applied to a function");
    assert_eq!(err.code(), SqlState::FeatureNotSupported);
}

#[test]
fn it_rejects_locks_on_values() {
    let node = Node::SelectStmt(Box::new(SelectStmt {
        locking_clause: vec![build::locking(LockClauseStrength::ForUpdate, &[])],
        ..build::values_stmt(vec![vec![build::int(1)]])
    }));
    let err = analyze_err(node, "VALUES (1) FOR UPDATE");
    assert_eq!(err.to_string(), "FOR UPDATE cannot be applied to VALUES");
}

#[test]
fn it_rejects_locks_on_grouped_queries() {
    let select = build::select_stmt(vec![build::target(build::func_star("count"))], vec![build::table("t")]);
    let err = analyze_err(locked(select, vec![build::locking(LockClauseStrength::ForUpdate, &[])]), "SELECT count(*) FROM t FOR UPDATE");
    assert_eq!(err.to_string(), "FOR UPDATE is not allowed with aggregate functions");

    let select = SelectStmt { distinct_clause: Some(vec![]), ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]) };
    let err = analyze_err(locked(select, vec![build::locking(LockClauseStrength::ForShare, &[])]), "SELECT DISTINCT a FROM t FOR SHARE");
    assert_eq!(err.to_string(), "FOR SHARE is not allowed with DISTINCT clause");

    let select = SelectStmt { group_clause: vec![build::col("a")], ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]) };
    let err = analyze_err(locked(select, vec![build::locking(LockClauseStrength::ForKeyShare, &[])]), "SELECT a FROM t GROUP BY a FOR KEY SHARE");
    assert_eq!(err.to_string(), "FOR KEY SHARE is not allowed with GROUP BY clause");
}

#[test]
fn it_checks_pushed_down_locks_against_the_subquery() {
    let inner = Node::SelectStmt(Box::new(SelectStmt {
        distinct_clause: Some(vec![]),
        ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")])
    }));
    let select = build::select_stmt(vec![build::target(build::col("s.a"))], vec![build::subselect(inner, "s")]);
    let err = analyze_err(locked(select, vec![build::locking(LockClauseStrength::ForUpdate, &[])]), "SELECT s.a FROM (SELECT DISTINCT a FROM t) s FOR UPDATE");
    assert_eq!(err.to_string(), "FOR UPDATE is not allowed with DISTINCT clause");
}
