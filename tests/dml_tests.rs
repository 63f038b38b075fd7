#![cfg(test)]

use pg_analyze::ast::{build, DeleteStmt, InsertStmt, Node, SelectStmt, UpdateStmt};
use pg_analyze::catalog::{INT4OID, INT8OID, TEXTOID};
use pg_analyze::query::{AclMode, CmdType, Expr, JoinTreeNode, RteKind};
use pg_analyze::{Analyzer, SqlState};

#[macro_use]
mod support;
use support::*;

fn insert(stmt: InsertStmt) -> Node {
    Node::InsertStmt(Box::new(stmt))
}

fn update(stmt: UpdateStmt) -> Node {
    Node::UpdateStmt(Box::new(stmt))
}

fn delete(stmt: DeleteStmt) -> Node {
    Node::DeleteStmt(Box::new(stmt))
}

// ============================================================================
// INSERT
// ============================================================================

#[test]
fn it_inserts_a_single_values_row() {
    let source = build::values_stmt(vec![vec![build::int(1), build::int(2)]]);
    let query = analyze(insert(build::insert("t", &["a", "b"], Some(source))), "INSERT INTO t (a, b) VALUES (1, 2)");
    assert_eq!(query.command_type, CmdType::Insert);
    assert_eq!(query.result_relation, Some(1));
    // A single row is used directly, without a VALUES entry.
    assert_eq!(query.rtable.len(), 1);
    assert!(query.jointree.fromlist.is_empty());

    let target = &query.rtable[0];
    assert!(target.required_perms.contains(AclMode::INSERT));
    assert_eq!(target.modified_cols.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(query.target_list.iter().map(|tle| tle.resno).collect::<Vec<_>>(), vec![1, 2]);
    assert!(matches!(&query.target_list[0].expr, Expr::Const(_)));
}

#[test]
fn it_inserts_into_every_column_by_default() {
    let source = build::values_stmt(vec![vec![build::int(7), build::string("bob")]]);
    let query = analyze(insert(build::insert("people", &[], Some(source))), "INSERT INTO people VALUES (7, 'bob')");
    assert_eq!(query.target_list.len(), 2);
    assert_eq!(query.target_list[1].resname.as_deref(), Some("name"));
    // The literal takes the column's type.
    assert_eq!(query.target_list[1].expr.type_oid(), TEXTOID);
}

#[test]
fn it_inserts_multiple_values_rows_through_a_values_entry() {
    let source = build::values_stmt(vec![vec![build::int(1), build::default()], vec![build::int(2), build::int(3)]]);
    let query = analyze(insert(build::insert("t", &["a", "b"], Some(source))), "INSERT INTO t (a, b) VALUES (1, DEFAULT), (2, 3)");
    assert_eq!(query.rtable.len(), 2);
    let RteKind::Values { values_lists, .. } = &query.rtable[1].kind else {
        panic!("expected a VALUES entry, got {:?}", query.rtable[1].kind);
    };
    assert_eq!(values_lists.len(), 2);
    assert!(matches!(&values_lists[0][1], Expr::SetToDefault(d) if d.type_oid == INT4OID));
    assert_eq!(query.jointree.fromlist, vec![JoinTreeNode::RangeTblRef(2)]);

    let a = cast!(&query.target_list[0].expr, Expr::Var);
    assert_eq!((a.varno, a.varattno), (2, 1));
}

#[test]
fn it_inserts_from_a_select() {
    let source = build::select_stmt(vec![build::target(build::col("a")), build::target(build::col("b"))], vec![build::table("t2")]);
    let query = analyze(insert(build::insert("t1", &[], Some(source))), "INSERT INTO t1 SELECT a, b FROM t2");
    assert_eq!(query.rtable.len(), 2);
    assert_eq!(query.rtable[1].refname, "*SELECT*");
    assert_eq!(query.rtable[1].subquery().map(|q| q.rtable[0].refname.as_str()), Some("t2"));

    let b = cast!(&query.target_list[1].expr, Expr::Var);
    assert_eq!((b.varno, b.varattno), (2, 2));
}

#[test]
fn it_types_parameters_passed_through_a_select() {
    let catalog = catalog();
    let analyzer = Analyzer::new(&catalog);
    let source = build::select_stmt(vec![build::target(build::param(1))], vec![]);
    let mut types = vec![];
    let query = analyzer
        .parse_analyze_varparams(insert(build::insert("people", &["name"], Some(source))), "INSERT INTO people (name) SELECT $1", &mut types)
        .unwrap();
    assert_eq!(types, vec![TEXTOID]);
    assert_eq!(query.target_list[0].expr.type_oid(), TEXTOID);

    let source = &query.rtable[1];
    assert_eq!(source.columns[0].type_oid, TEXTOID);
    let param = cast!(&source.subquery().unwrap().target_list[0].expr, Expr::Param);
    assert_eq!(param.paramtype, TEXTOID);
}

#[test]
fn it_coerces_inserted_values_to_the_column_type() {
    let source = build::values_stmt(vec![vec![build::int(5)]]);
    let query = analyze(insert(build::insert("s.events", &["x"], Some(source))), "INSERT INTO s.events (x) VALUES (5)");
    assert_eq!(query.target_list[0].expr.type_oid(), INT8OID);
}

#[test]
fn it_inserts_default_values() {
    let query = analyze(insert(build::insert("t", &[], None)), "INSERT INTO t DEFAULT VALUES");
    assert!(query.target_list.is_empty());
    assert_eq!(query.result_relation, Some(1));
}

#[test]
fn it_checks_insert_column_lists() {
    let values = || Some(build::values_stmt(vec![vec![build::int(1)]]));

    let err = analyze_err(insert(build::insert("t", &["zz"], values())), "INSERT INTO t (zz) VALUES (1)");
    assert_eq!(err.to_string(), "column \"zz\" of relation \"t\" does not exist");
    assert_eq!(err.code(), SqlState::UndefinedColumn);

    let err = analyze_err(insert(build::insert("t", &["a", "a"], values())), "INSERT INTO t (a, a) VALUES (1)");
    assert_eq!(err.to_string(), "column \"a\" specified more than once");
    assert_eq!(err.code(), SqlState::DuplicateColumn);
}

#[test]
fn it_matches_expressions_to_target_columns() {
    let source = build::values_stmt(vec![vec![build::int(1), build::int(2), build::int(3)]]);
    let err = analyze_err(insert(build::insert("t", &[], Some(source))), "INSERT INTO t VALUES (1, 2, 3)");
    assert_eq!(err.to_string(), "INSERT has more expressions than target columns");

    let source = build::values_stmt(vec![vec![build::int(1)]]);
    let err = analyze_err(insert(build::insert("t", &["a", "b"], Some(source))), "INSERT INTO t (a, b) VALUES (1)");
    assert_eq!(err.to_string(), "INSERT has more target columns than expressions");
    assert_eq!(err.diagnostic().and_then(|d| d.hint.as_deref()), None);
}

#[test]
fn it_hints_at_extra_parentheses() {
    let source = build::values_stmt(vec![vec![build::row(vec![build::int(1), build::int(2)])]]);
    let err = analyze_err(insert(build::insert("t", &["a", "b"], Some(source))), "INSERT INTO t (a, b) VALUES ((1, 2))");
    assert_eq!(err.to_string(), "INSERT has more target columns than expressions");
    let hint = err.diagnostic().and_then(|d| d.hint.clone()).unwrap();
    assert!(hint.contains("extra parentheses"));
}

#[test]
fn it_returns_from_the_target_table() {
    let stmt = InsertStmt {
        returning_list: vec![build::target(build::col("b")), build::target_as(build::col("a"), "id")],
        ..build::insert("t", &["a"], Some(build::values_stmt(vec![vec![build::int(1)]])))
    };
    let query = analyze(insert(stmt), "INSERT INTO t (a) VALUES (1) RETURNING b, a AS id");
    assert_eq!(query.returning_list.len(), 2);
    assert_eq!(query.returning_list.iter().map(|tle| tle.resno).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(query.returning_list[1].resname.as_deref(), Some("id"));
}

#[test]
fn it_returns_only_target_columns_after_multiple_rows() {
    let stmt = InsertStmt {
        returning_list: vec![build::target(build::col("a"))],
        ..build::insert("t", &["a"], Some(build::values_stmt(vec![vec![build::int(1)], vec![build::int(2)]])))
    };
    let query = analyze(insert(stmt), "INSERT INTO t (a) VALUES (1), (2) RETURNING a");
    let var = cast!(&query.returning_list[0].expr, Expr::Var);
    assert_eq!((var.varno, var.varattno), (1, 1));

    let stmt = InsertStmt {
        returning_list: vec![build::target(build::col("*VALUES*.column1"))],
        ..build::insert("t", &["a"], Some(build::values_stmt(vec![vec![build::int(1)], vec![build::int(2)]])))
    };
    let err = analyze_err(insert(stmt), "INSERT INTO t (a) VALUES (1), (2) RETURNING \"*VALUES*\".column1");
    assert_eq!(err.code(), SqlState::UndefinedTable);
}

#[test]
fn it_rejects_default_below_the_insert_level() {
    let values = build::values(vec![vec![build::default()]]);
    let source = build::select_stmt(vec![build::target(build::star())], vec![build::subselect(values, "v")]);
    let err = analyze_err(insert(build::insert("t", &["a"], Some(source))), "INSERT INTO t (a) SELECT * FROM (VALUES (DEFAULT)) v");
    assert_eq!(err.to_string(), "DEFAULT can only appear in a VALUES list within INSERT");
    assert_eq!(err.code(), SqlState::FeatureNotSupported);
}

// ============================================================================
// UPDATE
// ============================================================================

#[test]
fn it_updates_named_columns() {
    let stmt = UpdateStmt {
        where_clause: Some(build::op("=", build::col("a"), build::int(2))),
        ..build::update("t", vec![build::target_as(build::int(1), "b")])
    };
    let query = analyze(update(stmt), "UPDATE t SET b = 1 WHERE a = 2");
    assert_eq!(query.command_type, CmdType::Update);
    assert_eq!(query.result_relation, Some(1));
    assert!(query.jointree.quals.is_some());

    let target = &query.rtable[0];
    assert!(target.required_perms.contains(AclMode::UPDATE));
    assert_eq!(target.modified_cols.iter().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(query.target_list[0].resno, 2);
    assert_eq!(query.target_list[0].resname.as_deref(), Some("b"));
}

#[test]
fn it_updates_from_other_tables() {
    let stmt = UpdateStmt {
        from_clause: vec![build::table("t2")],
        where_clause: Some(build::op("=", build::col("t1.a"), build::col("t2.a"))),
        ..build::update("t1", vec![build::target_as(build::col("t2.b"), "b")])
    };
    let query = analyze(update(stmt), "UPDATE t1 SET b = t2.b FROM t2 WHERE t1.a = t2.a");
    assert_eq!(query.rtable.len(), 2);
    assert_eq!(query.jointree.fromlist.len(), 2);
    assert_eq!(cast!(&query.target_list[0].expr, Expr::Var).varno, 2);
}

#[test]
fn it_rejects_unknown_update_columns() {
    let err = analyze_err(update(build::update("t", vec![build::target_as(build::int(1), "zz")])), "UPDATE t SET zz = 1");
    assert_eq!(err.to_string(), "column \"zz\" of relation \"t\" does not exist");
}

#[test]
fn it_sets_columns_to_default() {
    let query = analyze(update(build::update("people", vec![build::target_as(build::default(), "name")])), "UPDATE people SET name = DEFAULT");
    assert!(matches!(&query.target_list[0].expr, Expr::SetToDefault(d) if d.type_oid == TEXTOID));
}

#[test]
fn it_only_accepts_default_in_the_set_list() {
    let stmt = UpdateStmt {
        where_clause: Some(build::op("=", build::col("name"), build::default())),
        ..build::update("people", vec![build::target_as(build::string("x"), "name")])
    };
    let err = analyze_err(update(stmt), "UPDATE people SET name = 'x' WHERE name = DEFAULT");
    assert_eq!(err.to_string(), "DEFAULT is not allowed in this context");
}

// ============================================================================
// DELETE
// ============================================================================

#[test]
fn it_deletes_with_a_condition() {
    let stmt = DeleteStmt { where_clause: Some(build::op("=", build::col("a"), build::int(1))), ..build::delete("t") };
    let query = analyze(delete(stmt), "DELETE FROM t WHERE a = 1");
    assert_eq!(query.command_type, CmdType::Delete);
    assert_eq!(query.result_relation, Some(1));
    assert!(query.target_list.is_empty());
    assert!(query.rtable[0].required_perms.contains(AclMode::DELETE));
    assert_eq!(query.jointree.fromlist, vec![JoinTreeNode::RangeTblRef(1)]);
}

#[test]
fn it_deletes_using_other_tables() {
    let stmt = DeleteStmt {
        using_clause: vec![build::table("t2")],
        where_clause: Some(build::op("=", build::col("t1.a"), build::col("t2.a"))),
        returning_list: vec![build::target(build::col("t1.b"))],
        ..build::delete("t1")
    };
    let query = analyze(delete(stmt), "DELETE FROM t1 USING t2 WHERE t1.a = t2.a RETURNING t1.b");
    assert_eq!(query.rtable.len(), 2);
    assert_eq!(query.returning_list.len(), 1);
}

#[test]
fn it_rejects_unknown_delete_targets() {
    let err = analyze_err(delete(build::delete("nope")), "DELETE FROM nope");
    assert_eq!(err.to_string(), "relation \"nope\" does not exist");
}

// ============================================================================
// VALUES
// ============================================================================

#[test]
fn it_analyzes_values_lists() {
    let node = build::values(vec![vec![build::int(1), build::string("x")], vec![build::int(2), build::string("y")]]);
    let query = analyze(node, "VALUES (1, 'x'), (2, 'y')");
    assert_eq!(query.command_type, CmdType::Select);
    assert_eq!(query.rtable.len(), 1);
    assert_eq!(query.rtable[0].refname, "*VALUES*");
    assert_eq!(query.rtable[0].column_names(), vec!["column1", "column2"]);
    let names: Vec<_> = query.target_list.iter().map(|tle| tle.resname.clone().unwrap_or_default()).collect();
    assert_eq!(names, vec!["column1", "column2"]);
    assert_eq!(query.target_list[0].expr.type_oid(), INT4OID);
}

#[test]
fn it_unifies_values_column_types() {
    let node = build::values(vec![vec![build::int(1)], vec![build::float("2.5")]]);
    let query = analyze(node, "VALUES (1), (2.5)");
    assert_eq!(query.target_list[0].expr.type_oid(), pg_analyze::catalog::NUMERICOID);
}

#[test]
fn it_rejects_ragged_values_lists() {
    let node = build::values(vec![vec![build::int(1), build::int(2)], vec![build::int(3)]]);
    let err = analyze_err(node, "VALUES (1, 2), (3)");
    assert_eq!(err.to_string(), "VALUES lists must all be the same length");
}

#[test]
fn it_rejects_default_outside_insert() {
    let err = analyze_err(build::values(vec![vec![build::default()]]), "VALUES (DEFAULT)");
    assert_eq!(err.to_string(), "DEFAULT can only appear in a VALUES list within INSERT");
    assert_eq!(err.code(), SqlState::FeatureNotSupported);
}

#[test]
fn it_orders_and_limits_values() {
    let node = Node::SelectStmt(Box::new(SelectStmt {
        sort_clause: vec![build::sort(build::col("column1"))],
        limit_count: Some(build::int(1)),
        ..build::values_stmt(vec![vec![build::int(2)], vec![build::int(1)]])
    }));
    let query = analyze(node, "VALUES (2), (1) ORDER BY column1 LIMIT 1");
    assert_eq!(query.sort_clause.len(), 1);
    assert!(query.limit_count.is_some());
}
