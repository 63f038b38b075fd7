#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};

use easy_parallel::Parallel;
use pg_analyze::ast::{build, IntoClause, Node, SelectStmt, VariableSetStmt};
use pg_analyze::catalog::{MemoryCatalog, INT4OID, INT8OID, TEXTOID, UNKNOWNOID};
use pg_analyze::query::{CmdType, Expr, RteKind, UtilityStmt};
use pg_analyze::{analyze_requires_snapshot, Analyzer, Error, SqlState};
use regex::Regex;

#[macro_use]
mod support;
use support::*;

fn stmt(select: SelectStmt) -> Node {
    Node::SelectStmt(Box::new(select))
}

// ============================================================================
// Target list and FROM
// ============================================================================

#[test]
fn it_resolves_columns_of_a_single_table() {
    let query = analyze(select_cols(&["a", "b"], &["t"]), "SELECT a, b FROM t");
    assert_eq!(query.command_type, CmdType::Select);
    assert!(query.can_set_tag);
    assert_eq!(query.rtable.len(), 1);
    assert_eq!(query.rtable[0].refname, "t");
    assert_eq!(query.target_list.len(), 2);

    let b = cast!(&query.target_list[1].expr, Expr::Var);
    assert_eq!((b.varno, b.varattno, b.vartype, b.varlevelsup), (1, 2, INT4OID, 0));
    assert_eq!(query.target_list[1].resname.as_deref(), Some("b"));
    assert_eq!(query.target_list[1].resno, 2);
}

#[test]
fn it_types_constants_without_a_from_clause() {
    let query = analyze(build::select(vec![build::target(build::int(1)), build::target(build::string("x"))], vec![]), "SELECT 1, 'x'");
    assert!(query.rtable.is_empty());
    assert_eq!(query.target_list[0].expr.type_oid(), INT4OID);
    assert_eq!(query.target_list[0].resname.as_deref(), Some("?column?"));
    // Nothing asks for a type, so the literal stays unknown.
    assert_eq!(query.target_list[1].expr.type_oid(), UNKNOWNOID);
}

#[test]
fn it_names_output_columns() {
    let targets = vec![
        build::target(build::func_star("count")),
        build::target_as(build::col("a"), "total"),
        build::target(build::col("t.b")),
    ];
    let node = Node::SelectStmt(Box::new(SelectStmt {
        group_clause: vec![build::col("a"), build::col("t.b")],
        ..build::select_stmt(targets, vec![build::table("t")])
    }));
    let query = analyze(node, "SELECT count(*), a AS total, t.b FROM t GROUP BY a, t.b");
    let names: Vec<_> = query.target_list.iter().map(|tle| tle.resname.as_deref().unwrap_or_default()).collect();
    assert_eq!(names, vec!["count", "total", "b"]);
}

#[test]
fn it_expands_stars() {
    let query = analyze(build::select(vec![build::target(build::star())], vec![build::table("t1"), build::table("people")]), "SELECT * FROM t1, people");
    let names: Vec<_> = query.target_list.iter().map(|tle| tle.resname.clone().unwrap_or_default()).collect();
    assert_eq!(names, vec!["a", "b", "id", "name"]);
    assert_eq!(query.jointree.fromlist.len(), 2);
}

#[test]
fn it_rejects_a_star_without_tables() {
    let err = analyze_err(build::select(vec![build::target(build::star())], vec![]), "SELECT *");
    assert_eq!(err.to_string(), "SELECT * with no tables specified is not valid");
}

#[test]
fn it_resolves_schema_qualified_tables() {
    let query = analyze(select_cols(&["x"], &["s.events"]), "SELECT x FROM s.events");
    assert_eq!(query.target_list[0].expr.type_oid(), INT8OID);
    assert!(matches!(&query.rtable[0].kind, RteKind::Relation { schema, .. } if schema == "s"));
}

#[test]
fn it_reports_unknown_names() {
    let err = analyze_err(select_cols(&["zz"], &["t"]), "SELECT zz FROM t");
    assert_eq!(err.to_string(), "column \"zz\" does not exist");
    assert_eq!(err.code(), SqlState::UndefinedColumn);

    let err = analyze_err(select_cols(&["a"], &["nope"]), "SELECT a FROM nope");
    assert_eq!(err.to_string(), "relation \"nope\" does not exist");
    assert_eq!(err.code(), SqlState::UndefinedTable);

    let err = analyze_err(select_cols(&["zz.a"], &["t"]), "SELECT zz.a FROM t");
    assert_eq!(err.to_string(), "missing FROM-clause entry for table \"zz\"");
}

#[test]
fn it_reports_ambiguous_columns() {
    let err = analyze_err(select_cols(&["a"], &["t1", "t2"]), "SELECT a FROM t1, t2");
    assert_eq!(err.to_string(), "column reference \"a\" is ambiguous");
    assert_eq!(err.code(), SqlState::AmbiguousColumn);

    // Qualified references pick one side.
    let query = analyze(select_cols(&["t2.a"], &["t1", "t2"]), "SELECT t2.a FROM t1, t2");
    assert_eq!(cast!(&query.target_list[0].expr, Expr::Var).varno, 2);
}

#[test]
fn it_rejects_a_table_listed_twice() {
    let err = analyze_err(select_cols(&["t.a"], &["t", "t"]), "SELECT t.a FROM t, t");
    assert_eq!(err.to_string(), "table name \"t\" specified more than once");
    assert_eq!(err.code(), SqlState::DuplicateAlias);

    analyze(build::select(vec![build::target(build::col("x.a"))], vec![build::table("t"), build::table_as("t", "x")]), "SELECT x.a FROM t, t x");
}

#[test]
fn it_reports_error_positions_in_characters() {
    let sql = "SELECT é, zz FROM t";
    let node = build::select(vec![build::target(build::int(1)), build::target(build::col_at("zz", 11))], vec![build::table("t")]);
    let err = analyze_err(node, sql);
    let diagnostic = err.diagnostic().unwrap();
    // `zz` starts at byte 11, which is character 10 since 'é' takes two bytes.
    assert_eq!(diagnostic.position, Some(11));
}

// ============================================================================
// WHERE, grouping and aggregates
// ============================================================================

#[test]
fn it_analyzes_where_clauses() {
    let node = build::select_where(vec![build::target(build::col("a"))], vec![build::table("t")], build::op(">", build::col("b"), build::int(10)));
    let query = analyze(node, "SELECT a FROM t WHERE b > 10");
    let quals = cast!(query.jointree.quals.as_ref().unwrap(), Expr::Op);
    assert_eq!(quals.opname, ">");
    assert_eq!(quals.opresulttype, pg_analyze::catalog::BOOLOID);
}

#[test]
fn it_rejects_aggregates_and_windows_in_where() {
    let node = build::select_where(vec![build::target(build::col("a"))], vec![build::table("t")], build::op(">", build::func_star("count"), build::int(1)));
    let err = analyze_err(node, "SELECT a FROM t WHERE count(*) > 1");
    assert_eq!(err.to_string(), "aggregate functions are not allowed in WHERE");
    assert_eq!(err.code(), SqlState::GroupingError);

    let window = build::window_func("row_number", vec![], vec![build::col("a")]);
    let node = build::select_where(vec![build::target(build::col("a"))], vec![build::table("t")], build::op(">", window, build::int(1)));
    let err = analyze_err(node, "SELECT a FROM t WHERE row_number() OVER (PARTITION BY a) > 1");
    assert_eq!(err.to_string(), "window functions are not allowed in WHERE");
}

#[test]
fn it_groups_by_output_columns() {
    let node = stmt(SelectStmt {
        group_clause: vec![build::col("a")],
        ..build::select_stmt(vec![build::target(build::col("a")), build::target(build::func("sum", vec![build::col("b")]))], vec![build::table("t")])
    });
    let query = analyze(node, "SELECT a, sum(b) FROM t GROUP BY a");
    assert!(query.has_aggs);
    assert_eq!(query.group_clause.len(), 1);
    assert_eq!(query.group_clause[0].tle_sort_group_ref, query.target_list[0].ressortgroupref);
    assert_eq!(query.target_list[1].expr.type_oid(), INT8OID);
}

#[test]
fn it_groups_by_position() {
    let node = stmt(SelectStmt {
        group_clause: vec![build::int(1)],
        ..build::select_stmt(vec![build::target(build::col("b")), build::target(build::func_star("count"))], vec![build::table("t")])
    });
    let query = analyze(node, "SELECT b, count(*) FROM t GROUP BY 1");
    assert_eq!(query.group_clause.len(), 1);
    assert_ne!(query.target_list[0].ressortgroupref, 0);

    let node = stmt(SelectStmt { group_clause: vec![build::int(3)], ..build::select_stmt(vec![build::target(build::col("b"))], vec![build::table("t")]) });
    let err = analyze_err(node, "SELECT b FROM t GROUP BY 3");
    assert_eq!(err.to_string(), "GROUP BY position 3 is not in select list");
}

#[test]
fn it_rejects_ungrouped_columns() {
    let node = stmt(SelectStmt {
        group_clause: vec![build::col("a")],
        ..build::select_stmt(vec![build::target(build::col("b")), build::target(build::func_star("count"))], vec![build::table("t")])
    });
    let err = analyze_err(node, "SELECT b, count(*) FROM t GROUP BY a");
    let pattern = Regex::new(r#"^column "t\.b" must appear in the GROUP BY clause"#).unwrap();
    assert!(pattern.is_match(&err.to_string()), "unexpected error: {}", err);
    assert_eq!(err.code(), SqlState::GroupingError);

    // An aggregate alone makes the whole query grouped.
    let node = build::select(vec![build::target(build::col("a")), build::target(build::func_star("count"))], vec![build::table("t")]);
    let err = analyze_err(node, "SELECT a, count(*) FROM t");
    assert_eq!(err.to_string(), "column \"t.a\" must appear in the GROUP BY clause or be used in an aggregate function");
}

// ============================================================================
// ORDER BY, DISTINCT and LIMIT
// ============================================================================

#[test]
fn it_adds_junk_entries_for_sort_keys_outside_the_target_list() {
    let node = stmt(SelectStmt { sort_clause: vec![build::sort_desc(build::col("b"))], ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]) });
    let query = analyze(node, "SELECT a FROM t ORDER BY b DESC");
    assert_eq!(query.target_list.len(), 2);
    assert!(query.target_list[1].resjunk);
    assert_eq!(query.visible_targets().count(), 1);
    assert_eq!(query.sort_clause.len(), 1);
    assert_eq!(query.sort_clause[0].tle_sort_group_ref, query.target_list[1].ressortgroupref);
}

#[test]
fn it_builds_distinct_clauses() {
    let node = stmt(SelectStmt { distinct_clause: Some(vec![]), ..build::select_stmt(vec![build::target(build::col("a")), build::target(build::col("b"))], vec![build::table("t")]) });
    let query = analyze(node, "SELECT DISTINCT a, b FROM t");
    assert_eq!(query.distinct_clause.len(), 2);
    assert!(!query.has_distinct_on);
}

#[test]
fn it_requires_distinct_on_to_lead_the_order_by() {
    let targets = || vec![build::target(build::col("a")), build::target(build::col("b"))];
    let node = stmt(SelectStmt {
        distinct_clause: Some(vec![build::col("a")]),
        sort_clause: vec![build::sort(build::col("a")), build::sort(build::col("b"))],
        ..build::select_stmt(targets(), vec![build::table("t")])
    });
    let query = analyze(node, "SELECT DISTINCT ON (a) a, b FROM t ORDER BY a, b");
    assert!(query.has_distinct_on);
    assert_eq!(query.distinct_clause.len(), 1);
    assert_eq!(query.sort_clause.len(), 2);

    let node = stmt(SelectStmt {
        distinct_clause: Some(vec![build::col("a")]),
        sort_clause: vec![build::sort(build::col("b"))],
        ..build::select_stmt(targets(), vec![build::table("t")])
    });
    let err = analyze_err(node, "SELECT DISTINCT ON (a) a, b FROM t ORDER BY b");
    assert_eq!(err.to_string(), "SELECT DISTINCT ON expressions must match initial ORDER BY expressions");
    assert_eq!(err.code(), SqlState::InvalidColumnReference);
}

#[test]
fn it_coerces_limit_to_bigint() {
    let node = stmt(SelectStmt {
        limit_count: Some(build::int(10)),
        limit_offset: Some(build::int(5)),
        ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")])
    });
    let query = analyze(node, "SELECT a FROM t LIMIT 10 OFFSET 5");
    assert_eq!(query.limit_count.as_ref().map(Expr::type_oid), Some(INT8OID));
    assert_eq!(query.limit_offset.as_ref().map(Expr::type_oid), Some(INT8OID));
}

#[test]
fn it_rejects_invalid_limits() {
    let node = stmt(SelectStmt { limit_count: Some(build::int(-1)), ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]) });
    let err = analyze_err(node, "SELECT a FROM t LIMIT -1");
    assert_eq!(err.to_string(), "LIMIT must not be negative");
    assert_eq!(err.code(), SqlState::InvalidRowCountInLimitClause);

    let node = stmt(SelectStmt { limit_offset: Some(build::col("a")), ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]) });
    let err = analyze_err(node, "SELECT a FROM t OFFSET a");
    assert_eq!(err.to_string(), "argument of OFFSET must not contain variables");
}

// ============================================================================
// Subqueries and CTEs
// ============================================================================

#[test]
fn it_analyzes_subqueries_in_from() {
    let inner = select_cols(&["a"], &["t"]);
    let query = analyze(build::select(vec![build::target(build::col("s.a"))], vec![build::subselect(inner, "s")]), "SELECT s.a FROM (SELECT a FROM t) s");
    let sub = query.rtable[0].subquery().unwrap();
    assert_eq!(sub.rtable[0].refname, "t");
    assert_eq!(query.rtable[0].refname, "s");
    assert_eq!(cast!(&query.target_list[0].expr, Expr::Var).vartype, INT4OID);
}

#[test]
fn it_lets_lateral_subqueries_see_earlier_items() {
    let inner = build::select_where(vec![build::target(build::col("b"))], vec![build::table("t2")], build::op("=", build::col("t2.a"), build::col("t1.a")));
    let node = build::select(vec![build::target(build::col("l.b"))], vec![build::table("t1"), build::lateral(inner.clone(), "l")]);
    let query = analyze(node, "SELECT l.b FROM t1, LATERAL (SELECT b FROM t2 WHERE t2.a = t1.a) l");
    assert!(query.rtable[1].lateral);

    let node = build::select(vec![build::target(build::col("l.b"))], vec![build::table("t1"), build::subselect(inner, "l")]);
    let err = analyze_err(node, "SELECT l.b FROM t1, (SELECT b FROM t2 WHERE t2.a = t1.a) l");
    assert_eq!(err.code(), SqlState::UndefinedTable);
}

#[test]
fn it_links_correlated_sublinks_to_the_outer_level() {
    let inner = build::select_where(vec![build::target(build::int(1))], vec![build::table("t2")], build::op("=", build::col("t2.a"), build::col("t1.a")));
    let node = build::select_where(vec![build::target(build::col("a"))], vec![build::table("t1")], build::exists(inner));
    let query = analyze(node, "SELECT a FROM t1 WHERE EXISTS (SELECT 1 FROM t2 WHERE t2.a = t1.a)");
    assert!(query.has_sub_links);

    let sublink = cast!(query.jointree.quals.as_ref().unwrap(), Expr::SubLink);
    let cond = cast!(sublink.subselect.jointree.quals.as_ref().unwrap(), Expr::Op);
    let outer = cast!(&cond.args[1], Expr::Var);
    assert_eq!((outer.varno, outer.varlevelsup), (1, 1));
}

#[test]
fn it_requires_scalar_subqueries_to_return_one_column() {
    let node = build::select(vec![build::target(build::scalar_subquery(select_cols(&["a", "b"], &["t"])))], vec![]);
    let err = analyze_err(node, "SELECT (SELECT a, b FROM t)");
    assert_eq!(err.to_string(), "subquery must return only one column");
}

#[test]
fn it_analyzes_with_queries() {
    let node = stmt(SelectStmt {
        with_clause: Some(build::with(false, vec![("w", select_cols(&["a"], &["t"]))])),
        ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("w")])
    });
    let query = analyze(node, "WITH w AS (SELECT a FROM t) SELECT a FROM w");
    assert_eq!(query.cte_list.len(), 1);
    assert_eq!(query.cte_list[0].ctename, "w");
    assert_eq!(query.cte_list[0].ctecolnames, vec!["a".to_string()]);
    assert_eq!(query.cte_list[0].ctecoltypes, vec![INT4OID]);
    assert!(!query.cte_list[0].cterecursive);
    assert!(matches!(&query.rtable[0].kind, RteKind::Cte { ctename, levelsup: 0, self_reference: false } if ctename == "w"));
}

#[test]
fn it_rejects_duplicate_with_names() {
    let node = stmt(SelectStmt {
        with_clause: Some(build::with(false, vec![("w", select_cols(&["a"], &["t"])), ("w", select_cols(&["b"], &["t"]))])),
        ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("w")])
    });
    let err = analyze_err(node, "WITH w AS (SELECT a FROM t), w AS (SELECT b FROM t) SELECT a FROM w");
    assert_eq!(err.to_string(), "WITH query name \"w\" specified more than once");
}

#[test]
fn it_analyzes_recursive_with_queries() {
    let seed = build::select_stmt(vec![build::target_as(build::int(1), "n")], vec![]);
    let step = SelectStmt {
        where_clause: Some(build::op("<", build::col("n"), build::int(10))),
        ..build::select_stmt(vec![build::target(build::op("+", build::col("n"), build::int(1)))], vec![build::table("r")])
    };
    let body = stmt(build::set_op(pg_analyze::ast::SetOperation::Union, true, seed, step));
    let node = stmt(SelectStmt { with_clause: Some(build::with(true, vec![("r", body)])), ..build::select_stmt(vec![build::target(build::col("n"))], vec![build::table("r")]) });

    let query = analyze(node, "WITH RECURSIVE r AS (SELECT 1 AS n UNION ALL SELECT n + 1 FROM r WHERE n < 10) SELECT n FROM r");
    assert!(query.has_recursive);
    assert!(query.cte_list[0].cterecursive);
    assert_eq!(query.cte_list[0].ctecoltypes, vec![INT4OID]);
    assert_eq!(query.target_list[0].expr.type_oid(), INT4OID);
}

// ============================================================================
// SELECT INTO
// ============================================================================

#[test]
fn it_turns_select_into_into_create_table_as() {
    let into = IntoClause { rel: build::range_var("copy"), ..Default::default() };
    let node = stmt(SelectStmt { into_clause: Some(into), ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]) });
    let query = analyze(node, "SELECT a INTO copy FROM t");
    assert_eq!(query.command_type, CmdType::Utility);
    let ctas = cast!(query.utility_stmt.as_ref().unwrap(), UtilityStmt::CreateTableAs);
    assert!(ctas.is_select_into);
    assert_eq!(ctas.into.relname, "copy");
    assert_eq!(ctas.query.command_type, CmdType::Select);
}

#[test]
fn it_rejects_select_into_below_the_top_level() {
    let into = IntoClause { rel: build::range_var("copy"), ..Default::default() };
    let inner = stmt(SelectStmt { into_clause: Some(into), ..build::select_stmt(vec![build::target(build::col("a"))], vec![build::table("t")]) });
    let node = build::select(vec![build::target(build::col("s.a"))], vec![build::subselect(inner, "s")]);
    let err = analyze_err(node, "SELECT s.a FROM (SELECT a INTO copy FROM t) s");
    assert_eq!(err.to_string(), "SELECT ... INTO is not allowed here");
}

// ============================================================================
// Parameters
// ============================================================================

fn param_query() -> Node {
    build::select_where(vec![build::target(build::col("a"))], vec![build::table("t")], build::op("=", build::col("a"), build::param(1)))
}

#[test]
fn it_uses_declared_parameter_types() {
    let catalog = catalog();
    let analyzer = Analyzer::new(&catalog);
    let query = analyzer.parse_analyze(param_query(), "SELECT a FROM t WHERE a = $1", &[INT8OID]).unwrap();
    let quals = cast!(query.jointree.quals.as_ref().unwrap(), Expr::Op);
    let param = cast!(&quals.args[1], Expr::Param);
    assert_eq!(param.paramtype, INT8OID);

    let err = analyzer.parse_analyze(param_query(), "SELECT a FROM t WHERE a = $1", &[]).unwrap_err();
    assert_eq!(err.to_string(), "there is no parameter $1");
    assert_eq!(err.code(), SqlState::UndefinedParameter);
}

#[test]
fn it_deduces_parameter_types() {
    let catalog = catalog();
    let analyzer = Analyzer::new(&catalog);
    let mut types = vec![];
    analyzer.parse_analyze_varparams(param_query(), "SELECT a FROM t WHERE a = $1", &mut types).unwrap();
    assert_eq!(types, vec![INT4OID]);

    // Parameters nobody constrains stay unknown.
    let node = build::select(vec![build::target(build::param(2))], vec![]);
    let mut types = vec![];
    analyzer.parse_analyze_varparams(node, "SELECT $2", &mut types).unwrap();
    assert_eq!(types.len(), 2);
    assert_eq!(types[0], UNKNOWNOID);
}

#[test]
fn it_rejects_parameters_left_untyped_beside_a_deduced_use() {
    let catalog = catalog();
    let analyzer = Analyzer::new(&catalog);
    let node = build::select_where(
        vec![build::target(build::param(1)), build::target(build::col("a"))],
        vec![build::table("t")],
        build::op("=", build::col("a"), build::param(1)),
    );
    let mut types = vec![];
    let err = analyzer.parse_analyze_varparams(node, "SELECT $1, a FROM t WHERE a = $1", &mut types).unwrap_err();
    assert_eq!(err.to_string(), "could not determine data type of parameter $1");
    assert_eq!(err.code(), SqlState::AmbiguousParameter);
    // The caller's array is left as it was.
    assert!(types.is_empty());
}

// ============================================================================
// Entry points
// ============================================================================

#[test]
fn it_requires_source_text() {
    let err = analyze_err(select_cols(&["a"], &["t"]), "");
    assert!(matches!(err, Error::Internal(_)));
}

#[test]
fn it_calls_the_post_analyze_hook_once_per_statement() {
    let catalog = catalog();
    let calls = AtomicUsize::new(0);
    let analyzer = Analyzer::new(&catalog).with_post_analyze_hook(|_, query| {
        assert_eq!(query.command_type, CmdType::Select);
        calls.fetch_add(1, Ordering::SeqCst);
    });
    analyzer.parse_analyze(select_cols(&["a"], &["t"]), "SELECT a FROM t", &[]).unwrap();
    analyzer.parse_analyze(build::select(vec![build::target(build::int(1))], vec![]), "SELECT 1", &[]).unwrap();
    assert!(analyzer.parse_analyze(select_cols(&["zz"], &["t"]), "SELECT zz FROM t", &[]).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn it_knows_which_statements_need_a_snapshot() {
    assert!(analyze_requires_snapshot(&select_cols(&["a"], &["t"])));
    assert!(analyze_requires_snapshot(&Node::InsertStmt(Box::new(build::insert("t", &[], None)))));
    assert!(analyze_requires_snapshot(&Node::DeleteStmt(Box::new(build::delete("t")))));
    assert!(!analyze_requires_snapshot(&Node::VariableSetStmt(Box::new(VariableSetStmt { name: "search_path".to_string(), args: vec![], is_local: false }))));
}

#[test]
fn it_serializes_queries_to_json() {
    let query = analyze(select_cols(&["a"], &["t"]), "SELECT a FROM t");
    let json: serde_json::Value = serde_json::from_str(&query.to_json().unwrap()).unwrap();
    assert_eq!(json["command_type"], "Select");
    assert_eq!(json["rtable"][0]["refname"], "t");
    assert_eq!(json["target_list"][0]["resname"], "a");
}

#[test]
fn it_analyzes_from_many_threads() {
    let results = Parallel::new()
        .each(0..8, |i| {
            let catalog = MemoryCatalog::new().with_table("t", &[("a", "int4"), ("b", "text")]);
            let analyzer = Analyzer::new(&catalog);
            let column = if i % 2 == 0 { "a" } else { "b" };
            let query = analyzer.parse_analyze(select_cols(&[column], &["t"]), "SELECT col FROM t", &[]).unwrap();
            query.target_list[0].expr.type_oid()
        })
        .run();
    assert_eq!(results, vec![INT4OID, TEXTOID, INT4OID, TEXTOID, INT4OID, TEXTOID, INT4OID, TEXTOID]);
}

#[test]
fn it_refuses_queries_nested_too_deeply() {
    let catalog = catalog();
    let config = pg_analyze::AnalyzerConfig { max_depth: 2, ..Default::default() };
    let analyzer = Analyzer::new(&catalog).with_config(config);

    let mut node = select_cols(&["a"], &["t"]);
    for level in 0..3 {
        node = build::select(vec![build::target(build::col("a"))], vec![build::subselect(node, &format!("s{}", level))]);
    }
    let sql = "SELECT a FROM (SELECT a FROM (SELECT a FROM (SELECT a FROM t) s0) s1) s2";
    let err = analyzer.parse_analyze(node.clone(), sql, &[]).unwrap_err();
    assert!(matches!(err, Error::TooComplex { depth: 2 }));

    let relaxed = Analyzer::new(&catalog).with_config(pg_analyze::AnalyzerConfig { max_depth: 3, ..Default::default() });
    assert!(relaxed.parse_analyze(node, sql, &[]).is_ok());
}
