#![allow(unused_macros, dead_code)]

use std::collections::HashMap;
use std::fmt;

use pg_analyze::ast::{build, Node, RelPersistence};
use pg_analyze::catalog::{MemoryCatalog, RelKind};
use pg_analyze::config::NodeRole;
use pg_analyze::{Analyzer, Error, Query, SqlParser};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(PartialEq, Eq)]
pub struct MultiLineString<'a>(pub &'a str);

impl<'a> fmt::Debug for MultiLineString<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

// Modified from https://github.com/colin-kiegel/rust-pretty-assertions/issues/24#issuecomment-520613247
// to optionally turn off the pretty printing so you can copy the actual string.
macro_rules! assert_debug_eq {
    ($left:expr, $right:expr) => {
        if let Ok(_diff) = std::env::var("DIFF") {
            pretty_assertions::assert_eq!(MultiLineString(&format!("{:#?}", $left)), MultiLineString($right));
        } else {
            std::assert_eq!(MultiLineString(&format!("{:#?}", $left)), MultiLineString($right));
        }
    };
}

macro_rules! assert_eq {
    ($left:expr, $right:expr) => {
        if let Ok(_diff) = std::env::var("DIFF") {
            pretty_assertions::assert_eq!($left, $right);
        } else {
            std::assert_eq!($left, $right);
        }
    };
}

macro_rules! cast {
    ($target: expr, $pat: path) => {{
        if let $pat(a) = $target {
            // #1
            a
        } else {
            panic!("mismatch variant when cast to {}", stringify!($pat)); // #2
        }
    }};
}

/// Routes analyzer events to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let env_filter = EnvFilter::builder().with_default_directive(tracing::Level::ERROR.into()).from_env_lossy();
    let subscriber = FmtSubscriber::builder().with_test_writer().with_env_filter(env_filter).finish();
    // Only the first test in a binary gets to install it.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Catalog shared by the integration tests.
pub fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_table("t", &[("a", "int4"), ("b", "int4")])
        .with_table("t1", &[("a", "int4"), ("b", "int4")])
        .with_table("t2", &[("a", "int4"), ("b", "int4")])
        .with_table("t3", &[("a", "int4"), ("b", "int4")])
        .with_table("people", &[("id", "int4"), ("name", "text")])
        .with_table("s.events", &[("x", "int8")])
        .with_relation("scratch", &[("id", "int4")], RelKind::Table, RelPersistence::Temp)
        .with_relation("v", &[("a", "int4")], RelKind::View, RelPersistence::Permanent)
        .with_node("coord1", NodeRole::Coordinator, 0)
        .with_node("coord2", NodeRole::Coordinator, 1)
        .with_node("dn1", NodeRole::Datanode, 0)
}

/// Analyzes `node` against the fixture catalog and panics on error.
pub fn analyze(node: Node, sql: &str) -> Query {
    let catalog = catalog();
    let analyzer = Analyzer::new(&catalog);
    match analyzer.parse_analyze(node, sql, &[]) {
        Ok(query) => query,
        Err(e) => panic!("analysis of {sql:?} failed: {e}"),
    }
}

/// Analyzes `node` against the fixture catalog, expecting an error.
pub fn analyze_err(node: Node, sql: &str) -> Error {
    let catalog = catalog();
    let analyzer = Analyzer::new(&catalog);
    match analyzer.parse_analyze(node, sql, &[]) {
        Ok(query) => panic!("analysis of {sql:?} unexpectedly succeeded: {query:?}"),
        Err(e) => e,
    }
}

/// `SELECT cols FROM tables`
pub fn select_cols(cols: &[&str], tables: &[&str]) -> Node {
    build::select(cols.iter().map(|c| build::target(build::col(c))).collect(), tables.iter().map(|t| build::table(t)).collect())
}

/// Parser answering from a fixed table of SQL texts.
#[derive(Default)]
pub struct CannedParser {
    statements: HashMap<String, Vec<Node>>,
}

impl CannedParser {
    pub fn with(mut self, sql: &str, statements: Vec<Node>) -> Self {
        self.statements.insert(sql.to_string(), statements);
        self
    }
}

impl SqlParser for CannedParser {
    fn parse(&self, sql: &str) -> Result<Vec<Node>, String> {
        self.statements.get(sql).cloned().ok_or_else(|| format!("syntax error at or near \"{}\"", sql))
    }
}
