//! Semantic analysis of raw SQL parse trees.
//!
//! `pg_analyze` turns the untyped tree a grammar front end produces into a [`Query`]:
//! names resolved against a [`Catalog`], expressions typed, collations assigned and
//! the FROM clause laid out as a positional range table. It also carries two
//! Oracle-compatible rewrites: the `(+)` outer-join marker and ROWNUM-to-LIMIT.
//!
//! # Example
//!
//! ```rust
//! use pg_analyze::ast::build;
//! use pg_analyze::catalog::{MemoryCatalog, INT4OID};
//! use pg_analyze::Analyzer;
//!
//! let catalog = MemoryCatalog::new().with_table("users", &[("id", "int4"), ("name", "text")]);
//! let analyzer = Analyzer::new(&catalog);
//!
//! let stmt = build::select(vec![build::target(build::col("id"))], vec![build::table("users")]);
//! let query = analyzer.parse_analyze(stmt, "SELECT id FROM users", &[]).unwrap();
//! assert_eq!(query.rtable.len(), 1);
//! assert_eq!(query.target_list[0].expr.type_oid(), INT4OID);
//! ```

mod analyze;
pub mod ast;
pub mod catalog;
mod clause;
mod coerce;
mod collation;
pub mod config;
mod error;
mod expr;
mod locking;
mod outer_join;
pub mod query;
mod relation;
mod rownum;
pub mod scope;
mod transform;

pub use analyze::*;
pub use catalog::Catalog;
pub use config::AnalyzerConfig;
pub use error::*;
pub use query::Query;
pub use scope::ParseState;
