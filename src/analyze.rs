//! Entry points of semantic analysis.
//!
//! An [`Analyzer`] bundles what analysis consults: a [`Catalog`], the
//! [`AnalyzerConfig`], an optional [`SqlParser`] for statements that embed SQL
//! text, and an optional hook that observes every finished top-level query.

use std::rc::Rc;

use tracing::debug;

use crate::ast::Node;
use crate::catalog::{Catalog, Oid, UNKNOWNOID};
use crate::config::AnalyzerConfig;
use crate::error::{Diagnostic, SqlState};
use crate::query::{Expr, ParamKind, Query};
use crate::rownum::rewrite_rownum;
use crate::scope::{char_position, AnalyzeContext, CteItem, ParamState, ParseState};
use crate::transform::{transform_stmt, transform_top_level_stmt};
use crate::{Error, Result};

/// Turns SQL text into raw statements. Used for SQL embedded in other statements, like EXECUTE DIRECT.
pub trait SqlParser: Send + Sync {
    fn parse(&self, sql: &str) -> std::result::Result<Vec<Node>, String>;
}

/// Called with the scope and the finished query after each top-level analysis.
pub type PostAnalyzeHook<'a> = Box<dyn Fn(&ParseState<'_>, &Query) + Send + Sync + 'a>;

/// Semantic analyzer bound to a catalog.
pub struct Analyzer<'a> {
    catalog: &'a dyn Catalog,
    config: AnalyzerConfig,
    parser: Option<&'a dyn SqlParser>,
    hook: Option<PostAnalyzeHook<'a>>,
}

impl<'a> Analyzer<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog, config: AnalyzerConfig::default(), parser: None, hook: None }
    }

    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_parser(mut self, parser: &'a dyn SqlParser) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Installs a hook that sees every query [`Analyzer::parse_analyze`] produces. It may inspect but not change it.
    pub fn with_post_analyze_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ParseState<'_>, &Query) + Send + Sync + 'a,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn catalog(&self) -> &'a dyn Catalog {
        self.catalog
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn parser(&self) -> Option<&'a dyn SqlParser> {
        self.parser
    }

    /// Analyzes a raw statement with fixed parameter types.
    ///
    /// Referencing `$n` beyond `param_types` is an error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pg_analyze::ast::build;
    /// use pg_analyze::catalog::{MemoryCatalog, INT8OID};
    /// use pg_analyze::Analyzer;
    ///
    /// let catalog = MemoryCatalog::new().with_table("t", &[("a", "int4")]);
    /// let analyzer = Analyzer::new(&catalog);
    /// let stmt = build::select_where(vec![build::target(build::col("a"))], vec![build::table("t")], build::op("=", build::col("a"), build::param(1)));
    /// let query = analyzer.parse_analyze(stmt, "SELECT a FROM t WHERE a = $1", &[INT8OID]).unwrap();
    /// assert!(query.jointree.quals.is_some());
    /// ```
    pub fn parse_analyze(&self, node: Node, source_text: &str, param_types: &[Oid]) -> Result<Query> {
        let params = ParamState { types: param_types.to_vec(), variable: false };
        self.analyze(&node, source_text, params).map(|(query, _)| query)
    }

    /// Analyzes a raw statement, deducing parameter types from how they are used.
    ///
    /// `param_types` holds the known types on entry and is extended with the deduced ones.
    /// Parameters whose type could not be deduced are left as `UNKNOWNOID`.
    pub fn parse_analyze_varparams(&self, node: Node, source_text: &str, param_types: &mut Vec<Oid>) -> Result<Query> {
        let params = ParamState { types: param_types.clone(), variable: true };
        let (query, params) = self.analyze(&node, source_text, params)?;
        check_param_types(&query, &params.types, source_text)?;
        *param_types = params.types;
        Ok(query)
    }

    fn analyze(&self, node: &Node, source_text: &str, params: ParamState) -> Result<(Query, ParamState)> {
        if source_text.is_empty() {
            return Err(Error::Internal("source text is required for analysis".to_string()));
        }
        let ctx = AnalyzeContext::new(self, source_text, params);
        let mut pstate = ParseState::new(&ctx);
        let mut query = transform_top_level_stmt(&mut pstate, node)?;

        let catalog = self.catalog;
        query.try_for_each_query_mut(&mut |q: &mut Query| {
            rewrite_rownum(catalog, q);
            Ok(())
        })?;

        if let Some(hook) = &self.hook {
            hook(&pstate, &query);
        }
        drop(pstate);
        Ok((query, ctx.params.into_inner()))
    }
}

/// Every `$n` must carry the type finally recorded for it.
///
/// A use left untyped while another use deduced a type could not be resolved.
fn check_param_types(query: &Query, types: &[Oid], source_text: &str) -> Result<()> {
    let mut conflict = None;
    query.any_query(&mut |q| {
        q.exprs().into_iter().any(|e| {
            e.any(&mut |e| match e {
                Expr::Param(p) if p.kind == ParamKind::Extern => {
                    let recorded = usize::try_from(p.paramid - 1).ok().and_then(|i| types.get(i)).copied();
                    if recorded != Some(p.paramtype) {
                        conflict = Some((p.paramid, p.paramtype, p.location));
                        return true;
                    }
                    false
                }
                _ => false,
            })
        })
    });
    let Some((number, found, location)) = conflict else {
        return Ok(());
    };
    debug!(param = number, "parameter used with conflicting types");
    let diagnostic = if found == UNKNOWNOID {
        Diagnostic::new(SqlState::AmbiguousParameter, format!("could not determine data type of parameter ${}", number))
    } else {
        Diagnostic::new(SqlState::DatatypeMismatch, format!("inconsistent types deduced for parameter ${}", number))
    };
    Err(diagnostic.position(char_position(source_text, location)).into())
}

/// Analyzes a statement nested in another one, as a child level of `parent`.
///
/// `parent_cte` is the WITH query the statement is the body of, if any.
pub(crate) fn parse_sub_analyze(node: &Node, parent: &ParseState<'_>, parent_cte: Option<Rc<CteItem>>) -> Result<Query> {
    let mut pstate = parent.make_child()?;
    pstate.parent_cte = parent_cte;
    transform_stmt(&mut pstate, node)
}

/// Whether analyzing `node` reads the catalog, so the caller has to take a snapshot first.
///
/// ```rust
/// use pg_analyze::ast::build;
/// use pg_analyze::analyze_requires_snapshot;
///
/// assert!(analyze_requires_snapshot(&build::select(vec![build::target(build::int(1))], vec![])));
/// assert!(!analyze_requires_snapshot(&build::int(1)));
/// ```
pub fn analyze_requires_snapshot(node: &Node) -> bool {
    matches!(
        node,
        Node::InsertStmt(_)
            | Node::DeleteStmt(_)
            | Node::UpdateStmt(_)
            | Node::SelectStmt(_)
            | Node::DeclareCursorStmt(_)
            | Node::ExplainStmt(_)
            | Node::CreateTableAsStmt(_)
            | Node::ExecDirectStmt(_)
    )
}
