//! Per-level analysis state.
//!
//! A [`ParseState`] exists for every statement level being analyzed: the top-level
//! statement, each subquery in FROM, each sublink and each WITH query. Children
//! hold a shared reference to their parent so column references and CTE names can
//! resolve outward; the parent outlives every child it spawns.
//!
//! Visibility is a plain value. [`Namespace`] snapshots are taken, adjusted and put
//! back around clauses that must not see some entries (an UPDATE target inside its
//! own FROM list, a join's children inside its ON clause).

use std::cell::RefCell;
use std::rc::Rc;

use crate::analyze::Analyzer;
use crate::catalog::{Catalog, Oid, UNKNOWNOID};
use crate::config::AnalyzerConfig;
use crate::error::{Diagnostic, SqlState};
use crate::query::{Index, JoinTreeNode, Query, RangeTblEntry, RteColumn};
use crate::{Error, Result};

// ============================================================================
// Namespace
// ============================================================================

/// Visibility of one range-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceItem {
    pub rtindex: Index,
    /// The entry can be named as a table qualifier.
    pub rel_visible: bool,
    /// Its columns can be referenced unqualified.
    pub cols_visible: bool,
    /// Visible only to LATERAL items.
    pub lateral_only: bool,
    /// A LATERAL item may see it even though it is `lateral_only`.
    pub lateral_ok: bool,
}

impl NamespaceItem {
    pub fn new(rtindex: Index, rel_visible: bool, cols_visible: bool) -> Self {
        Self { rtindex, rel_visible, cols_visible, lateral_only: false, lateral_ok: true }
    }
}

/// An ordered set of namespace items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    items: Vec<NamespaceItem>,
}

impl Namespace {
    pub fn new(items: Vec<NamespaceItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[NamespaceItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// This namespace followed by `other`.
    pub fn concat(mut self, other: Namespace) -> Self {
        self.items.extend(other.items);
        self
    }

    /// Sets the lateral flags of every item.
    pub fn with_all_lateral(mut self, lateral_only: bool, lateral_ok: bool) -> Self {
        for item in self.items.iter_mut() {
            item.lateral_only = lateral_only;
            item.lateral_ok = lateral_ok;
        }
        self
    }

    /// Sets the lateral flags of the items for one range-table entry.
    pub fn with_lateral(mut self, rtindex: Index, lateral_only: bool, lateral_ok: bool) -> Self {
        for item in self.items.iter_mut().filter(|item| item.rtindex == rtindex) {
            item.lateral_only = lateral_only;
            item.lateral_ok = lateral_ok;
        }
        self
    }

    /// Hides the columns of every item while keeping relation names visible.
    pub fn with_columns_hidden(mut self) -> Self {
        for item in self.items.iter_mut() {
            item.cols_visible = false;
        }
        self
    }

    /// Only the items for the given range-table entries.
    pub fn restricted_to(mut self, rtindexes: &[Index]) -> Self {
        self.items.retain(|item| rtindexes.contains(&item.rtindex));
        self
    }

    /// Everything except the items for one range-table entry.
    pub fn without(mut self, rtindex: Index) -> Self {
        self.items.retain(|item| item.rtindex != rtindex);
        self
    }

    pub fn contains(&self, rtindex: Index) -> bool {
        self.items.iter().any(|item| item.rtindex == rtindex)
    }
}

// ============================================================================
// Expression context
// ============================================================================

/// The clause an expression is being analyzed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExprKind {
    #[default]
    None,
    Other,
    JoinOn,
    JoinUsing,
    FromFunction,
    Where,
    Having,
    SelectTarget,
    UpdateSource,
    GroupBy,
    OrderBy,
    DistinctOn,
    Limit,
    Offset,
    Returning,
    Values,
    ValuesSingle,
    WindowPartition,
}

impl ExprKind {
    /// Clause name used in "not allowed in" errors.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::None | ExprKind::Other => "this context",
            ExprKind::JoinOn => "JOIN conditions",
            ExprKind::JoinUsing => "USING",
            ExprKind::FromFunction => "functions in FROM",
            ExprKind::Where => "WHERE",
            ExprKind::Having => "HAVING",
            ExprKind::SelectTarget => "SELECT",
            ExprKind::UpdateSource => "UPDATE",
            ExprKind::GroupBy => "GROUP BY",
            ExprKind::OrderBy => "ORDER BY",
            ExprKind::DistinctOn => "DISTINCT ON",
            ExprKind::Limit => "LIMIT",
            ExprKind::Offset => "OFFSET",
            ExprKind::Returning => "RETURNING",
            ExprKind::Values | ExprKind::ValuesSingle => "VALUES",
            ExprKind::WindowPartition => "window PARTITION BY",
        }
    }
}

// ============================================================================
// Parameters and CTEs
// ============================================================================

/// 1-based character position of byte offset `location` in `text`.
///
/// An offset inside a multi-byte character points at that character.
pub(crate) fn char_position(text: &str, location: i32) -> Option<usize> {
    let mut end = usize::try_from(location).ok()?.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(text[..end].chars().count() + 1)
}

/// Types of `$n` parameters for one top-level statement.
#[derive(Debug, Clone, Default)]
pub struct ParamState {
    pub types: Vec<Oid>,
    /// Types may be deduced from context and the list grown.
    pub variable: bool,
}

/// A WITH query visible to name lookup.
#[derive(Debug)]
pub struct CteItem {
    pub name: String,
    pub aliascolnames: Vec<String>,
    /// Declared inside WITH RECURSIVE.
    pub recursive: bool,
    /// The query is `non-recursive-term UNION [ALL] recursive-term`.
    pub union_shaped: bool,
    pub location: i32,
    pub state: RefCell<CteState>,
}

#[derive(Debug, Default)]
pub struct CteState {
    /// Output columns, known once the query (or its non-recursive term) is analyzed.
    pub columns: Option<Vec<RteColumn>>,
    pub refcount: u32,
    pub query: Option<Query>,
    /// INSERT/UPDATE/DELETE inside WITH.
    pub modifying: bool,
    /// The query is being analyzed right now.
    pub analyzing: bool,
    /// The query referenced itself.
    pub self_referenced: bool,
}

impl CteItem {
    pub fn new(name: &str, aliascolnames: Vec<String>, recursive: bool, union_shaped: bool, location: i32) -> Self {
        Self { name: name.to_string(), aliascolnames, recursive, union_shaped, location, state: RefCell::new(CteState::default()) }
    }

    /// Records the output columns, renamed by the column alias list.
    pub fn set_columns(&self, mut columns: Vec<RteColumn>) {
        for (column, alias) in columns.iter_mut().zip(&self.aliascolnames) {
            column.name = alias.clone();
        }
        self.state.borrow_mut().columns = Some(columns);
    }
}

// ============================================================================
// ParseState
// ============================================================================

/// State shared by every level of one top-level statement.
pub struct AnalyzeContext<'a> {
    pub analyzer: &'a Analyzer<'a>,
    pub source_text: &'a str,
    pub params: RefCell<ParamState>,
}

impl<'a> AnalyzeContext<'a> {
    pub fn new(analyzer: &'a Analyzer<'a>, source_text: &'a str, params: ParamState) -> Self {
        Self { analyzer, source_text, params: RefCell::new(params) }
    }
}

/// Analysis state of one statement level.
pub struct ParseState<'a> {
    pub ctx: &'a AnalyzeContext<'a>,
    pub parent: Option<&'a ParseState<'a>>,
    /// The WITH query whose body this level is, if any.
    pub parent_cte: Option<Rc<CteItem>>,
    /// Nesting depth, 0 at the top level.
    pub depth: usize,
    pub rtable: Vec<RangeTblEntry>,
    /// Items that will make up the FROM list of the join tree.
    pub joinlist: Vec<JoinTreeNode>,
    pub namespace: Namespace,
    /// Set while a LATERAL item is analyzed.
    pub lateral_active: bool,
    pub ctenamespace: Vec<Rc<CteItem>>,
    pub next_resno: i16,
    /// INSERT/UPDATE/DELETE target entry.
    pub target_rte: Option<Index>,
    /// DEFAULT is accepted in this level's VALUES rows.
    pub is_insert: bool,
    /// DEFAULT is accepted in this level's SET list.
    pub is_update: bool,
    pub expr_kind: ExprKind,
    /// `(+)` markers are accepted in the current clause.
    pub allow_join_markers: bool,
    pub has_aggs: bool,
    pub has_window_funcs: bool,
    pub has_target_srfs: bool,
    pub has_sub_links: bool,
    pub has_modifying_cte: bool,
}

impl<'a> ParseState<'a> {
    pub fn new(ctx: &'a AnalyzeContext<'a>) -> Self {
        Self {
            ctx,
            parent: None,
            parent_cte: None,
            depth: 0,
            rtable: vec![],
            joinlist: vec![],
            namespace: Namespace::default(),
            lateral_active: false,
            ctenamespace: vec![],
            next_resno: 1,
            target_rte: None,
            is_insert: false,
            is_update: false,
            expr_kind: ExprKind::None,
            allow_join_markers: false,
            has_aggs: false,
            has_window_funcs: false,
            has_target_srfs: false,
            has_sub_links: false,
            has_modifying_cte: false,
        }
    }

    /// A fresh level nested in this one.
    pub fn make_child<'b>(&'b self) -> Result<ParseState<'b>>
    where
        'a: 'b,
    {
        let depth = self.depth + 1;
        if depth > self.config().max_depth {
            return Err(Error::TooComplex { depth: self.config().max_depth });
        }
        let mut child = ParseState::new(self.ctx);
        child.parent = Some(self);
        child.depth = depth;
        Ok(child)
    }

    pub fn catalog(&self) -> &'a dyn Catalog {
        self.ctx.analyzer.catalog()
    }

    pub fn config(&self) -> &'a AnalyzerConfig {
        self.ctx.analyzer.config()
    }

    pub fn source_text(&self) -> &'a str {
        self.ctx.source_text
    }

    /// 1-based character position of a byte offset in the source text.
    pub fn errposition(&self, location: i32) -> Option<usize> {
        char_position(self.ctx.source_text, location)
    }

    /// A user-facing error pointing at `location`.
    pub fn error(&self, code: SqlState, message: impl Into<String>, location: i32) -> Error {
        Error::Statement(self.diagnostic(code, message, location))
    }

    pub fn diagnostic(&self, code: SqlState, message: impl Into<String>, location: i32) -> Diagnostic {
        Diagnostic::new(code, message).position(self.errposition(location))
    }

    /// Range-table entry at a 1-based position of this level.
    pub fn rte(&self, rtindex: Index) -> Result<&RangeTblEntry> {
        rtindex
            .checked_sub(1)
            .and_then(|i| self.rtable.get(i))
            .ok_or_else(|| Error::Internal(format!("invalid range table index {}", rtindex)))
    }

    pub fn rte_mut(&mut self, rtindex: Index) -> Result<&mut RangeTblEntry> {
        rtindex
            .checked_sub(1)
            .and_then(|i| self.rtable.get_mut(i))
            .ok_or_else(|| Error::Internal(format!("invalid range table index {}", rtindex)))
    }

    /// The level `levelsup` steps out from this one.
    pub fn ancestor(&self, levelsup: u32) -> Option<&ParseState<'a>> {
        let mut level = self;
        for _ in 0..levelsup {
            level = level.parent?;
        }
        Some(level)
    }

    /// Levels from this one outward.
    pub fn levels(&self) -> impl Iterator<Item = &ParseState<'a>> {
        std::iter::successors(Some(self), |level| level.parent)
    }

    /// Whether a namespace item may be seen right now.
    pub fn item_visible(&self, item: &NamespaceItem) -> bool {
        !item.lateral_only || (self.lateral_active && item.lateral_ok)
    }

    /// Current visibility, to be put back with [`ParseState::restore`].
    pub fn snapshot(&self) -> Namespace {
        self.namespace.clone()
    }

    pub fn restore(&mut self, namespace: Namespace) {
        self.namespace = namespace;
    }

    /// Runs `f` with `expr_kind` set, restoring the previous kind afterwards.
    pub fn with_expr_kind<T>(&mut self, kind: ExprKind, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = std::mem::replace(&mut self.expr_kind, kind);
        let result = f(self);
        self.expr_kind = saved;
        result
    }

    /// Type of parameter `$number`, growing the list when types are being deduced.
    pub fn param_type(&self, number: i32, location: i32) -> Result<Oid> {
        let mut params = self.ctx.params.borrow_mut();
        let index = usize::try_from(number).ok().filter(|n| *n >= 1).map(|n| n - 1);
        match index {
            Some(i) if i < params.types.len() => Ok(params.types[i]),
            Some(i) if params.variable => {
                params.types.resize(i + 1, UNKNOWNOID);
                Ok(UNKNOWNOID)
            }
            _ => Err(self.error(SqlState::UndefinedParameter, format!("there is no parameter ${}", number), location)),
        }
    }

    /// Records a type deduced for parameter `$number` from context.
    pub fn deduce_param_type(&self, number: i32, type_oid: Oid, location: i32) -> Result<bool> {
        let mut params = self.ctx.params.borrow_mut();
        if !params.variable {
            return Ok(false);
        }
        let Some(slot) = usize::try_from(number).ok().and_then(|n| n.checked_sub(1)).and_then(|i| params.types.get_mut(i)) else {
            return Ok(false);
        };
        if *slot == UNKNOWNOID {
            *slot = type_oid;
        } else if *slot != type_oid {
            return Err(self.error(SqlState::DatatypeMismatch, format!("inconsistent types deduced for parameter ${}", number), location));
        }
        Ok(true)
    }

    /// Finds a WITH query by name, innermost level first, with the number of levels up it was found.
    pub fn find_cte(&self, name: &str) -> Option<(Rc<CteItem>, u32)> {
        self.levels()
            .enumerate()
            .find_map(|(levelsup, level)| level.ctenamespace.iter().find(|cte| cte.name == name).map(|cte| (cte.clone(), levelsup as u32)))
    }

    /// Whether a name refers to a WITH query rather than a table.
    pub fn is_cte_name(&self, name: &str) -> bool {
        self.find_cte(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    #[test]
    fn it_restores_visibility_snapshots() {
        let ns = Namespace::new(vec![NamespaceItem::new(1, true, true), NamespaceItem::new(2, true, true)]);
        let saved = ns.clone();
        let hidden = ns.with_lateral(1, true, false);
        assert!(hidden.items()[0].lateral_only);
        assert!(!hidden.items()[1].lateral_only);
        assert!(!saved.items()[0].lateral_only);
        assert_eq!(saved.clone().without(2).items().len(), 1);
        assert_eq!(saved.restricted_to(&[2]).items()[0].rtindex, 2);
    }

    #[test]
    fn it_reports_positions_in_characters() {
        let catalog = MemoryCatalog::new();
        let analyzer = Analyzer::new(&catalog);
        let ctx = AnalyzeContext::new(&analyzer, "SELECT 'é', x", ParamState::default());
        let pstate = ParseState::new(&ctx);
        assert_eq!(pstate.errposition(13), Some(13));
        assert_eq!(pstate.errposition(-1), None);
        assert_eq!(pstate.errposition(0), Some(1));
        // Inside the two bytes of 'é'.
        assert_eq!(pstate.errposition(9), Some(9));
        assert_eq!(pstate.errposition(100), Some(14));
    }

    #[test]
    fn it_grows_parameters_only_when_deducing() {
        let catalog = MemoryCatalog::new();
        let analyzer = Analyzer::new(&catalog);
        let fixed = AnalyzeContext::new(&analyzer, "SELECT $2", ParamState { types: vec![crate::catalog::INT4OID], variable: false });
        let err = ParseState::new(&fixed).param_type(2, 7).unwrap_err();
        assert_eq!(err.to_string(), "there is no parameter $2");

        let variable = AnalyzeContext::new(&analyzer, "SELECT $2", ParamState { types: vec![], variable: true });
        let pstate = ParseState::new(&variable);
        assert_eq!(pstate.param_type(2, 7).unwrap(), UNKNOWNOID);
        assert!(pstate.deduce_param_type(2, crate::catalog::TEXTOID, 7).unwrap());
        assert_eq!(variable.params.borrow().types, vec![UNKNOWNOID, crate::catalog::TEXTOID]);
    }
}
