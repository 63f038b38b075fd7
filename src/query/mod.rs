//! The analyzed query tree.
//!
//! Every name is resolved, every expression is typed, and range-table entries are
//! referenced by their 1-based position in [`Query::rtable`].

mod expr;
pub mod walk;

use std::collections::BTreeSet;

use serde::Serialize;

pub use expr::*;

use crate::ast::{self, CursorOptions, JoinType, LockClauseStrength, LockWaitPolicy, OnCommitAction, ObjectType, RelPersistence, SetOperation};
use crate::catalog::{Oid, RelKind};
use crate::Result;

/// 1-based position in a range table.
pub type Index = usize;

/// 1-based column number; 0 means the whole row.
pub type AttrNumber = i16;

// ============================================================================
// Query
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CmdType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Utility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum QuerySource {
    #[default]
    Original,
}

/// The resolved form of one statement level.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Query {
    pub command_type: CmdType,
    pub query_source: QuerySource,
    pub can_set_tag: bool,
    pub utility_stmt: Option<UtilityStmt>,
    /// Target of INSERT/UPDATE/DELETE.
    pub result_relation: Option<Index>,
    pub has_aggs: bool,
    pub has_window_funcs: bool,
    pub has_target_srfs: bool,
    pub has_sub_links: bool,
    pub has_distinct_on: bool,
    pub has_recursive: bool,
    pub has_modifying_cte: bool,
    pub has_for_update: bool,
    pub cte_list: Vec<CommonTableExpr>,
    pub rtable: Vec<RangeTblEntry>,
    pub jointree: FromExpr,
    pub target_list: Vec<TargetEntry>,
    pub returning_list: Vec<TargetEntry>,
    pub group_clause: Vec<SortGroupClause>,
    pub having_qual: Option<Expr>,
    pub distinct_clause: Vec<SortGroupClause>,
    pub sort_clause: Vec<SortGroupClause>,
    pub limit_offset: Option<Expr>,
    pub limit_count: Option<Expr>,
    pub row_marks: Vec<RowMarkClause>,
    pub set_operations: Option<SetOpTree>,
    /// Routing of an EXECUTE DIRECT statement.
    pub remote: Option<RemoteQuery>,
}

impl Query {
    /// Range-table entry at a 1-based position.
    pub fn rte(&self, index: Index) -> Option<&RangeTblEntry> {
        index.checked_sub(1).and_then(|i| self.rtable.get(i))
    }

    pub fn rte_mut(&mut self, index: Index) -> Option<&mut RangeTblEntry> {
        index.checked_sub(1).and_then(|i| self.rtable.get_mut(i))
    }

    /// Output columns returned to the client.
    pub fn visible_targets(&self) -> impl Iterator<Item = &TargetEntry> {
        self.target_list.iter().filter(|tle| !tle.resjunk)
    }

    /// Row mark for a range-table position.
    pub fn row_mark(&self, rti: Index) -> Option<&RowMarkClause> {
        self.row_marks.iter().find(|rm| rm.rti == rti)
    }

    /// Serializes the query tree to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetEntry {
    pub expr: Expr,
    pub resno: AttrNumber,
    pub resname: Option<String>,
    /// Non-zero when referenced by a sort/group clause.
    pub ressortgroupref: u32,
    pub resorigtbl: Oid,
    pub resorigcol: AttrNumber,
    /// Present only to support ORDER BY / GROUP BY; not returned.
    pub resjunk: bool,
}

impl TargetEntry {
    pub fn new(expr: Expr, resno: AttrNumber, resname: Option<String>, resjunk: bool) -> Self {
        Self { expr, resno, resname, ressortgroupref: 0, resorigtbl: 0, resorigcol: 0, resjunk }
    }
}

// ============================================================================
// Range table
// ============================================================================

/// Permission bits requested on a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AclMode(pub u32);

impl AclMode {
    pub const INSERT: u32 = 1 << 0;
    pub const SELECT: u32 = 1 << 1;
    pub const UPDATE: u32 = 1 << 2;
    pub const DELETE: u32 = 1 << 3;
    /// Row locking checks UPDATE privilege.
    pub const SELECT_FOR_UPDATE: u32 = Self::UPDATE;

    pub fn contains(&self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub fn insert(&mut self, bits: u32) {
        self.0 |= bits;
    }
}

/// A column exposed by a range-table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RteColumn {
    pub name: String,
    pub type_oid: Oid,
    pub typmod: i32,
    pub collation: Oid,
    /// Dropped relation columns keep their slot so attribute numbers stay stable.
    pub dropped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RteKind {
    Relation { relid: Oid, schema: String, relkind: RelKind, persistence: RelPersistence },
    Subquery { subquery: Box<Query> },
    Join { jointype: JoinType, join_alias_vars: Vec<Expr> },
    Function { funcexpr: Expr },
    Values { values_lists: Vec<Vec<Expr>>, collations: Vec<Oid> },
    Cte { ctename: String, levelsup: u32, self_reference: bool },
}

impl RteKind {
    pub fn name(&self) -> &'static str {
        match self {
            RteKind::Relation { .. } => "relation",
            RteKind::Subquery { .. } => "subquery",
            RteKind::Join { .. } => "join",
            RteKind::Function { .. } => "function",
            RteKind::Values { .. } => "values",
            RteKind::Cte { .. } => "cte",
        }
    }
}

/// One source of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeTblEntry {
    pub kind: RteKind,
    /// User-supplied alias, if any.
    pub alias: Option<String>,
    /// Name the entry is referenced by: the alias, or the object name.
    pub refname: String,
    pub columns: Vec<RteColumn>,
    pub lateral: bool,
    pub inh: bool,
    pub in_from_cl: bool,
    pub required_perms: AclMode,
    pub modified_cols: BTreeSet<AttrNumber>,
}

impl RangeTblEntry {
    pub fn new(kind: RteKind, refname: impl Into<String>, columns: Vec<RteColumn>) -> Self {
        Self {
            kind,
            alias: None,
            refname: refname.into(),
            columns,
            lateral: false,
            inh: false,
            in_from_cl: false,
            required_perms: AclMode::default(),
            modified_cols: BTreeSet::new(),
        }
    }

    pub fn relid(&self) -> Option<Oid> {
        match &self.kind {
            RteKind::Relation { relid, .. } => Some(*relid),
            _ => None,
        }
    }

    pub fn subquery(&self) -> Option<&Query> {
        match &self.kind {
            RteKind::Subquery { subquery } => Some(subquery),
            _ => None,
        }
    }

    /// Names of the live columns, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().filter(|c| !c.dropped).map(|c| c.name.as_str()).collect()
    }
}

// ============================================================================
// Join tree
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FromExpr {
    pub fromlist: Vec<JoinTreeNode>,
    pub quals: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JoinTreeNode {
    RangeTblRef(Index),
    Join(Box<JoinExpr>),
    From(Box<FromExpr>),
}

impl JoinTreeNode {
    /// Whether the range-table position is a leaf somewhere below this node.
    pub fn contains(&self, rti: Index) -> bool {
        match self {
            JoinTreeNode::RangeTblRef(r) => *r == rti,
            JoinTreeNode::Join(j) => j.larg.contains(rti) || j.rarg.contains(rti),
            JoinTreeNode::From(f) => f.fromlist.iter().any(|n| n.contains(rti)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinExpr {
    pub jointype: JoinType,
    pub is_natural: bool,
    pub larg: JoinTreeNode,
    pub rarg: JoinTreeNode,
    pub using: Vec<String>,
    pub quals: Option<Expr>,
    pub alias: Option<String>,
    /// Position of the join's own range-table entry; `None` until one is made.
    pub rtindex: Option<Index>,
}

// ============================================================================
// Clauses
// ============================================================================

/// An ORDER BY, GROUP BY or DISTINCT item pointing at a target entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortGroupClause {
    pub tle_sort_group_ref: u32,
    pub eqop: Oid,
    pub sortop: Oid,
    pub nulls_first: bool,
    pub hashable: bool,
}

/// FOR UPDATE/SHARE marker on a range-table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowMarkClause {
    pub rti: Index,
    pub strength: LockClauseStrength,
    pub wait_policy: LockWaitPolicy,
    /// Inherited from an outer level's locking clause.
    pub pushed_down: bool,
}

/// A node of a set-operation tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SetOpTree {
    /// Subquery range-table entry holding a leaf SELECT.
    Leaf(Index),
    Op(Box<SetOperationStmt>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetOperationStmt {
    pub op: SetOperation,
    pub all: bool,
    pub larg: SetOpTree,
    pub rarg: SetOpTree,
    pub col_types: Vec<Oid>,
    pub col_typmods: Vec<i32>,
    pub col_collations: Vec<Oid>,
    /// Equality/sort operators used to remove duplicates; empty for UNION ALL.
    pub group_clauses: Vec<SortGroupClause>,
}

/// A WITH list item after analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonTableExpr {
    pub ctename: String,
    pub aliascolnames: Vec<String>,
    pub ctequery: Box<Query>,
    pub location: i32,
    pub cterecursive: bool,
    pub cterefcount: u32,
    pub ctecolnames: Vec<String>,
    pub ctecoltypes: Vec<Oid>,
    pub ctecoltypmods: Vec<i32>,
    pub ctecolcollations: Vec<Oid>,
}

// ============================================================================
// Utility payloads
// ============================================================================

/// Statement carried by a utility query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UtilityStmt {
    /// Statement passed through untouched.
    Command {
        tag: &'static str,
        #[serde(skip)]
        stmt: ast::Node,
    },
    DeclareCursor { portalname: String, options: CursorOptions },
    Explain { query: Box<Query>, options: Vec<String> },
    CreateTableAs(Box<CreateTableAs>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateTableAs {
    pub query: Box<Query>,
    pub into: IntoTarget,
    pub objtype: ObjectType,
    pub is_select_into: bool,
    pub if_not_exists: bool,
}

/// Destination of CREATE TABLE AS / materialized view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntoTarget {
    pub schema: Option<String>,
    pub relname: String,
    pub persistence: RelPersistence,
    pub col_names: Vec<String>,
    pub on_commit: OnCommitAction,
    pub table_space_name: Option<String>,
    pub skip_data: bool,
    /// Copy of the defining query of a materialized view.
    pub view_query: Option<Box<Query>>,
}

impl From<ast::IntoClause> for IntoTarget {
    fn from(into: ast::IntoClause) -> Self {
        Self {
            schema: Some(into.rel.schemaname).filter(|s| !s.is_empty()),
            relname: into.rel.relname,
            persistence: into.rel.relpersistence,
            col_names: into.col_names,
            on_commit: into.on_commit,
            table_space_name: Some(into.table_space_name).filter(|s| !s.is_empty()),
            skip_data: into.skip_data,
            view_query: None,
        }
    }
}

// ============================================================================
// Remote execution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemoteExecType {
    OnCoordinators,
    OnDatanodes,
}

/// Kind of statement routed by EXECUTE DIRECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecDirectType {
    Local,
    LocalUtility,
    Utility,
    Select,
    Insert,
    Update,
    Delete,
}

/// Where and how an EXECUTE DIRECT statement runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteQuery {
    pub sql_statement: String,
    pub exec_nodes: Vec<u32>,
    pub exec_type: RemoteExecType,
    pub exec_direct_type: ExecDirectType,
    pub is_local: bool,
    pub read_only: bool,
}
