//! Catalog lookups consulted during analysis.
//!
//! The analyzer never owns metadata. Everything it needs to know about relations,
//! types, operators, functions, collations and cluster nodes is asked of a [`Catalog`].
//! [`MemoryCatalog`] is a self-contained implementation preloaded with the built-in types.

mod memory;

use serde::Serialize;

pub use memory::MemoryCatalog;

use crate::ast::RelPersistence;
use crate::config::NodeRole;

/// Object identifier.
pub type Oid = u32;

pub const INVALID_OID: Oid = 0;

pub const BOOLOID: Oid = 16;
pub const INT8OID: Oid = 20;
pub const INT2OID: Oid = 21;
pub const INT4OID: Oid = 23;
pub const TEXTOID: Oid = 25;
pub const FLOAT8OID: Oid = 701;
pub const UNKNOWNOID: Oid = 705;
pub const VARCHAROID: Oid = 1043;
pub const NUMERICOID: Oid = 1700;
pub const RECORDOID: Oid = 2249;
pub const ANYOID: Oid = 2276;

pub const DEFAULT_COLLATION_OID: Oid = 100;
pub const C_COLLATION_OID: Oid = 950;
pub const POSIX_COLLATION_OID: Oid = 951;

/// Size of the length header that type modifiers of variable-length types include.
pub const VARHDRSZ: i32 = 4;

/// Broad grouping of types used when picking a common type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeCategory {
    Boolean,
    Numeric,
    String,
    Unknown,
    Pseudo,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeMeta {
    pub oid: Oid,
    pub name: String,
    pub category: TypeCategory,
    pub preferred: bool,
    /// Default collation for collatable types, `INVALID_OID` otherwise.
    pub collation: Oid,
}

/// How hard a coercion may try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoercionContext {
    Implicit,
    Assignment,
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Volatility {
    Immutable,
    Stable,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RelKind {
    Table,
    View,
    MatView,
    Foreign,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub type_oid: Oid,
    pub typmod: i32,
    pub collation: Oid,
    pub dropped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationMeta {
    pub oid: Oid,
    pub schema: String,
    pub name: String,
    pub kind: RelKind,
    pub persistence: RelPersistence,
    /// Physical columns in attribute-number order, dropped ones included.
    pub columns: Vec<ColumnMeta>,
}

impl RelationMeta {
    /// Attribute number (1-based) of a live column.
    pub fn attnum(&self, name: &str) -> Option<i16> {
        self.columns.iter().position(|c| !c.dropped && c.name == name).map(|i| i as i16 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorMeta {
    pub oid: Oid,
    pub name: String,
    /// `INVALID_OID` for prefix operators.
    pub left: Oid,
    pub right: Oid,
    pub result: Oid,
    pub commutator: Oid,
    pub func: Oid,
    pub volatility: Volatility,
    pub hashable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FuncKind {
    Normal,
    Aggregate,
    Window,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionMeta {
    pub oid: Oid,
    pub name: String,
    /// Argument types; `ANYOID` accepts any type.
    pub args: Vec<Oid>,
    pub result: Oid,
    pub kind: FuncKind,
    pub returns_set: bool,
    pub volatility: Volatility,
}

/// Ordering and equality operators of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortGroupOperators {
    pub lt: Oid,
    pub eq: Oid,
    pub gt: Oid,
    pub hashable: bool,
}

/// A cluster node that EXECUTE DIRECT may target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeMeta {
    pub oid: Oid,
    pub name: String,
    pub role: NodeRole,
    pub index: u32,
}

/// Metadata source for the analyzer.
pub trait Catalog: Send + Sync {
    /// Looks up a relation; `schema` is `None` for unqualified names.
    fn relation(&self, schema: Option<&str>, name: &str) -> Option<RelationMeta>;

    fn type_by_name(&self, name: &str) -> Option<TypeMeta>;

    fn type_by_oid(&self, oid: Oid) -> Option<TypeMeta>;

    /// Whether a value of type `from` can be converted to `to` in `context`.
    fn can_coerce(&self, from: Oid, to: Oid, context: CoercionContext) -> bool;

    /// All operators with the given name.
    fn operators(&self, name: &str) -> Vec<OperatorMeta>;

    fn operator(&self, oid: Oid) -> Option<OperatorMeta>;

    /// Operator implemented by the given function, if any.
    fn operator_for_function(&self, func: Oid) -> Option<OperatorMeta>;

    /// All functions with the given name.
    fn functions(&self, name: &str) -> Vec<FunctionMeta>;

    fn sort_group_operators(&self, type_oid: Oid) -> Option<SortGroupOperators>;

    fn collation_by_name(&self, name: &str) -> Option<Oid>;

    fn node(&self, name: &str) -> Option<NodeMeta>;
}
