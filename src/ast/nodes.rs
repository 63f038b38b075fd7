//! Native Rust AST node types for raw (unanalyzed) parse trees.
//!
//! These mirror the structure the grammar produces: names are unresolved strings,
//! expressions carry no types and every node keeps the byte offset of the token it
//! came from so errors can point back into the source text.

/// The main AST node enum containing all node types the analyzer understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // Primitive value types
    Integer(Integer),
    Float(Float),
    Boolean(Boolean),
    String(StringValue),
    Null,

    // List type
    List(Vec<Node>),

    // Optimizable statements
    SelectStmt(Box<SelectStmt>),
    InsertStmt(Box<InsertStmt>),
    UpdateStmt(Box<UpdateStmt>),
    DeleteStmt(Box<DeleteStmt>),

    // Statements with an embedded query
    DeclareCursorStmt(Box<DeclareCursorStmt>),
    ExplainStmt(Box<ExplainStmt>),
    CreateTableAsStmt(Box<CreateTableAsStmt>),
    ExecDirectStmt(Box<ExecDirectStmt>),

    // Plain utility statements
    CreateStmt(Box<CreateStmt>),
    DropStmt(Box<DropStmt>),
    TransactionStmt(Box<TransactionStmt>),
    VariableSetStmt(Box<VariableSetStmt>),
    VariableShowStmt(Box<VariableShowStmt>),
    CreateTableSpaceStmt(Box<CreateTableSpaceStmt>),
    DropTableSpaceStmt(Box<DropTableSpaceStmt>),

    // Expression types
    AExpr(Box<AExpr>),
    ColumnRef(Box<ColumnRef>),
    ColumnRefJoin(Box<ColumnRefJoin>),
    Rownum(Rownum),
    ParamRef(Box<ParamRef>),
    AConst(Box<AConst>),
    TypeCast(Box<TypeCast>),
    CollateClause(Box<CollateClause>),
    FuncCall(Box<FuncCall>),
    AStar(AStar),
    SubLink(Box<SubLink>),
    BoolExpr(Box<BoolExpr>),
    NullTest(Box<NullTest>),
    BooleanTest(Box<BooleanTest>),
    CaseExpr(Box<CaseExpr>),
    CoalesceExpr(Box<CoalesceExpr>),
    RowExpr(Box<RowExpr>),
    SetToDefault(SetToDefault),

    // FROM clause items
    RangeVar(Box<RangeVar>),
    RangeSubselect(Box<RangeSubselect>),
    RangeFunction(Box<RangeFunction>),
    JoinExpr(Box<JoinExpr>),
}

// ============================================================================
// Primitive value types
// ============================================================================

/// Integer value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Integer {
    pub ival: i32,
}

/// Float value (stored as string)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Float {
    pub fval: String,
}

/// Boolean value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Boolean {
    pub boolval: bool,
}

/// String value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringValue {
    pub sval: String,
}

/// A star (*) in column reference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AStar;

// ============================================================================
// Core statement types
// ============================================================================

/// SELECT statement. Also represents VALUES lists and set operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectStmt {
    /// `None` for no DISTINCT, an empty list for plain DISTINCT, expressions for DISTINCT ON.
    pub distinct_clause: Option<Vec<Node>>,
    pub into_clause: Option<IntoClause>,
    pub target_list: Vec<ResTarget>,
    pub from_clause: Vec<Node>,
    pub where_clause: Option<Node>,
    pub group_clause: Vec<Node>,
    pub having_clause: Option<Node>,
    pub values_lists: Vec<Vec<Node>>,
    pub sort_clause: Vec<SortBy>,
    pub limit_offset: Option<Node>,
    pub limit_count: Option<Node>,
    pub locking_clause: Vec<LockingClause>,
    pub with_clause: Option<WithClause>,
    pub op: SetOperation,
    pub all: bool,
    pub larg: Option<Box<SelectStmt>>,
    pub rarg: Option<Box<SelectStmt>>,
}

/// INSERT statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertStmt {
    pub relation: RangeVar,
    /// Target columns; only `name` and `location` are meaningful.
    pub cols: Vec<ResTarget>,
    /// `None` means DEFAULT VALUES.
    pub select_stmt: Option<Box<SelectStmt>>,
    pub returning_list: Vec<ResTarget>,
    pub with_clause: Option<WithClause>,
}

/// UPDATE statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateStmt {
    pub relation: RangeVar,
    pub target_list: Vec<ResTarget>,
    pub where_clause: Option<Node>,
    pub from_clause: Vec<Node>,
    pub returning_list: Vec<ResTarget>,
    pub with_clause: Option<WithClause>,
}

/// DELETE statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteStmt {
    pub relation: RangeVar,
    pub using_clause: Vec<Node>,
    pub where_clause: Option<Node>,
    pub returning_list: Vec<ResTarget>,
    pub with_clause: Option<WithClause>,
}

/// DECLARE CURSOR statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeclareCursorStmt {
    pub portalname: String,
    pub options: CursorOptions,
    pub query: Node,
}

/// EXPLAIN statement
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainStmt {
    pub query: Node,
    pub options: Vec<DefElem>,
}

/// CREATE TABLE AS / CREATE MATERIALIZED VIEW / SELECT INTO
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableAsStmt {
    pub query: Node,
    pub into: IntoClause,
    pub objtype: ObjectType,
    pub is_select_into: bool,
    pub if_not_exists: bool,
}

/// EXECUTE DIRECT ON (node) 'sql'
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecDirectStmt {
    pub node_names: Vec<String>,
    pub query: String,
    pub location: i32,
}

// ============================================================================
// Utility statements
// ============================================================================

/// CREATE TABLE statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateStmt {
    pub relation: RangeVar,
    pub table_elts: Vec<ColumnDef>,
    pub if_not_exists: bool,
}

/// DROP statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropStmt {
    pub objects: Vec<Vec<String>>,
    pub remove_type: ObjectType,
    pub missing_ok: bool,
}

/// Transaction statement (BEGIN, COMMIT, ROLLBACK, etc.)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionStmt {
    pub kind: TransactionStmtKind,
    pub savepoint_name: String,
}

/// SET variable statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSetStmt {
    pub name: String,
    pub args: Vec<Node>,
    pub is_local: bool,
}

/// SHOW variable statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableShowStmt {
    pub name: String,
}

/// CREATE TABLESPACE statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateTableSpaceStmt {
    pub tablespacename: String,
    pub location: String,
}

/// DROP TABLESPACE statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropTableSpaceStmt {
    pub tablespacename: String,
    pub missing_ok: bool,
}

// ============================================================================
// Expression types
// ============================================================================

/// An expression with an operator (e.g., "a + b", "x = 1")
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AExpr {
    pub kind: AExprKind,
    pub name: Vec<String>,
    pub lexpr: Option<Node>,
    pub rexpr: Option<Node>,
    pub location: i32,
}

/// Column reference (e.g., "table.column"). Fields are `String` or `AStar` nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRef {
    pub fields: Vec<Node>,
    pub location: i32,
}

/// Column reference carrying the Oracle outer-join marker, e.g. `t2.id(+)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRefJoin {
    pub column: ColumnRef,
    pub location: i32,
}

/// The ROWNUM pseudo column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rownum {
    pub location: i32,
}

/// Parameter reference ($1, $2, etc.)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamRef {
    pub number: i32,
    pub location: i32,
}

/// A constant value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AConst {
    pub val: Option<AConstValue>,
    pub isnull: bool,
    pub location: i32,
}

/// Value types for AConst
#[derive(Debug, Clone, PartialEq)]
pub enum AConstValue {
    Integer(Integer),
    Float(Float),
    Boolean(Boolean),
    String(StringValue),
}

/// Type cast expression
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCast {
    pub arg: Node,
    pub type_name: TypeName,
    pub location: i32,
}

/// COLLATE clause
#[derive(Debug, Clone, PartialEq)]
pub struct CollateClause {
    pub arg: Node,
    pub collname: Vec<String>,
    pub location: i32,
}

/// Function call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuncCall {
    pub funcname: Vec<String>,
    pub args: Vec<Node>,
    pub over: Option<WindowDef>,
    pub agg_star: bool,
    pub agg_distinct: bool,
    pub location: i32,
}

/// Subquery link (subquery in expression context)
#[derive(Debug, Clone, PartialEq)]
pub struct SubLink {
    pub sub_link_type: SubLinkType,
    pub testexpr: Option<Node>,
    pub oper_name: Vec<String>,
    pub subselect: Node,
    pub location: i32,
}

/// Boolean expression (AND, OR, NOT)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolExpr {
    pub boolop: BoolExprType,
    pub args: Vec<Node>,
    pub location: i32,
}

/// NULL test expression
#[derive(Debug, Clone, PartialEq)]
pub struct NullTest {
    pub arg: Node,
    pub nulltesttype: NullTestType,
    pub location: i32,
}

/// Boolean test (IS TRUE, IS FALSE, etc.)
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanTest {
    pub arg: Node,
    pub booltesttype: BoolTestType,
    pub location: i32,
}

/// CASE expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseExpr {
    pub arg: Option<Node>,
    pub args: Vec<CaseWhen>,
    pub defresult: Option<Node>,
    pub location: i32,
}

/// WHEN clause of CASE
#[derive(Debug, Clone, PartialEq)]
pub struct CaseWhen {
    pub expr: Node,
    pub result: Node,
    pub location: i32,
}

/// COALESCE expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoalesceExpr {
    pub args: Vec<Node>,
    pub location: i32,
}

/// ROW() expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowExpr {
    pub args: Vec<Node>,
    pub location: i32,
}

/// DEFAULT keyword in a VALUES list or UPDATE SET clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetToDefault {
    pub location: i32,
}

// ============================================================================
// Target/Result types
// ============================================================================

/// Result target (column in SELECT list or assignment target)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResTarget {
    pub name: Option<String>,
    pub val: Option<Node>,
    pub location: i32,
}

// ============================================================================
// Table/Range types
// ============================================================================

/// Table/relation reference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeVar {
    pub catalogname: String,
    pub schemaname: String,
    pub relname: String,
    pub inh: bool,
    pub relpersistence: RelPersistence,
    pub alias: Option<Alias>,
    pub location: i32,
}

/// Subquery in FROM clause
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSubselect {
    pub lateral: bool,
    pub subquery: Node,
    pub alias: Option<Alias>,
}

/// Function call in FROM clause
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFunction {
    pub lateral: bool,
    pub function: FuncCall,
    pub alias: Option<Alias>,
}

/// JOIN expression
#[derive(Debug, Clone, PartialEq)]
pub struct JoinExpr {
    pub jointype: JoinType,
    pub is_natural: bool,
    pub larg: Node,
    pub rarg: Node,
    pub using_clause: Vec<String>,
    pub quals: Option<Node>,
    pub alias: Option<Alias>,
    pub location: i32,
}

// ============================================================================
// Clause types
// ============================================================================

/// ORDER BY clause element
#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub node: Node,
    pub sortby_dir: SortByDir,
    pub sortby_nulls: SortByNulls,
    pub location: i32,
}

/// Inline window specification of a window function call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowDef {
    pub partition_clause: Vec<Node>,
    pub order_clause: Vec<SortBy>,
    pub location: i32,
}

/// WITH clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WithClause {
    pub ctes: Vec<CommonTableExpr>,
    pub recursive: bool,
    pub location: i32,
}

/// Common Table Expression (CTE)
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpr {
    pub ctename: String,
    pub aliascolnames: Vec<String>,
    pub ctequery: Node,
    pub location: i32,
}

/// INTO clause for SELECT INTO and CREATE TABLE AS
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntoClause {
    pub rel: RangeVar,
    pub col_names: Vec<String>,
    pub options: Vec<DefElem>,
    pub on_commit: OnCommitAction,
    pub table_space_name: String,
    pub skip_data: bool,
}

/// FOR UPDATE/SHARE clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockingClause {
    pub locked_rels: Vec<RangeVar>,
    pub strength: LockClauseStrength,
    pub wait_policy: LockWaitPolicy,
}

// ============================================================================
// Type-related
// ============================================================================

/// Type name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeName {
    pub names: Vec<String>,
    pub typmods: Vec<Node>,
    pub location: i32,
}

/// Column definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDef {
    pub colname: String,
    pub type_name: TypeName,
    pub is_not_null: bool,
}

/// Definition element (generic)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefElem {
    pub defname: String,
    pub arg: Option<Node>,
    pub location: i32,
}

// ============================================================================
// Alias
// ============================================================================

/// Alias
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alias {
    pub aliasname: String,
    pub colnames: Vec<String>,
}

// ============================================================================
// Enums
// ============================================================================

/// SET operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum SetOperation {
    #[default]
    None,
    Union,
    Intersect,
    Except,
}

/// A_Expr kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AExprKind {
    #[default]
    Op,
    In,
    Like,
}

/// Boolean expression type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum BoolExprType {
    #[default]
    And,
    Or,
    Not,
}

/// Sublink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum SubLinkType {
    #[default]
    Exists,
    All,
    Any,
    Expr,
}

/// NULL test type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum NullTestType {
    #[default]
    IsNull,
    IsNotNull,
}

/// Boolean test type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum BoolTestType {
    #[default]
    IsTrue,
    IsNotTrue,
    IsFalse,
    IsNotFalse,
    IsUnknown,
    IsNotUnknown,
}

/// JOIN type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Full,
    Right,
}

/// SORT BY direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortByDir {
    #[default]
    Default,
    Asc,
    Desc,
}

/// SORT BY nulls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortByNulls {
    #[default]
    Default,
    First,
    Last,
}

/// ON COMMIT action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum OnCommitAction {
    #[default]
    Noop,
    PreserveRows,
    DeleteRows,
    Drop,
}

/// Object type of CREATE TABLE AS and DROP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum ObjectType {
    #[default]
    Table,
    MatView,
    View,
    Index,
    Sequence,
}

/// Transaction statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStmtKind {
    #[default]
    Begin,
    Commit,
    Rollback,
    Savepoint,
}

/// Persistence requested for a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum RelPersistence {
    #[default]
    Permanent,
    Unlogged,
    Temp,
}

/// Lock clause strength, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, serde::Serialize)]
pub enum LockClauseStrength {
    #[default]
    None,
    ForKeyShare,
    ForShare,
    ForNoKeyUpdate,
    ForUpdate,
}

/// Lock wait policy, ordered from most to least patient
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, serde::Serialize)]
pub enum LockWaitPolicy {
    #[default]
    Block,
    Skip,
    Error,
}

/// DECLARE CURSOR option bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct CursorOptions(pub u32);

impl CursorOptions {
    pub const BINARY: u32 = 0x0001;
    pub const SCROLL: u32 = 0x0002;
    pub const NO_SCROLL: u32 = 0x0004;
    pub const INSENSITIVE: u32 = 0x0008;
    pub const HOLD: u32 = 0x0010;

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}
