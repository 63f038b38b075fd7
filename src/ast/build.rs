//! Helpers for constructing raw trees by hand.
//!
//! All nodes built here have an unknown location (-1) unless a helper takes one.

use super::*;

/// Column reference; dots split qualified names (`"t.a"`), a trailing `*` becomes `t.*`.
pub fn col(name: &str) -> Node {
    Node::ColumnRef(Box::new(column_ref(name)))
}

pub(crate) fn column_ref(name: &str) -> ColumnRef {
    let fields = name
        .split('.')
        .map(|part| if part == "*" { Node::AStar(AStar) } else { Node::String(StringValue { sval: part.to_string() }) })
        .collect();
    ColumnRef { fields, location: -1 }
}

/// Column reference located at `location`.
pub fn col_at(name: &str, location: i32) -> Node {
    let mut column = column_ref(name);
    column.location = location;
    Node::ColumnRef(Box::new(column))
}

/// `*`
pub fn star() -> Node {
    Node::ColumnRef(Box::new(ColumnRef { fields: vec![Node::AStar(AStar)], location: -1 }))
}

/// Column reference with the `(+)` outer-join marker.
pub fn outer(name: &str) -> Node {
    Node::ColumnRefJoin(Box::new(ColumnRefJoin { column: column_ref(name), location: -1 }))
}

/// ROWNUM
pub fn rownum() -> Node {
    Node::Rownum(Rownum { location: -1 })
}

/// Integer literal.
pub fn int(ival: i32) -> Node {
    Node::AConst(Box::new(AConst { val: Some(AConstValue::Integer(Integer { ival })), isnull: false, location: -1 }))
}

/// Numeric literal such as `1.5`.
pub fn float(fval: &str) -> Node {
    Node::AConst(Box::new(AConst { val: Some(AConstValue::Float(Float { fval: fval.to_string() })), isnull: false, location: -1 }))
}

/// String literal; its type is unknown until context decides.
pub fn string(sval: &str) -> Node {
    Node::AConst(Box::new(AConst { val: Some(AConstValue::String(StringValue { sval: sval.to_string() })), isnull: false, location: -1 }))
}

/// Boolean literal.
pub fn boolean(boolval: bool) -> Node {
    Node::AConst(Box::new(AConst { val: Some(AConstValue::Boolean(Boolean { boolval })), isnull: false, location: -1 }))
}

/// NULL
pub fn null() -> Node {
    Node::AConst(Box::new(AConst { val: None, isnull: true, location: -1 }))
}

/// `$number`
pub fn param(number: i32) -> Node {
    Node::ParamRef(Box::new(ParamRef { number, location: -1 }))
}

/// DEFAULT
pub fn default() -> Node {
    Node::SetToDefault(SetToDefault { location: -1 })
}

/// Binary operator expression.
pub fn op(name: &str, lexpr: Node, rexpr: Node) -> Node {
    Node::AExpr(Box::new(AExpr { kind: AExprKind::Op, name: vec![name.to_string()], lexpr: Some(lexpr), rexpr: Some(rexpr), location: -1 }))
}

/// Prefix operator expression.
pub fn prefix_op(name: &str, rexpr: Node) -> Node {
    Node::AExpr(Box::new(AExpr { kind: AExprKind::Op, name: vec![name.to_string()], lexpr: None, rexpr: Some(rexpr), location: -1 }))
}

/// `lexpr IN (list...)`
pub fn in_list(lexpr: Node, list: Vec<Node>) -> Node {
    Node::AExpr(Box::new(AExpr { kind: AExprKind::In, name: vec!["=".to_string()], lexpr: Some(lexpr), rexpr: Some(Node::List(list)), location: -1 }))
}

pub fn and(args: Vec<Node>) -> Node {
    Node::BoolExpr(Box::new(BoolExpr { boolop: BoolExprType::And, args, location: -1 }))
}

pub fn or(args: Vec<Node>) -> Node {
    Node::BoolExpr(Box::new(BoolExpr { boolop: BoolExprType::Or, args, location: -1 }))
}

pub fn not(arg: Node) -> Node {
    Node::BoolExpr(Box::new(BoolExpr { boolop: BoolExprType::Not, args: vec![arg], location: -1 }))
}

/// `arg IS NULL`
pub fn is_null(arg: Node) -> Node {
    Node::NullTest(Box::new(NullTest { arg, nulltesttype: NullTestType::IsNull, location: -1 }))
}

/// Function call.
pub fn func(name: &str, args: Vec<Node>) -> Node {
    Node::FuncCall(Box::new(FuncCall { funcname: vec![name.to_string()], args, location: -1, ..Default::default() }))
}

/// Aggregate call with `*`, e.g. `count(*)`.
pub fn func_star(name: &str) -> Node {
    Node::FuncCall(Box::new(FuncCall { funcname: vec![name.to_string()], agg_star: true, location: -1, ..Default::default() }))
}

/// Window function call with an inline `OVER (PARTITION BY ...)`.
pub fn window_func(name: &str, args: Vec<Node>, partition_clause: Vec<Node>) -> Node {
    Node::FuncCall(Box::new(FuncCall {
        funcname: vec![name.to_string()],
        args,
        over: Some(WindowDef { partition_clause, order_clause: vec![], location: -1 }),
        location: -1,
        ..Default::default()
    }))
}

/// `arg::type_name`
pub fn cast(arg: Node, type_name: &str) -> Node {
    Node::TypeCast(Box::new(TypeCast { arg, type_name: type_name_of(type_name), location: -1 }))
}

/// Type name; a parenthesized modifier is accepted (`"varchar(10)"`).
pub fn type_name_of(name: &str) -> TypeName {
    match name.split_once('(') {
        Some((base, rest)) => {
            let typmods = rest
                .trim_end_matches(')')
                .split(',')
                .filter_map(|m| m.trim().parse::<i32>().ok())
                .map(int)
                .collect();
            TypeName { names: vec![base.to_string()], typmods, location: -1 }
        }
        None => TypeName { names: vec![name.to_string()], typmods: vec![], location: -1 },
    }
}

/// `arg COLLATE "name"`
pub fn collate(arg: Node, collation: &str) -> Node {
    Node::CollateClause(Box::new(CollateClause { arg, collname: vec![collation.to_string()], location: -1 }))
}

/// `ROW(args...)`
pub fn row(args: Vec<Node>) -> Node {
    Node::RowExpr(Box::new(RowExpr { args, location: -1 }))
}

/// `COALESCE(args...)`
pub fn coalesce(args: Vec<Node>) -> Node {
    Node::CoalesceExpr(Box::new(CoalesceExpr { args, location: -1 }))
}

/// `EXISTS (subselect)`
pub fn exists(subselect: Node) -> Node {
    Node::SubLink(Box::new(SubLink { sub_link_type: SubLinkType::Exists, testexpr: None, oper_name: vec![], subselect, location: -1 }))
}

/// `(subselect)` used as a scalar
pub fn scalar_subquery(subselect: Node) -> Node {
    Node::SubLink(Box::new(SubLink { sub_link_type: SubLinkType::Expr, testexpr: None, oper_name: vec![], subselect, location: -1 }))
}

/// `testexpr IN (subselect)`
pub fn in_subquery(testexpr: Node, subselect: Node) -> Node {
    Node::SubLink(Box::new(SubLink {
        sub_link_type: SubLinkType::Any,
        testexpr: Some(testexpr),
        oper_name: vec!["=".to_string()],
        subselect,
        location: -1,
    }))
}

/// Unnamed target list entry.
pub fn target(val: Node) -> ResTarget {
    let location = val.location();
    ResTarget { name: None, val: Some(val), location }
}

/// `val AS name`, or `name = val` in UPDATE.
pub fn target_as(val: Node, name: &str) -> ResTarget {
    let location = val.location();
    ResTarget { name: Some(name.to_string()), val: Some(val), location }
}

/// INSERT target column.
pub fn column(name: &str) -> ResTarget {
    ResTarget { name: Some(name.to_string()), val: None, location: -1 }
}

/// Relation reference; `"s.t"` sets the schema.
pub fn range_var(name: &str) -> RangeVar {
    match name.split_once('.') {
        Some((schema, rel)) => RangeVar { schemaname: schema.to_string(), relname: rel.to_string(), inh: true, location: -1, ..Default::default() },
        None => RangeVar { relname: name.to_string(), inh: true, location: -1, ..Default::default() },
    }
}

/// FROM item for a relation.
pub fn table(name: &str) -> Node {
    Node::RangeVar(Box::new(range_var(name)))
}

/// FROM item for an aliased relation.
pub fn table_as(name: &str, alias: &str) -> Node {
    let mut rv = range_var(name);
    rv.alias = Some(Alias { aliasname: alias.to_string(), colnames: vec![] });
    Node::RangeVar(Box::new(rv))
}

/// FROM item for a subquery.
pub fn subselect(query: Node, alias: &str) -> Node {
    Node::RangeSubselect(Box::new(RangeSubselect { lateral: false, subquery: query, alias: Some(Alias { aliasname: alias.to_string(), colnames: vec![] }) }))
}

/// FROM item for a LATERAL subquery.
pub fn lateral(query: Node, alias: &str) -> Node {
    Node::RangeSubselect(Box::new(RangeSubselect { lateral: true, subquery: query, alias: Some(Alias { aliasname: alias.to_string(), colnames: vec![] }) }))
}

/// FROM item for a function call.
pub fn range_function(name: &str, args: Vec<Node>, alias: &str) -> Node {
    Node::RangeFunction(Box::new(RangeFunction {
        lateral: false,
        function: FuncCall { funcname: vec![name.to_string()], args, location: -1, ..Default::default() },
        alias: Some(Alias { aliasname: alias.to_string(), colnames: vec![] }),
    }))
}

/// Explicit JOIN ... ON.
pub fn join(jointype: JoinType, larg: Node, rarg: Node, quals: Option<Node>) -> Node {
    Node::JoinExpr(Box::new(JoinExpr {
        jointype,
        is_natural: false,
        larg,
        rarg,
        using_clause: vec![],
        quals,
        alias: None,
        location: -1,
    }))
}

/// Explicit JOIN ... USING (columns).
pub fn join_using(jointype: JoinType, larg: Node, rarg: Node, columns: &[&str]) -> Node {
    Node::JoinExpr(Box::new(JoinExpr {
        jointype,
        is_natural: false,
        larg,
        rarg,
        using_clause: columns.iter().map(|c| c.to_string()).collect(),
        quals: None,
        alias: None,
        location: -1,
    }))
}

/// ORDER BY item.
pub fn sort(node: Node) -> SortBy {
    SortBy { node, sortby_dir: SortByDir::Default, sortby_nulls: SortByNulls::Default, location: -1 }
}

/// ORDER BY item, descending.
pub fn sort_desc(node: Node) -> SortBy {
    SortBy { node, sortby_dir: SortByDir::Desc, sortby_nulls: SortByNulls::Default, location: -1 }
}

/// Locking clause; `rels` empty means every table.
pub fn locking(strength: LockClauseStrength, rels: &[&str]) -> LockingClause {
    LockingClause { locked_rels: rels.iter().map(|r| range_var(r)).collect(), strength, wait_policy: LockWaitPolicy::Block }
}

/// WITH clause.
pub fn with(recursive: bool, ctes: Vec<(&str, Node)>) -> WithClause {
    WithClause {
        ctes: ctes
            .into_iter()
            .map(|(name, ctequery)| CommonTableExpr { ctename: name.to_string(), aliascolnames: vec![], ctequery, location: -1 })
            .collect(),
        recursive,
        location: -1,
    }
}

/// Plain SELECT statement node.
pub fn select(target_list: Vec<ResTarget>, from_clause: Vec<Node>) -> Node {
    Node::SelectStmt(Box::new(select_stmt(target_list, from_clause)))
}

/// Plain SELECT statement.
pub fn select_stmt(target_list: Vec<ResTarget>, from_clause: Vec<Node>) -> SelectStmt {
    SelectStmt { target_list, from_clause, ..Default::default() }
}

/// SELECT with a WHERE clause.
pub fn select_where(target_list: Vec<ResTarget>, from_clause: Vec<Node>, where_clause: Node) -> Node {
    Node::SelectStmt(Box::new(SelectStmt { target_list, from_clause, where_clause: Some(where_clause), ..Default::default() }))
}

/// VALUES statement node.
pub fn values(rows: Vec<Vec<Node>>) -> Node {
    Node::SelectStmt(Box::new(values_stmt(rows)))
}

/// VALUES statement.
pub fn values_stmt(rows: Vec<Vec<Node>>) -> SelectStmt {
    SelectStmt { values_lists: rows, ..Default::default() }
}

/// Set operation over two SELECT statements.
pub fn set_op(op: SetOperation, all: bool, larg: SelectStmt, rarg: SelectStmt) -> SelectStmt {
    SelectStmt { op, all, larg: Some(Box::new(larg)), rarg: Some(Box::new(rarg)), ..Default::default() }
}

/// `INSERT INTO relation (cols) source`; `source` of `None` means DEFAULT VALUES.
pub fn insert(relation: &str, cols: &[&str], source: Option<SelectStmt>) -> InsertStmt {
    InsertStmt {
        relation: range_var(relation),
        cols: cols.iter().map(|c| column(c)).collect(),
        select_stmt: source.map(Box::new),
        ..Default::default()
    }
}

/// `UPDATE relation SET ...`
pub fn update(relation: &str, target_list: Vec<ResTarget>) -> UpdateStmt {
    UpdateStmt { relation: range_var(relation), target_list, ..Default::default() }
}

/// `DELETE FROM relation`
pub fn delete(relation: &str) -> DeleteStmt {
    DeleteStmt { relation: range_var(relation), ..Default::default() }
}
