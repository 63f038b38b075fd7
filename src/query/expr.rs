use serde::Serialize;

use super::{AttrNumber, Index, Query};
use crate::ast::{BoolExprType, BoolTestType, NullTestType, SubLinkType};
use crate::catalog::{Oid, Volatility, BOOLOID, INT8OID, INVALID_OID, RECORDOID};

/// A typed expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Var(Var),
    Const(Const),
    Param(Param),
    Op(Box<OpExpr>),
    Func(Box<FuncExpr>),
    Aggref(Box<Aggref>),
    WindowFunc(Box<WindowFunc>),
    Bool(Box<BoolExpr>),
    NullTest(Box<NullTest>),
    BooleanTest(Box<BooleanTest>),
    Coerce(Box<CoerceExpr>),
    Collate(Box<CollateExpr>),
    Case(Box<CaseExpr>),
    Coalesce(Box<CoalesceExpr>),
    Row(Box<RowExpr>),
    SubLink(Box<SubLink>),
    SetToDefault(SetToDefault),
    /// Column reference carrying the `(+)` outer-join marker.
    ColumnRefJoin(Box<ColumnRefJoin>),
    Rownum(Rownum),
}

/// Reference to a column of a range-table entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Var {
    pub varno: Index,
    pub varattno: AttrNumber,
    pub vartype: Oid,
    pub vartypmod: i32,
    pub varcollid: Oid,
    /// Number of query levels up the referenced range table is.
    pub varlevelsup: u32,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Datum {
    Null,
    Int(i64),
    Numeric(String),
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Const {
    pub consttype: Oid,
    pub consttypmod: i32,
    pub constcollid: Oid,
    pub value: Datum,
    pub location: i32,
}

impl Const {
    pub fn int8(value: i64) -> Self {
        Self { consttype: INT8OID, consttypmod: -1, constcollid: INVALID_OID, value: Datum::Int(value), location: -1 }
    }

    pub fn is_null(&self) -> bool {
        self.value == Datum::Null
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    /// Supplied by the client ($n).
    Extern,
    /// Output column of a sublink's subquery.
    Sublink,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub kind: ParamKind,
    pub paramid: i32,
    pub paramtype: Oid,
    pub paramtypmod: i32,
    pub paramcollid: Oid,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpExpr {
    pub opno: Oid,
    pub opname: String,
    pub opfuncid: Oid,
    pub opresulttype: Oid,
    pub volatility: Volatility,
    pub args: Vec<Expr>,
    pub opcollid: Oid,
    pub inputcollid: Oid,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncExpr {
    pub funcid: Oid,
    pub funcname: String,
    pub funcresulttype: Oid,
    pub funcretset: bool,
    pub volatility: Volatility,
    pub args: Vec<Expr>,
    pub funccollid: Oid,
    pub inputcollid: Oid,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggref {
    pub aggfnoid: Oid,
    pub aggname: String,
    pub aggtype: Oid,
    pub args: Vec<Expr>,
    pub aggstar: bool,
    pub aggdistinct: bool,
    pub aggcollid: Oid,
    pub inputcollid: Oid,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowFunc {
    pub winfnoid: Oid,
    pub winname: String,
    pub wintype: Oid,
    pub args: Vec<Expr>,
    pub partition: Vec<Expr>,
    pub order: Vec<Expr>,
    pub wincollid: Oid,
    pub inputcollid: Oid,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoolExpr {
    pub boolop: BoolExprType,
    pub args: Vec<Expr>,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NullTest {
    pub arg: Expr,
    pub nulltesttype: NullTestType,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BooleanTest {
    pub arg: Expr,
    pub booltesttype: BoolTestType,
    pub location: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoercionForm {
    Explicit,
    Implicit,
}

/// Conversion of a value to another type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoerceExpr {
    pub arg: Expr,
    pub resulttype: Oid,
    pub resulttypmod: i32,
    pub resultcollid: Oid,
    pub format: CoercionForm,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollateExpr {
    pub arg: Expr,
    pub coll_oid: Oid,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseWhen {
    pub expr: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseExpr {
    pub casetype: Oid,
    pub casecollid: Oid,
    pub arg: Option<Expr>,
    pub args: Vec<CaseWhen>,
    pub defresult: Option<Expr>,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoalesceExpr {
    pub coalescetype: Oid,
    pub coalescecollid: Oid,
    pub args: Vec<Expr>,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowExpr {
    pub args: Vec<Expr>,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubLink {
    pub sub_link_type: SubLinkType,
    /// Comparison against the subquery output for ANY/ALL.
    pub testexpr: Option<Expr>,
    pub subselect: Box<Query>,
    pub result_type: Oid,
    pub result_collid: Oid,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetToDefault {
    pub type_oid: Oid,
    pub typmod: i32,
    pub collation: Oid,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnRefJoin {
    pub var: Var,
    pub location: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rownum {
    pub location: i32,
}

impl Expr {
    /// Result type.
    pub fn type_oid(&self) -> Oid {
        match self {
            Expr::Var(v) => v.vartype,
            Expr::Const(c) => c.consttype,
            Expr::Param(p) => p.paramtype,
            Expr::Op(o) => o.opresulttype,
            Expr::Func(f) => f.funcresulttype,
            Expr::Aggref(a) => a.aggtype,
            Expr::WindowFunc(w) => w.wintype,
            Expr::Bool(_) | Expr::NullTest(_) | Expr::BooleanTest(_) => BOOLOID,
            Expr::Coerce(c) => c.resulttype,
            Expr::Collate(c) => c.arg.type_oid(),
            Expr::Case(c) => c.casetype,
            Expr::Coalesce(c) => c.coalescetype,
            Expr::Row(_) => RECORDOID,
            Expr::SubLink(s) => s.result_type,
            Expr::SetToDefault(d) => d.type_oid,
            Expr::ColumnRefJoin(j) => j.var.vartype,
            Expr::Rownum(_) => INT8OID,
        }
    }

    /// Result type modifier, -1 when unspecified.
    pub fn typmod(&self) -> i32 {
        match self {
            Expr::Var(v) => v.vartypmod,
            Expr::Const(c) => c.consttypmod,
            Expr::Param(p) => p.paramtypmod,
            Expr::Coerce(c) => c.resulttypmod,
            Expr::Collate(c) => c.arg.typmod(),
            Expr::SetToDefault(d) => d.typmod,
            Expr::ColumnRefJoin(j) => j.var.vartypmod,
            _ => -1,
        }
    }

    /// Result collation, `INVALID_OID` for non-collatable results.
    pub fn collation(&self) -> Oid {
        match self {
            Expr::Var(v) => v.varcollid,
            Expr::Const(c) => c.constcollid,
            Expr::Param(p) => p.paramcollid,
            Expr::Op(o) => o.opcollid,
            Expr::Func(f) => f.funccollid,
            Expr::Aggref(a) => a.aggcollid,
            Expr::WindowFunc(w) => w.wincollid,
            Expr::Coerce(c) => c.resultcollid,
            Expr::Collate(c) => c.coll_oid,
            Expr::Case(c) => c.casecollid,
            Expr::Coalesce(c) => c.coalescecollid,
            Expr::SubLink(s) => s.result_collid,
            Expr::SetToDefault(d) => d.collation,
            Expr::ColumnRefJoin(j) => j.var.varcollid,
            Expr::Bool(_) | Expr::NullTest(_) | Expr::BooleanTest(_) | Expr::Row(_) | Expr::Rownum(_) => INVALID_OID,
        }
    }

    /// Byte offset in the source text, -1 when unknown.
    pub fn location(&self) -> i32 {
        match self {
            Expr::Var(v) => v.location,
            Expr::Const(c) => c.location,
            Expr::Param(p) => p.location,
            Expr::Op(o) => o.args.first().map(Expr::location).filter(|l| *l >= 0).unwrap_or(o.location),
            Expr::Func(f) => f.location,
            Expr::Aggref(a) => a.location,
            Expr::WindowFunc(w) => w.location,
            Expr::Bool(b) => b.location,
            Expr::NullTest(n) => n.location,
            Expr::BooleanTest(b) => b.location,
            Expr::Coerce(c) => c.location,
            Expr::Collate(c) => c.location,
            Expr::Case(c) => c.location,
            Expr::Coalesce(c) => c.location,
            Expr::Row(r) => r.location,
            Expr::SubLink(s) => s.location,
            Expr::SetToDefault(d) => d.location,
            Expr::ColumnRefJoin(j) => j.location,
            Expr::Rownum(r) => r.location,
        }
    }

    fn set_location(&mut self, location: i32) {
        match self {
            Expr::Var(v) => v.location = location,
            Expr::Const(c) => c.location = location,
            Expr::Param(p) => p.location = location,
            Expr::Op(o) => o.location = location,
            Expr::Func(f) => f.location = location,
            Expr::Aggref(a) => a.location = location,
            Expr::WindowFunc(w) => w.location = location,
            Expr::Bool(b) => b.location = location,
            Expr::NullTest(n) => n.location = location,
            Expr::BooleanTest(b) => b.location = location,
            Expr::Coerce(c) => c.location = location,
            Expr::Collate(c) => c.location = location,
            Expr::Case(c) => c.location = location,
            Expr::Coalesce(c) => c.location = location,
            Expr::Row(r) => r.location = location,
            Expr::SubLink(s) => s.location = location,
            Expr::SetToDefault(d) => d.location = location,
            Expr::ColumnRefJoin(j) => {
                j.location = location;
                j.var.location = location;
            }
            Expr::Rownum(r) => r.location = location,
        }
    }

    /// Structural equality that ignores source locations.
    pub fn same_as(&self, other: &Expr) -> bool {
        let strip = |e: &Expr| {
            let mut e = e.clone();
            e.visit_mut(&mut |node: &mut Expr| node.set_location(-1));
            e
        };
        strip(self) == strip(other)
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Expr::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Builds the conjunction of `quals`: `None` when empty, the qual itself when alone.
    pub fn and_all(mut quals: Vec<Expr>) -> Option<Expr> {
        match quals.len() {
            0 => None,
            1 => quals.pop(),
            _ => Some(Expr::Bool(Box::new(BoolExpr { boolop: BoolExprType::And, args: quals, location: -1 }))),
        }
    }

    /// Splits nested ANDs into a flat list of conjuncts.
    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::Bool(b) if b.boolop == BoolExprType::And => b.args.into_iter().flat_map(Expr::into_conjuncts).collect(),
            other => vec![other],
        }
    }
}
