//! Raw parse tree types consumed by the analyzer.
//!
//! The grammar front end is not part of this crate: callers hand in trees they
//! produced themselves, or build them with the helpers in [`build`].
//!
//! # Example
//!
//! ```rust
//! use pg_analyze::ast::{build, Node};
//!
//! let stmt = build::select(vec![build::target(build::col("id"))], vec![build::table("users")]);
//! if let Node::SelectStmt(select) = &stmt {
//!     assert_eq!(select.target_list.len(), 1);
//! }
//! ```

pub mod build;
mod nodes;

pub use nodes::*;

impl Node {
    /// Byte offset of the token this node starts at, or -1 when unknown.
    pub fn location(&self) -> i32 {
        match self {
            Node::AExpr(n) => match &n.lexpr {
                Some(l) if l.location() >= 0 && l.location() < n.location => l.location(),
                _ => n.location,
            },
            Node::ColumnRef(n) => n.location,
            Node::ColumnRefJoin(n) => n.location,
            Node::Rownum(n) => n.location,
            Node::ParamRef(n) => n.location,
            Node::AConst(n) => n.location,
            Node::TypeCast(n) => {
                let arg = n.arg.location();
                if arg >= 0 && (n.location < 0 || arg < n.location) {
                    arg
                } else {
                    n.location
                }
            }
            Node::CollateClause(n) => n.arg.location(),
            Node::FuncCall(n) => n.location,
            Node::SubLink(n) => n.location,
            Node::BoolExpr(n) => n.location,
            Node::NullTest(n) => n.location,
            Node::BooleanTest(n) => n.location,
            Node::CaseExpr(n) => n.location,
            Node::CoalesceExpr(n) => n.location,
            Node::RowExpr(n) => n.location,
            Node::SetToDefault(n) => n.location,
            Node::RangeVar(n) => n.location,
            Node::JoinExpr(n) => n.location,
            Node::ExecDirectStmt(n) => n.location,
            Node::List(items) => items.iter().map(Node::location).find(|l| *l >= 0).unwrap_or(-1),
            _ => -1,
        }
    }

    /// Short tag used in log events and "unrecognized node" errors.
    pub fn tag(&self) -> &'static str {
        match self {
            Node::Integer(_) => "Integer",
            Node::Float(_) => "Float",
            Node::Boolean(_) => "Boolean",
            Node::String(_) => "String",
            Node::Null => "Null",
            Node::List(_) => "List",
            Node::SelectStmt(_) => "SelectStmt",
            Node::InsertStmt(_) => "InsertStmt",
            Node::UpdateStmt(_) => "UpdateStmt",
            Node::DeleteStmt(_) => "DeleteStmt",
            Node::DeclareCursorStmt(_) => "DeclareCursorStmt",
            Node::ExplainStmt(_) => "ExplainStmt",
            Node::CreateTableAsStmt(_) => "CreateTableAsStmt",
            Node::ExecDirectStmt(_) => "ExecDirectStmt",
            Node::CreateStmt(_) => "CreateStmt",
            Node::DropStmt(_) => "DropStmt",
            Node::TransactionStmt(_) => "TransactionStmt",
            Node::VariableSetStmt(_) => "VariableSetStmt",
            Node::VariableShowStmt(_) => "VariableShowStmt",
            Node::CreateTableSpaceStmt(_) => "CreateTableSpaceStmt",
            Node::DropTableSpaceStmt(_) => "DropTableSpaceStmt",
            Node::AExpr(_) => "A_Expr",
            Node::ColumnRef(_) => "ColumnRef",
            Node::ColumnRefJoin(_) => "ColumnRefJoin",
            Node::Rownum(_) => "Rownum",
            Node::ParamRef(_) => "ParamRef",
            Node::AConst(_) => "A_Const",
            Node::TypeCast(_) => "TypeCast",
            Node::CollateClause(_) => "CollateClause",
            Node::FuncCall(_) => "FuncCall",
            Node::AStar(_) => "A_Star",
            Node::SubLink(_) => "SubLink",
            Node::BoolExpr(_) => "BoolExpr",
            Node::NullTest(_) => "NullTest",
            Node::BooleanTest(_) => "BooleanTest",
            Node::CaseExpr(_) => "CaseExpr",
            Node::CoalesceExpr(_) => "CoalesceExpr",
            Node::RowExpr(_) => "RowExpr",
            Node::SetToDefault(_) => "SetToDefault",
            Node::RangeVar(_) => "RangeVar",
            Node::RangeSubselect(_) => "RangeSubselect",
            Node::RangeFunction(_) => "RangeFunction",
            Node::JoinExpr(_) => "JoinExpr",
        }
    }
}

impl SelectStmt {
    /// The leftmost plain SELECT of a set-operation tree (the statement itself when it has no set operation).
    pub fn leftmost(&self) -> &SelectStmt {
        let mut stmt = self;
        while stmt.op != SetOperation::None {
            match &stmt.larg {
                Some(larg) => stmt = larg,
                None => break,
            }
        }
        stmt
    }

    /// Mutable counterpart of [`SelectStmt::leftmost`].
    pub fn leftmost_mut(&mut self) -> &mut SelectStmt {
        if self.op != SetOperation::None && self.larg.is_some() {
            return self.larg.as_mut().unwrap().leftmost_mut();
        }
        self
    }
}

impl LockClauseStrength {
    /// SQL spelling of the clause, used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockClauseStrength::None => "FOR NONE",
            LockClauseStrength::ForKeyShare => "FOR KEY SHARE",
            LockClauseStrength::ForShare => "FOR SHARE",
            LockClauseStrength::ForNoKeyUpdate => "FOR NO KEY UPDATE",
            LockClauseStrength::ForUpdate => "FOR UPDATE",
        }
    }
}

impl SetOperation {
    /// SQL keyword of the operation, used as error context.
    pub fn as_str(&self) -> &'static str {
        match self {
            SetOperation::None => "SELECT",
            SetOperation::Union => "UNION",
            SetOperation::Intersect => "INTERSECT",
            SetOperation::Except => "EXCEPT",
        }
    }
}
