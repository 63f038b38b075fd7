//! Traversal of expressions and nested queries.

use super::*;
use crate::catalog::Volatility;

impl Expr {
    /// Direct sub-expressions. Subqueries of sublinks are not expressions and are not included.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Var(_) | Expr::Const(_) | Expr::Param(_) | Expr::SetToDefault(_) | Expr::ColumnRefJoin(_) | Expr::Rownum(_) => vec![],
            Expr::Op(o) => o.args.iter().collect(),
            Expr::Func(f) => f.args.iter().collect(),
            Expr::Aggref(a) => a.args.iter().collect(),
            Expr::WindowFunc(w) => w.args.iter().chain(&w.partition).chain(&w.order).collect(),
            Expr::Bool(b) => b.args.iter().collect(),
            Expr::NullTest(n) => vec![&n.arg],
            Expr::BooleanTest(b) => vec![&b.arg],
            Expr::Coerce(c) => vec![&c.arg],
            Expr::Collate(c) => vec![&c.arg],
            Expr::Case(c) => c.arg.iter().chain(c.args.iter().flat_map(|w| [&w.expr, &w.result])).chain(c.defresult.iter()).collect(),
            Expr::Coalesce(c) => c.args.iter().collect(),
            Expr::Row(r) => r.args.iter().collect(),
            Expr::SubLink(s) => s.testexpr.iter().collect(),
        }
    }

    /// Mutable counterpart of [`Expr::children`].
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Var(_) | Expr::Const(_) | Expr::Param(_) | Expr::SetToDefault(_) | Expr::ColumnRefJoin(_) | Expr::Rownum(_) => vec![],
            Expr::Op(o) => o.args.iter_mut().collect(),
            Expr::Func(f) => f.args.iter_mut().collect(),
            Expr::Aggref(a) => a.args.iter_mut().collect(),
            Expr::WindowFunc(w) => w.args.iter_mut().chain(w.partition.iter_mut()).chain(w.order.iter_mut()).collect(),
            Expr::Bool(b) => b.args.iter_mut().collect(),
            Expr::NullTest(n) => vec![&mut n.arg],
            Expr::BooleanTest(b) => vec![&mut b.arg],
            Expr::Coerce(c) => vec![&mut c.arg],
            Expr::Collate(c) => vec![&mut c.arg],
            Expr::Case(c) => {
                let CaseExpr { arg, args, defresult, .. } = &mut **c;
                arg.iter_mut().chain(args.iter_mut().flat_map(|w| [&mut w.expr, &mut w.result])).chain(defresult.iter_mut()).collect()
            }
            Expr::Coalesce(c) => c.args.iter_mut().collect(),
            Expr::Row(r) => r.args.iter_mut().collect(),
            Expr::SubLink(s) => s.testexpr.iter_mut().collect(),
        }
    }

    /// Whether `pred` holds for this expression or any expression below it at the same query level.
    pub fn any<F: FnMut(&Expr) -> bool>(&self, pred: &mut F) -> bool {
        pred(self) || self.children().into_iter().any(|child| child.any(pred))
    }

    /// Applies `f` to every expression below and including this one, children first.
    pub fn visit_mut<F: FnMut(&mut Expr)>(&mut self, f: &mut F) {
        for child in self.children_mut() {
            child.visit_mut(f);
        }
        f(self);
    }

    /// Queries nested inside sublinks, outermost sublinks first.
    pub fn sublink_queries(&self) -> Vec<&Query> {
        let mut queries = vec![];
        self.collect_sublink_queries(&mut queries);
        queries
    }

    fn collect_sublink_queries<'a>(&'a self, queries: &mut Vec<&'a Query>) {
        if let Expr::SubLink(s) = self {
            queries.push(&s.subselect);
        }
        for child in self.children() {
            child.collect_sublink_queries(queries);
        }
    }

    /// Calls `f` on every query nested inside sublinks of this expression.
    pub fn try_for_each_sublink_query_mut<F: FnMut(&mut Query) -> Result<()>>(&mut self, f: &mut F) -> Result<()> {
        if let Expr::SubLink(s) = self {
            f(&mut s.subselect)?;
        }
        for child in self.children_mut() {
            child.try_for_each_sublink_query_mut(f)?;
        }
        Ok(())
    }

    /// Whether a ROWNUM reference appears at this query level.
    pub fn contains_rownum(&self) -> bool {
        self.any(&mut |e| matches!(e, Expr::Rownum(_)))
    }

    /// Whether an outer-join marker appears at this query level.
    pub fn contains_join_marker(&self) -> bool {
        self.any(&mut |e| matches!(e, Expr::ColumnRefJoin(_)))
    }

    /// Whether a volatile function or operator appears at this query level.
    pub fn contains_volatile_functions(&self) -> bool {
        self.any(&mut |e| match e {
            Expr::Func(f) => f.volatility == Volatility::Volatile,
            Expr::Op(o) => o.volatility == Volatility::Volatile,
            _ => false,
        })
    }

    /// Whether any variable of the current query level is referenced.
    pub fn contains_local_vars(&self) -> bool {
        self.any(&mut |e| match e {
            Expr::Var(v) => v.varlevelsup == 0,
            Expr::ColumnRefJoin(j) => j.var.varlevelsup == 0,
            _ => false,
        })
    }

    /// Replaces outer-join markers with the plain column references they wrap.
    pub fn strip_join_markers(&mut self) {
        self.visit_mut(&mut |e| {
            if let Expr::ColumnRefJoin(j) = e {
                let var = j.var.clone();
                *e = Expr::Var(var);
            }
        });
    }
}

impl FromExpr {
    /// Qualifications of this node and of every join below it.
    pub fn quals_mut(&mut self) -> Vec<&mut Expr> {
        let mut quals: Vec<&mut Expr> = self.quals.iter_mut().collect();
        for node in self.fromlist.iter_mut() {
            node.collect_quals_mut(&mut quals);
        }
        quals
    }

    fn quals(&self) -> Vec<&Expr> {
        let mut quals: Vec<&Expr> = self.quals.iter().collect();
        for node in &self.fromlist {
            node.collect_quals(&mut quals);
        }
        quals
    }
}

impl JoinTreeNode {
    fn collect_quals_mut<'a>(&'a mut self, quals: &mut Vec<&'a mut Expr>) {
        match self {
            JoinTreeNode::RangeTblRef(_) => {}
            JoinTreeNode::Join(j) => {
                let JoinExpr { larg, rarg, quals: own, .. } = &mut **j;
                quals.extend(own.iter_mut());
                larg.collect_quals_mut(quals);
                rarg.collect_quals_mut(quals);
            }
            JoinTreeNode::From(f) => quals.extend(f.quals_mut()),
        }
    }

    fn collect_quals<'a>(&'a self, quals: &mut Vec<&'a Expr>) {
        match self {
            JoinTreeNode::RangeTblRef(_) => {}
            JoinTreeNode::Join(j) => {
                quals.extend(j.quals.iter());
                j.larg.collect_quals(quals);
                j.rarg.collect_quals(quals);
            }
            JoinTreeNode::From(f) => quals.extend(f.quals()),
        }
    }
}

impl Query {
    /// Root expressions of this query level.
    pub fn exprs(&self) -> Vec<&Expr> {
        let mut exprs: Vec<&Expr> = vec![];
        exprs.extend(self.target_list.iter().map(|tle| &tle.expr));
        exprs.extend(self.returning_list.iter().map(|tle| &tle.expr));
        exprs.extend(self.jointree.quals());
        exprs.extend(self.having_qual.iter());
        exprs.extend(self.limit_offset.iter());
        exprs.extend(self.limit_count.iter());
        for rte in &self.rtable {
            match &rte.kind {
                RteKind::Function { funcexpr } => exprs.push(funcexpr),
                RteKind::Values { values_lists, .. } => exprs.extend(values_lists.iter().flatten()),
                RteKind::Join { join_alias_vars, .. } => exprs.extend(join_alias_vars.iter()),
                _ => {}
            }
        }
        exprs
    }

    /// Mutable counterpart of [`Query::exprs`].
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        let Query { target_list, returning_list, jointree, having_qual, limit_offset, limit_count, rtable, .. } = self;
        let mut exprs: Vec<&mut Expr> = vec![];
        exprs.extend(target_list.iter_mut().map(|tle| &mut tle.expr));
        exprs.extend(returning_list.iter_mut().map(|tle| &mut tle.expr));
        exprs.extend(jointree.quals_mut());
        exprs.extend(having_qual.iter_mut());
        exprs.extend(limit_offset.iter_mut());
        exprs.extend(limit_count.iter_mut());
        for rte in rtable.iter_mut() {
            match &mut rte.kind {
                RteKind::Function { funcexpr } => exprs.push(funcexpr),
                RteKind::Values { values_lists, .. } => exprs.extend(values_lists.iter_mut().flatten()),
                RteKind::Join { join_alias_vars, .. } => exprs.extend(join_alias_vars.iter_mut()),
                _ => {}
            }
        }
        exprs
    }

    /// Queries directly nested in this one: FROM subqueries, CTEs, sublinks and utility payloads.
    pub fn child_queries(&self) -> Vec<&Query> {
        let mut children: Vec<&Query> = vec![];
        children.extend(self.cte_list.iter().map(|cte| &*cte.ctequery));
        children.extend(self.rtable.iter().filter_map(RangeTblEntry::subquery));
        for expr in self.exprs() {
            children.extend(expr.sublink_queries());
        }
        match &self.utility_stmt {
            Some(UtilityStmt::Explain { query, .. }) => children.push(query),
            Some(UtilityStmt::CreateTableAs(ctas)) => {
                children.push(&ctas.query);
                children.extend(ctas.into.view_query.as_deref());
            }
            _ => {}
        }
        children
    }

    /// Calls `f` on every query nested below this one, innermost first, then on this one.
    pub fn try_for_each_query_mut<F: FnMut(&mut Query) -> Result<()>>(&mut self, f: &mut F) -> Result<()> {
        for cte in self.cte_list.iter_mut() {
            cte.ctequery.try_for_each_query_mut(f)?;
        }
        for rte in self.rtable.iter_mut() {
            if let RteKind::Subquery { subquery } = &mut rte.kind {
                subquery.try_for_each_query_mut(f)?;
            }
        }
        for expr in self.exprs_mut() {
            expr.try_for_each_sublink_query_mut(&mut |q: &mut Query| q.try_for_each_query_mut(f))?;
        }
        match &mut self.utility_stmt {
            Some(UtilityStmt::Explain { query, .. }) => query.try_for_each_query_mut(f)?,
            Some(UtilityStmt::CreateTableAs(ctas)) => {
                ctas.query.try_for_each_query_mut(f)?;
                if let Some(view_query) = ctas.into.view_query.as_deref_mut() {
                    view_query.try_for_each_query_mut(f)?;
                }
            }
            _ => {}
        }
        f(self)
    }

    /// Whether `pred` holds for this query or any query nested in it.
    pub fn any_query(&self, pred: &mut dyn FnMut(&Query) -> bool) -> bool {
        pred(self) || self.child_queries().into_iter().any(|q| q.any_query(pred))
    }
}
