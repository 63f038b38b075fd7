//! Oracle-style `(+)` outer joins.
//!
//! `WHERE a.id = b.a_id(+)` marks `b` as the null-extended side of a left join
//! between `a` and `b`. The WHERE clause of a SELECT is split into conjuncts,
//! conjuncts carrying markers are grouped by the pair of tables they join, and
//! each group becomes the condition of an explicit join node built out of the
//! flat FROM list. Conjuncts that cannot be placed stay in WHERE with their
//! markers removed. With a single FROM item the markers are just removed.

use tracing::debug;

use crate::ast::{BoolExprType, JoinType};
use crate::error::SqlState;
use crate::query::{Expr, Index, JoinExpr, JoinTreeNode, RteColumn};
use crate::relation::expand_columns;
use crate::scope::{Namespace, NamespaceItem, ParseState};
use crate::{Error, Result};

/// What a single conjunct says about the tables it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `left` is preserved and `right` is null-extended.
    Outer { left: Index, right: Index, location: i32 },
    /// Two tables without a marker, in ascending order.
    Pair(Index, Index),
    /// One table, three or more, or none.
    Other,
}

fn classify(pstate: &ParseState, qual: &Expr) -> Result<Shape> {
    let mut outer: Vec<(Index, i32)> = vec![];
    let mut plain: Vec<Index> = vec![];
    qual.any(&mut |e| {
        match e {
            Expr::ColumnRefJoin(j) if j.var.varlevelsup == 0 => {
                if !outer.iter().any(|(varno, _)| *varno == j.var.varno) {
                    outer.push((j.var.varno, j.location));
                }
            }
            Expr::Var(v) if v.varlevelsup == 0 => plain.push(v.varno),
            _ => {}
        }
        false
    });
    plain.sort_unstable();
    plain.dedup();

    match outer.as_slice() {
        [] => Ok(match plain.as_slice() {
            [a, b] => Shape::Pair(*a, *b),
            _ => Shape::Other,
        }),
        [(right, location)] => {
            plain.retain(|varno| varno != right);
            match plain.as_slice() {
                [] => Ok(Shape::Other),
                [left] => Ok(Shape::Outer { left: *left, right: *right, location: *location }),
                _ => Err(pstate.error(SqlState::SyntaxError, "a predicate may reference only one outer-joined table", *location)),
            }
        }
        [_, (_, location), ..] => Err(pstate.error(SqlState::SyntaxError, "a predicate may reference only one outer-joined table", *location)),
    }
}

fn conjuncts(qual: &Expr) -> Vec<&Expr> {
    match qual {
        Expr::Bool(b) if b.boolop == BoolExprType::And => b.args.iter().flat_map(conjuncts).collect(),
        other => vec![other],
    }
}

/// Whether `rtindex` is a table or join somewhere inside `node`.
fn covers(node: &JoinTreeNode, rtindex: Index) -> bool {
    match node {
        JoinTreeNode::RangeTblRef(r) => *r == rtindex,
        JoinTreeNode::Join(j) => j.rtindex == Some(rtindex) || covers(&j.larg, rtindex) || covers(&j.rarg, rtindex),
        JoinTreeNode::From(f) => f.fromlist.iter().any(|n| covers(n, rtindex)),
    }
}

fn guard(pstate: &ParseState, depth: usize) -> Result<()> {
    let max_depth = pstate.config().max_depth;
    if depth > max_depth {
        return Err(Error::TooComplex { depth: max_depth });
    }
    Ok(())
}

// ============================================================================
// JOIN ... ON
// ============================================================================

/// Validates markers in an explicit join condition against the join type, then removes them.
pub(crate) fn check_join_markers(pstate: &ParseState, jointype: JoinType, larg: &JoinTreeNode, rarg: &JoinTreeNode, qual: &mut Expr) -> Result<()> {
    for conjunct in conjuncts(qual) {
        let Shape::Outer { left, right, location } = classify(pstate, conjunct)? else {
            continue;
        };
        let conflicts = (covers(larg, left) && jointype != JoinType::Left)
            || (covers(larg, right) && jointype != JoinType::Right)
            || (covers(rarg, left) && jointype != JoinType::Right)
            || (covers(rarg, right) && jointype != JoinType::Left);
        if conflicts {
            return Err(pstate.error(SqlState::SyntaxError, "the (+) operator conflicts with the join type", location));
        }
    }
    qual.strip_join_markers();
    Ok(())
}

// ============================================================================
// WHERE
// ============================================================================

/// Conjuncts that join the same preserved table to the same null-extended one.
struct Group {
    left: Index,
    right: Index,
    quals: Vec<Expr>,
}

/// Moves marker predicates out of WHERE into join nodes. Returns what stays in WHERE.
pub(crate) fn transform_outer_joins(pstate: &mut ParseState, quals: Option<Expr>) -> Result<Option<Expr>> {
    let Some(mut quals) = quals else {
        return Ok(None);
    };
    if !quals.contains_join_marker() {
        return Ok(Some(quals));
    }
    // A lone FROM item has nothing to be joined with.
    if pstate.joinlist.len() <= 1 {
        quals.strip_join_markers();
        return Ok(Some(quals));
    }

    let mut groups: Vec<Group> = vec![];
    let mut pairs: Vec<(Expr, (Index, Index))> = vec![];
    let mut remainder: Vec<Expr> = vec![];
    for conjunct in quals.into_conjuncts() {
        match classify(pstate, &conjunct)? {
            Shape::Outer { left, right, .. } => match groups.iter_mut().find(|g| g.left == left && g.right == right) {
                Some(group) => group.quals.push(conjunct),
                None => groups.push(Group { left, right, quals: vec![conjunct] }),
            },
            Shape::Pair(a, b) => pairs.push((conjunct, (a, b))),
            Shape::Other => remainder.push(conjunct),
        }
    }
    // Plain conditions between two outer-joined tables belong to their join.
    for (conjunct, pair) in pairs {
        match groups.iter_mut().find(|g| (g.left.min(g.right), g.left.max(g.right)) == pair) {
            Some(group) => group.quals.push(conjunct),
            None => remainder.push(conjunct),
        }
    }

    let pullups = groups.len();
    for group in groups {
        place_group(pstate, group)?;
    }
    regenerate_namespace(pstate)?;
    debug!(pullups, depth = pstate.depth, "moved (+) predicates into the join tree");

    for qual in remainder.iter_mut() {
        qual.strip_join_markers();
    }
    Ok(Expr::and_all(remainder))
}

fn place_group(pstate: &mut ParseState, group: Group) -> Result<()> {
    let Group { left, right, mut quals } = group;
    for qual in quals.iter_mut() {
        qual.strip_join_markers();
    }
    let qual = Expr::and_all(quals).ok_or_else(|| Error::Internal("empty outer join group".to_string()))?;

    let lpos = pstate.joinlist.iter().position(|n| covers(n, left));
    let rpos = pstate.joinlist.iter().position(|n| covers(n, right));
    let (Some(lpos), Some(rpos)) = (lpos, rpos) else {
        return Err(pstate.error(SqlState::SyntaxError, "could not move filter to join", qual.location()));
    };

    if lpos == rpos {
        let mut joinlist = std::mem::take(&mut pstate.joinlist);
        let result = add_to_join(pstate, &mut joinlist[lpos], left, right, qual, 0);
        pstate.joinlist = joinlist;
        return result;
    }

    // Take out the later item first so the earlier position stays valid.
    let (larg, rarg) = if lpos > rpos {
        let larg = pstate.joinlist.remove(lpos);
        (larg, pstate.joinlist.remove(rpos))
    } else {
        let rarg = pstate.joinlist.remove(rpos);
        (pstate.joinlist.remove(lpos), rarg)
    };
    let join = JoinTreeNode::Join(Box::new(JoinExpr {
        jointype: JoinType::Left,
        is_natural: false,
        larg,
        rarg,
        using: vec![],
        quals: Some(qual),
        alias: None,
        rtindex: None,
    }));
    pstate.joinlist.insert(lpos.min(rpos), join);
    Ok(())
}

/// ANDs `qual` into the innermost join of `node` that has the two tables on opposite sides.
fn add_to_join(pstate: &ParseState, node: &mut JoinTreeNode, left: Index, right: Index, qual: Expr, depth: usize) -> Result<()> {
    guard(pstate, depth)?;
    let stack_size = pstate.config().stack_size;
    stacker::maybe_grow(32 * 1024, stack_size, || match node {
        JoinTreeNode::Join(j) => {
            if covers(&j.larg, left) && covers(&j.larg, right) {
                return add_to_join(pstate, &mut j.larg, left, right, qual, depth + 1);
            }
            if covers(&j.rarg, left) && covers(&j.rarg, right) {
                return add_to_join(pstate, &mut j.rarg, left, right, qual, depth + 1);
            }
            let nullable_ok = match j.jointype {
                JoinType::Left => covers(&j.rarg, right),
                JoinType::Right => covers(&j.larg, right),
                JoinType::Inner | JoinType::Full => false,
            };
            if !nullable_ok {
                return Err(pstate.error(SqlState::SyntaxError, "move filter qual to join filter failed!", qual.location()));
            }
            j.quals = Expr::and_all(j.quals.take().into_iter().chain(std::iter::once(qual)).collect());
            Ok(())
        }
        JoinTreeNode::From(f) => match f.fromlist.iter_mut().find(|n| covers(n, left) && covers(n, right)) {
            Some(child) => add_to_join(pstate, child, left, right, qual, depth + 1),
            None => Err(pstate.error(SqlState::SyntaxError, "could not move filter to join", qual.location())),
        },
        JoinTreeNode::RangeTblRef(_) => Err(pstate.error(SqlState::SyntaxError, "could not move filter to join", qual.location())),
    })
}

// ============================================================================
// Namespace
// ============================================================================

/// Rebuilds visibility after the join list was restructured, giving every new join its entry.
fn regenerate_namespace(pstate: &mut ParseState) -> Result<()> {
    let old = pstate.snapshot();
    let mut joinlist = std::mem::take(&mut pstate.joinlist);
    let rebuilt: Result<Vec<Namespace>> = joinlist.iter_mut().map(|node| rebuild(pstate, node, &old, 0)).collect();
    pstate.joinlist = joinlist;
    pstate.namespace = rebuilt?.into_iter().fold(Namespace::default(), Namespace::concat);
    Ok(())
}

fn rebuild(pstate: &mut ParseState, node: &mut JoinTreeNode, old: &Namespace, depth: usize) -> Result<Namespace> {
    guard(pstate, depth)?;
    let stack_size = pstate.config().stack_size;
    stacker::maybe_grow(32 * 1024, stack_size, || match node {
        JoinTreeNode::RangeTblRef(rtindex) => Ok(old.clone().restricted_to(&[*rtindex])),
        JoinTreeNode::From(f) => {
            let mut namespace = Namespace::default();
            for child in f.fromlist.iter_mut() {
                namespace = namespace.concat(rebuild(pstate, child, old, depth + 1)?);
            }
            Ok(namespace)
        }
        JoinTreeNode::Join(j) => {
            let children = rebuild(pstate, &mut j.larg, old, depth + 1)?.concat(rebuild(pstate, &mut j.rarg, old, depth + 1)?);
            if let Some(rtindex) = j.rtindex {
                return Ok(children.concat(old.clone().restricted_to(&[rtindex])));
            }

            let mut columns = vec![];
            let mut vars = vec![];
            for side in [&j.larg, &j.rarg] {
                let rtindex = top_rtindex(side)?;
                for (name, var) in expand_columns(pstate.rte(rtindex)?, rtindex, 0, -1) {
                    columns.push(RteColumn { name, type_oid: var.vartype, typmod: var.vartypmod, collation: var.varcollid, dropped: false });
                    vars.push(Expr::Var(var));
                }
            }
            let rtindex = pstate.add_join_rte(columns, vars, j.jointype, None)?;
            j.rtindex = Some(rtindex);
            Ok(children.with_columns_hidden().concat(Namespace::new(vec![NamespaceItem::new(rtindex, false, true)])))
        }
    })
}

/// Entry whose columns a join-tree node produces.
fn top_rtindex(node: &JoinTreeNode) -> Result<Index> {
    match node {
        JoinTreeNode::RangeTblRef(rtindex) => Ok(*rtindex),
        JoinTreeNode::Join(j) => j.rtindex.ok_or_else(|| Error::Internal("join without a range table entry".to_string())),
        JoinTreeNode::From(_) => Err(Error::Internal("unexpected FROM list below a join".to_string())),
    }
}
