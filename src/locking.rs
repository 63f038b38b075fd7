//! FOR UPDATE / FOR SHARE.

use crate::ast::{LockClauseStrength, LockWaitPolicy, LockingClause, RangeVar};
use crate::error::SqlState;
use crate::query::{AclMode, Index, Query, RowMarkClause, RteKind};
use crate::scope::ParseState;
use crate::{Error, Result};

/// Rejects query shapes whose rows cannot be locked individually.
pub(crate) fn check_select_locking(pstate: &ParseState, query: &Query, strength: LockClauseStrength) -> Result<()> {
    let conflict = if query.set_operations.is_some() {
        Some("UNION/INTERSECT/EXCEPT")
    } else if !query.distinct_clause.is_empty() {
        Some("DISTINCT clause")
    } else if !query.group_clause.is_empty() {
        Some("GROUP BY clause")
    } else if query.having_qual.is_some() {
        Some("HAVING clause")
    } else if query.has_aggs {
        Some("aggregate functions")
    } else if query.has_window_funcs {
        Some("window functions")
    } else if query.has_target_srfs {
        Some("set-returning functions in the target list")
    } else {
        None
    };
    match conflict {
        Some(what) => Err(pstate.error(SqlState::FeatureNotSupported, format!("{} is not allowed with {}", strength.as_str(), what), -1)),
        None => Ok(()),
    }
}

/// Applies one locking clause to an analyzed query.
pub(crate) fn transform_locking_clause(pstate: &ParseState, query: &mut Query, clause: &LockingClause, pushed_down: bool) -> Result<()> {
    lock_query(pstate, query, clause.strength, clause.wait_policy, &clause.locked_rels, pushed_down, 0)
}

fn lock_query(
    pstate: &ParseState,
    query: &mut Query,
    strength: LockClauseStrength,
    wait_policy: LockWaitPolicy,
    rels: &[RangeVar],
    pushed_down: bool,
    depth: usize,
) -> Result<()> {
    let max_depth = pstate.config().max_depth;
    if depth > max_depth {
        return Err(Error::TooComplex { depth: max_depth });
    }
    check_select_locking(pstate, query, strength)?;

    if rels.is_empty() {
        // Every plain table and subquery; other kinds are left alone.
        for rti in 1..=query.rtable.len() {
            lock_rte(pstate, query, rti, strength, wait_policy, pushed_down, depth)?;
        }
        return Ok(());
    }

    for rel in rels {
        let s = strength.as_str();
        if !rel.schemaname.is_empty() || !rel.catalogname.is_empty() {
            return Err(pstate.error(SqlState::SyntaxError, format!("{} must specify unqualified relation names", s), rel.location));
        }
        let Some(position) = query.rtable.iter().position(|rte| rte.refname == rel.relname) else {
            return Err(pstate.error(
                SqlState::UndefinedTable,
                format!("relation \"{}\" in {} clause not found in FROM clause", rel.relname, s),
                rel.location,
            ));
        };
        let what = match &query.rtable[position].kind {
            RteKind::Relation { .. } | RteKind::Subquery { .. } => None,
            RteKind::Join { .. } => Some("a join"),
            RteKind::Function { .. } => Some("a function"),
            RteKind::Values { .. } => Some("VALUES"),
            RteKind::Cte { .. } => Some("a WITH query"),
        };
        if let Some(what) = what {
            return Err(pstate.error(SqlState::FeatureNotSupported, format!("{} cannot be applied to {}", s, what), rel.location));
        }
        lock_rte(pstate, query, position + 1, strength, wait_policy, pushed_down, depth)?;
    }
    Ok(())
}

fn lock_rte(
    pstate: &ParseState,
    query: &mut Query,
    rti: Index,
    strength: LockClauseStrength,
    wait_policy: LockWaitPolicy,
    pushed_down: bool,
    depth: usize,
) -> Result<()> {
    let Some(rte) = query.rte_mut(rti) else {
        return Err(Error::Internal(format!("invalid range table index {}", rti)));
    };
    match &mut rte.kind {
        RteKind::Relation { .. } => rte.required_perms.insert(AclMode::SELECT_FOR_UPDATE),
        RteKind::Subquery { subquery } => {
            // The whole subquery is locked, whatever was named.
            let stack_size = pstate.config().stack_size;
            stacker::maybe_grow(32 * 1024, stack_size, || lock_query(pstate, subquery, strength, wait_policy, &[], true, depth + 1))?;
        }
        _ => return Ok(()),
    }
    apply_row_mark(query, rti, strength, wait_policy, pushed_down);
    Ok(())
}

/// Records a lock on `rti`, merging with an existing request for the same entry.
pub(crate) fn apply_row_mark(query: &mut Query, rti: Index, strength: LockClauseStrength, wait_policy: LockWaitPolicy, pushed_down: bool) {
    if !pushed_down {
        query.has_for_update = true;
    }
    match query.row_marks.iter_mut().find(|rm| rm.rti == rti) {
        Some(rm) => {
            rm.strength = rm.strength.max(strength);
            rm.wait_policy = rm.wait_policy.max(wait_policy);
            rm.pushed_down &= pushed_down;
        }
        None => query.row_marks.push(RowMarkClause { rti, strength, wait_policy, pushed_down }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_merges_row_marks() {
        let mut query = Query::default();
        apply_row_mark(&mut query, 1, LockClauseStrength::ForShare, LockWaitPolicy::Error, true);
        assert!(!query.has_for_update);
        apply_row_mark(&mut query, 1, LockClauseStrength::ForUpdate, LockWaitPolicy::Block, false);
        assert!(query.has_for_update);
        assert_eq!(query.row_marks, vec![RowMarkClause {
            rti: 1,
            strength: LockClauseStrength::ForUpdate,
            wait_policy: LockWaitPolicy::Error,
            pushed_down: false,
        }]);
    }
}
