//! Collation derivation.
//!
//! Every collatable expression ends up with an output collation and every function
//! or operator call with the collation its inputs agree on. Explicit `COLLATE`
//! clauses beat implicit collations; two different explicit collations are an
//! error right away, two different implicit ones only leave the result without a
//! collation.

use crate::catalog::{Oid, C_COLLATION_OID, DEFAULT_COLLATION_OID, INVALID_OID, POSIX_COLLATION_OID};
use crate::coerce::type_collation;
use crate::error::{Diagnostic, SqlState};
use crate::query::{CaseExpr, Expr, Query, WindowFunc};
use crate::scope::ParseState;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Strength {
    None,
    Implicit,
    Conflict,
    Explicit,
}

#[derive(Debug, Clone, Copy)]
struct Derivation {
    collation: Oid,
    strength: Strength,
    location: i32,
    /// The two implicit collations that clashed, and where the second came from.
    conflict: Option<(Oid, Oid, i32)>,
}

impl Derivation {
    fn none() -> Self {
        Self { collation: INVALID_OID, strength: Strength::None, location: -1, conflict: None }
    }

    fn implicit(collation: Oid, location: i32) -> Self {
        if collation == INVALID_OID {
            return Self::none();
        }
        Self { collation, strength: Strength::Implicit, location, conflict: None }
    }

    fn merge(&mut self, pstate: &ParseState, other: Derivation) -> Result<()> {
        if other.strength > self.strength {
            *self = other;
            return Ok(());
        }
        if other.strength < self.strength || other.collation == self.collation {
            return Ok(());
        }
        match self.strength {
            Strength::None | Strength::Conflict => {}
            Strength::Implicit => {
                if self.collation == DEFAULT_COLLATION_OID {
                    *self = other;
                } else if other.collation != DEFAULT_COLLATION_OID {
                    self.conflict = Some((self.collation, other.collation, other.location));
                    self.strength = Strength::Conflict;
                    self.collation = INVALID_OID;
                }
            }
            Strength::Explicit => {
                return Err(pstate.error(
                    SqlState::CollationMismatch,
                    format!(
                        "collation mismatch between explicit collations \"{}\" and \"{}\"",
                        collation_name(self.collation),
                        collation_name(other.collation)
                    ),
                    other.location,
                ));
            }
        }
        Ok(())
    }

    /// Collation to store in a node: none when implicit collations clashed.
    fn resolved(&self) -> Oid {
        match self.strength {
            Strength::Conflict => INVALID_OID,
            _ => self.collation,
        }
    }
}

pub(crate) fn collation_name(oid: Oid) -> String {
    match oid {
        DEFAULT_COLLATION_OID => "default".to_string(),
        C_COLLATION_OID => "C".to_string(),
        POSIX_COLLATION_OID => "POSIX".to_string(),
        other => other.to_string(),
    }
}

/// Assigns collations throughout one expression tree.
pub(crate) fn assign_expr_collations(pstate: &ParseState, expr: &mut Expr) -> Result<()> {
    derive(pstate, expr).map(|_| ())
}

fn derive(pstate: &ParseState, expr: &mut Expr) -> Result<Derivation> {
    stacker::maybe_grow(32 * 1024, pstate.config().stack_size, || derive_inner(pstate, expr))
}

fn derive_all<'e>(pstate: &ParseState, exprs: impl IntoIterator<Item = &'e mut Expr>) -> Result<Derivation> {
    let mut state = Derivation::none();
    for expr in exprs {
        let derived = derive(pstate, expr)?;
        state.merge(pstate, derived)?;
    }
    Ok(state)
}

fn derive_inner(pstate: &ParseState, expr: &mut Expr) -> Result<Derivation> {
    // Leaves keep the collation they were created with.
    let inputs = match expr {
        Expr::Var(_) | Expr::Const(_) | Expr::Param(_) | Expr::SetToDefault(_) | Expr::ColumnRefJoin(_) | Expr::Rownum(_) => {
            return Ok(Derivation::implicit(expr.collation(), expr.location()));
        }
        Expr::Collate(c) => {
            derive(pstate, &mut c.arg)?;
            return Ok(Derivation { collation: c.coll_oid, strength: Strength::Explicit, location: c.location, conflict: None });
        }
        Expr::SubLink(s) => {
            if let Some(testexpr) = s.testexpr.as_mut() {
                derive(pstate, testexpr)?;
            }
            return Ok(Derivation::implicit(s.result_collid, s.location));
        }
        Expr::Row(r) => {
            for arg in r.args.iter_mut() {
                derive(pstate, arg)?;
            }
            return Ok(Derivation::none());
        }
        Expr::Case(c) => {
            let CaseExpr { arg, args, defresult, .. } = &mut **c;
            if let Some(arg) = arg.as_mut() {
                derive(pstate, arg)?;
            }
            for when in args.iter_mut() {
                derive(pstate, &mut when.expr)?;
            }
            derive_all(pstate, args.iter_mut().map(|w| &mut w.result).chain(defresult.iter_mut()))?
        }
        Expr::WindowFunc(w) => {
            let WindowFunc { args, partition, order, .. } = &mut **w;
            for e in partition.iter_mut().chain(order.iter_mut()) {
                derive(pstate, e)?;
            }
            derive_all(pstate, args.iter_mut())?
        }
        _ => derive_all(pstate, expr.children_mut())?,
    };

    let typcollation = type_collation(pstate, expr.type_oid());
    let output = if typcollation == INVALID_OID {
        Derivation::none()
    } else if inputs.strength > Strength::None {
        inputs
    } else {
        Derivation::implicit(typcollation, expr.location())
    };

    let input_collation = inputs.resolved();
    let output_collation = output.resolved();
    match expr {
        Expr::Op(o) => {
            o.inputcollid = input_collation;
            o.opcollid = output_collation;
        }
        Expr::Func(f) => {
            f.inputcollid = input_collation;
            f.funccollid = output_collation;
        }
        Expr::Aggref(a) => {
            a.inputcollid = input_collation;
            a.aggcollid = output_collation;
        }
        Expr::WindowFunc(w) => {
            w.inputcollid = input_collation;
            w.wincollid = output_collation;
        }
        Expr::Coerce(c) => c.resultcollid = output_collation,
        Expr::Case(c) => c.casecollid = output_collation,
        Expr::Coalesce(c) => c.coalescecollid = output_collation,
        _ => {}
    }
    Ok(output)
}

/// Derives one collation for a set of expressions, such as one column of a UNION.
///
/// With `none_ok` a clash of implicit collations yields `INVALID_OID`; otherwise it is an error.
pub(crate) fn select_common_collation<'e>(pstate: &ParseState, exprs: impl IntoIterator<Item = &'e mut Expr>, none_ok: bool) -> Result<Oid> {
    let state = derive_all(pstate, exprs)?;
    if state.strength == Strength::Conflict && !none_ok {
        let (first, second, location) = state.conflict.unwrap_or((INVALID_OID, INVALID_OID, -1));
        return Err(Diagnostic::new(
            SqlState::CollationMismatch,
            format!("collation mismatch between implicit collations \"{}\" and \"{}\"", collation_name(first), collation_name(second)),
        )
        .hint("You can choose the collation by applying the COLLATE clause to one or both expressions.")
        .position(pstate.errposition(location))
        .into());
    }
    Ok(state.resolved())
}

/// Assigns collations to every expression of one query level.
pub(crate) fn assign_query_collations(pstate: &ParseState, query: &mut Query) -> Result<()> {
    for expr in query.exprs_mut() {
        assign_expr_collations(pstate, expr)?;
    }
    Ok(())
}
