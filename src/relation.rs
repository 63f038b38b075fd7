//! Range-table construction and name resolution.
//!
//! Entries are only ever appended, so an [`Index`] handed out here stays valid
//! for the rest of the statement. Namespace registration is left to callers:
//! FROM items, target tables and set-operation leaves expose their entries
//! differently.

use tracing::trace;

use crate::ast::{Alias, JoinType, RangeVar};
use crate::catalog::{Oid, INVALID_OID};
use crate::error::SqlState;
use crate::query::{AclMode, AttrNumber, Expr, Index, JoinTreeNode, Query, RangeTblEntry, RteColumn, RteKind, Var};
use crate::scope::{CteItem, Namespace, NamespaceItem, ParseState};
use crate::{Error, Result};

impl<'a> ParseState<'a> {
    /// Appends an entry to the range table and returns its position.
    pub(crate) fn push_rte(&mut self, rte: RangeTblEntry) -> Index {
        let rtindex = self.rtable.len() + 1;
        trace!(rtindex, kind = rte.kind.name(), refname = %rte.refname, depth = self.depth, "range table entry added");
        self.rtable.push(rte);
        rtindex
    }

    /// Renames the live columns after an alias column list.
    fn alias_columns(&self, noun: &str, refname: &str, columns: &mut [RteColumn], alias: Option<&Alias>, location: i32) -> Result<()> {
        let Some(alias) = alias else {
            return Ok(());
        };
        let live = columns.iter().filter(|c| !c.dropped).count();
        if alias.colnames.len() > live {
            return Err(self.error(
                SqlState::InvalidColumnReference,
                format!("{} \"{}\" has {} columns available but {} columns specified", noun, refname, live, alias.colnames.len()),
                location,
            ));
        }
        for (column, name) in columns.iter_mut().filter(|c| !c.dropped).zip(&alias.colnames) {
            column.name = name.clone();
        }
        Ok(())
    }

    /// Adds a base relation looked up in the catalog.
    pub(crate) fn add_relation_rte(&mut self, rv: &RangeVar, in_from_cl: bool) -> Result<Index> {
        let schema = Some(rv.schemaname.as_str()).filter(|s| !s.is_empty());
        let Some(rel) = self.catalog().relation(schema, &rv.relname) else {
            let name = match schema {
                Some(schema) => format!("{}.{}", schema, rv.relname),
                None => rv.relname.clone(),
            };
            return Err(self.error(SqlState::UndefinedTable, format!("relation \"{}\" does not exist", name), rv.location));
        };

        let mut columns: Vec<RteColumn> = rel
            .columns
            .iter()
            .map(|c| RteColumn { name: c.name.clone(), type_oid: c.type_oid, typmod: c.typmod, collation: c.collation, dropped: c.dropped })
            .collect();
        let alias = rv.alias.as_ref();
        let refname = alias.map(|a| a.aliasname.clone()).unwrap_or_else(|| rel.name.clone());
        self.alias_columns("table", &refname, &mut columns, alias, rv.location)?;

        let kind = RteKind::Relation { relid: rel.oid, schema: rel.schema, relkind: rel.kind, persistence: rel.persistence };
        let mut rte = RangeTblEntry::new(kind, refname, columns);
        rte.alias = alias.map(|a| a.aliasname.clone());
        rte.inh = rv.inh;
        rte.in_from_cl = in_from_cl;
        rte.required_perms = AclMode(AclMode::SELECT);
        Ok(self.push_rte(rte))
    }

    /// Adds an analyzed subquery; its output columns are the non-junk targets.
    pub(crate) fn add_subquery_rte(&mut self, subquery: Query, alias: &Alias, lateral: bool, in_from_cl: bool) -> Result<Index> {
        let mut columns: Vec<RteColumn> = subquery
            .visible_targets()
            .map(|tle| RteColumn {
                name: tle.resname.clone().unwrap_or_else(|| "?column?".to_string()),
                type_oid: tle.expr.type_oid(),
                typmod: tle.expr.typmod(),
                collation: tle.expr.collation(),
                dropped: false,
            })
            .collect();
        self.alias_columns("table", &alias.aliasname, &mut columns, Some(alias), -1)?;

        let mut rte = RangeTblEntry::new(RteKind::Subquery { subquery: Box::new(subquery) }, alias.aliasname.clone(), columns);
        rte.alias = Some(alias.aliasname.clone());
        rte.lateral = lateral;
        rte.in_from_cl = in_from_cl;
        Ok(self.push_rte(rte))
    }

    /// Adds a VALUES block. Rows must already be coerced to their column types.
    pub(crate) fn add_values_rte(
        &mut self,
        values_lists: Vec<Vec<Expr>>,
        collations: Vec<Oid>,
        alias: Option<&Alias>,
        lateral: bool,
        in_from_cl: bool,
    ) -> Result<Index> {
        let first = values_lists.first().map(Vec::as_slice).unwrap_or_default();
        let mut columns: Vec<RteColumn> = first
            .iter()
            .enumerate()
            .map(|(i, expr)| {
                let typmod = expr.typmod();
                let agreed = values_lists.iter().all(|row| row.get(i).map(Expr::typmod) == Some(typmod));
                RteColumn {
                    name: format!("column{}", i + 1),
                    type_oid: expr.type_oid(),
                    typmod: if agreed { typmod } else { -1 },
                    collation: collations.get(i).copied().unwrap_or(INVALID_OID),
                    dropped: false,
                }
            })
            .collect();
        let refname = alias.map(|a| a.aliasname.clone()).unwrap_or_else(|| "*VALUES*".to_string());
        self.alias_columns("VALUES list", &refname, &mut columns, alias, -1)?;

        let mut rte = RangeTblEntry::new(RteKind::Values { values_lists, collations }, refname, columns);
        rte.alias = alias.map(|a| a.aliasname.clone());
        rte.lateral = lateral;
        rte.in_from_cl = in_from_cl;
        Ok(self.push_rte(rte))
    }

    /// Adds the entry for a join; `vars` are the join's output columns in terms of its inputs.
    pub(crate) fn add_join_rte(&mut self, mut columns: Vec<RteColumn>, vars: Vec<Expr>, jointype: JoinType, alias: Option<&Alias>) -> Result<Index> {
        let refname = alias.map(|a| a.aliasname.clone()).unwrap_or_else(|| "unnamed_join".to_string());
        self.alias_columns("join expression", &refname, &mut columns, alias, -1)?;

        let mut rte = RangeTblEntry::new(RteKind::Join { jointype, join_alias_vars: vars }, refname, columns);
        rte.alias = alias.map(|a| a.aliasname.clone());
        rte.in_from_cl = true;
        Ok(self.push_rte(rte))
    }

    /// Adds a function call in FROM. The function returns a single column named after the alias or the function.
    pub(crate) fn add_function_rte(&mut self, funcexpr: Expr, funcname: &str, alias: Option<&Alias>, lateral: bool, location: i32) -> Result<Index> {
        let refname = alias.map(|a| a.aliasname.clone()).unwrap_or_else(|| funcname.to_string());
        let collation = self.catalog().type_by_oid(funcexpr.type_oid()).map(|t| t.collation).unwrap_or(INVALID_OID);
        let mut columns = vec![RteColumn { name: refname.clone(), type_oid: funcexpr.type_oid(), typmod: funcexpr.typmod(), collation, dropped: false }];
        self.alias_columns("table", &refname, &mut columns, alias, location)?;

        let mut rte = RangeTblEntry::new(RteKind::Function { funcexpr }, refname, columns);
        rte.alias = alias.map(|a| a.aliasname.clone());
        rte.lateral = lateral;
        rte.in_from_cl = true;
        Ok(self.push_rte(rte))
    }

    /// Adds a reference to a WITH query found `levelsup` levels out.
    pub(crate) fn add_cte_rte(&mut self, cte: &CteItem, levelsup: u32, rv: &RangeVar, in_from_cl: bool) -> Result<Index> {
        let (columns, self_reference) = {
            let mut state = cte.state.borrow_mut();
            let Some(columns) = state.columns.clone() else {
                let (code, message) = if state.modifying {
                    (SqlState::FeatureNotSupported, format!("WITH query \"{}\" does not have a RETURNING clause", cte.name))
                } else if state.analyzing && !cte.union_shaped {
                    (
                        SqlState::InvalidRecursion,
                        format!("recursive query \"{}\" does not have the form non-recursive-term UNION [ALL] recursive-term", cte.name),
                    )
                } else if state.analyzing {
                    (SqlState::InvalidRecursion, format!("recursive reference to query \"{}\" must not appear within its non-recursive term", cte.name))
                } else {
                    (SqlState::FeatureNotSupported, "mutual recursion between WITH items is not implemented".to_string())
                };
                return Err(self.error(code, message, rv.location));
            };
            state.refcount += 1;
            if state.analyzing {
                state.self_referenced = true;
            }
            (columns, state.analyzing)
        };

        let mut columns = columns;
        let alias = rv.alias.as_ref();
        let refname = alias.map(|a| a.aliasname.clone()).unwrap_or_else(|| cte.name.clone());
        self.alias_columns("table", &refname, &mut columns, alias, rv.location)?;

        let kind = RteKind::Cte { ctename: cte.name.clone(), levelsup, self_reference };
        let mut rte = RangeTblEntry::new(kind, refname, columns);
        rte.alias = alias.map(|a| a.aliasname.clone());
        rte.in_from_cl = in_from_cl;
        Ok(self.push_rte(rte))
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Fails when an entry of `added` would be exposed under a name `existing` already uses.
    pub(crate) fn check_namespace_conflicts(&self, existing: &Namespace, added: &Namespace) -> Result<()> {
        for a in existing.items().iter().filter(|i| i.rel_visible) {
            for b in added.items().iter().filter(|i| i.rel_visible) {
                let (rte_a, rte_b) = (self.rte(a.rtindex)?, self.rte(b.rtindex)?);
                if rte_a.refname != rte_b.refname {
                    continue;
                }
                // Two different tables may share a bare name across schemas.
                let distinct_relations = rte_a.alias.is_none()
                    && rte_b.alias.is_none()
                    && matches!((rte_a.relid(), rte_b.relid()), (Some(x), Some(y)) if x != y);
                if !distinct_relations {
                    return Err(self.error(SqlState::DuplicateAlias, format!("table name \"{}\" specified more than once", rte_b.refname), -1));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn add_to_namespace(&mut self, item: NamespaceItem) {
        let namespace = std::mem::take(&mut self.namespace);
        self.namespace = namespace.concat(Namespace::new(vec![item]));
    }

    /// Opens the INSERT/UPDATE/DELETE target, requesting `perms` on it.
    pub(crate) fn set_target_table(&mut self, rv: &RangeVar, also_source: bool, perms: u32) -> Result<Index> {
        let rtindex = self.add_relation_rte(rv, also_source)?;
        self.rte_mut(rtindex)?.required_perms = AclMode(perms);
        self.target_rte = Some(rtindex);
        if also_source {
            self.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));
            self.add_to_namespace(NamespaceItem::new(rtindex, true, true));
        }
        Ok(rtindex)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Finds the entry a table qualifier names, searching outward. Returns its position and level.
    pub(crate) fn refname_lookup(&self, schema: Option<&str>, name: &str, location: i32) -> Result<Option<(Index, u32)>> {
        for (levelsup, level) in self.levels().enumerate() {
            let mut found: Option<Index> = None;
            for item in level.namespace.items().iter().filter(|item| item.rel_visible && level.item_visible(item)) {
                let rte = level.rte(item.rtindex)?;
                let matches = match schema {
                    None => rte.refname == name,
                    Some(schema) => rte.alias.is_none() && rte.refname == name && matches!(&rte.kind, RteKind::Relation { schema: s, .. } if s == schema),
                };
                if !matches {
                    continue;
                }
                if found.is_some() {
                    return Err(self.error(SqlState::AmbiguousAlias, format!("table reference \"{}\" is ambiguous", name), location));
                }
                found = Some(item.rtindex);
            }
            if let Some(rtindex) = found {
                return Ok(Some((rtindex, levelsup as u32)));
            }
        }
        Ok(None)
    }

    /// Resolves an unqualified column name, innermost level first.
    pub(crate) fn lookup_column(&self, name: &str, location: i32) -> Result<Option<Var>> {
        for (levelsup, level) in self.levels().enumerate() {
            let mut found: Option<Var> = None;
            for item in level.namespace.items().iter().filter(|item| item.cols_visible && level.item_visible(item)) {
                let rte = level.rte(item.rtindex)?;
                if let Some(attno) = self.column_position(rte, name, location)? {
                    if found.is_some() {
                        return Err(self.error(SqlState::AmbiguousColumn, format!("column reference \"{}\" is ambiguous", name), location));
                    }
                    found = Some(make_var(rte, item.rtindex, attno, levelsup as u32, location));
                }
            }
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Resolves `relname.colname` (optionally schema-qualified).
    pub(crate) fn lookup_qualified_column(&self, schema: Option<&str>, relname: &str, colname: &str, location: i32) -> Result<Var> {
        let (rtindex, levelsup) = self.qualified_rte(schema, relname, location)?;
        let rte = self.rte_at(rtindex, levelsup)?;
        match self.column_position(rte, colname, location)? {
            Some(attno) => Ok(make_var(rte, rtindex, attno, levelsup, location)),
            None => Err(self.error(SqlState::UndefinedColumn, format!("column {}.{} does not exist", relname, colname), location)),
        }
    }

    /// Position and level of the entry a qualifier names, failing when there is none.
    pub(crate) fn qualified_rte(&self, schema: Option<&str>, relname: &str, location: i32) -> Result<(Index, u32)> {
        self.refname_lookup(schema, relname, location)?
            .ok_or_else(|| self.error(SqlState::UndefinedTable, format!("missing FROM-clause entry for table \"{}\"", relname), location))
    }

    /// Entry `rtindex` of the level `levelsup` steps out.
    pub(crate) fn rte_at(&self, rtindex: Index, levelsup: u32) -> Result<&RangeTblEntry> {
        self.ancestor(levelsup).ok_or_else(|| Error::Internal(format!("no query level {} up", levelsup)))?.rte(rtindex)
    }

    /// Attribute number of a live column, failing if the name is not unique.
    pub(crate) fn column_position(&self, rte: &RangeTblEntry, name: &str, location: i32) -> Result<Option<AttrNumber>> {
        let mut positions = rte.columns.iter().enumerate().filter(|(_, c)| !c.dropped && c.name == name).map(|(i, _)| i as AttrNumber + 1);
        let first = positions.next();
        if first.is_some() && positions.next().is_some() {
            return Err(self.error(SqlState::AmbiguousColumn, format!("column reference \"{}\" is ambiguous", name), location));
        }
        Ok(first)
    }
}

/// A reference to column `attno` of `rte`.
pub(crate) fn make_var(rte: &RangeTblEntry, rtindex: Index, attno: AttrNumber, levelsup: u32, location: i32) -> Var {
    let column = &rte.columns[attno as usize - 1];
    Var {
        varno: rtindex,
        varattno: attno,
        vartype: column.type_oid,
        vartypmod: column.typmod,
        varcollid: column.collation,
        varlevelsup: levelsup,
        location,
    }
}

/// References to every live column of `rte`, with their names.
pub(crate) fn expand_columns(rte: &RangeTblEntry, rtindex: Index, levelsup: u32, location: i32) -> Vec<(String, Var)> {
    rte.columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.dropped)
        .map(|(i, c)| (c.name.clone(), make_var(rte, rtindex, i as AttrNumber + 1, levelsup, location)))
        .collect()
}
