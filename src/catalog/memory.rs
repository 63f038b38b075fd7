use std::collections::HashMap;

use itertools::Itertools;

use super::*;

const BUILTIN_TYPES: &[(Oid, &str, TypeCategory, bool, Oid)] = &[
    (BOOLOID, "bool", TypeCategory::Boolean, true, INVALID_OID),
    (INT2OID, "int2", TypeCategory::Numeric, false, INVALID_OID),
    (INT4OID, "int4", TypeCategory::Numeric, false, INVALID_OID),
    (INT8OID, "int8", TypeCategory::Numeric, false, INVALID_OID),
    (NUMERICOID, "numeric", TypeCategory::Numeric, false, INVALID_OID),
    (FLOAT8OID, "float8", TypeCategory::Numeric, true, INVALID_OID),
    (TEXTOID, "text", TypeCategory::String, true, DEFAULT_COLLATION_OID),
    (VARCHAROID, "varchar", TypeCategory::String, false, DEFAULT_COLLATION_OID),
    (UNKNOWNOID, "unknown", TypeCategory::Unknown, false, INVALID_OID),
    (RECORDOID, "record", TypeCategory::Pseudo, false, INVALID_OID),
    (ANYOID, "any", TypeCategory::Pseudo, false, INVALID_OID),
];

const TYPE_ALIASES: &[(&str, &str)] = &[
    ("boolean", "bool"),
    ("smallint", "int2"),
    ("int", "int4"),
    ("integer", "int4"),
    ("bigint", "int8"),
    ("decimal", "numeric"),
    ("double precision", "float8"),
    ("character varying", "varchar"),
];

/// Numeric types in widening order; each converts implicitly to the ones after it.
const NUMERIC_LADDER: &[Oid] = &[INT2OID, INT4OID, INT8OID, NUMERICOID, FLOAT8OID];

const COMPARISONS: &[(&str, &str)] = &[("=", "="), ("<>", "<>"), ("<", ">"), ("<=", ">="), (">", "<"), (">=", "<=")];

const FIRST_OPERATOR_OID: Oid = 10_000;
const FIRST_FUNCTION_OID: Oid = 20_000;
const FIRST_RELATION_OID: Oid = 30_000;
const FIRST_NODE_OID: Oid = 40_000;

/// In-memory catalog preloaded with built-in types, operators, functions and collations.
///
/// ```rust
/// use pg_analyze::catalog::{Catalog, MemoryCatalog, INT4OID};
///
/// let catalog = MemoryCatalog::new().with_table("t", &[("a", "int4"), ("b", "text")]);
/// let t = catalog.relation(None, "t").unwrap();
/// assert_eq!(t.columns[0].type_oid, INT4OID);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    types: HashMap<Oid, TypeMeta>,
    relations: Vec<RelationMeta>,
    operators: Vec<OperatorMeta>,
    functions: Vec<FunctionMeta>,
    collations: HashMap<String, Oid>,
    nodes: Vec<NodeMeta>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        let types = BUILTIN_TYPES
            .iter()
            .map(|&(oid, name, category, preferred, collation)| (oid, TypeMeta { oid, name: name.to_string(), category, preferred, collation }))
            .collect();
        let collations = [("default", DEFAULT_COLLATION_OID), ("C", C_COLLATION_OID), ("POSIX", POSIX_COLLATION_OID)]
            .into_iter()
            .map(|(name, oid)| (name.to_string(), oid))
            .collect();
        let mut catalog = Self { types, relations: vec![], operators: vec![], functions: vec![], collations, nodes: vec![] };
        catalog.add_builtin_operators();
        catalog.add_builtin_functions();
        catalog
    }

    /// Adds a permanent table in schema `public`. Column types are given by name, e.g. `"varchar(10)"`.
    pub fn with_table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
        self.add_table(name, columns, RelKind::Table, RelPersistence::Permanent);
        self
    }

    /// Adds a relation of any kind and persistence.
    pub fn with_relation(mut self, name: &str, columns: &[(&str, &str)], kind: RelKind, persistence: RelPersistence) -> Self {
        self.add_table(name, columns, kind, persistence);
        self
    }

    /// Registers a cluster node.
    pub fn with_node(mut self, name: &str, role: NodeRole, index: u32) -> Self {
        let oid = FIRST_NODE_OID + self.nodes.len() as Oid;
        self.nodes.push(NodeMeta { oid, name: name.to_string(), role, index });
        self
    }

    /// Registers a function.
    pub fn with_function(mut self, name: &str, args: &[Oid], result: Oid, kind: FuncKind, returns_set: bool, volatility: Volatility) -> Self {
        self.add_function(name, args, result, kind, returns_set, volatility);
        self
    }

    fn add_table(&mut self, name: &str, columns: &[(&str, &str)], kind: RelKind, persistence: RelPersistence) {
        let (schema, name) = match name.split_once('.') {
            Some((schema, name)) => (schema.to_string(), name.to_string()),
            None => ("public".to_string(), name.to_string()),
        };
        let columns = columns
            .iter()
            .map(|(colname, type_name)| {
                let (type_oid, typmod) = self.parse_type(type_name);
                let collation = self.types.get(&type_oid).map(|t| t.collation).unwrap_or(INVALID_OID);
                ColumnMeta { name: colname.to_string(), type_oid, typmod, collation, dropped: false }
            })
            .collect();
        let oid = FIRST_RELATION_OID + self.relations.len() as Oid;
        self.relations.push(RelationMeta { oid, schema, name, kind, persistence, columns });
    }

    fn parse_type(&self, spec: &str) -> (Oid, i32) {
        let (base, typmod) = match spec.split_once('(') {
            Some((base, rest)) => (base, rest.trim_end_matches(')').trim().parse::<i32>().map(|n| n + VARHDRSZ).unwrap_or(-1)),
            None => (spec, -1),
        };
        let oid = self.type_by_name(base.trim()).map(|t| t.oid).unwrap_or(UNKNOWNOID);
        (oid, typmod)
    }

    fn add_operator(&mut self, name: &str, left: Oid, right: Oid, result: Oid) {
        let oid = FIRST_OPERATOR_OID + self.operators.len() as Oid;
        self.operators.push(OperatorMeta {
            oid,
            name: name.to_string(),
            left,
            right,
            result,
            commutator: INVALID_OID,
            func: oid + (FIRST_FUNCTION_OID - FIRST_OPERATOR_OID) / 2,
            volatility: Volatility::Immutable,
            hashable: name == "=",
        });
    }

    fn add_function(&mut self, name: &str, args: &[Oid], result: Oid, kind: FuncKind, returns_set: bool, volatility: Volatility) {
        let oid = FIRST_FUNCTION_OID + self.functions.len() as Oid;
        self.functions.push(FunctionMeta { oid, name: name.to_string(), args: args.to_vec(), result, kind, returns_set, volatility });
    }

    fn add_builtin_operators(&mut self) {
        let integers = [INT2OID, INT4OID, INT8OID];
        let mut comparable: Vec<(Oid, Oid)> = integers.iter().cartesian_product(integers.iter()).map(|(l, r)| (*l, *r)).collect();
        comparable.extend([(NUMERICOID, NUMERICOID), (FLOAT8OID, FLOAT8OID), (TEXTOID, TEXTOID), (BOOLOID, BOOLOID)]);
        for (left, right) in comparable {
            for (name, _) in COMPARISONS {
                self.add_operator(name, left, right, BOOLOID);
            }
        }

        for (left, right, result) in [
            (INT2OID, INT2OID, INT2OID),
            (INT4OID, INT4OID, INT4OID),
            (INT8OID, INT8OID, INT8OID),
            (INT4OID, INT8OID, INT8OID),
            (INT8OID, INT4OID, INT8OID),
            (NUMERICOID, NUMERICOID, NUMERICOID),
            (FLOAT8OID, FLOAT8OID, FLOAT8OID),
        ] {
            for name in ["+", "-", "*", "/"] {
                self.add_operator(name, left, right, result);
            }
        }
        for ty in [INT4OID, INT8OID, NUMERICOID, FLOAT8OID] {
            self.add_operator("-", INVALID_OID, ty, ty);
        }
        self.add_operator("||", TEXTOID, TEXTOID, TEXTOID);
        self.add_operator("~~", TEXTOID, TEXTOID, BOOLOID);

        // Commutators pair an operator with its mirror over swapped argument types.
        let pairs: Vec<(usize, Oid)> = self
            .operators
            .iter()
            .enumerate()
            .filter(|(_, op)| op.left != INVALID_OID)
            .filter_map(|(i, op)| {
                let mirror = match op.name.as_str() {
                    "+" | "*" => op.name.as_str(),
                    name => COMPARISONS.iter().find(|(n, _)| *n == name).map(|(_, m)| *m)?,
                };
                self.operators
                    .iter()
                    .find(|other| other.name == mirror && other.left == op.right && other.right == op.left)
                    .map(|other| (i, other.oid))
            })
            .collect();
        for (i, commutator) in pairs {
            self.operators[i].commutator = commutator;
        }
    }

    fn add_builtin_functions(&mut self) {
        use FuncKind::*;
        use Volatility::*;

        self.add_function("upper", &[TEXTOID], TEXTOID, Normal, false, Immutable);
        self.add_function("lower", &[TEXTOID], TEXTOID, Normal, false, Immutable);
        self.add_function("length", &[TEXTOID], INT4OID, Normal, false, Immutable);
        self.add_function("abs", &[INT4OID], INT4OID, Normal, false, Immutable);
        self.add_function("abs", &[INT8OID], INT8OID, Normal, false, Immutable);
        self.add_function("abs", &[NUMERICOID], NUMERICOID, Normal, false, Immutable);
        self.add_function("random", &[], FLOAT8OID, Normal, false, Volatile);
        self.add_function("nextval", &[TEXTOID], INT8OID, Normal, false, Volatile);
        self.add_function("current_setting", &[TEXTOID], TEXTOID, Normal, false, Stable);
        self.add_function("generate_series", &[INT4OID, INT4OID], INT4OID, Normal, true, Immutable);
        self.add_function("generate_series", &[INT8OID, INT8OID], INT8OID, Normal, true, Immutable);

        self.add_function("count", &[], INT8OID, Aggregate, false, Immutable);
        self.add_function("count", &[ANYOID], INT8OID, Aggregate, false, Immutable);
        self.add_function("sum", &[INT4OID], INT8OID, Aggregate, false, Immutable);
        self.add_function("sum", &[INT8OID], NUMERICOID, Aggregate, false, Immutable);
        self.add_function("sum", &[NUMERICOID], NUMERICOID, Aggregate, false, Immutable);
        for ty in [INT4OID, INT8OID, NUMERICOID, TEXTOID] {
            self.add_function("max", &[ty], ty, Aggregate, false, Immutable);
            self.add_function("min", &[ty], ty, Aggregate, false, Immutable);
        }

        self.add_function("row_number", &[], INT8OID, Window, false, Immutable);
        self.add_function("rank", &[], INT8OID, Window, false, Immutable);
    }

    fn resolve_alias<'a>(name: &'a str) -> &'a str {
        TYPE_ALIASES.iter().find(|(alias, _)| *alias == name).map(|(_, real)| *real).unwrap_or(name)
    }

    fn ladder_position(oid: Oid) -> Option<usize> {
        NUMERIC_LADDER.iter().position(|t| *t == oid)
    }
}

impl Catalog for MemoryCatalog {
    fn relation(&self, schema: Option<&str>, name: &str) -> Option<RelationMeta> {
        self.relations.iter().find(|r| r.name == name && schema.map_or(true, |s| s == r.schema)).cloned()
    }

    fn type_by_name(&self, name: &str) -> Option<TypeMeta> {
        let name = Self::resolve_alias(name);
        self.types.values().find(|t| t.name == name).cloned()
    }

    fn type_by_oid(&self, oid: Oid) -> Option<TypeMeta> {
        self.types.get(&oid).cloned()
    }

    fn can_coerce(&self, from: Oid, to: Oid, context: CoercionContext) -> bool {
        if from == to || from == UNKNOWNOID || to == ANYOID {
            return true;
        }
        let widening = match (Self::ladder_position(from), Self::ladder_position(to)) {
            (Some(f), Some(t)) => Some(f < t),
            _ => None,
        };
        match (from, to) {
            (VARCHAROID, TEXTOID) | (TEXTOID, VARCHAROID) => true,
            _ if widening == Some(true) => true,
            _ if context == CoercionContext::Implicit => false,
            // Assignment allows narrowing numerics and output to text.
            _ if widening == Some(false) => true,
            (_, TEXTOID) | (_, VARCHAROID) => from != RECORDOID,
            _ if context == CoercionContext::Assignment => false,
            (TEXTOID, _) | (VARCHAROID, _) => to != RECORDOID,
            (BOOLOID, INT4OID) | (INT4OID, BOOLOID) => true,
            _ => false,
        }
    }

    fn operators(&self, name: &str) -> Vec<OperatorMeta> {
        self.operators.iter().filter(|op| op.name == name).cloned().collect()
    }

    fn operator(&self, oid: Oid) -> Option<OperatorMeta> {
        self.operators.iter().find(|op| op.oid == oid).cloned()
    }

    fn operator_for_function(&self, func: Oid) -> Option<OperatorMeta> {
        self.operators.iter().find(|op| op.func == func).cloned()
    }

    fn functions(&self, name: &str) -> Vec<FunctionMeta> {
        self.functions.iter().filter(|f| f.name == name).cloned().collect()
    }

    fn sort_group_operators(&self, type_oid: Oid) -> Option<SortGroupOperators> {
        // varchar has no operators of its own and borrows text's.
        let type_oid = if type_oid == VARCHAROID { TEXTOID } else { type_oid };
        let find = |name: &str| self.operators.iter().find(|op| op.name == name && op.left == type_oid && op.right == type_oid);
        let eq = find("=")?;
        Some(SortGroupOperators { lt: find("<")?.oid, eq: eq.oid, gt: find(">")?.oid, hashable: eq.hashable })
    }

    fn collation_by_name(&self, name: &str) -> Option<Oid> {
        self.collations.get(name).copied()
    }

    fn node(&self, name: &str) -> Option<NodeMeta> {
        self.nodes.iter().find(|n| n.name == name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_pairs_comparison_commutators() {
        let catalog = MemoryCatalog::new();
        let lt = catalog.operators("<").into_iter().find(|op| op.left == INT8OID && op.right == INT4OID).unwrap();
        let commutator = catalog.operator(lt.commutator).unwrap();
        assert_eq!(commutator.name, ">");
        assert_eq!((commutator.left, commutator.right), (INT4OID, INT8OID));
    }

    #[test]
    fn it_widens_numerics_implicitly_only() {
        let catalog = MemoryCatalog::new();
        assert!(catalog.can_coerce(INT4OID, INT8OID, CoercionContext::Implicit));
        assert!(!catalog.can_coerce(INT8OID, INT4OID, CoercionContext::Implicit));
        assert!(catalog.can_coerce(INT8OID, INT4OID, CoercionContext::Assignment));
        assert!(!catalog.can_coerce(TEXTOID, INT4OID, CoercionContext::Assignment));
        assert!(catalog.can_coerce(TEXTOID, INT4OID, CoercionContext::Explicit));
    }

    #[test]
    fn it_parses_type_modifiers() {
        let catalog = MemoryCatalog::new().with_table("s.t", &[("name", "varchar(10)")]);
        assert!(catalog.relation(None, "t").is_some());
        assert!(catalog.relation(Some("public"), "t").is_none());
        let t = catalog.relation(Some("s"), "t").unwrap();
        assert_eq!(t.columns[0].typmod, 14);
        assert_eq!(t.columns[0].collation, DEFAULT_COLLATION_OID);
    }
}
