//! The query tree used to plan selective `copy` statements.
//!
//! The planner nests these nodes to describe the rows a table contributes to
//! the dump; `render::render_query` turns a tree into SQL text. Nodes own
//! their identifiers, so a built tree is independent of the schema graph.

use crate::catalog::table::{ForeignKey, Table};

/// A plannable statement.
#[derive(Debug, Clone)]
pub enum SqlQuery {
    Select(Select),
    RecursiveCte(RecursiveCte),
    CopyOut(CopyOut),
}

/// A `select` query.
#[derive(Debug, Clone)]
pub struct Select {
    pub columns: Vec<ColumnExpr>,
    pub from: Vec<FromEntry>,
    pub where_: Option<Predicate>,
}

/// An output column of a `select`.
#[derive(Debug, Clone)]
pub enum ColumnExpr {
    Star,
    /// A quoted column identifier, optionally alias-qualified.
    Column {
        alias: Option<String>,
        name: String,
    },
    /// A raw SQL expression emitted verbatim.
    Raw(String),
}

impl ColumnExpr {
    pub fn name(name: impl Into<String>) -> Self {
        ColumnExpr::Column {
            alias: None,
            name: name.into(),
        }
    }

    pub fn qualified(alias: impl Into<String>, name: impl Into<String>) -> Self {
        ColumnExpr::Column {
            alias: Some(alias.into()),
            name: name.into(),
        }
    }
}

/// One entry of a `from` clause.
#[derive(Debug, Clone)]
pub struct FromEntry {
    pub source: FromSource,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FromSource {
    /// A table, selected with `only` so partition children are not doubled.
    Table { schema: String, name: String },
    /// A common table expression introduced by an enclosing query.
    Cte(String),
}

impl FromEntry {
    pub fn table(table: &Table, alias: impl Into<String>) -> Self {
        FromEntry {
            source: FromSource::Table {
                schema: table.schema.clone(),
                name: table.name.clone(),
            },
            alias: Some(alias.into()),
        }
    }

    pub fn cte(name: impl Into<String>) -> Self {
        FromEntry {
            source: FromSource::Cte(name.into()),
            alias: None,
        }
    }
}

/// A boolean condition in a `where` clause.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// A raw SQL condition from the configuration, parenthesised on render.
    Sql(String),
    Exists(Box<Select>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// Equality between the two sides of a foreign key: the referencing
    /// columns on the `from` alias, the referenced columns on the `to` one.
    FkeyJoin {
        fkey: ForeignKey,
        from: String,
        to: String,
    },
}

/// A table closed over its self-referential foreign keys: the rows selected
/// by the base term plus every row they reach through the keys, then
/// selected as a whole.
#[derive(Debug, Clone)]
pub struct RecursiveCte {
    pub name: String,
    pub base: Select,
    pub recursive: Select,
}

/// A `copy ... to stdout` statement.
#[derive(Debug, Clone)]
pub struct CopyOut {
    pub source: CopySource,
}

#[derive(Debug, Clone)]
pub enum CopySource {
    /// Copy a table's columns directly.
    Table {
        schema: String,
        name: String,
        columns: Vec<String>,
    },
    /// Copy the result of a query.
    Query(Box<SqlQuery>),
}

/// Collapse a list of conditions: nothing for an empty list, the condition
/// itself for a single one, a conjunction otherwise.
pub fn maybe_and(mut conds: Vec<Predicate>) -> Option<Predicate> {
    match conds.len() {
        0 => None,
        1 => Some(conds.remove(0)),
        _ => Some(Predicate::And(conds)),
    }
}

/// `maybe_and` for disjunctions.
pub fn maybe_or(mut conds: Vec<Predicate>) -> Option<Predicate> {
    match conds.len() {
        0 => None,
        1 => Some(conds.remove(0)),
        _ => Some(Predicate::Or(conds)),
    }
}

/// Generator of the `t0`, `t1`, ... aliases of a planned query. Reset for
/// every top-level statement so plans are deterministic.
#[derive(Debug, Default)]
pub struct AliasGen {
    next: usize,
}

impl AliasGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.next);
        self.next += 1;
        alias
    }
}
