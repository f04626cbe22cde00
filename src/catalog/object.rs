use std::fmt;

use crate::catalog::matview::MaterializedView;
use crate::catalog::sequence::Sequence;
use crate::catalog::table::Table;

/// A PostgreSQL object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(pub u32);

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kinds of relations whose state can appear in a data dump.
///
/// The other relkinds are either stateless (views) or internal (indexes,
/// toast tables) and never enter the schema graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Table,
    PartitionedTable,
    Sequence,
    MaterializedView,
}

impl ObjectKind {
    /// Map a `pg_class.relkind` letter to a dumpable kind.
    pub fn from_relkind(relkind: &str) -> Option<Self> {
        match relkind {
            "r" => Some(ObjectKind::Table),
            "p" => Some(ObjectKind::PartitionedTable),
            "S" => Some(ObjectKind::Sequence),
            "m" => Some(ObjectKind::MaterializedView),
            _ => None,
        }
    }

    /// Parse the kind name used in rule files.
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "table" => Some(ObjectKind::Table),
            "partitioned table" => Some(ObjectKind::PartitionedTable),
            "sequence" => Some(ObjectKind::Sequence),
            "materialized view" => Some(ObjectKind::MaterializedView),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::PartitionedTable => "partitioned table",
            ObjectKind::Sequence => "sequence",
            ObjectKind::MaterializedView => "materialized view",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A database object in the schema graph.
///
/// Partitioned tables carry the same payload as plain tables: the planner
/// treats them identically and only the kind differs for rule matching.
#[derive(Debug, Clone)]
pub enum DbObject {
    Table(Table),
    PartitionedTable(Table),
    Sequence(Sequence),
    MaterializedView(MaterializedView),
}

impl DbObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            DbObject::Table(_) => ObjectKind::Table,
            DbObject::PartitionedTable(_) => ObjectKind::PartitionedTable,
            DbObject::Sequence(_) => ObjectKind::Sequence,
            DbObject::MaterializedView(_) => ObjectKind::MaterializedView,
        }
    }

    pub fn oid(&self) -> Oid {
        match self {
            DbObject::Table(t) | DbObject::PartitionedTable(t) => t.oid,
            DbObject::Sequence(s) => s.oid,
            DbObject::MaterializedView(v) => v.oid,
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            DbObject::Table(t) | DbObject::PartitionedTable(t) => &t.schema,
            DbObject::Sequence(s) => &s.schema,
            DbObject::MaterializedView(v) => &v.schema,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DbObject::Table(t) | DbObject::PartitionedTable(t) => &t.name,
            DbObject::Sequence(s) => &s.name,
            DbObject::MaterializedView(v) => &v.name,
        }
    }

    /// The extension owning the object, if any.
    pub fn extension(&self) -> Option<&str> {
        match self {
            DbObject::Table(t) | DbObject::PartitionedTable(t) => t.extension.as_deref(),
            DbObject::Sequence(s) => s.extension.as_deref(),
            DbObject::MaterializedView(v) => v.extension.as_deref(),
        }
    }

    /// The dump condition declared by the owning extension: empty to dump
    /// the whole object, or a SQL predicate selecting the rows to dump.
    pub fn extcondition(&self) -> Option<&str> {
        match self {
            DbObject::Table(t) | DbObject::PartitionedTable(t) => t.extcondition.as_deref(),
            DbObject::Sequence(s) => s.extcondition.as_deref(),
            DbObject::MaterializedView(v) => v.extcondition.as_deref(),
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            DbObject::Table(t) | DbObject::PartitionedTable(t) => Some(t),
            DbObject::Sequence(_) | DbObject::MaterializedView(_) => None,
        }
    }

    /// Human-readable dotted name, for logs and error messages.
    pub fn ident(&self) -> String {
        crate::render::ident_display(self.schema(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relkind_mapping_covers_the_dumpable_kinds() {
        assert_eq!(ObjectKind::from_relkind("r"), Some(ObjectKind::Table));
        assert_eq!(
            ObjectKind::from_relkind("p"),
            Some(ObjectKind::PartitionedTable)
        );
        assert_eq!(ObjectKind::from_relkind("S"), Some(ObjectKind::Sequence));
        assert_eq!(
            ObjectKind::from_relkind("m"),
            Some(ObjectKind::MaterializedView)
        );
        for stateless in ["i", "t", "v", "c", "f", "I"] {
            assert_eq!(ObjectKind::from_relkind(stateless), None);
        }
    }

    #[test]
    fn config_names_round_trip() {
        for kind in [
            ObjectKind::Table,
            ObjectKind::PartitionedTable,
            ObjectKind::Sequence,
            ObjectKind::MaterializedView,
        ] {
            assert_eq!(ObjectKind::from_config_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ObjectKind::from_config_name("view"), None);
    }

    #[test]
    fn partitioned_tables_expose_the_table_payload() {
        let table = Table::new(Oid(1), "public", "events");
        let obj = DbObject::PartitionedTable(table);
        assert_eq!(obj.kind(), ObjectKind::PartitionedTable);
        assert!(obj.as_table().is_some());
        assert_eq!(obj.ident(), "public.events");
    }
}
