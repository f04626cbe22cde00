//! The in-memory schema graph: every dumpable object of the source
//! database, with columns, foreign keys and sequence-usage edges.

use std::collections::BTreeMap;

use crate::error::DumpError;

pub mod matview;
pub mod object;
pub mod sequence;
pub mod table;

pub use object::{DbObject, ObjectKind, Oid};

use table::{Column, ForeignKey, Table};

/// The schema graph. Built once by the reader, indexed by OID and by
/// (schema, name), then treated as read-only by matching, propagation and
/// planning.
#[derive(Debug, Default)]
pub struct Database {
    objects: Vec<DbObject>,
    by_oid: BTreeMap<Oid, usize>,
    by_name: BTreeMap<(String, String), usize>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object to the graph. Both indexes are 1:1.
    pub fn add_object(&mut self, obj: DbObject) -> Result<(), DumpError> {
        let oid = obj.oid();
        if self.by_oid.contains_key(&oid) {
            return Err(DumpError::Dump(format!(
                "the database already contains an object with oid {oid}"
            )));
        }
        let key = (obj.schema().to_string(), obj.name().to_string());
        if self.by_name.contains_key(&key) {
            return Err(DumpError::Dump(format!(
                "the database already contains an object called {}",
                obj.ident()
            )));
        }
        let idx = self.objects.len();
        self.by_oid.insert(oid, idx);
        self.by_name.insert(key, idx);
        self.objects.push(obj);
        Ok(())
    }

    pub fn get(&self, oid: Oid) -> Option<&DbObject> {
        self.by_oid.get(&oid).map(|&idx| &self.objects[idx])
    }

    pub fn get_by_name(&self, schema: &str, name: &str) -> Option<&DbObject> {
        self.by_name
            .get(&(schema.to_string(), name.to_string()))
            .map(|&idx| &self.objects[idx])
    }

    /// The table with the given OID, if the OID names a table.
    pub fn table(&self, oid: Oid) -> Option<&Table> {
        self.get(oid).and_then(DbObject::as_table)
    }

    pub fn table_mut(&mut self, oid: Oid) -> Option<&mut Table> {
        let &idx = self.by_oid.get(&oid)?;
        match &mut self.objects[idx] {
            DbObject::Table(t) | DbObject::PartitionedTable(t) => Some(t),
            DbObject::Sequence(_) | DbObject::MaterializedView(_) => None,
        }
    }

    /// Objects in insertion order. The reader inserts in (schema, name)
    /// order, which fixes the emission order within each kind.
    pub fn iter(&self) -> std::slice::Iter<'_, DbObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Attach a foreign key to its referencing table and to the referenced
    /// table's reverse index.
    pub fn add_foreign_key(&mut self, fkey: ForeignKey) -> Result<(), DumpError> {
        {
            let table = self.table_mut(fkey.table_oid).ok_or_else(|| {
                DumpError::Dump(format!(
                    "foreign key {} references unknown table oid {}",
                    fkey.name, fkey.table_oid
                ))
            })?;
            table.fkeys.push(fkey.clone());
        }
        let ftable = self.table_mut(fkey.ftable_oid).ok_or_else(|| {
            DumpError::Dump(format!(
                "foreign key {} references unknown table oid {}",
                fkey.name, fkey.ftable_oid
            ))
        })?;
        ftable.ref_fkeys.push(fkey);
        Ok(())
    }

    /// Record that a table column takes its default from a sequence.
    pub fn add_sequence_user(
        &mut self,
        seq_oid: Oid,
        table_oid: Oid,
        column: &str,
    ) -> Result<(), DumpError> {
        let table = self.table_mut(table_oid).ok_or_else(|| {
            DumpError::Dump(format!("no table with oid {table_oid} uses sequence {seq_oid}"))
        })?;
        let ident = table.ident();
        let col = table.get_column_mut(column).ok_or_else(|| {
            DumpError::Dump(format!("no column {column} in table {ident}"))
        })?;
        col.add_used_sequence(seq_oid);
        Ok(())
    }

    /// The tables consuming a sequence through a column default, with the
    /// consuming column.
    pub fn tables_using_sequence(&self, oid: Oid) -> Vec<(&Table, &Column)> {
        let mut rv = Vec::new();
        for obj in &self.objects {
            let Some(table) = obj.as_table() else { continue };
            for col in &table.columns {
                if col.used_sequences.contains(&oid) {
                    rv.push((table, col));
                }
            }
        }
        rv
    }
}
