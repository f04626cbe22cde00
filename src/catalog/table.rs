use crate::catalog::object::Oid;
use crate::render::ident_display;

/// A column of a table.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    /// Expression of a `generated always as ... stored` column. Such columns
    /// are recomputed on load and cannot go through `copy ... from`.
    pub generated: Option<String>,
    /// Sequences this column consumes through `default nextval(...)`.
    pub used_sequences: Vec<Oid>,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            generated: None,
            used_sequences: Vec::new(),
        }
    }

    pub fn add_used_sequence(&mut self, oid: Oid) {
        self.used_sequences.push(oid);
    }
}

/// A foreign key between two tables of the graph. The column lists are
/// ordered and have matching arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    /// The referencing table and its constrained columns.
    pub table_oid: Oid,
    pub table_cols: Vec<String>,
    /// The referenced table and its key columns.
    pub ftable_oid: Oid,
    pub ftable_cols: Vec<String>,
}

impl ForeignKey {
    /// A key whose referencing and referenced tables coincide. Closing over
    /// such keys needs a recursive query rather than graph navigation.
    pub fn is_self_referential(&self) -> bool {
        self.table_oid == self.ftable_oid
    }
}

/// A table (or partitioned table) in the database.
#[derive(Debug, Clone)]
pub struct Table {
    pub oid: Oid,
    pub schema: String,
    pub name: String,
    pub extension: Option<String>,
    pub extcondition: Option<String>,
    /// Columns in definition order.
    pub columns: Vec<Column>,
    /// Outbound foreign keys, towards the tables this one references.
    pub fkeys: Vec<ForeignKey>,
    /// Inbound foreign keys, from the tables referencing this one.
    pub ref_fkeys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(oid: Oid, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            oid,
            schema: schema.into(),
            name: name.into(),
            extension: None,
            extcondition: None,
            columns: Vec::new(),
            fkeys: Vec::new(),
            ref_fkeys: Vec::new(),
        }
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Human-readable dotted name, for logs and error messages.
    pub fn ident(&self) -> String {
        ident_display(&self.schema, &self.name)
    }
}
