use crate::catalog::object::Oid;
use crate::render::ident_display;

/// A sequence in the database. Its `last_value` is captured at emission
/// time, after the table data feeding from it has been copied.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub oid: Oid,
    pub schema: String,
    pub name: String,
    pub extension: Option<String>,
    pub extcondition: Option<String>,
}

impl Sequence {
    pub fn new(oid: Oid, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            oid,
            schema: schema.into(),
            name: name.into(),
            extension: None,
            extcondition: None,
        }
    }

    pub fn ident(&self) -> String {
        ident_display(&self.schema, &self.name)
    }
}
