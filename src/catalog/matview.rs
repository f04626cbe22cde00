use crate::catalog::object::Oid;
use crate::render::ident_display;

/// A materialized view. It holds no dumpable rows of its own: the dump only
/// refreshes it after the underlying data is restored.
#[derive(Debug, Clone)]
pub struct MaterializedView {
    pub oid: Oid,
    pub schema: String,
    pub name: String,
    pub extension: Option<String>,
    pub extcondition: Option<String>,
}

impl MaterializedView {
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
