use pgsieve::catalog::object::{DbObject, Oid};
use pgsieve::catalog::sequence::Sequence;
use pgsieve::catalog::table::{Column, ForeignKey, Table};
use pgsieve::catalog::Database;
use pgsieve::config::{self, RulesDocument};
use pgsieve::dumper::Dumper;

/// Build the sample schema used across the planning tests: `ntables` tables
/// `tableN(id, data)` where `id` defaults from the sequence
/// `tableN_id_seq`, plus the given foreign keys as
/// `(table, column, ftable, fcolumn)` tuples. Referencing columns are added
/// on demand and keys are named `<column>_<ftable>_<fcolumn>_fkey`.
pub fn sample_db(ntables: u32, fkeys: &[(&str, &str, &str, &str)]) -> Database {
    let mut db = Database::new();
    for i in 1..=ntables {
        let table_oid = Oid(100 + i);
        let seq_oid = Oid(200 + i);
        let mut table = Table::new(table_oid, "public", format!("table{i}"));
        let mut id = Column::new("id", "integer");
        id.add_used_sequence(seq_oid);
        table.columns.push(id);
        table.columns.push(Column::new("data", "text"));
        db.add_object(DbObject::Table(table)).unwrap();
        db.add_object(DbObject::Sequence(Sequence::new(
            seq_oid,
            "public",
            format!("table{i}_id_seq"),
        )))
        .unwrap();
    }

    for (table, column, ftable, fcolumn) in fkeys {
        let table_oid = oid_of(&db, table);
        let ftable_oid = oid_of(&db, ftable);
        for (oid, name) in [(table_oid, column), (ftable_oid, fcolumn)] {
            let t = db.table_mut(oid).unwrap();
            if t.get_column(name).is_none() {
                t.columns.push(Column::new(*name, "integer"));
            }
        }
        db.add_foreign_key(ForeignKey {
            name: format!("{column}_{ftable}_{fcolumn}_fkey"),
            table_oid,
            table_cols: vec![column.to_string()],
            ftable_oid,
            ftable_cols: vec![fcolumn.to_string()],
        })
        .unwrap();
    }

    db
}

pub fn oid_of(db: &Database, name: &str) -> Oid {
    db.get_by_name("public", name)
        .unwrap_or_else(|| panic!("no object called {name} in the sample schema"))
        .oid()
}

/// Load a YAML rule document into a dumper over the given schema.
pub fn dumper_with_rules(db: Database, yaml: &str) -> Dumper {
    let doc: RulesDocument = serde_yaml::from_str(yaml).expect("rule document should parse");
    let rules = config::rules_from_document(doc, "test.yaml").expect("rules should validate");
    let mut dumper = Dumper::new(db);
    dumper.add_rules(rules).unwrap();
    dumper
}
