//! Reading the schema graph and table data from PostgreSQL.

use std::io::Write;

use futures_util::TryStreamExt;
use sqlx::postgres::types::Oid as PgOid;
use sqlx::{Connection, PgConnection, Row};
use tracing::debug;

use crate::catalog::matview::MaterializedView;
use crate::catalog::object::{DbObject, ObjectKind, Oid};
use crate::catalog::sequence::Sequence;
use crate::catalog::table::{Column, ForeignKey, Table};
use crate::catalog::Database;
use crate::error::DumpError;
use crate::render::quote_qualified;

/// Access to the source database: the schema graph, sequence values and
/// streamed `copy` data.
#[allow(async_fn_in_trait)]
pub trait Reader {
    /// Build the schema graph: dumpable objects with their columns, foreign
    /// keys and sequence-usage edges.
    async fn load_schema(&mut self) -> Result<Database, DumpError>;

    /// The `last_value` of a sequence.
    async fn get_sequence_value(&mut self, seq: &Sequence) -> Result<i64, DumpError>;

    /// Run a `copy ... to stdout` statement, streaming the raw data into
    /// the sink. Returns the number of bytes copied.
    async fn copy(
        &mut self,
        statement: &str,
        out: &mut (impl Write + Send),
    ) -> Result<u64, DumpError>;
}

/// The sqlx-backed reader. Holds the single connection used for the whole
/// dump, so the catalog and the copied data come from one session.
pub struct DbReader {
    conn: PgConnection,
}

impl DbReader {
    pub async fn connect(dsn: &str) -> Result<Self, DumpError> {
        debug!("connecting to '{dsn}'");
        let conn = PgConnection::connect(dsn)
            .await
            .map_err(|e| DumpError::config(format!("error connecting to the database: {e}")))?;
        Ok(Self { conn })
    }

    /// Dumpable relations outside the system schemas. Extension members are
    /// included only when the extension declared a dump condition for them.
    async fn fetch_objects(&mut self, db: &mut Database) -> Result<(), DumpError> {
        debug!("fetching database objects");
        let rows = sqlx::query(
            r#"
            select
                r.oid as oid,
                s.nspname::text as schema,
                r.relname::text as name,
                r.relkind::text as kind,
                e.extname::text as extension,
                e.extcondition[array_position(e.extconfig, r.oid)] as extcondition
            from pg_class r
            join pg_namespace s on s.oid = r.relnamespace
            left join pg_depend d on d.objid = r.oid and d.deptype = 'e'
            left join pg_extension e on e.oid = d.refobjid
            where r.relkind = any(array['r', 'p', 'S', 'm'])
            and s.nspname <> 'information_schema'
            and s.nspname !~ '^pg_'
            and (e.extname is null
                or e.extcondition[array_position(e.extconfig, r.oid)] is not null)
            order by s.nspname, r.relname
            "#,
        )
        .fetch_all(&mut self.conn)
        .await?;

        for row in rows {
            let oid = Oid(row.get::<PgOid, _>("oid").0);
            let schema: String = row.get("schema");
            let name: String = row.get("name");
            let kind: String = row.get("kind");
            let extension: Option<String> = row.get("extension");
            let extcondition: Option<String> = row.get("extcondition");

            let Some(kind) = ObjectKind::from_relkind(&kind) else {
                continue;
            };
            let obj = match kind {
                ObjectKind::Table | ObjectKind::PartitionedTable => {
                    let mut table = Table::new(oid, schema, name);
                    table.extension = extension;
                    table.extcondition = extcondition;
                    if kind == ObjectKind::Table {
                        DbObject::Table(table)
                    } else {
                        DbObject::PartitionedTable(table)
                    }
                }
                ObjectKind::Sequence => {
                    let mut seq = Sequence::new(oid, schema, name);
                    seq.extension = extension;
                    seq.extcondition = extcondition;
                    DbObject::Sequence(seq)
                }
                ObjectKind::MaterializedView => {
                    let mut view = MaterializedView::new(oid, schema, name);
                    view.extension = extension;
                    view.extcondition = extcondition;
                    DbObject::MaterializedView(view)
                }
            };
            db.add_object(obj)?;
        }
        Ok(())
    }

    /// Table columns in attribute order, skipping dropped and system
    /// columns, with the expression of generated columns.
    async fn fetch_columns(&mut self, db: &mut Database) -> Result<(), DumpError> {
        debug!("fetching columns");
        let rows = sqlx::query(
            r#"
            select
                a.attrelid as table_oid,
                a.attname::text as name,
                a.atttypid::regtype::text as type,
                case when a.attgenerated <> ''
                    then pg_catalog.pg_get_expr(ad.adbin, ad.adrelid)
                end as generated
            from pg_attribute a
            join pg_class r on r.oid = a.attrelid
            join pg_namespace s on s.oid = r.relnamespace
            left join pg_attrdef ad
                on ad.adrelid = a.attrelid and ad.adnum = a.attnum
            where r.relkind = any(array['r', 'p'])
            and a.attnum > 0
            and not a.attisdropped
            and s.nspname <> 'information_schema'
            and s.nspname !~ '^pg_'
            order by a.attrelid, a.attnum
            "#,
        )
        .fetch_all(&mut self.conn)
        .await?;

        for row in rows {
            let table_oid = Oid(row.get::<PgOid, _>("table_oid").0);
            let Some(table) = db.table_mut(table_oid) else {
                continue;
            };
            let mut column = Column::new(
                row.get::<String, _>("name"),
                row.get::<String, _>("type"),
            );
            column.generated = row.get("generated");
            table.columns.push(column);
        }
        Ok(())
    }

    /// Foreign keys between graph tables, with ordered column lists.
    async fn fetch_fkeys(&mut self, db: &mut Database) -> Result<(), DumpError> {
        debug!("fetching foreign keys");
        let rows = sqlx::query(
            r#"
            select
                c.conname::text as name,
                c.conrelid as table_oid,
                (select array_agg(a.attname::text order by k.ord)
                    from unnest(c.conkey) with ordinality as k(attnum, ord)
                    join pg_attribute a
                        on a.attrelid = c.conrelid and a.attnum = k.attnum)
                    as table_cols,
                c.confrelid as ftable_oid,
                (select array_agg(a.attname::text order by k.ord)
                    from unnest(c.confkey) with ordinality as k(attnum, ord)
                    join pg_attribute a
                        on a.attrelid = c.confrelid and a.attnum = k.attnum)
                    as ftable_cols
            from pg_constraint c
            join pg_class r on r.oid = c.conrelid
            join pg_namespace s on s.oid = r.relnamespace
            where c.contype = 'f'
            and s.nspname <> 'information_schema'
            and s.nspname !~ '^pg_'
            order by s.nspname, r.relname, c.conname
            "#,
        )
        .fetch_all(&mut self.conn)
        .await?;

        for row in rows {
            let fkey = ForeignKey {
                name: row.get("name"),
                table_oid: Oid(row.get::<PgOid, _>("table_oid").0),
                table_cols: row.get("table_cols"),
                ftable_oid: Oid(row.get::<PgOid, _>("ftable_oid").0),
                ftable_cols: row.get("ftable_cols"),
            };
            // A key can point at a table filtered out of the graph, e.g. in
            // a system schema. Nothing to close over then.
            if db.table(fkey.table_oid).is_none() || db.table(fkey.ftable_oid).is_none() {
                debug!("foreign key {} leaves the schema graph: ignored", fkey.name);
                continue;
            }
            db.add_foreign_key(fkey)?;
        }
        Ok(())
    }

    /// Column defaults drawing from sequences (`default nextval(...)`).
    async fn fetch_sequence_deps(&mut self, db: &mut Database) -> Result<(), DumpError> {
        debug!("fetching sequence dependencies");
        let rows = sqlx::query(
            r#"
            select
                tbl.oid as table_oid,
                att.attname::text as column_name,
                seq.oid as seq_oid
            from pg_depend dep
            join pg_attrdef def
                on dep.classid = 'pg_attrdef'::regclass and dep.objid = def.oid
            join pg_attribute att
                on (def.adrelid, def.adnum) = (att.attrelid, att.attnum)
            join pg_class tbl on tbl.oid = att.attrelid
            join pg_class seq
                on dep.refclassid = 'pg_class'::regclass
                and seq.oid = dep.refobjid
                and seq.relkind = 'S'
            "#,
        )
        .fetch_all(&mut self.conn)
        .await?;

        for row in rows {
            let table_oid = Oid(row.get::<PgOid, _>("table_oid").0);
            let seq_oid = Oid(row.get::<PgOid, _>("seq_oid").0);
            let column: String = row.get("column_name");
            if db.table(table_oid).is_none() || db.get(seq_oid).is_none() {
                continue;
            }
            db.add_sequence_user(seq_oid, table_oid, &column)?;
        }
        Ok(())
    }
}

impl Reader for DbReader {
    async fn load_schema(&mut self) -> Result<Database, DumpError> {
        let mut db = Database::new();
        self.fetch_objects(&mut db).await?;
        self.fetch_columns(&mut db).await?;
        self.fetch_fkeys(&mut db).await?;
        self.fetch_sequence_deps(&mut db).await?;
        debug!("loaded {} database objects", db.len());
        Ok(db)
    }

    async fn get_sequence_value(&mut self, seq: &Sequence) -> Result<i64, DumpError> {
        let stmt = format!(
            "select last_value from {}",
            quote_qualified(&seq.schema, &seq.name)
        );
        let row = sqlx::query(&stmt).fetch_one(&mut self.conn).await?;
        Ok(row.get(0))
    }

    async fn copy(
        &mut self,
        statement: &str,
        out: &mut (impl Write + Send),
    ) -> Result<u64, DumpError> {
        debug!("exporting using: {statement}");
        let mut stream = self.conn.copy_out_raw(statement).await?;
        let mut bytes = 0u64;
        while let Some(chunk) = stream.try_next().await? {
            out.write_all(&chunk)?;
            bytes += chunk.len() as u64;
        }
        Ok(bytes)
    }
}
