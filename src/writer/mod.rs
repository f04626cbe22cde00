//! Dump writers: the SQL writer emitting the dump text, and a dry-run
//! writer that only logs what it would do.

use std::io::Write;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::catalog::matview::MaterializedView;
use crate::catalog::sequence::Sequence;
use crate::catalog::table::Table;
use crate::error::DumpError;
use crate::matching::Match;
use crate::reader::Reader;
use crate::render::{escape_string, quote_qualified};

/// Consumer of planned dump operations. Called in a fixed lifecycle:
/// `begin_dump`, one call per object in emission order, `end_dump`, then
/// `close` on every exit path.
#[allow(async_fn_in_trait)]
pub trait Writer {
    async fn begin_dump(&mut self) -> Result<(), DumpError>;
    async fn dump_table(&mut self, table: &Table, m: &Match) -> Result<(), DumpError>;
    async fn dump_sequence(&mut self, seq: &Sequence, m: &Match) -> Result<(), DumpError>;
    async fn dump_materialized_view(
        &mut self,
        view: &MaterializedView,
        m: &Match,
    ) -> Result<(), DumpError>;
    async fn end_dump(&mut self) -> Result<(), DumpError>;
    fn close(&mut self) -> Result<(), DumpError>;
}

/// Writes the dump as replayable SQL text, streaming `copy` data straight
/// from the reader into the sink.
pub struct SqlWriter<R, O> {
    reader: R,
    out: O,
    started_at: Option<DateTime<Utc>>,
}

impl<R: Reader, O: Write + Send> SqlWriter<R, O> {
    pub fn new(reader: R, out: O) -> Self {
        Self {
            reader,
            out,
            started_at: None,
        }
    }

    fn write(&mut self, text: &str) -> Result<(), DumpError> {
        self.out.write_all(text.as_bytes())?;
        Ok(())
    }
}

impl<R: Reader, O: Write + Send> Writer for SqlWriter<R, O> {
    async fn begin_dump(&mut self) -> Result<(), DumpError> {
        let now = Utc::now();
        self.started_at = Some(now);
        self.write(&format!(
            "-- PostgreSQL data dump generated by {} {}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))?;
        self.write(&format!(
            "-- Data dump started at {}Z\n\n",
            now.format("%Y-%m-%d %H:%M:%S")
        ))?;
        self.write("set session authorization default;\n")
    }

    async fn dump_table(&mut self, table: &Table, m: &Match) -> Result<(), DumpError> {
        let import = m.import_statement.clone().ok_or_else(|| {
            DumpError::Dump(format!("no import statement for table {}", table.ident()))
        })?;
        let copy = m.copy_statement.clone().ok_or_else(|| {
            DumpError::Dump(format!("no copy statement for table {}", table.ident()))
        })?;

        let name = quote_qualified(&table.schema, &table.name);
        self.write(&format!("\nalter table {name} disable trigger all;\n"))?;
        self.write(&format!("\n{import}\n"))?;
        let bytes = self
            .reader
            .copy(&copy, &mut self.out)
            .await
            .map_err(|e| match e {
                DumpError::Database(e) => DumpError::Dump(format!(
                    "failed to copy from table {}: {e}",
                    table.ident()
                )),
                other => other,
            })?;
        self.write("\\.\n")?;
        self.write(&format!("\nalter table {name} enable trigger all;\n\n"))?;
        if bytes >= 1024 {
            self.write(&format!(
                "-- {bytes} bytes written for table {} ({})\n\n",
                table.ident(),
                pretty_size(bytes)
            ))
        } else {
            self.write(&format!(
                "-- {bytes} bytes written for table {}\n\n",
                table.ident()
            ))
        }
    }

    async fn dump_sequence(&mut self, seq: &Sequence, _m: &Match) -> Result<(), DumpError> {
        let value = self.reader.get_sequence_value(seq).await?;
        let name = quote_qualified(&seq.schema, &seq.name);
        self.write(&format!(
            "\nselect pg_catalog.setval({}, {value}, true);\n\n",
            escape_string(&name)
        ))
    }

    async fn dump_materialized_view(
        &mut self,
        view: &MaterializedView,
        _m: &Match,
    ) -> Result<(), DumpError> {
        self.write(&format!(
            "\nrefresh materialized view {};\n",
            quote_qualified(&view.schema, &view.name)
        ))
    }

    async fn end_dump(&mut self) -> Result<(), DumpError> {
        self.write("\n\nanalyze;\n\n")?;
        let now = Utc::now();
        if let Some(started) = self.started_at {
            self.write(&format!(
                "-- Data dump finished at {}Z ({})\n\n",
                now.format("%Y-%m-%d %H:%M:%S"),
                pretty_duration(now.signed_duration_since(started))
            ))?;
        }
        // no highlight please
        self.write("-- vim: set filetype=:\n")
    }

    fn close(&mut self) -> Result<(), DumpError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Logs the planned operations without writing anything (`--test`).
#[derive(Debug, Default)]
pub struct DummyWriter;

impl Writer for DummyWriter {
    async fn begin_dump(&mut self) -> Result<(), DumpError> {
        debug!("start of dump");
        Ok(())
    }

    async fn dump_table(&mut self, table: &Table, _m: &Match) -> Result<(), DumpError> {
        info!("would dump table {}", table.ident());
        Ok(())
    }

    async fn dump_sequence(&mut self, seq: &Sequence, _m: &Match) -> Result<(), DumpError> {
        info!("would dump sequence {}", seq.ident());
        Ok(())
    }

    async fn dump_materialized_view(
        &mut self,
        view: &MaterializedView,
        _m: &Match,
    ) -> Result<(), DumpError> {
        info!("would dump materialized view {}", view.ident());
        Ok(())
    }

    async fn end_dump(&mut self) -> Result<(), DumpError> {
        debug!("end of dump");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DumpError> {
        Ok(())
    }
}

/// Display a byte count in a human friendly way.
fn pretty_size(size: u64) -> String {
    const SUFFIXES: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];
    let mut value = size as f64;
    let mut idx = 0;
    while value >= 1024.0 && idx < SUFFIXES.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{size} B")
    } else {
        format!("{value:.2} {}", SUFFIXES[idx])
    }
}

/// Display a time interval in a human friendly way.
fn pretty_duration(delta: Duration) -> String {
    let total = delta.num_seconds().max(0);
    let (days, rem) = (total / 86400, total % 86400);
    let (hours, rem) = (rem / 3600, rem % 3600);
    let (mins, secs) = (rem / 60, rem % 60);
    let mut parts = Vec::new();
    for (value, unit) in [(days, "d"), (hours, "h"), (mins, "m"), (secs, "s")] {
        if parts.is_empty() && value == 0 && unit != "s" {
            continue;
        }
        parts.push(format!("{value}{unit}"));
    }
    parts.join(" ")
}
