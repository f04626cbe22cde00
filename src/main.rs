use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use pgsieve::config;
use pgsieve::dumper::Dumper;
use pgsieve::error::DumpError;
use pgsieve::reader::{DbReader, Reader};
use pgsieve::writer::{DummyWriter, SqlWriter, Writer};

/// Create a selective data dump of a PostgreSQL database.
///
/// The rows to dump are described by one or more YAML rule files; the dump
/// contains the matching rows plus whatever the declared foreign keys
/// require, and restores with psql into a schema-identical database.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// YAML files describing the data to dump
    #[arg(required = true, value_name = "config")]
    config_files: Vec<PathBuf>,

    /// Database connection string [default: $DATABASE_URL]
    #[arg(long, default_value = "")]
    dsn: String,

    /// The file where to save the dump [default: stdout]
    #[arg(long, short = 'o', default_value = "-")]
    outfile: String,

    /// Test the configuration to verify it works as expected
    #[arg(long)]
    test: bool,

    /// Talk less
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    /// Talk more
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli);

    let result = tokio::select! {
        result = run(&cli) => result,
        _ = tokio::signal::ctrl_c() => Err(DumpError::Interrupted),
    };

    if let Err(err) = result {
        match &err {
            DumpError::Config { messages } => {
                for message in messages {
                    error!("{message}");
                }
            }
            DumpError::Interrupted => info!("user interrupt"),
            DumpError::BrokenPipe => error!("dump interrupted: the output pipe was closed"),
            other => error!("{other}"),
        }
        std::process::exit(err.exit_code());
    }
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    // The dump goes to stdout: all diagnostics go to stderr.
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<(), DumpError> {
    let mut rule_sets = Vec::new();
    for path in &cli.config_files {
        rule_sets.push(config::load_rules(path)?);
    }

    let dsn = resolve_dsn(&cli.dsn)?;
    let mut reader = DbReader::connect(&dsn).await?;
    let db = reader.load_schema().await?;

    let mut dumper = Dumper::new(db);
    for rules in rule_sets {
        dumper.add_rules(rules)?;
    }
    dumper.plan_dump()?;

    if cli.test {
        let mut writer = DummyWriter;
        dumper.emit(&mut writer).await?;
        info!("the configuration works as expected");
        return Ok(());
    }

    let out = open_outfile(&cli.outfile)?;
    let mut writer = SqlWriter::new(reader, BufWriter::new(out));
    let emitted = dumper.emit(&mut writer).await;
    let closed = writer.close();
    emitted.and(closed)
}

fn resolve_dsn(dsn: &str) -> Result<String, DumpError> {
    if !dsn.is_empty() {
        return Ok(dsn.to_string());
    }
    std::env::var("DATABASE_URL").map_err(|_| {
        DumpError::config("no database connection string: use --dsn or set DATABASE_URL")
    })
}

fn open_outfile(outfile: &str) -> Result<Box<dyn Write + Send>, DumpError> {
    if outfile == "-" {
        Ok(Box::new(io::stdout()))
    } else {
        let file = File::create(outfile).map_err(|e| {
            DumpError::config(format!("couldn't open {outfile} for writing: {e}"))
        })?;
        Ok(Box::new(file))
    }
}
