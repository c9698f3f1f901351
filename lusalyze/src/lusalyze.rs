// `lusalyze` -- Ingest and analyze LUSU tag files from lithography machines
//
// Run with --help for brief help.
//
// Every subcommand runs one pipeline to completion against the record database and prints its
// result on stdout, as JSON unless a text format is requested.  Logging goes to stderr and is
// controlled by RUST_LOG (default "info", or "debug" with --verbose).
//
// The database is named by --database, or $LUSU_DATABASE, or is $HOME/lusu.db.
//
//
// Quirks
//
// Store failures while reading (records, stats, chart, machines) are reported as a JSON object with
// a "message" field and do not change the exit code, so that a consumer of the output always gets
// a payload.  Failures to open the database or to read the configuration are fatal.

mod chart;
mod format;
mod ingest;
mod records;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use lusulog::SqliteStore;
use std::env;
use std::io::{self, Write};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store the machines from the configuration file
    SyncConfig(SyncConfigArgs),

    /// Parse and store the files for the configured tasks
    Ingest(IngestArgs),

    /// List the known machines
    Machines(MachinesArgs),

    /// Print stored records for a machine, newest first
    Records(RecordArgs),

    /// Print per-metric statistics for a machine
    Stats(StatsArgs),

    /// Print time series of the measurements for a machine
    Chart(ChartArgs),
}

#[derive(Args, Debug)]
pub struct SyncConfigArgs {
    #[command(flatten)]
    config_args: ConfigArgs,

    #[command(flatten)]
    store_args: StoreArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    #[command(flatten)]
    config_args: ConfigArgs,

    /// Only run the tasks for this machine [default: all]
    #[arg(long, short)]
    machine: Option<String>,

    #[command(flatten)]
    store_args: StoreArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct MachinesArgs {
    #[command(flatten)]
    store_args: StoreArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// The machine to select records for
    machine_id: String,

    /// Print at most these many records
    #[arg(long, short, default_value_t = 10000)]
    limit: usize,

    /// Print these columns as a text table instead of JSON, comma-separated [default: JSON]
    #[arg(long)]
    fmt: Option<String>,

    /// With --fmt, print a header row
    #[arg(long, default_value_t = false)]
    header: bool,

    /// With --fmt, print csv instead of fixed-width columns
    #[arg(long, default_value_t = false)]
    csv: bool,

    #[command(flatten)]
    store_args: StoreArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// The machine to summarize
    machine_id: String,

    #[command(flatten)]
    store_args: StoreArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct ChartArgs {
    /// The machine to chart
    machine_id: String,

    /// Select records with this illumination mode [default: all]
    #[arg(long)]
    illumination_mode: Option<String>,

    /// Select records with this numerical aperture [default: all]
    #[arg(long)]
    na: Option<String>,

    /// Select records with this inner sigma [default: all]
    #[arg(long)]
    sigma_inner: Option<String>,

    /// Select records with this outer sigma [default: all]
    #[arg(long)]
    sigma_outer: Option<String>,

    /// Chart at most these many of the most recent records, before selection
    #[arg(long, short, default_value_t = 10000)]
    limit: usize,

    #[command(flatten)]
    store_args: StoreArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// File containing JSON data with machines and tasks
    #[arg(long)]
    config_file: String,
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    /// The record database [default: $LUSU_DATABASE, or $HOME/lusu.db]
    #[arg(long)]
    database: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Log debug information to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() {
    match lusalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn lusalyze() -> Result<()> {
    let cli = Cli::parse();

    let (store_args, meta_args) = match cli.command {
        Commands::SyncConfig(ref a) => (&a.store_args, &a.meta_args),
        Commands::Ingest(ref a) => (&a.store_args, &a.meta_args),
        Commands::Machines(ref a) => (&a.store_args, &a.meta_args),
        Commands::Records(ref a) => (&a.store_args, &a.meta_args),
        Commands::Stats(ref a) => (&a.store_args, &a.meta_args),
        Commands::Chart(ref a) => (&a.store_args, &a.meta_args),
    };

    init_logging(meta_args.verbose);

    let database = database_path(store_args)?;
    debug!(database = database.as_str(), "Opening record database");
    let store = SqliteStore::open(&database)?;

    // Requests run one at a time; the only waiting is on the store.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut output = io::stdout();
    runtime.block_on(async {
        match cli.command {
            Commands::SyncConfig(ref a) => {
                ingest::sync_config(&mut output, &store, &a.config_args.config_file).await
            }
            Commands::Ingest(ref a) => {
                ingest::ingest(
                    &mut output,
                    &store,
                    &a.config_args.config_file,
                    a.machine.as_deref(),
                )
                .await
            }
            Commands::Machines(_) => records::print_machines(&mut output, &store).await,
            Commands::Records(ref a) => records::print_records(&mut output, &store, a).await,
            Commands::Stats(ref a) => {
                records::print_stats(&mut output, &store, &a.machine_id).await
            }
            Commands::Chart(ref a) => chart::print_chart(&mut output, &store, a).await,
        }
    })
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn database_path(store_args: &StoreArgs) -> Result<String> {
    if let Some(ref p) = store_args.database {
        Ok(p.clone())
    } else if let Ok(val) = env::var("LUSU_DATABASE") {
        Ok(val)
    } else if let Ok(val) = env::var("HOME") {
        Ok(val + "/lusu.db")
    } else {
        bail!("No database path")
    }
}

/// Write `payload` as pretty-printed JSON followed by a newline.

pub fn write_json(output: &mut dyn io::Write, payload: &serde_json::Value) -> Result<()> {
    serde_json::to_writer_pretty(&mut *output, payload)?;
    writeln!(output)?;
    Ok(())
}

#[cfg(test)]
use lusulog::{LusuRecord, Machine, MetricStats, RecordTable, StoreError, StoreResult};

// A store where every operation fails, for checking that read failures become payloads.

#[cfg(test)]
pub struct FailingStore;

#[cfg(test)]
#[async_trait::async_trait]
impl lusulog::RecordStore for FailingStore {
    async fn upsert(
        &self,
        _machine_id: &str,
        _source_file: &str,
        _record: &LusuRecord,
    ) -> StoreResult<i64> {
        Err(StoreError::Poisoned)
    }

    async fn query(&self, _machine_id: &str, _limit: usize) -> StoreResult<RecordTable> {
        Err(StoreError::Poisoned)
    }

    async fn stats(&self, _machine_id: &str) -> StoreResult<Vec<MetricStats>> {
        Err(StoreError::Poisoned)
    }

    async fn upsert_machine(&self, _machine: &Machine) -> StoreResult<()> {
        Err(StoreError::Poisoned)
    }

    async fn machines(&self) -> StoreResult<Vec<Machine>> {
        Err(StoreError::Poisoned)
    }
}

#[test]
fn test_cli_parses() {
    let cli = Cli::try_parse_from([
        "lusalyze", "chart", "XT01", "--illumination-mode", "Annular", "--na", "0.85",
    ])
    .unwrap();
    if let Commands::Chart(a) = cli.command {
        assert!(a.machine_id == "XT01");
        assert!(a.illumination_mode.as_deref() == Some("Annular"));
        assert!(a.na.as_deref() == Some("0.85"));
        assert!(a.sigma_inner.is_none());
        assert!(a.limit == 10000);
    } else {
        panic!("Expected chart");
    }

    assert!(Cli::try_parse_from(["lusalyze", "ingest"]).is_err());
    assert!(Cli::try_parse_from(["lusalyze", "records"]).is_err());
}

#[test]
fn test_database_path() {
    let a = StoreArgs {
        database: Some("/tmp/x.db".to_string()),
    };
    assert!(database_path(&a).unwrap() == "/tmp/x.db");
}
