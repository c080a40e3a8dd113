//! marketdb CLI: ingestion, store inspection, and library build commands.
//!
//! Commands:
//! - `ingest`: fetch daily bars for one symbol and replace the SQLite table
//! - `status`: report row count, symbols and date range of a stored table
//! - `compile-auto`: build `usr/auto/<name>/auto.zig` as a dynamic library
//! - `compile-lib`: build `usr/autos/<src>` as a dynamic library

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use marketdb_core::config::{parse_date, Config, ToolchainConfig};
use marketdb_core::data::{
    ingest, CsvProvider, DataProvider, IngestRequest, SqliteStore, YahooProvider,
};
use marketdb_core::toolchain::BuildLib;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "marketdb",
    about = "Daily OHLCV ingestion into SQLite, plus dynamic-library builds"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily bars for one symbol and replace the stored table.
    Ingest(IngestArgs),
    /// Report row count, symbols and date range of a stored table.
    Status {
        /// SQLite database file.
        #[arg(long)]
        database: Option<PathBuf>,

        /// Table to inspect.
        #[arg(long)]
        table: Option<String>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Build usr/auto/<NAME>/auto.zig into zig-out/bin/auto/<NAME>.dylib.
    CompileAuto {
        name: String,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },
    /// Build usr/autos/<SRC> into zig-out/bin/usr/autos/<BIN>.
    CompileLib {
        src: String,
        bin: String,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },
}

#[derive(clap::Args)]
struct IngestArgs {
    /// Ticker symbol. Defaults to the config file, else AJG.
    symbol: Option<String>,

    /// First date to fetch (YYYY-MM-DD), inclusive.
    #[arg(long)]
    start: Option<String>,

    /// Last date to fetch (YYYY-MM-DD), inclusive.
    #[arg(long)]
    end: Option<String>,

    /// SQLite database file.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Destination table, replaced on every run.
    #[arg(long)]
    table: Option<String>,

    /// Read bars from a CSV export instead of Yahoo Finance.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// HTTP request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Path to a TOML config file. Defaults to ./marketdb.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ToolchainArgs {
    /// Project root holding usr/ and zig-out/.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Compiler executable.
    #[arg(long)]
    compiler: Option<String>,

    /// Optimization mode passed to -O.
    #[arg(long)]
    optimize: Option<String>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ToolchainArgs {
    /// Flags over config file over built-in defaults.
    fn resolve(self) -> Result<ToolchainConfig> {
        let mut toolchain = load_config(self.config)?.toolchain;
        if let Some(root) = self.root {
            toolchain.root = root;
        }
        if let Some(compiler) = self.compiler {
            toolchain.compiler = compiler;
        }
        if let Some(optimize) = self.optimize {
            toolchain.optimize = optimize;
        }
        Ok(toolchain)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest(args) => run_ingest(args),
        Commands::Status {
            database,
            table,
            config,
        } => run_status(database, table, config),
        Commands::CompileAuto { name, toolchain } => {
            let build = BuildLib::auto(&toolchain.resolve()?, &name);
            run_build(&build)
        }
        Commands::CompileLib {
            src,
            bin,
            toolchain,
        } => {
            let build = BuildLib::user(&toolchain.resolve()?, &src, &bin);
            run_build(&build)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = Config::load(path.as_deref()).context("failed to load configuration")?;
    Ok(config)
}

fn run_ingest(args: IngestArgs) -> Result<()> {
    let config = load_config(args.config)?;
    let defaults = config.ingest;

    let start = match args.start {
        Some(s) => parse_date("start", &s)?,
        None => defaults.start_date()?,
    };
    let end = match args.end {
        Some(s) => parse_date("end", &s)?,
        None => defaults.end_date()?,
    };
    let symbol = args.symbol.unwrap_or(defaults.symbol);
    let database = args.database.unwrap_or(defaults.database);
    let table = args.table.unwrap_or(defaults.table);

    let request = IngestRequest::new(&symbol, start, end, &table)?;

    let provider: Box<dyn DataProvider> = match args.csv {
        Some(path) => Box::new(CsvProvider::new(path)),
        None => {
            let mut provider_config = config.provider;
            if let Some(secs) = args.timeout_secs {
                provider_config.timeout_secs = secs;
            }
            Box::new(YahooProvider::new(&provider_config)?)
        }
    };

    let report = ingest(provider.as_ref(), &database, &request).with_context(|| {
        format!(
            "failed to ingest {} into {}",
            request.symbol(),
            database.display()
        )
    })?;

    println!(
        "Data saved to {} (table {}): {} rows for {}",
        report.database.display(),
        report.table,
        report.rows,
        report.symbol
    );
    Ok(())
}

fn run_status(
    database: Option<PathBuf>,
    table: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let defaults = load_config(config)?.ingest;
    let database = database.unwrap_or(defaults.database);
    let table = table.unwrap_or(defaults.table);

    if !database.is_file() {
        println!("Database does not exist: {}", database.display());
        return Ok(());
    }

    let store = SqliteStore::open(&database)
        .with_context(|| format!("failed to open {}", database.display()))?;
    let summary = store.table_summary(&table)?;
    store.close()?;

    let Some(summary) = summary else {
        println!("Table '{table}' not found in {}", database.display());
        return Ok(());
    };

    println!("Database: {}", database.display());
    println!("Table:    {table}");
    println!("Rows:     {}", summary.rows);
    println!("Symbols:  {}", summary.symbols.join(", "));
    if let (Some(first), Some(last)) = (summary.first_timestamp, summary.last_timestamp) {
        println!("Range:    {} to {}", format_day(first), format_day(last));
    }
    Ok(())
}

fn format_day(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn run_build(build: &BuildLib) -> Result<()> {
    let artifact = build
        .run()
        .with_context(|| format!("failed to compile {}", build.source.display()))?;
    println!(
        "Successfully compiled {}: {}",
        build.kind.label(),
        artifact.display()
    );
    Ok(())
}
