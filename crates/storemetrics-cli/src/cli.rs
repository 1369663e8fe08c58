//! CLI argument definitions for storemetrics.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Create the warehouse schema and seed default metrics |
//! | `ingest` | Load retail transactions as daily facts, optionally roll them up |
//! | `query` | Query facts for a date, nested or flat |
//! | `metrics` | List stored metrics |
//! | `validate` | Check that metrics, dimensions, and facts are populated |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--database` | environment | Warehouse descriptor (path, `:memory:`, `md:<db>`) |
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! storemetrics init
//! storemetrics ingest --path data/convertedcsv/MCCS_RetailData.csv --rollup monthly,yearly
//! storemetrics query --metric 1 --site 1100 --period 4 --date 2025-06-15 --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use storemetrics_warehouse::PeriodType;
use time::Date;

/// Star-schema retail metrics warehouse
#[derive(Debug, Parser)]
#[command(
    name = "storemetrics",
    author,
    version,
    about = "Star-schema retail metrics warehouse",
    long_about = "storemetrics loads retail transactions into a DuckDB star schema \
(metrics, dimensions, facts) and answers period-scoped queries for reporting.\n\
\n\
The warehouse is a local DuckDB file by default. Set MOTHERDUCK_TOKEN to use a \
MotherDuck cloud database instead, or pass --database explicitly."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Warehouse descriptor: a DuckDB file path, `:memory:`, or `md:<database>`.
    ///
    /// Defaults to the cloud backend when MOTHERDUCK_TOKEN is set, otherwise
    /// to `$STOREMETRICS_HOME/warehouse.duckdb`.
    #[arg(long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object output.
    Json,
    /// Human-readable layout for terminal display.
    Table,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the schema if missing and seed default metrics.
    Init,

    /// Load retail transactions into the warehouse.
    ///
    /// # Examples
    ///
    ///   storemetrics ingest
    ///   storemetrics ingest --path sales.parquet --rollup monthly,quarterly,yearly
    Ingest(IngestArgs),

    /// Query facts whose period contains a date.
    ///
    /// # Examples
    ///
    ///   storemetrics query --metric 1 --site 1100 --period 4 --date 2025-06-15
    ///   storemetrics query --metric 1 3 --period 1 2 --date 2025-06-15 --flat
    Query(QueryArgs),

    /// List stored metrics.
    Metrics,

    /// Check that metrics, dimensions, and facts are populated.
    ///
    /// Exits with code 3 when any of them is empty.
    Validate,
}

/// Arguments for the `ingest` command.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Retail data file (`.parquet` or `.csv`); the default locations are
    /// probed when omitted.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Period levels to roll daily facts up into after loading.
    #[arg(long, value_enum, value_delimiter = ',')]
    pub rollup: Vec<RollupLevel>,
}

/// Rollup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RollupLevel {
    Monthly,
    Quarterly,
    Yearly,
}

impl From<RollupLevel> for PeriodType {
    fn from(level: RollupLevel) -> Self {
        match level {
            RollupLevel::Monthly => Self::Monthly,
            RollupLevel::Quarterly => Self::Quarterly,
            RollupLevel::Yearly => Self::Yearly,
        }
    }
}

/// Arguments for the `query` command.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Metric ids to return.
    #[arg(long, required = true, num_args = 1..)]
    pub metric: Vec<i64>,

    /// Site codes to restrict to; all sites when omitted.
    #[arg(long, num_args = 1..)]
    pub site: Vec<String>,

    /// Period levels: 1=daily, 2=monthly, 3=quarterly, 4=yearly.
    #[arg(long, required = true, num_args = 1..)]
    pub period: Vec<i32>,

    /// Date the period must contain (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    pub date: Date,

    /// Return one row per metric, site, and period instead of nested output.
    #[arg(long, default_value_t = false)]
    pub flat: bool,

    /// Also write the flat table to this CSV file.
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

fn parse_date(value: &str) -> Result<Date, String> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(value, &format).map_err(|error| format!("expected YYYY-MM-DD: {error}"))
}
