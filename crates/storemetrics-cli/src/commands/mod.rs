mod ingest;
mod init;
mod metrics;
mod query;
mod validate;

use std::time::Instant;

use serde_json::Value;
use storemetrics_warehouse::{Warehouse, WarehouseConfig};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, EnvelopeError, Metadata};

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_error(mut self, error: EnvelopeError) -> Self {
        self.errors.push(error);
        self
    }
}

pub fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let started = Instant::now();
    let config = WarehouseConfig::resolve(cli.database.as_deref())?;
    let backend = config.backend_kind();

    let CommandResult {
        data,
        warnings,
        errors,
    } = match &cli.command {
        Command::Init => init::run(config)?,
        Command::Ingest(args) => ingest::run(args, &Warehouse::open(config)?)?,
        Command::Query(args) => query::run(args, Warehouse::open(config)?)?,
        Command::Metrics => metrics::run(&Warehouse::open(config)?)?,
        Command::Validate => validate::run(&Warehouse::open(config)?)?,
    };

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = Metadata::new(command_name(&cli.command), backend.as_str(), latency_ms);
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope { meta, data, errors })
}

const fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Init => "init",
        Command::Ingest(_) => "ingest",
        Command::Query(_) => "query",
        Command::Metrics => "metrics",
        Command::Validate => "validate",
    }
}
