use std::fs::File;
use std::io::BufWriter;

use storemetrics_warehouse::{Warehouse, WarehouseSession};

use crate::cli::QueryArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &QueryArgs, warehouse: Warehouse) -> Result<CommandResult, CliError> {
    let session = WarehouseSession::new(warehouse);
    let nested = session.query_facts(&args.metric, &args.site, &args.period, args.date)?;

    let mut warnings = Vec::new();
    if nested.is_empty() {
        warnings.push(String::from("no facts matched the query"));
    }

    let data = if args.flat || args.csv.is_some() {
        let table = session.to_table(&nested);
        if let Some(path) = &args.csv {
            table.write_csv(BufWriter::new(File::create(path)?))?;
            tracing::info!(rows = table.len(), path = %path.display(), "wrote query results");
        }
        if args.flat {
            serde_json::to_value(&table.rows)?
        } else {
            serde_json::to_value(&nested)?
        }
    } else {
        serde_json::to_value(&nested)?
    };

    Ok(CommandResult::ok(data).with_warnings(warnings))
}
