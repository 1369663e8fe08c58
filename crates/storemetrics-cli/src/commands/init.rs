use storemetrics_warehouse::{Warehouse, WarehouseConfig};

use crate::error::CliError;

use super::CommandResult;

pub fn run(config: WarehouseConfig) -> Result<CommandResult, CliError> {
    let warehouse = Warehouse::connect(config)?;
    let status = warehouse.initialize_schema()?;
    let counts = warehouse.table_counts()?;

    Ok(CommandResult::ok(serde_json::json!({
        "schema": status,
        "tables": counts,
    })))
}
