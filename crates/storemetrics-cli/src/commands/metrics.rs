use storemetrics_warehouse::Warehouse;

use crate::error::CliError;

use super::CommandResult;

pub fn run(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let metrics = warehouse.list_metrics()?;
    Ok(CommandResult::ok(serde_json::json!({
        "count": metrics.len(),
        "metrics": metrics,
    })))
}
