use storemetrics_warehouse::{IngestionManager, Warehouse};

use crate::error::CliError;
use crate::metadata::EnvelopeError;

use super::CommandResult;

pub fn run(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let valid = IngestionManager::new(warehouse).validate_data_integrity();
    let counts = warehouse.table_counts()?;
    let result = CommandResult::ok(serde_json::json!({
        "valid": valid,
        "tables": counts,
    }));

    if valid {
        Ok(result)
    } else {
        Ok(result.with_error(EnvelopeError::new(
            "integrity_check_failed",
            "metrics, dimensions, and facts must each contain at least one row",
        )))
    }
}
