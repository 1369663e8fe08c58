use storemetrics_warehouse::models::{TOTAL_RETURNS, TOTAL_SALES};
use storemetrics_warehouse::{IngestionManager, PeriodType, Warehouse};

use crate::cli::IngestArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &IngestArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let manager = IngestionManager::new(warehouse);
    let report = manager.load_retail_data(args.path.as_deref())?;

    let mut rollups = Vec::new();
    for level in &args.rollup {
        for metric_id in [TOTAL_SALES, TOTAL_RETURNS] {
            rollups.push(manager.rollup(metric_id, PeriodType::from(*level))?);
        }
    }

    let valid = manager.validate_data_integrity();
    let warnings = report.failures.clone();
    let result = CommandResult::ok(serde_json::json!({
        "ingestion": report,
        "rollups": rollups,
        "integrity_valid": valid,
    }))
    .with_warnings(warnings);

    if valid {
        Ok(result)
    } else {
        Ok(result.with_warning("data integrity check found empty tables after ingestion"))
    }
}
