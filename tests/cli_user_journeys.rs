//! Behavior-driven tests for CLI user journeys
//!
//! These tests run the `storemetrics` binary against a throwaway warehouse
//! file and check what the user sees on stdout and in the exit code.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

fn storemetrics(database: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_storemetrics"))
        .arg("--database")
        .arg(database)
        .args(args)
        .env("RUST_LOG", "warn")
        .env_remove("MOTHERDUCK_TOKEN")
        .output()
        .expect("run storemetrics")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// =============================================================================
// CLI User Journey: Setup
// =============================================================================

#[test]
fn user_can_initialize_a_warehouse_and_list_default_metrics() {
    // Given: No warehouse file yet
    let temp = tempdir().expect("tempdir");
    let database = temp.path().join("warehouse.duckdb");

    // When: They run init, then metrics
    let init = storemetrics(&database, &["init"]);
    let metrics = storemetrics(&database, &["metrics"]);

    // Then: The schema is created and nine metrics are listed
    assert!(init.status.success());
    let init = stdout_json(&init);
    assert_eq!(init["data"]["schema"]["tables_created"], true);
    assert_eq!(init["data"]["schema"]["metrics_seeded"], 9);
    assert_eq!(init["meta"]["backend"], "embedded");

    assert!(metrics.status.success());
    assert_eq!(stdout_json(&metrics)["data"]["count"], 9);
}

#[test]
fn user_sees_validation_fail_on_an_empty_warehouse() {
    // Given: A freshly initialized warehouse
    let temp = tempdir().expect("tempdir");
    let database = temp.path().join("warehouse.duckdb");

    // When: They validate it
    let output = storemetrics(&database, &["validate"]);

    // Then: The command exits with code 3 and reports the failure
    assert_eq!(output.status.code(), Some(3));
    let body = stdout_json(&output);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["errors"][0]["code"], "integrity_check_failed");
}

// =============================================================================
// CLI User Journey: Ingest and Query
// =============================================================================

#[test]
fn user_can_ingest_roll_up_and_query_yearly_sales() {
    // Given: A retail CSV export
    let temp = tempdir().expect("tempdir");
    let database = temp.path().join("warehouse.duckdb");
    let source = temp.path().join("retail.csv");
    fs::write(
        &source,
        "SITE_ID,SITE_NAME,COMMAND_NAME,SALE_DATE,EXTENSION_AMOUNT,QTY,RETURN_IND\n\
         1100,HHM MAIN STORE,HENDERSON HALL,01/02/25,40.00,1,N\n\
         1100,HHM MAIN STORE,HENDERSON HALL,06/15/25,60.00,3,N\n",
    )
    .expect("write csv");

    // When: They ingest with a yearly rollup and query the year
    let ingest = storemetrics(
        &database,
        &[
            "ingest",
            "--path",
            source.to_str().expect("utf8 path"),
            "--rollup",
            "yearly",
        ],
    );
    let query = storemetrics(
        &database,
        &[
            "query", "--metric", "1", "--site", "1100", "--period", "4", "--date", "2025-06-15",
        ],
    );

    // Then: The yearly total is the sum of both days
    assert!(ingest.status.success());
    let ingest = stdout_json(&ingest);
    assert_eq!(ingest["data"]["ingestion"]["facts_inserted"], 2);
    assert_eq!(ingest["data"]["integrity_valid"], true);

    assert!(query.status.success());
    let year = &stdout_json(&query)["data"]["result"]["1"]["1100"]["2025"];
    assert_eq!(year["value"], 100.0);
    assert_eq!(year["count"], 4);
}

#[test]
fn user_gets_a_warning_when_nothing_matches() {
    // Given: An empty warehouse
    let temp = tempdir().expect("tempdir");
    let database = temp.path().join("warehouse.duckdb");

    // When: They query a date with no facts
    let output = storemetrics(
        &database,
        &["query", "--metric", "1", "--period", "4", "--date", "2025-06-15"],
    );

    // Then: The result is empty and a warning explains why
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["data"], serde_json::json!({"result": {}}));
    assert_eq!(body["meta"]["warnings"][0], "no facts matched the query");
}
