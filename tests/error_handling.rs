//! Behavior-driven tests for error handling
//!
//! These tests verify that invalid configuration, queries, and inputs are
//! rejected with a specific error instead of silently producing data.

use std::fs;

use storemetrics_warehouse::{
    BackendKind, IngestionManager, Warehouse, WarehouseConfig, WarehouseError, WarehouseSession,
};
use tempfile::tempdir;
use time::macros::date;

// =============================================================================
// Errors: Configuration
// =============================================================================

#[test]
fn when_descriptor_is_empty_configuration_is_rejected() {
    let error = WarehouseConfig::from_descriptor("   ").expect_err("empty descriptor");
    assert!(matches!(error, WarehouseError::InvalidConfig(_)));
}

#[test]
fn when_cloud_database_name_is_not_an_identifier_configuration_is_rejected() {
    let error = WarehouseConfig::resolve_with(Some("md:retail;DROP"), &|_| None)
        .expect_err("invalid name");
    assert!(matches!(error, WarehouseError::InvalidConfig(_)));
}

#[test]
fn when_cloud_token_is_present_the_cloud_backend_is_selected() {
    let env = |key: &str| match key {
        "MOTHERDUCK_TOKEN" => Some("secret-token".to_string()),
        "STOREMETRICS_CLOUD_DATABASE" => Some("retail".to_string()),
        _ => None,
    };

    let config = WarehouseConfig::resolve_with(None, &env).expect("resolve");

    assert_eq!(config.backend_kind(), BackendKind::Cloud);
    assert!(!format!("{config:?}").contains("secret-token"));
}

#[test]
fn when_embedded_path_is_a_directory_connecting_fails_with_backend_named() {
    // Given: A path that is a directory, not a database file
    let temp = tempdir().expect("tempdir");

    // When: Connecting to it
    let error = Warehouse::connect(WarehouseConfig::embedded(temp.path()))
        .err()
        .expect("connect should fail");

    // Then: The failure is a connectivity error naming the embedded backend
    match error {
        WarehouseError::Connectivity { backend, .. } => {
            assert_eq!(backend, BackendKind::Embedded);
        }
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Errors: Queries
// =============================================================================

#[test]
fn when_period_level_is_unknown_the_query_is_rejected() {
    let session =
        WarehouseSession::new(Warehouse::open(WarehouseConfig::in_memory()).expect("open"));

    let error = session
        .query_facts(&[1], &[], &[9], date!(2025 - 06 - 15))
        .expect_err("unknown level");

    assert!(matches!(error, WarehouseError::InvalidQuery(_)));
    assert!(error.to_string().contains("unknown period level 9"));
}

#[test]
fn when_query_lists_are_empty_the_result_is_empty() {
    let session =
        WarehouseSession::new(Warehouse::open(WarehouseConfig::in_memory()).expect("open"));

    let result = session
        .query_facts(&[], &[], &[4], date!(2025 - 06 - 15))
        .expect("query");

    assert!(result.is_empty());
}

// =============================================================================
// Errors: Ingestion Sources
// =============================================================================

#[test]
fn when_source_has_an_unknown_extension_ingestion_is_rejected() {
    let temp = tempdir().expect("tempdir");
    let source = temp.path().join("retail.json");
    fs::write(&source, "[]").expect("write");
    let warehouse = Warehouse::open(WarehouseConfig::in_memory()).expect("open");

    let error = IngestionManager::new(&warehouse)
        .load_retail_data(Some(source.as_path()))
        .expect_err("unsupported");

    assert!(matches!(error, WarehouseError::UnsupportedFormat(_)));
}

#[test]
fn when_source_lacks_required_columns_ingestion_fails_without_facts() {
    // Given: A CSV without the retail columns
    let temp = tempdir().expect("tempdir");
    let source = temp.path().join("retail.csv");
    fs::write(&source, "A,B\n1,2\n").expect("write");
    let warehouse = Warehouse::open(WarehouseConfig::in_memory()).expect("open");

    // When: Ingesting it
    let result = IngestionManager::new(&warehouse).load_retail_data(Some(source.as_path()));

    // Then: The engine error surfaces and nothing is stored
    assert!(matches!(result, Err(WarehouseError::DuckDb(_))));
    assert_eq!(warehouse.table_counts().expect("counts").facts, 0);
}
