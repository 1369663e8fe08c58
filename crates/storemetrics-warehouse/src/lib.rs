//! # Storemetrics Warehouse
//!
//! DuckDB-backed star-schema warehouse for retail and marketing metrics.
//!
//! ## Overview
//!
//! Measurements are stored as facts: one aggregated value of a metric over a
//! period, tagged by one or more dimensions (a site, a command, ...). The
//! crate owns the engine lifecycle, the schema, retail ingestion, and the
//! period-scoped queries that report generators consume.
//!
//! ### Features
//!
//! - **Two backends**: a local DuckDB file, or a MotherDuck cloud database
//! - **Explicit initialization**: schema creation and metric seeding are an
//!   idempotent step separate from connecting
//! - **Atomic fact inserts**: a fact and all of its dimension links commit
//!   together or not at all
//! - **Streaming ingestion**: parquet/CSV sources are read through DuckDB
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storemetrics_warehouse::{Warehouse, WarehouseConfig, WarehouseSession};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::resolve(None)?)?;
//!     let session = WarehouseSession::new(warehouse);
//!
//!     let date = time::Date::from_calendar_date(2025, time::Month::June, 15)?;
//!     let result = session.query_facts(&[1], &[String::from("1100")], &[4], date)?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `metrics` | Measurable quantities, keyed by a stable `metric_id` |
//! | `dimensions` | Categorical values, unique by `(dimension_type, dimension_code)` |
//! | `facts` | Aggregated measurements over a period |
//! | `fact_dimensions` | Many-to-many links between facts and dimensions |
//! | `schema_migrations` | Applied migration versions |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_fact_dimensions` | Facts joined with their metric and dimensions |
//! | `vw_site_daily_facts` | Daily site-tagged facts, the input of rollups |

pub mod config;
pub mod duckdb;
mod error;
pub mod ingest;
pub mod migrations;
pub mod models;
pub mod period;
pub mod session;
pub mod views;

use std::collections::{BTreeMap, HashSet};
use std::fs;

use ::duckdb::{Connection, ToSql};
use serde::Serialize;
use serde_json::{Map, Value};

pub use config::{Backend, BackendKind, CloudConfig, WarehouseConfig};
pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};
pub use error::WarehouseError;
pub use ingest::{IngestionManager, IngestionReport, RollupReport};
pub use models::{
    Dimension, Fact, FactDimension, Metric, MetricDataType, MetricDefinition, NewFact, PeriodType,
    TableCounts,
};
pub use period::Period;
pub use session::{FactTable, FlatRow, NestedResult, WarehouseSession};

/// A session-scoped connection handed out by [`Warehouse::session`].
pub type Session = PooledConnection;

/// Outcome of [`Warehouse::initialize_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchemaStatus {
    pub backend: BackendKind,
    /// True when the required tables did not exist before this call.
    pub tables_created: bool,
    pub migrations_applied: usize,
    pub metrics_seeded: usize,
}

/// Filters for [`Warehouse::query_facts`].
#[derive(Debug, Clone, PartialEq)]
pub struct FactQuery {
    pub metric_ids: Vec<i64>,
    /// Site codes; empty means every dimension.
    pub group_names: Vec<String>,
    pub period_types: Vec<PeriodType>,
    /// `YYYYMMDD`; a fact matches when its period contains this date.
    pub exact_date: String,
}

/// One fact as seen through one of its dimensions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRow {
    pub metric_id: i64,
    pub metric_name: String,
    pub metric_description: String,
    pub site_id: String,
    pub site_name: String,
    pub command_name: String,
    pub store_format: String,
    pub period_key: String,
    pub value: f64,
    pub count: i64,
}

/// Query rows grouped by metric id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactQueryResult {
    pub result: BTreeMap<i64, Vec<FactRow>>,
}

impl FactQueryResult {
    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.result.values().map(Vec::len).sum()
    }
}

/// The warehouse connection manager.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Connect and initialize the schema using the resolved default
    /// configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::resolve(None)?)
    }

    /// Connect, then run [`Warehouse::initialize_schema`].
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        let warehouse = Self::connect(config)?;
        warehouse.initialize_schema()?;
        Ok(warehouse)
    }

    /// Open the backing engine and verify it is reachable.
    ///
    /// Does not create tables; see [`Warehouse::initialize_schema`].
    pub fn connect(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        let kind = config.backend_kind();
        tracing::info!(backend = %kind, "initializing warehouse connection");

        if let Backend::Embedded { db_path } = &config.backend {
            if !config.backend.is_in_memory() {
                if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let manager = DuckDbConnectionManager::open(config.backend.clone(), config.max_pool_size)
            .map_err(|error| connectivity(kind, &error))?;

        if kind == BackendKind::Cloud {
            let connection = manager
                .acquire()
                .map_err(|error| connectivity(kind, &error))?;
            connection
                .query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
                .map_err(|error| connectivity(kind, &error))?;
        }

        tracing::info!(backend = %kind, "connected to warehouse");
        Ok(Self { config, manager })
    }

    /// Create the schema if absent and seed any missing default metrics.
    ///
    /// Safe to call repeatedly; failures are fatal and propagate.
    pub fn initialize_schema(&self) -> Result<SchemaStatus, WarehouseError> {
        let connection = self.manager.acquire()?;
        let tables_existed = migrations::required_tables_exist(&connection)?;
        if !tables_existed {
            tracing::info!(backend = %self.backend_kind(), "creating warehouse tables");
        }

        let applied = migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        let metrics_seeded = seed_metrics(&connection, &models::default_metrics())?;
        if metrics_seeded > 0 {
            tracing::info!(count = metrics_seeded, "initialized default metrics");
        }

        Ok(SchemaStatus {
            backend: self.backend_kind(),
            tables_created: !tables_existed,
            migrations_applied: applied.len(),
            metrics_seeded,
        })
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.config.backend_kind()
    }

    /// A connection for a sequence of reads.
    pub fn session(&self) -> Result<Session, WarehouseError> {
        Ok(self.manager.acquire()?)
    }

    /// Identifier of the `(dimension_type, dimension_code)` dimension,
    /// creating it when absent.
    ///
    /// A concurrent creator of the same pair may win the race; the loser's
    /// insert is rolled back and its error returned without retrying.
    pub fn get_dimension_id(
        &self,
        dimension_type: &str,
        dimension_code: &str,
        dimension_name: &str,
        metadata: Option<&Map<String, Value>>,
    ) -> Result<i64, WarehouseError> {
        let connection = self.manager.acquire()?;
        if let Some(dimension) = find_dimension(&connection, dimension_type, dimension_code)? {
            return Ok(dimension.id);
        }

        let metadata_text = match metadata {
            Some(map) if !map.is_empty() => Some(serde_json::to_string(map)?),
            _ => None,
        };

        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<i64, WarehouseError> {
            let params: [&dyn ToSql; 4] = [
                &dimension_type,
                &dimension_code,
                &dimension_name,
                &metadata_text,
            ];
            let id = connection.query_row(
                "INSERT INTO dimensions \
                 (dimension_type, dimension_code, dimension_name, dimension_metadata) \
                 VALUES (?, ?, ?, ?) RETURNING id",
                params.as_slice(),
                |row| row.get(0),
            )?;
            Ok(id)
        })();

        match finalize_transaction(&connection, result) {
            Ok(id) => {
                tracing::info!(dimension_type, dimension_code, id, "created dimension");
                Ok(id)
            }
            Err(error) => {
                tracing::error!(dimension_type, dimension_code, %error, "failed to create dimension");
                Err(error)
            }
        }
    }

    /// Look up a dimension without creating it.
    pub fn find_dimension(
        &self,
        dimension_type: &str,
        dimension_code: &str,
    ) -> Result<Option<Dimension>, WarehouseError> {
        let connection = self.manager.acquire()?;
        find_dimension(&connection, dimension_type, dimension_code)
    }

    /// Insert a fact and one link per dimension id as a single unit.
    ///
    /// Either the fact and every link persist, or nothing does.
    pub fn insert_fact(&self, fact: &NewFact) -> Result<i64, WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<i64, WarehouseError> {
            let period_code = fact.period_type.code();
            let params: [&dyn ToSql; 7] = [
                &fact.metric_id,
                &period_code,
                &fact.period_start,
                &fact.period_end,
                &fact.period_key,
                &fact.value,
                &fact.count,
            ];
            let fact_id: i64 = connection.query_row(
                "INSERT INTO facts \
                 (metric_id, period_type, period_start, period_end, period_key, value, count) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
                params.as_slice(),
                |row| row.get(0),
            )?;

            for dimension_id in &fact.dimension_ids {
                let params: [&dyn ToSql; 1] = [dimension_id];
                let exists: i64 = connection.query_row(
                    "SELECT COUNT(*) FROM dimensions WHERE id = ?",
                    params.as_slice(),
                    |row| row.get(0),
                )?;
                if exists == 0 {
                    return Err(WarehouseError::UnknownDimension(*dimension_id));
                }

                let params: [&dyn ToSql; 2] = [&fact_id, dimension_id];
                connection.execute(
                    "INSERT INTO fact_dimensions (fact_id, dimension_id) VALUES (?, ?)",
                    params.as_slice(),
                )?;
            }

            Ok(fact_id)
        })();

        match finalize_transaction(&connection, result) {
            Ok(fact_id) => {
                tracing::debug!(
                    fact_id,
                    metric_id = fact.metric_id,
                    value = fact.value,
                    dimensions = ?fact.dimension_ids,
                    "inserted fact"
                );
                Ok(fact_id)
            }
            Err(error) => {
                tracing::error!(metric_id = fact.metric_id, %error, "failed to insert fact");
                Err(error)
            }
        }
    }

    /// Links from a fact to its dimensions, by ascending dimension id.
    pub fn fact_dimensions(&self, fact_id: i64) -> Result<Vec<FactDimension>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT id, fact_id, dimension_id FROM fact_dimensions \
             WHERE fact_id = ? ORDER BY dimension_id",
        )?;
        let params: [&dyn ToSql; 1] = [&fact_id];
        let links = statement
            .query_map(params.as_slice(), |row| {
                Ok(FactDimension {
                    id: row.get(0)?,
                    fact_id: row.get(1)?,
                    dimension_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Dimension ids linked to a fact, ascending.
    pub fn fact_dimension_ids(&self, fact_id: i64) -> Result<Vec<i64>, WarehouseError> {
        Ok(self
            .fact_dimensions(fact_id)?
            .into_iter()
            .map(|link| link.dimension_id)
            .collect())
    }

    /// Every fact linked to `dimension_id`, earliest period first.
    pub fn facts_for_dimension(&self, dimension_id: i64) -> Result<Vec<Fact>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT f.id, f.metric_id, f.period_type, f.period_start, f.period_end, \
             f.period_key, f.value, f.count \
             FROM facts f JOIN fact_dimensions fd ON fd.fact_id = f.id \
             WHERE fd.dimension_id = ? \
             ORDER BY f.period_start, f.period_type, f.id",
        )?;
        let params: [&dyn ToSql; 1] = [&dimension_id];
        let mut rows = statement.query(params.as_slice())?;

        let mut facts = Vec::new();
        while let Some(row) = rows.next()? {
            facts.push(Fact {
                id: row.get(0)?,
                metric_id: row.get(1)?,
                period_type: PeriodType::from_code(row.get(2)?)?,
                period_start: row.get(3)?,
                period_end: row.get(4)?,
                period_key: row.get(5)?,
                value: row.get(6)?,
                count: row.get(7)?,
            });
        }
        Ok(facts)
    }

    /// Facts whose period contains `query.exact_date`, grouped by metric.
    ///
    /// Repeated `(period_key, site_id)` pairs within a metric keep their first
    /// occurrence. No matching rows is an empty result, not an error.
    pub fn query_facts(
        &self,
        session: &Connection,
        query: &FactQuery,
    ) -> Result<FactQueryResult, WarehouseError> {
        period::parse_period_date(&query.exact_date)
            .map_err(|error| WarehouseError::InvalidQuery(error.to_string()))?;

        if query.metric_ids.is_empty() || query.period_types.is_empty() {
            return Ok(FactQueryResult::default());
        }

        let period_codes: Vec<i32> = query.period_types.iter().map(|p| p.code()).collect();

        let mut sql = format!(
            "SELECT metric_id, metric_name, metric_desc, period_key, value, count, \
             dimension_code, dimension_name, dimension_metadata \
             FROM vw_fact_dimensions \
             WHERE metric_id IN ({}) AND period_type IN ({}) \
             AND period_start <= ? AND period_end >= ?",
            placeholders(query.metric_ids.len()),
            placeholders(period_codes.len()),
        );

        let mut params: Vec<&dyn ToSql> = Vec::new();
        params.extend(query.metric_ids.iter().map(|id| id as &dyn ToSql));
        params.extend(period_codes.iter().map(|code| code as &dyn ToSql));
        params.push(&query.exact_date);
        params.push(&query.exact_date);

        if !query.group_names.is_empty() {
            sql.push_str(&format!(
                " AND dimension_type = 'site' AND dimension_code IN ({})",
                placeholders(query.group_names.len())
            ));
            params.extend(query.group_names.iter().map(|name| name as &dyn ToSql));
        }
        sql.push_str(" ORDER BY metric_id, fact_id, dimension_id");

        let mut statement = session.prepare(&sql)?;
        let mut rows = statement.query(params.as_slice())?;

        let mut output = FactQueryResult::default();
        let mut seen: HashSet<(i64, String, String)> = HashSet::new();
        while let Some(row) = rows.next()? {
            let metric_id: i64 = row.get(0)?;
            let metric_name: String = row.get(1)?;
            let metric_desc: Option<String> = row.get(2)?;
            let period_key: String = row.get(3)?;
            let value: f64 = row.get(4)?;
            let count: i64 = row.get(5)?;
            let site_id: String = row.get(6)?;
            let site_name: String = row.get(7)?;
            let metadata: Option<String> = row.get(8)?;

            if !seen.insert((metric_id, period_key.clone(), site_id.clone())) {
                continue;
            }

            let metadata = models::parse_metadata(metadata.as_deref());
            output.result.entry(metric_id).or_default().push(FactRow {
                metric_id,
                metric_name,
                metric_description: metric_desc.unwrap_or_default(),
                site_id,
                site_name,
                command_name: metadata_text(&metadata, "command_name"),
                store_format: metadata_text(&metadata, "store_format"),
                period_key,
                value,
                count,
            });
        }

        if output.is_empty() {
            tracing::warn!(
                metric_ids = ?query.metric_ids,
                exact_date = %query.exact_date,
                "no facts matched query"
            );
        }
        Ok(output)
    }

    /// Insert a metric, or update its name, description, and data type.
    pub fn upsert_metric(&self, metric: &MetricDefinition) -> Result<i64, WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<i64, WarehouseError> {
            let data_type = metric.data_type.as_str();
            let params: [&dyn ToSql; 4] = [
                &metric.metric_name,
                &metric.metric_desc,
                &data_type,
                &metric.metric_id,
            ];
            let updated = connection.execute(
                "UPDATE metrics SET metric_name = ?, metric_desc = ?, data_type = ? \
                 WHERE metric_id = ?",
                params.as_slice(),
            )?;
            if updated == 0 {
                insert_metric(&connection, metric)?;
            }

            let params: [&dyn ToSql; 1] = [&metric.metric_id];
            let id = connection.query_row(
                "SELECT id FROM metrics WHERE metric_id = ?",
                params.as_slice(),
                |row| row.get(0),
            )?;
            Ok(id)
        })();

        finalize_transaction(&connection, result)
    }

    /// Every stored metric, ordered by `metric_id`.
    pub fn list_metrics(&self) -> Result<Vec<Metric>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT id, metric_id, metric_name, metric_desc, data_type \
             FROM metrics ORDER BY metric_id",
        )?;
        let mut rows = statement.query([])?;

        let mut metrics = Vec::new();
        while let Some(row) = rows.next()? {
            let data_type: String = row.get(4)?;
            metrics.push(Metric {
                id: row.get(0)?,
                metric_id: row.get(1)?,
                metric_name: row.get(2)?,
                metric_desc: row.get(3)?,
                data_type: MetricDataType::parse(&data_type)?,
            });
        }
        Ok(metrics)
    }

    /// Row counts of the schema tables.
    pub fn table_counts(&self) -> Result<TableCounts, WarehouseError> {
        let connection = self.manager.acquire()?;
        let count = |table: &str| -> Result<i64, WarehouseError> {
            // Table names come from the fixed list below.
            let sql = format!("SELECT COUNT(*) FROM {table}");
            Ok(connection.query_row(sql.as_str(), [], |row| row.get(0))?)
        };

        Ok(TableCounts {
            metrics: count("metrics")?,
            dimensions: count("dimensions")?,
            facts: count("facts")?,
            fact_dimensions: count("fact_dimensions")?,
        })
    }
}

fn connectivity(backend: BackendKind, error: &::duckdb::Error) -> WarehouseError {
    WarehouseError::Connectivity {
        backend,
        message: error.to_string(),
    }
}

fn find_dimension(
    connection: &Connection,
    dimension_type: &str,
    dimension_code: &str,
) -> Result<Option<Dimension>, WarehouseError> {
    let mut statement = connection.prepare(
        "SELECT id, dimension_type, dimension_code, dimension_name, dimension_metadata \
         FROM dimensions WHERE dimension_type = ? AND dimension_code = ?",
    )?;
    let params: [&dyn ToSql; 2] = [&dimension_type, &dimension_code];
    let mut rows = statement.query(params.as_slice())?;

    match rows.next()? {
        Some(row) => Ok(Some(Dimension {
            id: row.get(0)?,
            dimension_type: row.get(1)?,
            dimension_code: row.get(2)?,
            dimension_name: row.get(3)?,
            dimension_metadata: row.get(4)?,
        })),
        None => Ok(None),
    }
}

/// Insert the definitions whose `metric_id` is not stored yet.
fn seed_metrics(
    connection: &Connection,
    metrics: &[MetricDefinition],
) -> Result<usize, WarehouseError> {
    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = (|| -> Result<usize, WarehouseError> {
        let mut seeded = 0;
        for metric in metrics {
            let params: [&dyn ToSql; 1] = [&metric.metric_id];
            let existing: i64 = connection.query_row(
                "SELECT COUNT(*) FROM metrics WHERE metric_id = ?",
                params.as_slice(),
                |row| row.get(0),
            )?;
            if existing == 0 {
                insert_metric(connection, metric)?;
                seeded += 1;
            }
        }
        Ok(seeded)
    })();

    finalize_transaction(connection, result)
}

fn insert_metric(connection: &Connection, metric: &MetricDefinition) -> Result<(), WarehouseError> {
    let data_type = metric.data_type.as_str();
    let params: [&dyn ToSql; 4] = [
        &metric.metric_id,
        &metric.metric_name,
        &metric.metric_desc,
        &data_type,
    ];
    connection.execute(
        "INSERT INTO metrics (metric_id, metric_name, metric_desc, data_type) \
         VALUES (?, ?, ?, ?)",
        params.as_slice(),
    )?;
    Ok(())
}

/// Finalize a transaction, committing on success or rolling back on failure.
pub(crate) fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => match connection.execute_batch("COMMIT") {
            Ok(()) => Ok(value),
            Err(error) => {
                let _ = connection.execute_batch("ROLLBACK");
                Err(error.into())
            }
        },
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn metadata_text(metadata: &Map<String, Value>, key: &str) -> String {
    match metadata.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Escape a string for inclusion in a SQL string literal.
///
/// Only used for file paths handed to `DuckDB` table functions, which do not
/// accept bound parameters.
pub(crate) fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn warehouse() -> Warehouse {
        Warehouse::open(WarehouseConfig::in_memory()).expect("warehouse open")
    }

    fn site(warehouse: &Warehouse, code: &str, name: &str) -> i64 {
        let mut metadata = Map::new();
        metadata.insert("command_name".into(), Value::from("HENDERSON HALL"));
        metadata.insert("store_format".into(), Value::from("MAIN STORE"));
        warehouse
            .get_dimension_id("site", code, name, Some(&metadata))
            .expect("dimension")
    }

    fn yearly(metric_id: i64, dimension_ids: Vec<i64>, value: f64) -> NewFact {
        NewFact {
            metric_id,
            dimension_ids,
            period_type: PeriodType::Yearly,
            period_start: String::from("20250101"),
            period_end: String::from("20251231"),
            period_key: String::from("2025"),
            value,
            count: 1000,
        }
    }

    #[test]
    fn initializes_tables_and_seeds_metrics_once() {
        let temp = tempdir().expect("tempdir");
        let config = WarehouseConfig::embedded(temp.path().join("nested").join("wh.duckdb"));

        let warehouse = Warehouse::connect(config).expect("connect");
        let first = warehouse.initialize_schema().expect("first init");
        assert!(first.tables_created);
        assert_eq!(first.metrics_seeded, 9);

        let second = warehouse.initialize_schema().expect("second init");
        assert!(!second.tables_created);
        assert_eq!(second.metrics_seeded, 0);
        assert_eq!(second.migrations_applied, 0);
        assert_eq!(warehouse.table_counts().expect("counts").metrics, 9);
    }

    #[test]
    fn connect_does_not_create_tables() {
        let warehouse = Warehouse::connect(WarehouseConfig::in_memory()).expect("connect");
        let session = warehouse.session().expect("session");
        assert!(!migrations::required_tables_exist(&session).expect("introspect"));
    }

    #[test]
    fn dimension_lookup_is_idempotent() {
        let warehouse = warehouse();
        let first = site(&warehouse, "1100", "HHM MAIN STORE");
        let second = site(&warehouse, "1100", "renamed");
        assert_eq!(first, second);

        let stored = warehouse
            .find_dimension("site", "1100")
            .expect("lookup")
            .expect("present");
        assert_eq!(stored.dimension_name, "HHM MAIN STORE");
        assert_eq!(stored.metadata()["store_format"], "MAIN STORE");
    }

    #[test]
    fn empty_metadata_is_stored_as_null() {
        let warehouse = warehouse();
        warehouse
            .get_dimension_id("command", "HH", "HENDERSON HALL", Some(&Map::new()))
            .expect("dimension");
        let stored = warehouse
            .find_dimension("command", "HH")
            .expect("lookup")
            .expect("present");
        assert_eq!(stored.dimension_metadata, None);
    }

    #[test]
    fn insert_fact_links_every_dimension() {
        let warehouse = warehouse();
        let store = site(&warehouse, "1100", "HHM MAIN STORE");
        let command = warehouse
            .get_dimension_id("command", "HH", "HENDERSON HALL", None)
            .expect("command");

        let fact_id = warehouse
            .insert_fact(&yearly(1, vec![store, command], 10.0))
            .expect("insert");

        let mut expected = vec![store, command];
        expected.sort_unstable();
        assert_eq!(warehouse.fact_dimension_ids(fact_id).expect("links"), expected);
    }

    #[test]
    fn reads_back_facts_and_links_for_a_dimension() {
        let warehouse = warehouse();
        let store = site(&warehouse, "1100", "HHM MAIN STORE");
        let other = site(&warehouse, "5206", "CLM MARINE MART");

        let fact_id = warehouse
            .insert_fact(&yearly(1, vec![store], 42.5))
            .expect("insert");
        warehouse
            .insert_fact(&yearly(1, vec![other], 7.0))
            .expect("other");

        let facts = warehouse.facts_for_dimension(store).expect("facts");
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, fact_id);
        assert_eq!(facts[0].period_type, PeriodType::Yearly);
        assert_eq!(facts[0].period_key, "2025");
        assert_eq!(facts[0].value, 42.5);

        let links = warehouse.fact_dimensions(fact_id).expect("links");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].fact_id, fact_id);
        assert_eq!(links[0].dimension_id, store);
        assert!(warehouse.facts_for_dimension(9_999).expect("none").is_empty());
    }

    #[test]
    fn insert_fact_rolls_back_on_unknown_dimension() {
        let warehouse = warehouse();
        let store = site(&warehouse, "1100", "HHM MAIN STORE");

        let error = warehouse
            .insert_fact(&yearly(1, vec![store, 9_999], 10.0))
            .expect_err("unknown dimension");
        assert!(matches!(error, WarehouseError::UnknownDimension(9_999)));

        let counts = warehouse.table_counts().expect("counts");
        assert_eq!(counts.facts, 0);
        assert_eq!(counts.fact_dimensions, 0);
    }

    #[test]
    fn insert_fact_rejects_unknown_metric() {
        let warehouse = warehouse();
        let store = site(&warehouse, "1100", "HHM MAIN STORE");
        assert!(warehouse.insert_fact(&yearly(404, vec![store], 1.0)).is_err());
        assert_eq!(warehouse.table_counts().expect("counts").facts, 0);
    }

    #[test]
    fn query_filters_by_window_and_site() {
        let warehouse = warehouse();
        let main = site(&warehouse, "1100", "HHM MAIN STORE");
        let mart = site(&warehouse, "5206", "CLM MARINE MART");
        warehouse
            .insert_fact(&yearly(1, vec![main], 773_686.11))
            .expect("main");
        warehouse
            .insert_fact(&yearly(1, vec![mart], 616_489.05))
            .expect("mart");

        let session = warehouse.session().expect("session");
        let query = FactQuery {
            metric_ids: vec![1],
            group_names: vec![String::from("1100")],
            period_types: vec![PeriodType::Yearly],
            exact_date: String::from("20250615"),
        };
        let result = warehouse.query_facts(&session, &query).expect("query");
        assert_eq!(result.row_count(), 1);
        let row = &result.result[&1][0];
        assert_eq!(row.value, 773_686.11);
        assert_eq!(row.count, 1000);
        assert_eq!(row.command_name, "HENDERSON HALL");
        assert_eq!(row.metric_name, "Total Sales");

        let outside = FactQuery {
            exact_date: String::from("20260101"),
            ..query
        };
        assert!(warehouse
            .query_facts(&session, &outside)
            .expect("query")
            .is_empty());
    }

    #[test]
    fn query_keeps_first_row_per_period_and_site() {
        let warehouse = warehouse();
        let main = site(&warehouse, "1100", "HHM MAIN STORE");
        warehouse
            .insert_fact(&yearly(1, vec![main], 1.0))
            .expect("first");
        warehouse
            .insert_fact(&yearly(1, vec![main], 2.0))
            .expect("second");

        let session = warehouse.session().expect("session");
        let result = warehouse
            .query_facts(
                &session,
                &FactQuery {
                    metric_ids: vec![1],
                    group_names: Vec::new(),
                    period_types: vec![PeriodType::Yearly],
                    exact_date: String::from("20250301"),
                },
            )
            .expect("query");
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.result[&1][0].value, 1.0);
    }

    #[test]
    fn query_rejects_malformed_date() {
        let warehouse = warehouse();
        let session = warehouse.session().expect("session");
        let error = warehouse
            .query_facts(
                &session,
                &FactQuery {
                    metric_ids: vec![1],
                    group_names: Vec::new(),
                    period_types: vec![PeriodType::Daily],
                    exact_date: String::from("2025-06-15"),
                },
            )
            .expect_err("malformed");
        assert!(matches!(error, WarehouseError::InvalidQuery(_)));
    }

    #[test]
    fn upsert_metric_inserts_then_updates() {
        let warehouse = warehouse();
        let definition =
            MetricDefinition::new(42, "Store Visits", "Foot traffic", MetricDataType::Count);
        let id = warehouse.upsert_metric(&definition).expect("insert");

        let renamed = MetricDefinition {
            metric_name: String::from("Store Visitors"),
            ..definition
        };
        assert_eq!(warehouse.upsert_metric(&renamed).expect("update"), id);

        let metrics = warehouse.list_metrics().expect("list");
        let stored = metrics
            .iter()
            .find(|metric| metric.metric_id == 42)
            .expect("stored");
        assert_eq!(stored.metric_name, "Store Visitors");
        assert_eq!(stored.data_type, MetricDataType::Count);
        assert_eq!(metrics.len(), 10);
    }
}
