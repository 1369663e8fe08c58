//! Retail data ingestion and period rollups.
//!
//! Source files are never loaded whole: an in-memory `DuckDB` instance exposes
//! the parquet or CSV file as a view and aggregates it one sale date at a time.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, Statement, ToSql};
use serde::Serialize;
use serde_json::{Map, Value};
use time::Date;

use crate::models::{NewFact, PeriodType, SITE_DIMENSION, TOTAL_RETURNS, TOTAL_SALES};
use crate::period::{self, calendar_date, Period};
use crate::{escape_sql_string, Warehouse, WarehouseError};

/// Source files probed, in order, when no path is given.
pub const DEFAULT_RETAIL_PATHS: [&str; 3] = [
    "data/rawdata/MCCS_RetailData.parquet",
    "data/convertedcsv/MCCS_RetailData.csv",
    "retail_data_sample.parquet",
];

const PROGRESS_INTERVAL: usize = 10;

/// Summary of one [`IngestionManager::load_retail_data`] run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub source: PathBuf,
    pub dimensions: usize,
    pub dates_seen: usize,
    pub dates_processed: usize,
    pub dates_skipped: usize,
    /// Source rows attributed to a known site.
    pub transactions: i64,
    pub facts_inserted: usize,
    pub facts_failed: usize,
    pub failures: Vec<String>,
}

/// Summary of one [`IngestionManager::rollup`] run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupReport {
    pub metric_id: i64,
    pub period_type: PeriodType,
    pub daily_facts_read: usize,
    pub periods_created: usize,
    pub periods_skipped: usize,
}

/// Loads retail transactions into the warehouse as daily facts.
pub struct IngestionManager<'a> {
    warehouse: &'a Warehouse,
}

impl<'a> IngestionManager<'a> {
    pub fn new(warehouse: &'a Warehouse) -> Self {
        Self { warehouse }
    }

    /// Aggregate a retail transaction file into daily sales and return facts.
    ///
    /// Dates that cannot be parsed or aggregated and facts that fail to insert
    /// are skipped and recorded in the report. Failing to open the source or
    /// resolve its sites aborts the run.
    pub fn load_retail_data(&self, path: Option<&Path>) -> Result<IngestionReport, WarehouseError> {
        let result = resolve_source(path).and_then(|source| self.load(&source));
        match &result {
            Ok(report) => tracing::info!(
                source = %report.source.display(),
                dates = report.dates_processed,
                facts = report.facts_inserted,
                failed = report.facts_failed,
                "retail data ingestion complete"
            ),
            Err(error) => tracing::error!(%error, "retail data ingestion failed"),
        }
        result
    }

    fn load(&self, source: &Path) -> Result<IngestionReport, WarehouseError> {
        tracing::info!(source = %source.display(), "loading retail data");
        let reader = open_source(source)?;
        self.load_from(&reader, source)
    }

    /// Ingest everything exposed by the `retail_source` view of `reader`.
    fn load_from(
        &self,
        reader: &Connection,
        source: &Path,
    ) -> Result<IngestionReport, WarehouseError> {
        let mut report = IngestionReport {
            source: source.to_path_buf(),
            ..IngestionReport::default()
        };

        let sites = self.load_sites(reader)?;
        report.dimensions = sites.len();
        tracing::info!(count = sites.len(), "resolved site dimensions");

        let dates = distinct_sale_dates(reader)?;
        report.dates_seen = dates.len();

        let mut statement = reader.prepare(
            "SELECT CAST(SITE_ID AS VARCHAR) AS site_id, \
             SUM(TRY_CAST(EXTENSION_AMOUNT AS DOUBLE)) AS amount, \
             SUM(TRY_CAST(QTY AS DOUBLE)) AS quantity, \
             COUNT(*) FILTER (WHERE CAST(RETURN_IND AS VARCHAR) = 'Y') AS returns, \
             COUNT(*) AS transactions \
             FROM retail_source \
             WHERE CAST(SALE_DATE AS VARCHAR) = ? \
             GROUP BY 1 ORDER BY 1",
        )?;

        for raw_date in &dates {
            let Some(date) = parse_sale_date(raw_date) else {
                tracing::warn!(sale_date = %raw_date, "skipping unparseable sale date");
                report.dates_skipped += 1;
                report
                    .failures
                    .push(format!("unparseable sale date '{raw_date}'"));
                continue;
            };

            let loaded = self.load_date(&mut statement, raw_date, date, &sites, &mut report);
            if let Err(error) = loaded {
                tracing::warn!(sale_date = %raw_date, %error, "skipping sale date");
                report.dates_skipped += 1;
                report
                    .failures
                    .push(format!("sale date '{raw_date}': {error}"));
                continue;
            }

            report.dates_processed += 1;
            if report.dates_processed % PROGRESS_INTERVAL == 0 {
                tracing::info!(
                    processed = report.dates_processed,
                    total = report.dates_seen,
                    "ingestion progress"
                );
            }
        }

        Ok(report)
    }

    /// Aggregate one sale date per site and store its daily facts.
    fn load_date(
        &self,
        statement: &mut Statement<'_>,
        raw_date: &str,
        date: Date,
        sites: &HashMap<String, i64>,
        report: &mut IngestionReport,
    ) -> Result<(), WarehouseError> {
        let day = Period::containing(date, PeriodType::Daily)?;

        let params: [&dyn ToSql; 1] = [&raw_date];
        let mut rows = statement.query(params.as_slice())?;
        while let Some(row) = rows.next()? {
            let site_id: Option<String> = row.get(0)?;
            let amount: Option<f64> = row.get(1)?;
            let quantity: Option<f64> = row.get(2)?;
            let returns: i64 = row.get(3)?;
            let transactions: i64 = row.get(4)?;

            let site_id = site_id.unwrap_or_default();
            let Some(&dimension_id) = sites.get(&site_id) else {
                tracing::warn!(
                    sale_date = %raw_date,
                    site_id = %site_id,
                    transactions,
                    "no dimension for site"
                );
                report.failures.push(format!(
                    "{transactions} transactions on {} have no site dimension for '{site_id}'",
                    day.key
                ));
                continue;
            };
            report.transactions += transactions;

            let mut facts = vec![NewFact {
                metric_id: TOTAL_SALES,
                dimension_ids: vec![dimension_id],
                period_type: PeriodType::Daily,
                period_start: day.start.clone(),
                period_end: day.end.clone(),
                period_key: day.key.clone(),
                value: amount.unwrap_or(0.0),
                count: quantity.unwrap_or(0.0) as i64,
            }];
            if returns > 0 {
                facts.push(NewFact {
                    metric_id: TOTAL_RETURNS,
                    dimension_ids: vec![dimension_id],
                    period_type: PeriodType::Daily,
                    period_start: day.start.clone(),
                    period_end: day.end.clone(),
                    period_key: day.key.clone(),
                    value: returns as f64,
                    count: returns,
                });
            }

            for fact in &facts {
                match self.warehouse.insert_fact(fact) {
                    Ok(_) => report.facts_inserted += 1,
                    Err(error) => {
                        report.facts_failed += 1;
                        report.failures.push(format!(
                            "metric {} for site {site_id} on {}: {error}",
                            fact.metric_id, day.key
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    fn load_sites(&self, reader: &Connection) -> Result<HashMap<String, i64>, WarehouseError> {
        let mut statement = reader.prepare(
            "SELECT DISTINCT CAST(SITE_ID AS VARCHAR), CAST(SITE_NAME AS VARCHAR), \
             CAST(COMMAND_NAME AS VARCHAR) \
             FROM retail_source WHERE SITE_ID IS NOT NULL ORDER BY 1, 2, 3",
        )?;
        let mut rows = statement.query([])?;

        let mut sites = HashMap::new();
        while let Some(row) = rows.next()? {
            let site_id: String = row.get(0)?;
            let site_name: Option<String> = row.get(1)?;
            let command_name: Option<String> = row.get(2)?;
            let site_name = site_name.unwrap_or_default();

            let mut metadata = Map::new();
            metadata.insert(
                String::from("command_name"),
                Value::from(command_name.unwrap_or_default()),
            );
            metadata.insert(
                String::from("store_format"),
                Value::from(store_format(&site_name)),
            );

            let id = self.warehouse.get_dimension_id(
                SITE_DIMENSION,
                &site_id,
                &site_name,
                Some(&metadata),
            )?;
            sites.insert(site_id, id);
        }

        Ok(sites)
    }

    /// Sum stored daily facts of `metric_id` into `target` periods per site.
    ///
    /// Periods that already hold a fact for the same metric and site are left
    /// untouched, so reruns only fill gaps.
    pub fn rollup(&self, metric_id: i64, target: PeriodType) -> Result<RollupReport, WarehouseError> {
        if target == PeriodType::Daily {
            return Err(WarehouseError::InvalidQuery(String::from(
                "daily facts cannot be rolled up into daily periods",
            )));
        }

        let session = self.warehouse.session()?;
        let mut statement = session.prepare(
            "SELECT dimension_id, period_start, value, count \
             FROM vw_site_daily_facts WHERE metric_id = ? ORDER BY dimension_id, period_start",
        )?;
        let params: [&dyn ToSql; 1] = [&metric_id];
        let mut rows = statement.query(params.as_slice())?;

        let mut totals: BTreeMap<(i64, Period), (f64, i64)> = BTreeMap::new();
        let mut daily_facts_read = 0;
        while let Some(row) = rows.next()? {
            let dimension_id: i64 = row.get(0)?;
            let period_start: String = row.get(1)?;
            let value: f64 = row.get(2)?;
            let count: i64 = row.get(3)?;
            daily_facts_read += 1;

            let date = period::parse_period_date(&period_start)?;
            let entry = totals
                .entry((dimension_id, Period::containing(date, target)?))
                .or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += count;
        }

        let mut report = RollupReport {
            metric_id,
            period_type: target,
            daily_facts_read,
            periods_created: 0,
            periods_skipped: 0,
        };

        for ((dimension_id, period), (value, count)) in totals {
            if fact_exists(&session, metric_id, dimension_id, &period)? {
                report.periods_skipped += 1;
                continue;
            }
            self.warehouse.insert_fact(&NewFact {
                metric_id,
                dimension_ids: vec![dimension_id],
                period_type: target,
                period_start: period.start,
                period_end: period.end,
                period_key: period.key,
                value,
                count,
            })?;
            report.periods_created += 1;
        }

        tracing::info!(
            metric_id,
            period = %target,
            created = report.periods_created,
            skipped = report.periods_skipped,
            "rollup complete"
        );
        Ok(report)
    }

    /// Whether metrics, dimensions, and facts all hold at least one row.
    pub fn validate_data_integrity(&self) -> bool {
        let counts = match self.warehouse.table_counts() {
            Ok(counts) => counts,
            Err(error) => {
                tracing::error!(%error, "data integrity check failed");
                return false;
            }
        };

        let empty: Vec<&str> = [
            ("metrics", counts.metrics),
            ("dimensions", counts.dimensions),
            ("facts", counts.facts),
        ]
        .into_iter()
        .filter(|(_, count)| *count == 0)
        .map(|(table, _)| table)
        .collect();

        if empty.is_empty() {
            tracing::info!(
                metrics = counts.metrics,
                dimensions = counts.dimensions,
                facts = counts.facts,
                "data integrity check passed"
            );
            true
        } else {
            tracing::warn!(tables = ?empty, "data integrity check found empty tables");
            false
        }
    }
}

fn resolve_source(path: Option<&Path>) -> Result<PathBuf, WarehouseError> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(WarehouseError::SourceNotFound {
                tried: vec![path.display().to_string()],
            });
        }
        return Ok(path.to_path_buf());
    }

    DEFAULT_RETAIL_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
        .ok_or_else(|| WarehouseError::SourceNotFound {
            tried: DEFAULT_RETAIL_PATHS.iter().map(|p| (*p).to_string()).collect(),
        })
}

/// Expose `source` as the `retail_source` view of a fresh in-memory engine.
fn open_source(source: &Path) -> Result<Connection, WarehouseError> {
    let extension = source
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let escaped = escape_sql_string(&source.to_string_lossy());
    let reader = match extension.as_deref() {
        Some("parquet") => format!("read_parquet('{escaped}')"),
        Some("csv") => format!("read_csv('{escaped}', header = true, all_varchar = true)"),
        _ => return Err(WarehouseError::UnsupportedFormat(source.to_path_buf())),
    };

    let connection = Connection::open_in_memory()?;
    connection.execute_batch(&format!(
        "PRAGMA disable_progress_bar; CREATE VIEW retail_source AS SELECT * FROM {reader};"
    ))?;
    Ok(connection)
}

fn distinct_sale_dates(reader: &Connection) -> Result<Vec<String>, WarehouseError> {
    let mut statement = reader.prepare(
        "SELECT DISTINCT CAST(SALE_DATE AS VARCHAR) FROM retail_source \
         WHERE SALE_DATE IS NOT NULL ORDER BY 1",
    )?;
    let dates = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dates)
}

fn fact_exists(
    session: &Connection,
    metric_id: i64,
    dimension_id: i64,
    period: &Period,
) -> Result<bool, WarehouseError> {
    let period_code = period.period_type.code();
    let params: [&dyn ToSql; 4] = [&metric_id, &period_code, &period.start, &dimension_id];
    let existing: i64 = session.query_row(
        "SELECT COUNT(*) FROM vw_fact_dimensions \
         WHERE metric_id = ? AND period_type = ? AND period_start = ? AND dimension_id = ?",
        params.as_slice(),
        |row| row.get(0),
    )?;
    Ok(existing > 0)
}

pub(crate) fn store_format(site_name: &str) -> &'static str {
    if site_name.contains("MAIN") {
        "MAIN STORE"
    } else {
        "MARINE MART"
    }
}

/// Parse a sale date as `MM/DD/YY`, then `YY/MM/DD`, then a `YYYY-MM-DD`
/// prefix (native date columns).
pub fn parse_sale_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if let Some([first, second, third]) = slash_fields(raw) {
        return calendar_date(expand_year(third), first, second)
            .or_else(|| calendar_date(expand_year(first), second, third));
    }

    let iso = raw.get(..10)?;
    let bytes = iso.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let year: i32 = iso[0..4].parse().ok()?;
    let month: u8 = iso[5..7].parse().ok()?;
    let day: u8 = iso[8..10].parse().ok()?;
    calendar_date(year, month, day)
}

/// `a/b/c` where every field is one or two digits.
fn slash_fields(raw: &str) -> Option<[u8; 3]> {
    let parts: Vec<&str> = raw.split('/').collect();
    let [a, b, c] = parts.as_slice() else {
        return None;
    };
    let field = |text: &str| -> Option<u8> {
        if text.is_empty() || text.len() > 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        text.parse().ok()
    };
    Some([field(a)?, field(b)?, field(c)?])
}

/// Two-digit years 69-99 map to the 1900s and 00-68 to the 2000s.
fn expand_year(two_digit: u8) -> i32 {
    let year = i32::from(two_digit);
    if year >= 69 {
        1900 + year
    } else {
        2000 + year
    }
}
