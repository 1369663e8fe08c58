//! Report-facing query session.
//!
//! Wraps [`Warehouse::query_facts`] and reshapes its rows into the nested
//! `metric -> site -> period` structure report generators consume, or into a
//! flat table.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;
use time::Date;

use crate::models::PeriodType;
use crate::period::format_period_date;
use crate::{FactQuery, FactQueryResult, Warehouse, WarehouseConfig, WarehouseError};

/// Nested query result, serialized as `{"result": {metric_id: ...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NestedResult {
    pub result: BTreeMap<i64, MetricBlock>,
}

impl NestedResult {
    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricBlock {
    pub metadata: MetricMetadata,
    /// Keyed by site code, serialized alongside `metadata`.
    #[serde(flatten)]
    pub sites: BTreeMap<String, SiteBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricMetadata {
    pub metric_name: String,
    pub metric_desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteBlock {
    pub metadata: SiteMetadata,
    pub site_name: String,
    #[serde(flatten)]
    pub periods: BTreeMap<String, PeriodValue>,
}

/// Site attributes; empty values are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodValue {
    pub value: f64,
    pub count: i64,
}

/// One `(metric, site, period)` data point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
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

/// Flat, tabular form of a [`NestedResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactTable {
    pub rows: Vec<FlatRow>,
}

impl FactTable {
    pub const COLUMNS: [&'static str; 10] = [
        "metric_id",
        "metric_name",
        "metric_description",
        "site_id",
        "site_name",
        "command_name",
        "store_format",
        "period_key",
        "value",
        "count",
    ];

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", Self::COLUMNS.join(","))?;
        for row in &self.rows {
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{},{},{}",
                row.metric_id,
                csv_text(&row.metric_name),
                csv_text(&row.metric_description),
                csv_text(&row.site_id),
                csv_text(&row.site_name),
                csv_text(&row.command_name),
                csv_text(&row.store_format),
                csv_text(&row.period_key),
                row.value,
                row.count,
            )?;
        }
        writer.flush()
    }
}

fn csv_text(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Query session bound to one warehouse.
#[derive(Clone)]
pub struct WarehouseSession {
    warehouse: Warehouse,
}

impl WarehouseSession {
    pub fn new(warehouse: Warehouse) -> Self {
        tracing::info!(backend = %warehouse.backend_kind(), "warehouse session initialized");
        Self { warehouse }
    }

    /// Resolve `descriptor` (or the environment when `None`), then connect and
    /// initialize the schema.
    pub fn open(descriptor: Option<&str>) -> Result<Self, WarehouseError> {
        let config = WarehouseConfig::resolve(descriptor)?;
        Ok(Self::new(Warehouse::open(config)?))
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Facts of `metric_ids` whose period contains `exact_date`, nested by
    /// metric, site, and period key.
    ///
    /// `period_levels` are stored codes: 1=daily, 2=monthly, 3=quarterly,
    /// 4=yearly. An empty `group_names` matches every site.
    pub fn query_facts(
        &self,
        metric_ids: &[i64],
        group_names: &[String],
        period_levels: &[i32],
        exact_date: Date,
    ) -> Result<NestedResult, WarehouseError> {
        let period_types = period_levels
            .iter()
            .map(|level| PeriodType::from_code(*level))
            .collect::<Result<Vec<_>, _>>()?;

        let query = FactQuery {
            metric_ids: metric_ids.to_vec(),
            group_names: group_names.to_vec(),
            period_types,
            exact_date: format_period_date(exact_date),
        };

        let session = self.warehouse.session()?;
        let rows = self.warehouse.query_facts(&session, &query)?;
        Ok(nest(rows))
    }

    /// Flatten a nested result into one row per `(metric, site, period)`.
    pub fn to_table(&self, nested: &NestedResult) -> FactTable {
        if nested.is_empty() {
            tracing::warn!("no data in query result to convert to a table");
            return FactTable::default();
        }

        let mut rows = Vec::new();
        for (metric_id, block) in &nested.result {
            for (site_id, site) in &block.sites {
                for (period_key, point) in &site.periods {
                    rows.push(FlatRow {
                        metric_id: *metric_id,
                        metric_name: block.metadata.metric_name.clone(),
                        metric_description: block.metadata.metric_desc.clone(),
                        site_id: site_id.clone(),
                        site_name: site.site_name.clone(),
                        command_name: site.metadata.command_name.clone().unwrap_or_default(),
                        store_format: site.metadata.store_format.clone().unwrap_or_default(),
                        period_key: period_key.clone(),
                        value: if point.value.is_finite() { point.value } else { 0.0 },
                        count: point.count,
                    });
                }
            }
        }

        tracing::info!(rows = rows.len(), "converted query result to table");
        FactTable { rows }
    }

    /// [`WarehouseSession::query_facts`] followed by
    /// [`WarehouseSession::to_table`].
    pub fn query_facts_as_table(
        &self,
        metric_ids: &[i64],
        group_names: &[String],
        period_levels: &[i32],
        exact_date: Date,
    ) -> Result<FactTable, WarehouseError> {
        let nested = self.query_facts(metric_ids, group_names, period_levels, exact_date)?;
        Ok(self.to_table(&nested))
    }
}

fn nest(rows: FactQueryResult) -> NestedResult {
    let mut nested = NestedResult::default();
    for (metric_id, facts) in rows.result {
        let Some(first) = facts.first() else {
            continue;
        };
        let mut block = MetricBlock {
            metadata: MetricMetadata {
                metric_name: first.metric_name.clone(),
                metric_desc: first.metric_description.clone(),
            },
            sites: BTreeMap::new(),
        };

        for fact in facts {
            if fact.site_id.is_empty() {
                continue;
            }
            let site = block
                .sites
                .entry(fact.site_id)
                .or_insert_with(|| SiteBlock {
                    metadata: SiteMetadata {
                        command_name: non_empty(fact.command_name),
                        store_format: non_empty(fact.store_format),
                    },
                    site_name: fact.site_name,
                    periods: BTreeMap::new(),
                });
            site.periods.entry(fact.period_key).or_insert(PeriodValue {
                value: fact.value,
                count: fact.count,
            });
        }

        nested.result.insert(metric_id, block);
    }
    nested
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
