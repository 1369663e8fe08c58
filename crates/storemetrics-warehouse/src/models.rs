//! Star-schema record types.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::WarehouseError;

/// Aggregation granularity of a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Daily,
    Monthly,
    Quarterly,
    Yearly,
}

impl PeriodType {
    pub const ALL: [Self; 4] = [Self::Daily, Self::Monthly, Self::Quarterly, Self::Yearly];

    /// Stored integer code: 1=daily, 2=monthly, 3=quarterly, 4=yearly.
    pub const fn code(self) -> i32 {
        match self {
            Self::Daily => 1,
            Self::Monthly => 2,
            Self::Quarterly => 3,
            Self::Yearly => 4,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, WarehouseError> {
        match code {
            1 => Ok(Self::Daily),
            2 => Ok(Self::Monthly),
            3 => Ok(Self::Quarterly),
            4 => Ok(Self::Yearly),
            other => Err(WarehouseError::InvalidQuery(format!(
                "unknown period level {other}; expected 1=daily, 2=monthly, 3=quarterly, 4=yearly"
            ))),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

impl Display for PeriodType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of value a metric measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricDataType {
    Numeric,
    Percentage,
    Count,
}

impl MetricDataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Percentage => "percentage",
            Self::Count => "count",
        }
    }

    pub fn parse(tag: &str) -> Result<Self, WarehouseError> {
        match tag {
            "numeric" => Ok(Self::Numeric),
            "percentage" => Ok(Self::Percentage),
            "count" => Ok(Self::Count),
            other => Err(WarehouseError::InvalidQuery(format!(
                "unknown metric data type '{other}'"
            ))),
        }
    }
}

/// A stored metric row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub id: i64,
    pub metric_id: i64,
    pub metric_name: String,
    pub metric_desc: Option<String>,
    pub data_type: MetricDataType,
}

/// Caller-supplied metric definition used for seeding and upserts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDefinition {
    pub metric_id: i64,
    pub metric_name: String,
    pub metric_desc: Option<String>,
    pub data_type: MetricDataType,
}

impl MetricDefinition {
    pub fn new(
        metric_id: i64,
        metric_name: impl Into<String>,
        metric_desc: impl Into<String>,
        data_type: MetricDataType,
    ) -> Self {
        Self {
            metric_id,
            metric_name: metric_name.into(),
            metric_desc: Some(metric_desc.into()),
            data_type,
        }
    }
}

/// Metric id of daily total sales produced by retail ingestion.
pub const TOTAL_SALES: i64 = 1;
/// Metric id of daily return counts produced by retail ingestion.
pub const TOTAL_RETURNS: i64 = 3;

/// Metrics seeded into a freshly initialized warehouse.
pub const DEFAULT_METRICS: [(i64, &str, &str, MetricDataType); 9] = [
    (1, "Total Sales", "Total sales revenue in dollars", MetricDataType::Numeric),
    (2, "Total Quantity", "Total quantity sold", MetricDataType::Numeric),
    (3, "Total Returns", "Total return transactions", MetricDataType::Numeric),
    (4, "Return Rate", "Percentage of returns", MetricDataType::Percentage),
    (5, "Net Sales", "Sales after returns", MetricDataType::Numeric),
    (6, "Email Opens", "Number of email opens", MetricDataType::Numeric),
    (7, "Email Clicks", "Number of email clicks", MetricDataType::Numeric),
    (8, "Social Media Engagement", "Social media engagement metrics", MetricDataType::Numeric),
    (9, "Social Media Followers", "Total social media followers", MetricDataType::Numeric),
];

pub fn default_metrics() -> Vec<MetricDefinition> {
    DEFAULT_METRICS
        .iter()
        .map(|&(metric_id, name, desc, data_type)| {
            MetricDefinition::new(metric_id, name, desc, data_type)
        })
        .collect()
}

/// Dimension type used for retail sites.
pub const SITE_DIMENSION: &str = "site";

/// A stored dimension row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimension {
    pub id: i64,
    pub dimension_type: String,
    pub dimension_code: String,
    pub dimension_name: String,
    /// JSON object text, if any metadata was supplied.
    pub dimension_metadata: Option<String>,
}

impl Dimension {
    /// Parsed metadata; blobs that are not JSON objects yield an empty map.
    pub fn metadata(&self) -> Map<String, Value> {
        parse_metadata(self.dimension_metadata.as_deref())
    }
}

pub(crate) fn parse_metadata(raw: Option<&str>) -> Map<String, Value> {
    let Some(raw) = raw else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            tracing::debug!(metadata = raw, "ignoring unparseable dimension metadata");
            Map::new()
        }
    }
}

/// A stored fact row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub id: i64,
    pub metric_id: i64,
    pub period_type: PeriodType,
    /// Inclusive `YYYYMMDD` boundary.
    pub period_start: String,
    /// Inclusive `YYYYMMDD` boundary.
    pub period_end: String,
    pub period_key: String,
    pub value: f64,
    pub count: i64,
}

/// Link between a fact and one of its dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FactDimension {
    pub id: i64,
    pub fact_id: i64,
    pub dimension_id: i64,
}

/// Insert payload for [`crate::Warehouse::insert_fact`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub metric_id: i64,
    pub dimension_ids: Vec<i64>,
    pub period_type: PeriodType,
    pub period_start: String,
    pub period_end: String,
    pub period_key: String,
    pub value: f64,
    pub count: i64,
}

/// Row counts of the four schema tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub metrics: i64,
    pub dimensions: i64,
    pub facts: i64,
    pub fact_dimensions: i64,
}
