//! Database views over the star schema.

use ::duckdb::Connection;

/// Create the analytical views.
///
/// - `vw_fact_dimensions`: one row per fact/dimension link, with the metric's
///   display columns attached
/// - `vw_site_daily_facts`: daily facts tagged with a site dimension, the
///   input of period rollups
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_fact_dimensions AS
SELECT
    f.id AS fact_id,
    f.metric_id,
    m.metric_name,
    m.metric_desc,
    f.period_type,
    f.period_start,
    f.period_end,
    f.period_key,
    f.value,
    f.count,
    d.id AS dimension_id,
    d.dimension_type,
    d.dimension_code,
    d.dimension_name,
    d.dimension_metadata
FROM facts f
JOIN metrics m ON f.metric_id = m.metric_id
JOIN fact_dimensions fd ON f.id = fd.fact_id
JOIN dimensions d ON fd.dimension_id = d.id;

CREATE OR REPLACE VIEW vw_site_daily_facts AS
SELECT
    fact_id,
    metric_id,
    dimension_id,
    dimension_code AS site_id,
    period_start,
    value,
    count
FROM vw_fact_dimensions
WHERE period_type = 1 AND dimension_type = 'site';
",
    )?;

    Ok(())
}
