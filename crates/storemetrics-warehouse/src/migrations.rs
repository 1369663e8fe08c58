//! Versioned schema migrations for the star schema.

use std::collections::HashSet;

use ::duckdb::{Connection, ToSql};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

/// Tables that must exist for the warehouse to be usable.
pub const REQUIRED_TABLES: [&str; 4] = ["metrics", "dimensions", "facts", "fact_dimensions"];

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_star_schema",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS seq_metrics_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_dimensions_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_facts_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_fact_dimensions_id START 1;

CREATE TABLE IF NOT EXISTS metrics (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_metrics_id'),
    metric_id BIGINT NOT NULL UNIQUE,
    metric_name VARCHAR NOT NULL,
    metric_desc VARCHAR,
    data_type VARCHAR NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS dimensions (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_dimensions_id'),
    dimension_type VARCHAR NOT NULL,
    dimension_code VARCHAR NOT NULL,
    dimension_name VARCHAR NOT NULL,
    dimension_metadata VARCHAR,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(dimension_type, dimension_code)
);

CREATE TABLE IF NOT EXISTS facts (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_facts_id'),
    metric_id BIGINT NOT NULL REFERENCES metrics(metric_id),
    period_type INTEGER NOT NULL,
    period_start VARCHAR NOT NULL,
    period_end VARCHAR NOT NULL,
    period_key VARCHAR NOT NULL,
    value DOUBLE NOT NULL,
    count BIGINT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS fact_dimensions (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_fact_dimensions_id'),
    fact_id BIGINT NOT NULL REFERENCES facts(id),
    dimension_id BIGINT NOT NULL REFERENCES dimensions(id),
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(fact_id, dimension_id)
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_fact_lookup ON facts(metric_id, period_type, period_start, period_end);
CREATE INDEX IF NOT EXISTS idx_fact_dimension_dimension ON fact_dimensions(dimension_id);
"#,
    },
];

/// Apply every migration not yet recorded in `schema_migrations`.
///
/// Returns the versions applied by this call.
pub fn apply_migrations(connection: &Connection) -> Result<Vec<&'static str>, ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version VARCHAR PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    let mut applied = Vec::new();
    for migration in MIGRATIONS {
        let params: [&dyn ToSql; 1] = [&migration.version];
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params.as_slice(),
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params.as_slice(),
            )?;
            applied.push(migration.version);
        }
    }

    Ok(applied)
}

/// Whether all of [`REQUIRED_TABLES`] exist in the current schema.
pub fn required_tables_exist(connection: &Connection) -> Result<bool, ::duckdb::Error> {
    let mut statement = connection.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_catalog = current_database() AND table_schema = current_schema()",
    )?;
    let existing = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;

    Ok(REQUIRED_TABLES
        .iter()
        .all(|table| existing.contains(*table)))
}
