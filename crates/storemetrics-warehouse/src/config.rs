//! Warehouse connection configuration.
//!
//! Resolution happens once, in [`WarehouseConfig::resolve`]:
//!
//! 1. an explicit connection descriptor, when given;
//! 2. cloud credentials discovered in the environment;
//! 3. the default embedded database under the storemetrics home directory.

use std::env;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::WarehouseError;

/// Environment variable holding the MotherDuck access token.
pub const CLOUD_TOKEN_VAR: &str = "MOTHERDUCK_TOKEN";
/// Environment variable naming the cloud database.
pub const CLOUD_DATABASE_VAR: &str = "STOREMETRICS_CLOUD_DATABASE";
/// Environment variable naming the schema inside the cloud database.
pub const CLOUD_SCHEMA_VAR: &str = "STOREMETRICS_CLOUD_SCHEMA";
/// Environment variable overriding the storemetrics home directory.
pub const HOME_VAR: &str = "STOREMETRICS_HOME";

const DEFAULT_CLOUD_DATABASE: &str = "storemetrics";
const DEFAULT_CLOUD_SCHEMA: &str = "main";
const DEFAULT_DB_FILE: &str = "warehouse.duckdb";
const IN_MEMORY: &str = ":memory:";

/// Which engine a configuration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local file-backed (or in-memory) `DuckDB`.
    Embedded,
    /// MotherDuck cloud warehouse reached through `DuckDB`.
    Cloud,
}

impl BackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::Cloud => "cloud",
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials and location of a cloud database.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudConfig {
    pub token: String,
    pub database: String,
    pub schema: String,
}

impl CloudConfig {
    /// The `DuckDB` connection string for this database.
    pub fn connection_string(&self) -> String {
        if self.token.is_empty() {
            format!("md:{}", self.database)
        } else {
            format!("md:{}?motherduck_token={}", self.database, self.token)
        }
    }
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("token", &"<redacted>")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Backend-specific connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// A local database file, or `:memory:`.
    Embedded { db_path: PathBuf },
    /// A cloud database.
    Cloud(CloudConfig),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Embedded { .. } => BackendKind::Embedded,
            Self::Cloud(_) => BackendKind::Cloud,
        }
    }

    /// Whether this is an embedded in-memory database.
    pub fn is_in_memory(&self) -> bool {
        matches!(self, Self::Embedded { db_path } if db_path.as_os_str() == IN_MEMORY)
    }
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for storemetrics data.
    pub home: PathBuf,
    /// Engine to connect to.
    pub backend: Backend,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::embedded_default(resolve_home(&process_env))
    }
}

impl WarehouseConfig {
    /// Embedded database at `path`.
    pub fn embedded(path: impl Into<PathBuf>) -> Self {
        let db_path = path.into();
        let home = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            home,
            backend: Backend::Embedded { db_path },
            max_pool_size: 4,
        }
    }

    /// Embedded in-memory database; contents vanish with the warehouse.
    pub fn in_memory() -> Self {
        Self {
            home: PathBuf::from("."),
            backend: Backend::Embedded {
                db_path: PathBuf::from(IN_MEMORY),
            },
            max_pool_size: 4,
        }
    }

    fn embedded_default(home: PathBuf) -> Self {
        let db_path = home.join(DEFAULT_DB_FILE);
        Self {
            home,
            backend: Backend::Embedded { db_path },
            max_pool_size: 4,
        }
    }

    /// Resolve a configuration: explicit descriptor, then discovered cloud
    /// credentials, then the default embedded database.
    pub fn resolve(explicit: Option<&str>) -> Result<Self, WarehouseError> {
        Self::resolve_with(explicit, &process_env)
    }

    /// [`WarehouseConfig::resolve`] against a caller-supplied environment.
    pub fn resolve_with(
        explicit: Option<&str>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, WarehouseError> {
        match explicit {
            Some(descriptor) => Self::from_descriptor_with(descriptor, lookup),
            None => Ok(Self::from_env_with(lookup)),
        }
    }

    /// [`WarehouseConfig::from_env_with`] against the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(&process_env)
    }

    /// Cloud configuration when credentials are present, otherwise the
    /// default embedded database.
    pub fn from_env_with(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let home = resolve_home(lookup);
        match discover_cloud(lookup) {
            Some(cloud) => Self {
                home,
                backend: Backend::Cloud(cloud),
                max_pool_size: 4,
            },
            None => Self::embedded_default(home),
        }
    }

    /// Classify an explicit connection descriptor.
    ///
    /// `md:`/`motherduck:` select the cloud backend, `duckdb://` is an
    /// embedded engine URL, and anything else is treated as a file path.
    pub fn from_descriptor(descriptor: &str) -> Result<Self, WarehouseError> {
        Self::from_descriptor_with(descriptor, &process_env)
    }

    fn from_descriptor_with(
        descriptor: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, WarehouseError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(WarehouseError::InvalidConfig(String::from(
                "connection descriptor must not be empty",
            )));
        }

        let home = resolve_home(lookup);
        if let Some(rest) = descriptor
            .strip_prefix("md:")
            .or_else(|| descriptor.strip_prefix("motherduck:"))
        {
            let cloud = parse_cloud_descriptor(rest, lookup)?;
            return Ok(Self {
                home,
                backend: Backend::Cloud(cloud),
                max_pool_size: 4,
            });
        }

        let path = descriptor.strip_prefix("duckdb://").unwrap_or(descriptor);
        if path.is_empty() {
            return Err(WarehouseError::InvalidConfig(format!(
                "descriptor '{descriptor}' does not name a database file"
            )));
        }
        if path == IN_MEMORY {
            return Ok(Self {
                home,
                ..Self::in_memory()
            });
        }

        let db_path = absolute_path(Path::new(path))?;
        Ok(Self {
            home,
            backend: Backend::Embedded { db_path },
            max_pool_size: 4,
        })
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

/// Parse `<database>[?motherduck_token=...]`; the token falls back to the
/// environment.
fn parse_cloud_descriptor(
    rest: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<CloudConfig, WarehouseError> {
    let (database, query) = match rest.split_once('?') {
        Some((database, query)) => (database, Some(query)),
        None => (rest, None),
    };

    let token = query
        .into_iter()
        .flat_map(|query| query.split('&'))
        .find_map(|pair| pair.strip_prefix("motherduck_token="))
        .map(str::to_owned)
        .or_else(|| non_empty_var(lookup, CLOUD_TOKEN_VAR))
        .unwrap_or_default();

    let database = if database.is_empty() {
        non_empty_var(lookup, CLOUD_DATABASE_VAR)
            .unwrap_or_else(|| DEFAULT_CLOUD_DATABASE.to_owned())
    } else {
        database.to_owned()
    };

    if !is_identifier(&database) {
        return Err(WarehouseError::InvalidConfig(format!(
            "cloud database name '{database}' is not a plain identifier"
        )));
    }

    let schema = cloud_schema(lookup)?;
    Ok(CloudConfig {
        token,
        database,
        schema,
    })
}

fn discover_cloud(lookup: &dyn Fn(&str) -> Option<String>) -> Option<CloudConfig> {
    let token = non_empty_var(lookup, CLOUD_TOKEN_VAR)?;
    let database = non_empty_var(lookup, CLOUD_DATABASE_VAR)
        .unwrap_or_else(|| DEFAULT_CLOUD_DATABASE.to_owned());
    let schema = cloud_schema(lookup).ok()?;
    if !is_identifier(&database) {
        tracing::warn!(database = %database, "ignoring cloud credentials with an invalid database name");
        return None;
    }
    Some(CloudConfig {
        token,
        database,
        schema,
    })
}

fn cloud_schema(lookup: &dyn Fn(&str) -> Option<String>) -> Result<String, WarehouseError> {
    let schema =
        non_empty_var(lookup, CLOUD_SCHEMA_VAR).unwrap_or_else(|| DEFAULT_CLOUD_SCHEMA.to_owned());
    if !is_identifier(&schema) {
        return Err(WarehouseError::InvalidConfig(format!(
            "cloud schema name '{schema}' is not a plain identifier"
        )));
    }
    Ok(schema)
}

/// Database and schema names are spliced into `USE` statements.
pub(crate) fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn non_empty_var(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Resolve the storemetrics home directory from environment or default.
fn resolve_home(lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = non_empty_var(lookup, HOME_VAR) {
        return PathBuf::from(path);
    }

    if let Some(home) = non_empty_var(lookup, "HOME") {
        return PathBuf::from(home).join(".storemetrics");
    }

    PathBuf::from(".storemetrics")
}

fn absolute_path(path: &Path) -> Result<PathBuf, WarehouseError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn falls_back_to_embedded_default_without_credentials() {
        let lookup = env_of(&[("STOREMETRICS_HOME", "/srv/metrics")]);
        let config = WarehouseConfig::resolve_with(None, &lookup).expect("resolve");

        assert_eq!(config.backend_kind(), BackendKind::Embedded);
        assert_eq!(
            config.backend,
            Backend::Embedded {
                db_path: PathBuf::from("/srv/metrics/warehouse.duckdb")
            }
        );
    }

    #[test]
    fn discovers_cloud_credentials() {
        let lookup = env_of(&[
            ("MOTHERDUCK_TOKEN", "secret"),
            ("STOREMETRICS_CLOUD_DATABASE", "retail"),
        ]);
        let config = WarehouseConfig::resolve_with(None, &lookup).expect("resolve");

        let Backend::Cloud(cloud) = config.backend else {
            panic!("expected cloud backend");
        };
        assert_eq!(cloud.database, "retail");
        assert_eq!(cloud.schema, "main");
        assert_eq!(cloud.connection_string(), "md:retail?motherduck_token=secret");
    }

    #[test]
    fn blank_token_is_not_a_credential() {
        let lookup = env_of(&[("MOTHERDUCK_TOKEN", "  ")]);
        let config = WarehouseConfig::resolve_with(None, &lookup).expect("resolve");
        assert_eq!(config.backend_kind(), BackendKind::Embedded);
    }

    #[test]
    fn explicit_descriptor_wins_over_environment() {
        let lookup = env_of(&[("MOTHERDUCK_TOKEN", "secret")]);
        let config =
            WarehouseConfig::resolve_with(Some("/tmp/explicit.duckdb"), &lookup).expect("resolve");
        assert_eq!(
            config.backend,
            Backend::Embedded {
                db_path: PathBuf::from("/tmp/explicit.duckdb")
            }
        );
    }

    #[test]
    fn classifies_descriptors() {
        let lookup = env_of(&[]);

        let url = WarehouseConfig::resolve_with(Some("duckdb:///var/lib/wh.db"), &lookup)
            .expect("engine url");
        assert_eq!(
            url.backend,
            Backend::Embedded {
                db_path: PathBuf::from("/var/lib/wh.db")
            }
        );

        let memory = WarehouseConfig::resolve_with(Some(":memory:"), &lookup).expect("memory");
        assert!(memory.backend.is_in_memory());

        let relative = WarehouseConfig::resolve_with(Some("local.db"), &lookup).expect("relative");
        let Backend::Embedded { db_path } = relative.backend else {
            panic!("expected embedded backend");
        };
        assert!(db_path.is_absolute());
        assert!(db_path.ends_with("local.db"));

        let cloud = WarehouseConfig::resolve_with(Some("md:sales?motherduck_token=abc"), &lookup)
            .expect("cloud");
        let Backend::Cloud(cloud) = cloud.backend else {
            panic!("expected cloud backend");
        };
        assert_eq!(cloud.database, "sales");
        assert_eq!(cloud.token, "abc");
    }

    #[test]
    fn rejects_empty_and_unsafe_descriptors() {
        let lookup = env_of(&[]);
        assert!(matches!(
            WarehouseConfig::resolve_with(Some("   "), &lookup),
            Err(WarehouseError::InvalidConfig(_))
        ));
        assert!(matches!(
            WarehouseConfig::resolve_with(Some("md:sales;drop"), &lookup),
            Err(WarehouseError::InvalidConfig(_))
        ));
    }

    #[test]
    fn cloud_debug_output_redacts_token() {
        let cloud = CloudConfig {
            token: String::from("very-secret"),
            database: String::from("retail"),
            schema: String::from("main"),
        };
        let rendered = format!("{cloud:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
