//! `DuckDB` connection pool management.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

use crate::config::{Backend, CloudConfig};

struct PoolInner {
    backend: Backend,
    max_pool_size: usize,
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
}

/// A connection pool manager for `DuckDB` connections.
///
/// All pooled connections are clones of one root connection, so they share a
/// single database instance (and, for `:memory:`, the same data).
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Open the root connection for `backend`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(backend: Backend, max_pool_size: usize) -> Result<Self, ::duckdb::Error> {
        let root = open_root(&backend)?;
        configure_connection(&root, &backend)?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                backend,
                max_pool_size: max_pool_size.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Acquire a connection from the pool.
    ///
    /// # Errors
    /// Returns an error if a new connection cannot be cloned or configured.
    ///
    /// # Panics
    /// Panics if a pool mutex is poisoned (indicating a previous panic
    /// while holding the lock).
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let idle = self
            .inner
            .idle
            .lock()
            .expect("duckdb connection pool mutex poisoned")
            .pop();

        let connection = match idle {
            Some(connection) => connection,
            None => {
                let connection = self
                    .inner
                    .root
                    .lock()
                    .expect("duckdb root connection mutex poisoned")
                    .try_clone()?;
                configure_connection(&connection, &self.inner.backend)?;
                connection
            }
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        // A poisoned pool just drops the connection.
        if let Ok(mut idle) = self.pool.idle.lock() {
            if idle.len() < self.pool.max_pool_size {
                idle.push(connection);
            }
        }
    }
}

fn open_root(backend: &Backend) -> Result<Connection, ::duckdb::Error> {
    match backend {
        Backend::Embedded { .. } if backend.is_in_memory() => Connection::open_in_memory(),
        Backend::Embedded { db_path } => Connection::open(db_path),
        Backend::Cloud(cloud) => Connection::open(cloud.connection_string()),
    }
}

/// Configure a database connection with appropriate settings.
///
/// # Errors
/// Returns an error if configuration SQL fails to execute.
fn configure_connection(connection: &Connection, backend: &Backend) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    if let Backend::Cloud(cloud) = backend {
        connection.execute_batch(&use_cloud_schema_sql(cloud))?;
    }
    Ok(())
}

/// Names are validated as plain identifiers when the config is built.
fn use_cloud_schema_sql(cloud: &CloudConfig) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {db}.{schema}; USE {db}.{schema};",
        db = cloud.database,
        schema = cloud.schema,
    )
}
