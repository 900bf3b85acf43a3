use async_trait::async_trait;
use std::fmt::{self, Debug};
use tracing::{debug, info};

use crate::{
    config::{Backend, DatabaseConfig},
    error::{IngestError, StorageOperation, StoreError},
    model::NormalizedRecord,
    store::{postgres::PostgresConnector, sqlite::SqliteConnector},
};

pub mod postgres;
pub mod sqlite;

/// Longest identifier Postgres keeps without truncating.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Namespace-qualified name of the append-only observations table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    namespace: String,
    table: String,
}

impl TableRef {
    pub fn new(namespace: &str, table: &str) -> Result<Self, StoreError> {
        validate_identifier(namespace)?;
        validate_identifier(table)?;
        Ok(Self { namespace: namespace.to_string(), table: table.to_string() })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `"namespace"."table"`, safe to splice into SQL.
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.namespace, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.table)
    }
}

fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid { Ok(()) } else { Err(StoreError::InvalidIdentifier(name.to_string())) }
}

/// A live, exclusively owned database session.
#[async_trait]
pub trait WeatherStore: Send + Debug {
    /// Trivial round trip proving the session works.
    async fn ping(&mut self) -> Result<(), StoreError>;

    /// Create namespace and table if missing, atomically.
    async fn ensure_schema(&mut self, target: &TableRef) -> Result<(), StoreError>;

    /// Append one row and return its identity.
    async fn insert(&mut self, target: &TableRef, record: &NormalizedRecord)
    -> Result<i64, StoreError>;

    /// Release the session. Further calls fail with [`StoreError::Closed`].
    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Opens new sessions against one configured database.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn connect(&self) -> Result<Box<dyn WeatherStore>, StoreError>;
}

/// Readiness probe: open a session and ping it. A session that connects but
/// fails the ping is closed before the error is returned.
pub async fn open_ready(connector: &dyn Connector) -> Result<Box<dyn WeatherStore>, StoreError> {
    let mut store = connector.connect().await?;

    if let Err(e) = store.ping().await {
        if let Err(close_err) = store.close().await {
            debug!(error = %close_err, "closing unresponsive connection failed");
        }
        return Err(e);
    }

    Ok(store)
}

/// Schema provisioner: safe to call on every cycle.
pub async fn ensure_schema(
    store: &mut dyn WeatherStore,
    target: &TableRef,
) -> Result<(), IngestError> {
    info!(table = %target, "ensuring schema exists");
    store
        .ensure_schema(target)
        .await
        .map_err(|e| IngestError::storage(StorageOperation::Provision, e))
}

pub async fn persist(
    store: &mut dyn WeatherStore,
    target: &TableRef,
    record: &NormalizedRecord,
) -> Result<i64, IngestError> {
    let id = store
        .insert(target, record)
        .await
        .map_err(|e| IngestError::storage(StorageOperation::Insert, e))?;
    info!(table = %target, id, "inserted observation");
    Ok(id)
}

/// Build the connector for the configured backend.
pub fn connector_from_config(config: &DatabaseConfig) -> anyhow::Result<Box<dyn Connector>> {
    let boxed: Box<dyn Connector> = match config.backend {
        Backend::Postgres => Box::new(PostgresConnector::from_config(config)),
        Backend::Sqlite => {
            let path = config.sqlite_path.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "SQLite backend selected but no `sqlite_path` configured.\n\
                     Hint: set `database.sqlite_path` in the config file."
                )
            })?;
            Box::new(SqliteConnector::new(path))
        }
    };

    Ok(boxed)
}
