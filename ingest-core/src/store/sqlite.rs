//! SQLite backend for local runs.
//!
//! SQLite has no `CREATE SCHEMA`; a namespace is an attached database file
//! sitting next to the main one (`weather.db` + namespace `dev` gives
//! `weather.dev.db`). The `main` namespace needs no attachment.
//!
//! `ATTACH` is not allowed inside a transaction, so provisioning attaches
//! first and creates the table afterwards. If the table cannot be created
//! and the attach is what created the namespace file, the file is detached
//! and removed again.

use async_trait::async_trait;
use sqlx::{Connection, SqliteConnection, sqlite::SqliteConnectOptions};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::warn;

use crate::{
    error::StoreError,
    model::NormalizedRecord,
    store::{Connector, TableRef, WeatherStore},
};

pub const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    /// `path` may be `:memory:` for a throwaway database.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File that backs `namespace`, or `None` for `main` and in-memory databases.
    pub fn namespace_path(&self, namespace: &str) -> Option<PathBuf> {
        if namespace == "main" || is_memory(&self.path) {
            return None;
        }
        let stem = self.path.file_stem().and_then(|s| s.to_str()).unwrap_or("weather");
        Some(self.path.with_file_name(format!("{stem}.{namespace}.db")))
    }
}

fn is_memory(path: &Path) -> bool {
    path.as_os_str() == MEMORY_PATH
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self) -> Result<Box<dyn WeatherStore>, StoreError> {
        let options = if is_memory(&self.path) {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new().filename(&self.path).create_if_missing(true)
        };

        let conn = SqliteConnection::connect_with(&options).await?;
        Ok(Box::new(SqliteStore { connector: self.clone(), conn: Some(conn) }))
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    connector: SqliteConnector,
    conn: Option<SqliteConnection>,
}

impl SqliteStore {
    fn conn(&mut self) -> Result<&mut SqliteConnection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::Closed)
    }

    /// Attach `namespace` if needed. Returns the backing file when this call
    /// brought it into existence.
    async fn attach(&mut self, namespace: &str) -> Result<Option<PathBuf>, StoreError> {
        if namespace == "main" {
            return Ok(None);
        }

        let file = self.connector.namespace_path(namespace);
        let fresh = file.as_ref().filter(|path| !path.exists()).cloned();

        let conn = self.conn()?;
        let attached: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pragma_database_list WHERE name = ?")
                .bind(namespace)
                .fetch_one(&mut *conn)
                .await?;

        if attached > 0 {
            return Ok(None);
        }

        let name = file
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| MEMORY_PATH.to_string());
        sqlx::query(&format!("ATTACH DATABASE ? AS \"{namespace}\""))
            .bind(name)
            .execute(&mut *conn)
            .await?;

        Ok(fresh)
    }

    /// Attach `namespace`, then run `ddl` in a transaction. On failure a
    /// namespace file created by the attach is removed again.
    async fn provision(&mut self, namespace: &str, ddl: &str) -> Result<(), StoreError> {
        let created = self.attach(namespace).await?;

        let result = self.run_in_tx(ddl).await;
        if let (Err(e), Some(file)) = (&result, created) {
            warn!(namespace, error = %e, "table creation failed, discarding new namespace file");
            self.discard(namespace, &file).await;
        }

        result
    }

    async fn run_in_tx(&mut self, sql: &str) -> Result<(), StoreError> {
        let mut tx = self.conn()?.begin().await?;
        sqlx::query(sql).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn discard(&mut self, namespace: &str, file: &Path) {
        let Ok(conn) = self.conn() else { return };

        let detach = format!("DETACH DATABASE \"{namespace}\"");
        if let Err(e) = sqlx::query(&detach).execute(conn).await {
            warn!(namespace, error = %e, "could not detach namespace");
            return;
        }
        if let Err(e) = fs::remove_file(file) {
            warn!(file = %file.display(), error = %e, "could not remove namespace file");
        }
    }
}

#[async_trait]
impl WeatherStore for SqliteStore {
    async fn ping(&mut self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(self.conn()?).await?;
        Ok(())
    }

    async fn ensure_schema(&mut self, target: &TableRef) -> Result<(), StoreError> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city TEXT,
                temperature REAL,
                weather_description TEXT,
                wind_speed REAL,
                time TIMESTAMP,
                inserted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                utc_offset TEXT
            )",
            target.qualified()
        );

        self.provision(target.namespace(), &create_table).await
    }

    async fn insert(
        &mut self,
        target: &TableRef,
        record: &NormalizedRecord,
    ) -> Result<i64, StoreError> {
        self.attach(target.namespace()).await?;

        let sql = format!(
            "INSERT INTO {} (
                city, temperature, weather_description, wind_speed, time, inserted_at, utc_offset
            ) VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP, ?)",
            target.qualified()
        );

        let done = sqlx::query(&sql)
            .bind(record.location_name.as_str())
            .bind(record.temperature)
            .bind(record.weather_description.as_str())
            .bind(record.wind_speed)
            .bind(record.observation_instant_utc)
            .bind(record.utc_offset.as_str())
            .execute(self.conn()?)
            .await?;

        Ok(done.last_insert_rowid())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}
