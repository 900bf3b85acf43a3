use async_trait::async_trait;
use sqlx::{Connection, PgConnection, postgres::PgConnectOptions};
use std::time::Duration;

use crate::{
    config::DatabaseConfig,
    error::StoreError,
    model::NormalizedRecord,
    store::{Connector, TableRef, WeatherStore},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PostgresConnector {
    options: PgConnectOptions,
}

impl PostgresConnector {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .application_name("weather-ingest");

        if let Some(password) = config.password.as_deref() {
            options = options.password(password);
        }

        Self { options }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self) -> Result<Box<dyn WeatherStore>, StoreError> {
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, PgConnection::connect_with(&self.options))
            .await
            .map_err(|_| {
                StoreError::Other(format!("connect timed out after {}s", CONNECT_TIMEOUT.as_secs()))
            })??;

        Ok(Box::new(PostgresStore { conn: Some(conn) }))
    }
}

#[derive(Debug)]
pub struct PostgresStore {
    conn: Option<PgConnection>,
}

impl PostgresStore {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::Closed)
    }
}

#[async_trait]
impl WeatherStore for PostgresStore {
    async fn ping(&mut self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(self.conn()?).await?;
        Ok(())
    }

    async fn ensure_schema(&mut self, target: &TableRef) -> Result<(), StoreError> {
        let create_schema = format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", target.namespace());
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id SERIAL PRIMARY KEY,
                city TEXT,
                temperature FLOAT,
                weather_description TEXT,
                wind_speed FLOAT,
                time TIMESTAMP,
                inserted_at TIMESTAMP DEFAULT NOW(),
                utc_offset TEXT
            )",
            target.qualified()
        );

        // Postgres DDL is transactional; dropping `tx` on error rolls back.
        let mut tx = self.conn()?.begin().await?;
        sqlx::query(&create_schema).execute(&mut *tx).await?;
        sqlx::query(&create_table).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn insert(
        &mut self,
        target: &TableRef,
        record: &NormalizedRecord,
    ) -> Result<i64, StoreError> {
        let sql = format!(
            "INSERT INTO {} (
                city, temperature, weather_description, wind_speed, time, inserted_at, utc_offset
            ) VALUES ($1, $2, $3, $4, $5, NOW(), $6)
            RETURNING id",
            target.qualified()
        );

        let id: i32 = sqlx::query_scalar(&sql)
            .bind(record.location_name.as_str())
            .bind(record.temperature)
            .bind(record.weather_description.as_str())
            .bind(record.wind_speed)
            .bind(record.observation_instant_utc)
            .bind(record.utc_offset.as_str())
            .fetch_one(self.conn()?)
            .await?;

        Ok(i64::from(id))
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}
