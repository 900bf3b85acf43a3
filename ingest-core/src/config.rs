use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    gate::ReadinessPolicy,
    store::{TableRef, sqlite::MEMORY_PATH},
};

pub const API_KEY_ENV: &str = "WEATHER_INGEST_API_KEY";
pub const DB_PASSWORD_ENV: &str = "WEATHER_INGEST_DB_PASSWORD";

/// One week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    Sqlite,
}

impl Backend {
    pub const fn all() -> &'static [Backend] {
        &[Backend::Postgres, Backend::Sqlite]
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Postgres => "postgres",
            Backend::Sqlite => "sqlite",
        })
    }
}

/// Where observations are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    /// Main database file for the SQLite backend.
    pub sqlite_path: Option<PathBuf>,
    /// Namespace (Postgres schema) holding the table.
    pub schema: String,
    pub table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Postgres,
            host: "localhost".to_string(),
            port: 5432,
            database: "db".to_string(),
            user: "db_user".to_string(),
            password: None,
            sqlite_path: None,
            schema: "dev".to_string(),
            table: "raw_weather_data".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn table_ref(&self) -> Result<TableRef> {
        TableRef::new(&self.schema, &self.table).with_context(|| {
            format!("Invalid table name `{}.{}` in [database]", self.schema, self.table)
        })
    }
}

/// Weatherstack API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherstackConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Location passed as `query`, e.g. "New York".
    pub query_location: String,
    pub timeout_secs: u64,
}

impl Default for WeatherstackConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "http://api.weatherstack.com".to_string(),
            query_location: "New York".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        let policy = ReadinessPolicy::default();
        Self { max_attempts: policy.max_attempts, delay_ms: policy.delay.as_millis() as u64 }
    }
}

impl ReadinessConfig {
    pub fn policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_minutes: 5 }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [database]
/// host = "db"
/// password = "..."
///
/// [weatherstack]
/// api_key = "..."
/// query_location = "New York"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub weatherstack: WeatherstackConfig,
    pub readiness: ReadinessConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load config from an explicit path, or defaults if the file is missing.
    /// Secrets in the environment win over the file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::read_file(path)?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// File contents only, ignoring the environment. Use this before `save_to`
    /// so secrets from the environment never end up on disk.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.weatherstack.api_key = Some(key);
        }
        if let Some(password) = lookup(DB_PASSWORD_ENV).filter(|v| !v.is_empty()) {
            self.database.password = Some(password);
        }
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-ingest", "weather-ingest")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// API key, if one is configured.
    pub fn api_key(&self) -> Option<&str> {
        self.weatherstack.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Check everything a cycle needs before the first trigger.
    pub fn validate(&self) -> Result<()> {
        if self.api_key().is_none() {
            bail!(
                "No Weatherstack API key configured.\n\
                 Hint: run `ingest-cli configure` or set {API_KEY_ENV}."
            );
        }

        if self.weatherstack.query_location.trim().is_empty() {
            bail!(
                "No query location configured.\n\
                 Hint: set `weatherstack.query_location`, e.g. \"New York\"."
            );
        }

        if self.readiness.max_attempts == 0 {
            bail!("`readiness.max_attempts` must be at least 1");
        }

        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.schedule.interval_minutes) {
            bail!("`schedule.interval_minutes` must be between 1 and {MAX_INTERVAL_MINUTES}");
        }

        if self.database.backend == Backend::Sqlite {
            match self.database.sqlite_path.as_deref() {
                None => bail!(
                    "SQLite backend selected but no `sqlite_path` configured.\n\
                     Hint: set `database.sqlite_path` in the config file."
                ),
                Some(path) if path.as_os_str() == MEMORY_PATH => bail!(
                    "`sqlite_path = \"{MEMORY_PATH}\"` discards every row when the job exits.\n\
                     Hint: point `database.sqlite_path` at a file."
                ),
                Some(_) => {}
            }
        }

        self.database.table_ref()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let mut cfg = Config::default();
        cfg.weatherstack.api_key = Some("KEY".into());
        cfg
    }

    #[test]
    fn defaults_match_the_deployed_job() {
        let cfg = Config::default();

        assert_eq!(cfg.database.backend, Backend::Postgres);
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.schema, "dev");
        assert_eq!(cfg.database.table, "raw_weather_data");
        assert_eq!(cfg.readiness.policy(), ReadinessPolicy::default());
        assert_eq!(cfg.readiness.max_attempts, 15);
        assert_eq!(cfg.schedule.interval_minutes, 5);
    }

    #[test]
    fn validate_errors_when_api_key_missing() {
        let err = Config::default().validate().unwrap_err();

        assert!(err.to_string().contains("No Weatherstack API key configured"));
        assert!(err.to_string().contains("Hint: run `ingest-cli configure`"));
    }

    #[test]
    fn validate_rejects_bad_identifiers() {
        let mut cfg = configured();
        cfg.database.table = "raw; DROP TABLE x".into();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid table name"));
    }

    #[test]
    fn validate_requires_sqlite_path() {
        let mut cfg = configured();
        cfg.database.backend = Backend::Sqlite;

        assert!(cfg.validate().is_err());

        cfg.database.sqlite_path = Some(PathBuf::from("/var/lib/weather/weather.db"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_in_memory_sqlite() {
        let mut cfg = configured();
        cfg.database.backend = Backend::Sqlite;
        cfg.database.sqlite_path = Some(PathBuf::from(":memory:"));

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("discards every row"));
    }

    #[test]
    fn validate_bounds_schedule_interval() {
        let mut cfg = configured();

        cfg.schedule.interval_minutes = 0;
        assert!(cfg.validate().is_err());

        cfg.schedule.interval_minutes = MAX_INTERVAL_MINUTES;
        assert!(cfg.validate().is_ok());

        cfg.schedule.interval_minutes = u64::MAX;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("interval_minutes"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [database]
            backend = "sqlite"
            sqlite_path = "/tmp/weather.db"

            [weatherstack]
            api_key = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.database.backend, Backend::Sqlite);
        assert_eq!(cfg.database.schema, "dev");
        assert_eq!(cfg.weatherstack.query_location, "New York");
        assert_eq!(cfg.api_key(), Some("abc"));
        assert_eq!(cfg.readiness.delay_ms, 1000);
    }

    #[test]
    fn env_secrets_override_file() {
        let mut cfg = configured();
        cfg.apply_env(|key| match key {
            API_KEY_ENV => Some("FROM_ENV".into()),
            DB_PASSWORD_ENV => Some("".into()),
            _ => None,
        });

        assert_eq!(cfg.api_key(), Some("FROM_ENV"));
        assert_eq!(cfg.database.password, None);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = configured();
        cfg.weatherstack.query_location = "Lisbon".into();
        cfg.save_to(&path).unwrap();

        let loaded = Config::read_file(&path).unwrap();
        assert_eq!(loaded.weatherstack.query_location, "Lisbon");
        assert_eq!(loaded.api_key(), Some("KEY"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(cfg.database.host, "localhost");
    }
}
