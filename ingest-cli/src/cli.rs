use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ingest_core::{Backend, Config, CycleOutcome, Ingestor, MAX_INTERVAL_MINUTES};
use inquire::{CustomType, Password, PasswordDisplayMode, Select, Text};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "ingest-cli", version, about = "Weather snapshot ingestion job")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one ingestion cycle now. Exits non-zero if the cycle failed.
    Run,

    /// Run a cycle on a fixed interval until interrupted.
    Schedule {
        /// Minutes between triggers; overrides `schedule.interval_minutes`.
        #[arg(long)]
        interval_minutes: Option<u64>,
    },

    /// Wait for the database and create the schema, without fetching.
    Provision,

    /// Interactively write the config file.
    Configure,

    /// Print the config file location.
    ConfigPath,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };

        match self.command {
            Command::Run => {
                let ingestor = Ingestor::from_config(&Config::load_from(&path)?)?;
                let report = ingestor.run_cycle().await.into_result()?;

                println!(
                    "Stored observation #{} for {}: {}°, {} (observed {} UTC)",
                    report.row_id,
                    report.record.location_name,
                    report.record.temperature,
                    report.record.weather_description.trim(),
                    report.record.observation_instant_utc,
                );
            }
            Command::Schedule { interval_minutes } => {
                let config = Config::load_from(&path)?;
                let every =
                    trigger_interval(interval_minutes.unwrap_or(config.schedule.interval_minutes))?;

                let ingestor = Ingestor::from_config(&config)?;
                schedule(&ingestor, every).await?;
            }
            Command::Provision => {
                let ingestor = Ingestor::from_config(&Config::load_from(&path)?)?;
                ingestor.provision().await?;

                println!("Table {} is ready.", ingestor.target());
            }
            Command::Configure => configure(&path)?,
            Command::ConfigPath => println!("{}", path.display()),
        }

        Ok(())
    }
}

fn trigger_interval(minutes: u64) -> Result<Duration> {
    anyhow::ensure!(minutes > 0, "interval must be at least one minute");
    anyhow::ensure!(
        minutes <= MAX_INTERVAL_MINUTES,
        "interval of {minutes} minutes exceeds the maximum of {MAX_INTERVAL_MINUTES}"
    );

    let secs = minutes.checked_mul(60).context("interval overflows")?;
    Ok(Duration::from_secs(secs))
}

/// Fixed-interval trigger. Cycles never overlap; a tick missed while a cycle
/// is still running is skipped, not queued.
async fn schedule(ingestor: &Ingestor, every: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(every_secs = every.as_secs(), table = %ingestor.target(), "scheduler started");

    let (mut succeeded, mut failed) = (0u64, 0u64);
    loop {
        tokio::select! {
            _ = ticker.tick() => match ingestor.run_cycle().await {
                CycleOutcome::Success(_) => succeeded += 1,
                CycleOutcome::Failed(failure) => {
                    failed += 1;
                    if !failure.error.is_retryable() {
                        warn!(error = %failure, "cycle failed with a non-retryable fault");
                    }
                }
            },
            res = &mut shutdown => {
                res.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    info!(succeeded, failed, "scheduler stopped");
    Ok(())
}

fn configure(path: &Path) -> Result<()> {
    let mut cfg = Config::read_file(path)?;

    let api_key = Password::new("Weatherstack API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key")
        .prompt()?;
    if !api_key.trim().is_empty() {
        cfg.weatherstack.api_key = Some(api_key.trim().to_string());
    }

    cfg.weatherstack.query_location = Text::new("Location to track:")
        .with_default(&cfg.weatherstack.query_location)
        .prompt()?;

    let backends = Backend::all().to_vec();
    let cursor = backends.iter().position(|b| *b == cfg.database.backend).unwrap_or(0);
    cfg.database.backend =
        Select::new("Database backend:", backends).with_starting_cursor(cursor).prompt()?;

    match cfg.database.backend {
        Backend::Postgres => {
            let db = &mut cfg.database;
            db.host = Text::new("Host:").with_default(&db.host).prompt()?;
            db.port = CustomType::<u16>::new("Port:").with_default(db.port).prompt()?;
            db.database = Text::new("Database:").with_default(&db.database).prompt()?;
            db.user = Text::new("User:").with_default(&db.user).prompt()?;

            let password = Password::new("Password:")
                .with_display_mode(PasswordDisplayMode::Masked)
                .without_confirmation()
                .with_help_message("Leave empty to keep the current password")
                .prompt()?;
            if !password.is_empty() {
                db.password = Some(password);
            }
        }
        Backend::Sqlite => {
            let current = cfg
                .database
                .sqlite_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "weather.db".to_string());
            let sqlite_path = Text::new("SQLite file:").with_default(&current).prompt()?;
            cfg.database.sqlite_path = Some(PathBuf::from(sqlite_path));
        }
    }

    cfg.validate()?;
    cfg.save_to(path)?;

    println!("Configuration saved to {}", path.display());
    Ok(())
}
