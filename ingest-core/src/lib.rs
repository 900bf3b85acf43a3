//! Core library for the weather ingestion job.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Offset parsing and timestamp normalization
//! - The readiness gate and storage backends (Postgres, SQLite)
//! - Abstraction over the upstream weather provider
//! - The ingestion cycle that ties them together
//!
//! It is used by `ingest-cli`, but can also be driven by any other scheduler.

pub mod config;
pub mod error;
pub mod gate;
pub mod model;
pub mod normalize;
pub mod offset;
pub mod pipeline;
pub mod provider;
pub mod store;

pub use config::{Backend, Config, DatabaseConfig, MAX_INTERVAL_MINUTES};
pub use error::{FaultKind, FormatError, IngestError, StoreError};
pub use gate::{ReadinessPolicy, await_ready};
pub use model::{NormalizedRecord, WeatherObservation};
pub use normalize::{FixedToday, SystemToday, TodayProvider, normalize};
pub use offset::parse_offset;
pub use pipeline::{CycleFailure, CycleOutcome, CycleReport, CycleState, Ingestor};
pub use provider::{WeatherProvider, provider_from_config};
pub use store::{Connector, TableRef, WeatherStore, connector_from_config};
