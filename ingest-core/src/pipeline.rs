//! One ingestion cycle: gate, provision, fetch, normalize, persist.
//!
//! The store handle is acquired while gating and closed on every way out of
//! the cycle. Faults never escape as panics or bare errors; the caller gets a
//! [`CycleOutcome`] and decides whether to alert. Nothing here retries a
//! whole cycle; that is left to whatever triggers the next one.

use std::fmt;

use tracing::{error, info, instrument, warn};

use crate::{
    Config,
    error::IngestError,
    gate::{ReadinessPolicy, await_ready},
    model::NormalizedRecord,
    normalize::{SystemToday, TodayProvider},
    provider::{WeatherProvider, provider_from_config},
    store::{self, Connector, TableRef, WeatherStore, connector_from_config},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Init,
    Gating,
    Provisioning,
    Fetching,
    Normalizing,
    Persisting,
    Failed,
    Closed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleState::Init => "init",
            CycleState::Gating => "gating",
            CycleState::Provisioning => "provisioning",
            CycleState::Fetching => "fetching",
            CycleState::Normalizing => "normalizing",
            CycleState::Persisting => "persisting",
            CycleState::Failed => "failed",
            CycleState::Closed => "closed",
        })
    }
}

/// What a successful cycle wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub row_id: i64,
    pub record: NormalizedRecord,
}

/// Why a cycle stopped, and in which step.
#[derive(Debug)]
pub struct CycleFailure {
    pub state: CycleState,
    pub error: IngestError,
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle failed while {}: {}", self.state, self.error)
    }
}

impl std::error::Error for CycleFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Success(CycleReport),
    Failed(CycleFailure),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<CycleReport, CycleFailure> {
        match self {
            CycleOutcome::Success(report) => Ok(report),
            CycleOutcome::Failed(failure) => Err(failure),
        }
    }
}

fn at(state: CycleState) -> impl FnOnce(IngestError) -> CycleFailure {
    move |error| CycleFailure { state, error }
}

/// Everything a cycle needs, wired once and reused across triggers.
#[derive(Debug)]
pub struct Ingestor {
    connector: Box<dyn Connector>,
    provider: Box<dyn WeatherProvider>,
    target: TableRef,
    readiness: ReadinessPolicy,
    today: Box<dyn TodayProvider>,
}

impl Ingestor {
    pub fn new(
        connector: Box<dyn Connector>,
        provider: Box<dyn WeatherProvider>,
        target: TableRef,
        readiness: ReadinessPolicy,
    ) -> Self {
        Self { connector, provider, target, readiness, today: Box::new(SystemToday) }
    }

    /// Build from a validated config with the real backends.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        Ok(Self::new(
            connector_from_config(&config.database)?,
            provider_from_config(config)?,
            config.database.table_ref()?,
            config.readiness.policy(),
        ))
    }

    /// Replace the wall-clock "today" lookup.
    pub fn with_today(mut self, today: impl TodayProvider + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn target(&self) -> &TableRef {
        &self.target
    }

    /// Run one full cycle and report how it ended.
    #[instrument(skip(self), fields(table = %self.target))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        info!(state = %CycleState::Init, "starting ingestion cycle");

        let mut session = match self.acquire().await {
            Ok(session) => session,
            Err(failure) => return self.finish(Err(failure)),
        };

        let result = self.ingest(session.as_mut()).await;
        self.release(session.as_mut()).await;
        self.finish(result)
    }

    /// Gate and provision only, without fetching. Useful before the first trigger.
    #[instrument(skip(self), fields(table = %self.target))]
    pub async fn provision(&self) -> Result<(), CycleFailure> {
        let mut session = self.acquire().await?;

        let result = store::ensure_schema(session.as_mut(), &self.target)
            .await
            .map_err(at(CycleState::Provisioning));
        self.release(session.as_mut()).await;
        result
    }

    async fn acquire(&self) -> Result<Box<dyn WeatherStore>, CycleFailure> {
        info!(state = %CycleState::Gating, "waiting for database");

        await_ready(|| store::open_ready(self.connector.as_ref()), &self.readiness)
            .await
            .map_err(|unavailable| IngestError::Unavailable {
                attempts: unavailable.attempts,
                last_error: unavailable.last_error,
            })
            .map_err(at(CycleState::Gating))
    }

    async fn ingest(&self, session: &mut dyn WeatherStore) -> Result<CycleReport, CycleFailure> {
        info!(state = %CycleState::Provisioning, "provisioning schema");
        store::ensure_schema(session, &self.target)
            .await
            .map_err(at(CycleState::Provisioning))?;

        info!(state = %CycleState::Fetching, "fetching current weather");
        let observation = self
            .provider
            .fetch_current()
            .await
            .map_err(IngestError::Fetch)
            .map_err(at(CycleState::Fetching))?;

        info!(
            state = %CycleState::Normalizing,
            location = %observation.location_name,
            "normalizing observation"
        );
        let record = NormalizedRecord::from_observation(observation, self.today.as_ref())
            .map_err(IngestError::from)
            .map_err(at(CycleState::Normalizing))?;

        info!(
            state = %CycleState::Persisting,
            instant = %record.observation_instant_utc,
            "persisting observation"
        );
        let row_id = store::persist(session, &self.target, &record)
            .await
            .map_err(at(CycleState::Persisting))?;

        Ok(CycleReport { row_id, record })
    }

    async fn release(&self, session: &mut dyn WeatherStore) {
        match session.close().await {
            Ok(()) => info!(state = %CycleState::Closed, "database connection closed"),
            Err(e) => {
                warn!(state = %CycleState::Closed, error = %e, "closing database connection failed")
            }
        }
    }

    fn finish(&self, result: Result<CycleReport, CycleFailure>) -> CycleOutcome {
        match result {
            Ok(report) => {
                info!(row_id = report.row_id, "ingestion cycle succeeded");
                CycleOutcome::Success(report)
            }
            Err(failure) => {
                error!(
                    state = %CycleState::Failed,
                    failed_while = %failure.state,
                    retryable = failure.error.is_retryable(),
                    error = %failure.error,
                    "ingestion cycle failed"
                );
                CycleOutcome::Failed(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{FaultKind, StoreError},
        model::WeatherObservation,
        normalize::FixedToday,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    #[derive(Debug, Default)]
    struct Ledger {
        connects: AtomicUsize,
        closes: AtomicUsize,
        rows: Mutex<Vec<NormalizedRecord>>,
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct Faults {
        connect: bool,
        provision: bool,
        insert: bool,
    }

    #[derive(Debug, Clone)]
    struct FakeConnector {
        ledger: Arc<Ledger>,
        faults: Faults,
    }

    #[derive(Debug)]
    struct FakeStore {
        ledger: Arc<Ledger>,
        faults: Faults,
        open: bool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn WeatherStore>, StoreError> {
            self.ledger.connects.fetch_add(1, Ordering::SeqCst);
            if self.faults.connect {
                return Err(StoreError::Other("connection refused".into()));
            }
            Ok(Box::new(FakeStore { ledger: self.ledger.clone(), faults: self.faults, open: true }))
        }
    }

    #[async_trait]
    impl WeatherStore for FakeStore {
        async fn ping(&mut self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn ensure_schema(&mut self, _target: &TableRef) -> Result<(), StoreError> {
            if self.faults.provision {
                return Err(StoreError::Other("permission denied for database db".into()));
            }
            Ok(())
        }

        async fn insert(
            &mut self,
            _target: &TableRef,
            record: &NormalizedRecord,
        ) -> Result<i64, StoreError> {
            if self.faults.insert {
                return Err(StoreError::Other("disk full".into()));
            }
            let mut rows = self.ledger.rows.lock().unwrap();
            rows.push(record.clone());
            Ok(rows.len() as i64)
        }

        async fn close(&mut self) -> Result<(), StoreError> {
            if std::mem::take(&mut self.open) {
                self.ledger.closes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FakeProvider(Option<WeatherObservation>);

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn fetch_current(&self) -> anyhow::Result<WeatherObservation> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("upstream returned nothing"))
        }
    }

    fn new_york() -> WeatherObservation {
        WeatherObservation {
            location_name: "New York".into(),
            utc_offset: "-4.0".into(),
            observation_clock_time: "07:40 AM".into(),
            temperature: 26.0,
            weather_description: "Partly Cloudy ".into(),
            wind_speed: 8.0,
        }
    }

    fn ingestor(faults: Faults, observation: Option<WeatherObservation>) -> (Ingestor, Arc<Ledger>) {
        let ledger = Arc::new(Ledger::default());
        let ingestor = Ingestor::new(
            Box::new(FakeConnector { ledger: ledger.clone(), faults }),
            Box::new(FakeProvider(observation)),
            TableRef::new("dev", "raw_weather_data").unwrap(),
            ReadinessPolicy { max_attempts: 15, delay: Duration::from_secs(1) },
        )
        .with_today(FixedToday(NaiveDate::from_ymd_opt(2025, 8, 13).unwrap()));
        (ingestor, ledger)
    }

    fn failure(outcome: CycleOutcome) -> CycleFailure {
        match outcome {
            CycleOutcome::Failed(failure) => failure,
            CycleOutcome::Success(report) => panic!("expected failure, got {report:?}"),
        }
    }

    #[tokio::test]
    async fn successful_cycle_writes_one_row_and_closes() {
        let (ingestor, ledger) = ingestor(Faults::default(), Some(new_york()));

        let report = ingestor.run_cycle().await.into_result().unwrap();

        assert_eq!(report.row_id, 1);
        assert_eq!(report.record.location_name, "New York");
        assert_eq!(report.record.temperature, 26.0);
        assert_eq!(report.record.utc_offset, "-4.0");
        assert_eq!(
            report.record.observation_instant_utc,
            NaiveDate::from_ymd_opt(2025, 8, 13).unwrap().and_hms_opt(11, 40, 0).unwrap()
        );
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
        assert_eq!(ledger.connects.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_database_exhausts_budget() {
        let faults = Faults { connect: true, ..Default::default() };
        let (ingestor, ledger) = ingestor(faults, Some(new_york()));

        let failure = failure(ingestor.run_cycle().await);

        assert_eq!(failure.state, CycleState::Gating);
        assert_eq!(failure.error.kind(), FaultKind::Unavailable);
        assert!(matches!(failure.error, IngestError::Unavailable { attempts: 15, .. }));
        assert_eq!(ledger.connects.load(Ordering::SeqCst), 15);
        assert_eq!(ledger.closes.load(Ordering::SeqCst), 0);
        assert!(ledger.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provisioning_fault_still_releases_handle() {
        let faults = Faults { provision: true, ..Default::default() };
        let (ingestor, ledger) = ingestor(faults, Some(new_york()));

        let failure = failure(ingestor.run_cycle().await);

        assert_eq!(failure.state, CycleState::Provisioning);
        assert_eq!(failure.error.kind(), FaultKind::Storage);
        assert_eq!(ledger.closes.load(Ordering::SeqCst), 1);
        assert!(ledger.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_payload_is_a_fetch_error() {
        let (ingestor, ledger) = ingestor(Faults::default(), None);

        let failure = failure(ingestor.run_cycle().await);

        assert_eq!(failure.state, CycleState::Fetching);
        assert_eq!(failure.error.kind(), FaultKind::Fetch);
        assert!(failure.to_string().contains("upstream returned nothing"));
        assert_eq!(ledger.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_offset_fails_normalizing() {
        let observation = WeatherObservation { utc_offset: "banana".into(), ..new_york() };
        let (ingestor, ledger) = ingestor(Faults::default(), Some(observation));

        let failure = failure(ingestor.run_cycle().await);

        assert_eq!(failure.state, CycleState::Normalizing);
        assert_eq!(failure.error.kind(), FaultKind::Format);
        assert!(!failure.error.is_retryable());
        assert_eq!(ledger.closes.load(Ordering::SeqCst), 1);
        assert!(ledger.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_fault_reports_persisting() {
        let faults = Faults { insert: true, ..Default::default() };
        let (ingestor, ledger) = ingestor(faults, Some(new_york()));

        let failure = failure(ingestor.run_cycle().await);

        assert_eq!(failure.state, CycleState::Persisting);
        assert_eq!(failure.error.kind(), FaultKind::Storage);
        assert_eq!(ledger.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provision_only_does_not_fetch() {
        let (ingestor, ledger) = ingestor(Faults::default(), None);

        ingestor.provision().await.unwrap();

        assert_eq!(ledger.connects.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.closes.load(Ordering::SeqCst), 1);
    }
}
