//! Turning an API's local clock time plus offset into an absolute UTC instant.
//!
//! The upstream API reports only a wall-clock time ("07:40 AM") and a separate
//! offset, never a date. The date is taken as "today" *in the observed
//! location's zone*, so a reading just before local midnight does not land on
//! the ingesting host's calendar day.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use std::fmt::Debug;

use crate::{
    error::FormatError,
    model::{NormalizedRecord, WeatherObservation},
    offset::fixed_offset,
};

/// Source of "today's" calendar date as seen in a given fixed-offset zone.
pub trait TodayProvider: Send + Sync + Debug {
    fn today_in(&self, zone: FixedOffset) -> NaiveDate;
}

/// Wall-clock date in the requested zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToday;

impl TodayProvider for SystemToday {
    fn today_in(&self, zone: FixedOffset) -> NaiveDate {
        Utc::now().with_timezone(&zone).date_naive()
    }
}

/// Always the same date, whatever the zone. Used for replays and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedToday(pub NaiveDate);

impl TodayProvider for FixedToday {
    fn today_in(&self, _zone: FixedOffset) -> NaiveDate {
        self.0
    }
}

/// Parse a 12-hour clock reading such as `07:40 AM`.
pub fn parse_clock_time(raw: &str) -> Result<NaiveTime, FormatError> {
    NaiveTime::parse_from_str(raw.trim(), "%I:%M %p")
        .map_err(|_| FormatError::ClockTime { raw: raw.to_string() })
}

/// Resolve `clock_time` at `offset_raw` on today's date (in that offset) to a
/// zone-free UTC timestamp.
pub fn normalize(
    clock_time: &str,
    offset_raw: &str,
    today: &dyn TodayProvider,
) -> Result<NaiveDateTime, FormatError> {
    let time = parse_clock_time(clock_time)?;
    let zone = fixed_offset(offset_raw)?;

    let local = today.today_in(zone).and_time(time);
    local
        .checked_sub_signed(TimeDelta::seconds(i64::from(zone.local_minus_utc())))
        .ok_or_else(|| FormatError::InstantOutOfRange { raw: format!("{clock_time} {offset_raw}") })
}

impl NormalizedRecord {
    pub fn from_observation(
        observation: WeatherObservation,
        today: &dyn TodayProvider,
    ) -> Result<Self, FormatError> {
        let instant = normalize(
            &observation.observation_clock_time,
            &observation.utc_offset,
            today,
        )?;
        Ok(Self::new(observation, instant))
    }
}
