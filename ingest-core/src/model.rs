use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One current-conditions snapshot as reported by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub location_name: String,
    /// Free-form offset as the API reports it, e.g. "-4.0" or "UTC+5:30".
    pub utc_offset: String,
    /// Local wall-clock time of the reading, "HH:MM AM/PM".
    pub observation_clock_time: String,
    pub temperature: f64,
    pub weather_description: String,
    pub wind_speed: f64,
}

/// An observation with its reading time resolved to an absolute UTC instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub location_name: String,
    pub utc_offset: String,
    pub observation_clock_time: String,
    pub temperature: f64,
    pub weather_description: String,
    pub wind_speed: f64,
    /// UTC, stored without a zone tag.
    pub observation_instant_utc: NaiveDateTime,
}

impl NormalizedRecord {
    pub fn new(observation: WeatherObservation, observation_instant_utc: NaiveDateTime) -> Self {
        let WeatherObservation {
            location_name,
            utc_offset,
            observation_clock_time,
            temperature,
            weather_description,
            wind_speed,
        } = observation;

        Self {
            location_name,
            utc_offset,
            observation_clock_time,
            temperature,
            weather_description,
            wind_speed,
            observation_instant_utc,
        }
    }
}
