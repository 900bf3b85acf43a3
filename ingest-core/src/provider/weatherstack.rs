use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{config::WeatherstackConfig, model::WeatherObservation};

use super::WeatherProvider;

#[derive(Debug, Clone)]
pub struct WeatherstackProvider {
    api_key: String,
    base_url: String,
    query: String,
    http: Client,
}

impl WeatherstackProvider {
    pub fn new(api_key: String, config: &WeatherstackConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for Weatherstack")?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            query: config.query_location.clone(),
            http,
        })
    }
}

// Weatherstack answers 200 even for failures, with `success: false`.
#[derive(Debug, Deserialize)]
struct WsResponse {
    error: Option<WsError>,
    location: Option<WsLocation>,
    current: Option<WsCurrent>,
}

#[derive(Debug, Deserialize)]
struct WsError {
    code: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsLocation {
    name: String,
    utc_offset: String,
}

#[derive(Debug, Deserialize)]
struct WsCurrent {
    observation_time: String,
    temperature: f64,
    #[serde(default)]
    weather_descriptions: Vec<String>,
    wind_speed: f64,
}

#[async_trait]
impl WeatherProvider for WeatherstackProvider {
    async fn fetch_current(&self) -> Result<WeatherObservation> {
        let url = format!("{}/current", self.base_url);
        debug!(%url, query = %self.query, "requesting current weather");

        let res = self
            .http
            .get(&url)
            .query(&[("access_key", self.api_key.as_str()), ("query", self.query.as_str())])
            .send()
            .await
            .context("Failed to send request to Weatherstack (current)")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read Weatherstack current response body")?;

        if !status.is_success() {
            bail!(
                "Weatherstack current request failed with status {}: {}",
                status,
                truncate_body(&body),
            );
        }

        let parsed: WsResponse =
            serde_json::from_str(&body).context("Failed to parse Weatherstack current JSON")?;

        if let Some(err) = parsed.error {
            bail!(
                "Weatherstack returned error {} ({}): {}",
                err.code.map_or_else(|| "?".to_string(), |c| c.to_string()),
                err.kind.as_deref().unwrap_or("unknown"),
                err.info.as_deref().unwrap_or("no details"),
            );
        }

        let location =
            parsed.location.ok_or_else(|| anyhow!("Weatherstack response has no location block"))?;
        let current =
            parsed.current.ok_or_else(|| anyhow!("Weatherstack response has no current block"))?;

        let weather_description =
            current.weather_descriptions.into_iter().next().ok_or_else(|| {
                anyhow!("Weatherstack response contained no weather description")
            })?;

        Ok(WeatherObservation {
            location_name: location.name,
            utc_offset: location.utc_offset,
            observation_clock_time: current.observation_time,
            temperature: current.temperature,
            weather_description,
            wind_speed: current.wind_speed,
        })
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
