use async_trait::async_trait;
use std::fmt::Debug;

use crate::{Config, model::WeatherObservation, provider::weatherstack::WeatherstackProvider};

pub mod weatherstack;

/// Upstream source of the current observation for the configured location.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch_current(&self) -> anyhow::Result<WeatherObservation>;
}

/// Construct the Weatherstack provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for Weatherstack.\n\
             Hint: run `ingest-cli configure` and enter your API key."
        )
    })?;

    let provider = WeatherstackProvider::new(api_key.to_owned(), &config.weatherstack)?;

    Ok(Box::new(provider))
}
