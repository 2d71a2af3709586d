use crate::{Config, model::CurrentWeather, provider::weatherapi::WeatherApiProvider};
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

pub mod weatherapi;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Weather provider returned HTTP {0}")]
    Status(u16),

    #[error("Failed to reach weather provider: {0}")]
    Transport(reqwest::Error),

    #[error("Failed to parse weather provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

// The request URL carries the API key in its query string, so it never goes into the error.
impl From<reqwest::Error> for WeatherError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url())
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Fetch current conditions for a free-form place name.
    async fn current(&self, location: &str) -> Result<CurrentWeather, WeatherError>;
}

/// Construct the provider from config. Returns `Ok(None)` when no API key is configured.
pub fn provider_from_config(
    config: &Config,
) -> Result<Option<Box<dyn WeatherProvider>>, WeatherError> {
    let Some(api_key) = config.weather_api_key() else {
        return Ok(None);
    };

    let provider = WeatherApiProvider::new(
        api_key.to_owned(),
        config.weather.base_url.clone(),
        config.timeout(),
    )?;

    Ok(Some(Box::new(provider)))
}
