use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::model::CurrentWeather;

use super::{WeatherError, WeatherProvider};

/// WeatherAPI.com client for the `current.json` endpoint.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, WeatherError> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { api_key, base_url, http })
    }

    pub fn current_url(&self) -> String {
        format!("{}/current.json", self.base_url)
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    #[tracing::instrument(name = "weatherapi.current", skip(self))]
    async fn current(&self, location: &str) -> Result<CurrentWeather, WeatherError> {
        let res = self
            .http
            .get(self.current_url())
            .query(&[("key", self.api_key.as_str()), ("q", location)])
            .send()
            .await?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %truncate_body(&body), "WeatherAPI current request failed");
            return Err(WeatherError::Status(status.as_u16()));
        }

        let body = res.text().await?;
        let parsed: CurrentWeather = serde_json::from_str(&body)?;

        tracing::debug!(name = %parsed.location.name, "WeatherAPI current request succeeded");
        Ok(parsed)
    }
}

fn truncate_body(body: &str) -> &str {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
