use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Config,
    model::{WeatherQueryResult, WeatherReport},
    provider::{WeatherError, WeatherProvider, provider_from_config},
};

use super::{Tool, ToolError};

/// Current-weather lookup exposed to the model.
#[derive(Debug)]
pub struct WeatherTool {
    provider: Option<Box<dyn WeatherProvider>>,
}

impl WeatherTool {
    pub const NAME: &'static str = "WeatherTool";
    pub const DESCRIPTION: &'static str = "Gets current weather information for a location";

    pub fn from_config(config: &Config) -> Result<Self, WeatherError> {
        Ok(Self::with_provider(provider_from_config(config)?))
    }

    /// `None` means no credential is configured; every lookup then short-circuits.
    pub fn with_provider(provider: Option<Box<dyn WeatherProvider>>) -> Self {
        Self { provider }
    }

    /// Look up current conditions.
    ///
    /// A missing credential or a non-200 provider status is reported as an error
    /// record. Transport and decoding failures are returned as `Err`.
    pub async fn lookup(&self, location: &str) -> Result<WeatherQueryResult, WeatherError> {
        let Some(provider) = &self.provider else {
            return Ok(WeatherQueryResult::missing_key());
        };

        if location.trim().is_empty() {
            return Ok(WeatherQueryResult::error("location must be a non-empty string"));
        }

        match provider.current(location).await {
            Ok(data) => Ok(WeatherQueryResult::Report(WeatherReport::from(data))),
            Err(WeatherError::Status(code)) => Ok(WeatherQueryResult::provider_status(code)),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        Self::DESCRIPTION
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and country/state"
                }
            },
            "required": ["location"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let location = args.get("location").and_then(Value::as_str).unwrap_or_default();
        let result = self.lookup(location).await?;
        Ok(serde_json::to_value(result)?)
    }
}
