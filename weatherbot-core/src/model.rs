use serde::{Deserialize, Serialize};
use serde_json::Number;

pub const MISSING_KEY_MESSAGE: &str = "Weather API key not found in .env file";

/// Payload of the provider's `current.json` endpoint, trimmed to the fields we use.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    pub location: Location,
    pub current: Current,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub name: String,
    pub region: String,
    pub country: String,
}

/// Numbers are kept as JSON numbers so they render exactly as the provider sent them.
#[derive(Debug, Clone, Deserialize)]
pub struct Current {
    pub temp_c: Number,
    pub temp_f: Number,
    pub condition: Condition,
    pub humidity: Number,
    pub wind_mph: Number,
    pub wind_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub text: String,
}

/// Normalized success record handed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub region: String,
    pub country: String,
    pub temperature: String,
    pub condition: String,
    pub humidity: String,
    pub wind: String,
}

impl From<CurrentWeather> for WeatherReport {
    fn from(data: CurrentWeather) -> Self {
        let CurrentWeather { location, current } = data;

        Self {
            location: location.name,
            region: location.region,
            country: location.country,
            temperature: format!("{}°C / {}°F", current.temp_c, current.temp_f),
            condition: current.condition.text,
            humidity: format!("{}%", current.humidity),
            wind: format!("{} mph {}", current.wind_mph, current.wind_dir),
        }
    }
}

/// Result of one weather lookup: either a full report or a single error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeatherQueryResult {
    Report(WeatherReport),
    Error { error: String },
}

impl WeatherQueryResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { error: message.into() }
    }

    pub fn missing_key() -> Self {
        Self::error(MISSING_KEY_MESSAGE)
    }

    pub fn provider_status(status: u16) -> Self {
        Self::error(format!("Failed to get weather data: {status}"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
