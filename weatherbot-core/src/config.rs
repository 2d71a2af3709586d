use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

pub const WEATHER_API_KEY_ENV: &str = "WEATHER_API_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const MODEL_ENV: &str = "WEATHERBOT_MODEL";

pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.weatherapi.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Weather provider credentials and endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self { api_key: None, base_url: DEFAULT_WEATHER_BASE_URL.to_string() }
    }
}

/// Language model credentials and generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub name: String,
    pub temperature: f32,
    pub base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            name: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// timeout_secs = 30
///
/// [weather]
/// api_key = "..."
///
/// [model]
/// api_key = "..."
/// name = "gemini-2.0-flash"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub weather: WeatherConfig,
    pub model: ModelConfig,
    /// Applied to every outbound HTTP request.
    pub timeout_secs: u64,
    /// Model round-trips with tool calls allowed per turn.
    pub max_tool_rounds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weather: WeatherConfig::default(),
            model: ModelConfig::default(),
            timeout_secs: 30,
            max_tool_rounds: 5,
        }
    }
}

impl Config {
    /// Load the config file, then overlay the process environment.
    pub fn resolve() -> Result<Self> {
        let mut cfg = Self::load()?;
        cfg.apply_env(|name| std::env::var(name).ok());
        Ok(cfg)
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration TOML")
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(path)
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weatherbot", "weatherbot")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Overlay values from an environment lookup. Unset or empty variables leave
    /// the file value in place.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(WEATHER_API_KEY_ENV) {
            self.weather.api_key = Some(key);
        }
        if let Some(key) = get(GEMINI_API_KEY_ENV) {
            self.model.api_key = Some(key);
        }
        if let Some(name) = get(MODEL_ENV) {
            self.model.name = name;
        }
    }

    /// Returns the weather provider key, if present and non-empty.
    pub fn weather_api_key(&self) -> Option<&str> {
        non_empty(self.weather.api_key.as_deref())
    }

    /// Returns the language model key, if present and non-empty.
    pub fn model_api_key(&self) -> Option<&str> {
        non_empty(self.model.api_key.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
