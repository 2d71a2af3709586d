use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use weatherbot_core::{Config, WeatherTool};

use crate::chat;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weatherbot", version, about = "Chat with WeatherBot about the current weather")]
pub struct Cli {
    /// Defaults to `chat` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start an interactive chat session.
    Chat,

    /// Store API keys and the model name in the config file.
    Configure,

    /// Look up current weather directly, without the model.
    Weather {
        /// City, optionally with region or country.
        location: String,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command.unwrap_or(Command::Chat) {
            Command::Chat => {
                let config = Config::resolve()?;
                chat::run(&config).await
            }
            Command::Configure => configure(),
            Command::Weather { location } => {
                let config = Config::resolve()?;
                let tool = WeatherTool::from_config(&config)?;
                let result = tool.lookup(&location).await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(())
            }
        }
    }
}

/// Interactive prompts; blank answers keep the stored value.
fn configure() -> anyhow::Result<()> {
    // File values only, so keys that came from the environment are not persisted.
    let mut config = Config::load()?;

    if let Some(key) = prompt_key("WeatherAPI.com API key:", config.weather_api_key().is_some())? {
        config.weather.api_key = Some(key);
    }
    if let Some(key) = prompt_key("Gemini API key:", config.model_api_key().is_some())? {
        config.model.api_key = Some(key);
    }

    let model = Text::new("Gemini model:")
        .with_default(&config.model.name)
        .prompt()
        .context("Failed to read model name")?;
    if !model.trim().is_empty() {
        config.model.name = model.trim().to_string();
    }

    let path = config.save()?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

fn prompt_key(message: &str, has_current: bool) -> anyhow::Result<Option<String>> {
    let help = if has_current {
        "Leave empty to keep the stored key"
    } else {
        "Leave empty to skip"
    };

    let key = Password::new(message)
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_help_message(help)
        .prompt()
        .with_context(|| format!("Failed to read {message}"))?;

    let key = key.trim();
    Ok((!key.is_empty()).then(|| key.to_string()))
}
