//! Core library for the WeatherBot chat client.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The weather provider and the lookup tool built on it
//! - The language model client and the agent runner that drives a turn
//! - In-memory conversation sessions
//!
//! It is used by `weatherbot-cli`, but can also be reused by other binaries or services.

pub mod agent;
pub mod config;
pub mod llm;
pub mod model;
pub mod provider;
pub mod session;
pub mod tool;

pub use agent::{Agent, AgentError, AgentEvent};
pub use config::Config;
pub use llm::{GeminiModel, LanguageModel, ModelError};
pub use model::{WeatherQueryResult, WeatherReport};
pub use provider::{WeatherError, WeatherProvider};
pub use session::{InMemorySessionService, Session, SessionKey};
pub use tool::{Tool, ToolError, ToolRegistry, WeatherTool};
