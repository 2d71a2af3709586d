//! Conversation content and the language model abstraction.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

use crate::tool::ToolDeclaration;

pub mod gemini;

pub use gemini::GeminiModel;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model API key not found.\nHint: set GEMINI_API_KEY or run `weatherbot configure`.")]
    MissingCredential,

    #[error("Model API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Model stream error: {0}")]
    Stream(String),

    #[error("Failed to reach model API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse model response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall { name: String, args: Value },
    FunctionResponse { name: String, response: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text(text.into())])
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::Text(text.into())])
    }
}

/// One piece of a streamed model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelPart {
    Text(String),
    FunctionCall { name: String, args: Value },
}

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub tools: Vec<ToolDeclaration>,
    pub temperature: Option<f32>,
}

pub type ModelStream = BoxStream<'static, Result<ModelPart, ModelError>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Start generating a reply. Errors before the first part (bad status,
    /// unreachable host) are returned directly; later ones arrive in the stream.
    async fn stream(&self, request: &GenerateRequest) -> Result<ModelStream, ModelError>;
}
