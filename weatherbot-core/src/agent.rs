//! Agent runner: drives one conversation turn between the model and the tools.

use futures::TryStreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    Config,
    llm::{Content, GenerateRequest, LanguageModel, ModelError, ModelPart, Part, Role},
    session::Session,
    tool::{ToolError, ToolRegistry, WeatherTool},
};

pub const WEATHERBOT_INSTRUCTION: &str = "\
You are WeatherBot, a helpful assistant specialized in weather information.
You can answer questions about current weather conditions for different locations.
If a user asks about weather in a specific location, use the WeatherTool to look up information.
For non-weather questions, politely explain that you specialize in weather information.

Always respond in a friendly, conversational manner.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Stopped after {0} rounds of tool calls without a final answer")]
    ToolRoundLimit(usize),
}

/// What the console sees while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    TextChunk(String),
    ToolCall { name: String, args: Value },
    ToolResult { name: String, response: Value },
}

pub struct Agent {
    name: String,
    description: String,
    instruction: String,
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    temperature: Option<f32>,
    max_tool_rounds: usize,
}

impl Agent {
    pub fn new(name: impl Into<String>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: String::new(),
            model,
            tools: ToolRegistry::new(),
            temperature: None,
            max_tool_rounds: 5,
        }
    }

    /// The weather assistant with its lookup tool, configured from `config`.
    pub fn weatherbot(config: &Config, model: Arc<dyn LanguageModel>) -> Result<Self, AgentError> {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(WeatherTool::from_config(config).map_err(ToolError::from)?))?;

        Ok(Self::new("WeatherBot", model)
            .with_description("An assistant for weather information")
            .with_instruction(WEATHERBOT_INSTRUCTION)
            .with_tools(tools)
            .with_temperature(config.model.temperature)
            .with_max_tool_rounds(config.max_tool_rounds))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one user turn, sending events as they happen.
    ///
    /// On error the session history is restored to what it was before the turn.
    #[tracing::instrument(name = "agent.turn", skip_all, fields(agent = %self.name, session = %session.id))]
    pub async fn run_turn(
        &self,
        session: &mut Session,
        input: &str,
        events: UnboundedSender<AgentEvent>,
    ) -> Result<(), AgentError> {
        let checkpoint = session.history.len();

        let result = self.drive_turn(session, input, &events).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "Turn abandoned");
            session.history.truncate(checkpoint);
        }
        result
    }

    async fn drive_turn(
        &self,
        session: &mut Session,
        input: &str,
        events: &UnboundedSender<AgentEvent>,
    ) -> Result<(), AgentError> {
        session.history.push(Content::user_text(input));
        let mut rounds = 0;

        loop {
            let request = self.request(&session.history);
            let mut stream = self.model.stream(&request).await?;

            let mut parts: Vec<Part> = Vec::new();
            let mut calls: Vec<(String, Value)> = Vec::new();

            while let Some(part) = stream.try_next().await? {
                match part {
                    ModelPart::Text(text) => {
                        if text.is_empty() {
                            continue;
                        }
                        emit(events, AgentEvent::TextChunk(text.clone()));
                        match parts.last_mut() {
                            Some(Part::Text(buf)) => buf.push_str(&text),
                            _ => parts.push(Part::Text(text)),
                        }
                    }
                    ModelPart::FunctionCall { name, args } => {
                        emit(events, AgentEvent::ToolCall { name: name.clone(), args: args.clone() });
                        parts.push(Part::FunctionCall { name: name.clone(), args: args.clone() });
                        calls.push((name, args));
                    }
                }
            }

            if !parts.is_empty() {
                session.history.push(Content::new(Role::Model, parts));
            }

            if calls.is_empty() {
                return Ok(());
            }

            rounds += 1;
            if rounds > self.max_tool_rounds {
                return Err(AgentError::ToolRoundLimit(self.max_tool_rounds));
            }

            let mut responses = Vec::with_capacity(calls.len());
            for (name, args) in calls {
                let response = self.call_tool(&name, args).await?;
                emit(events, AgentEvent::ToolResult { name: name.clone(), response: response.clone() });
                responses.push(Part::FunctionResponse { name, response });
            }
            session.history.push(Content::new(Role::User, responses));
        }
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, AgentError> {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = name, "Model requested an unknown tool");
            return Ok(json!({ "error": format!("Unknown tool: {name}") }));
        };

        tracing::debug!(tool = name, %args, "Calling tool");
        Ok(tool.call(args).await?)
    }

    fn request(&self, history: &[Content]) -> GenerateRequest {
        GenerateRequest {
            system_instruction: (!self.instruction.is_empty()).then(|| self.instruction.clone()),
            contents: history.to_vec(),
            tools: self.tools.declarations(),
            temperature: self.temperature,
        }
    }
}

fn emit(events: &UnboundedSender<AgentEvent>, event: AgentEvent) {
    if events.send(event).is_err() {
        tracing::debug!("Event receiver dropped");
    }
}
