//! Tools the agent can expose to the model.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::provider::WeatherError;

pub mod weather;

pub use weather::WeatherTool;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error("Failed to encode tool result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Name, description and JSON schema the model sees for a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Run the tool. `Err` means the call could not complete at all and aborts
    /// the turn; failures the model should see are returned as `Ok` values.
    async fn call(&self, args: Value) -> Result<Value, ToolError>;

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Ordered set of tools, unique by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        if self.get(tool.name()).is_some() {
            return Err(ToolError::Duplicate(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|t| t.declaration()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.iter().map(|t| t.name())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its arguments"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        async fn call(&self, args: Value) -> Result<Value, ToolError> {
            Ok(args)
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();

        let err = registry.register(Arc::new(Echo)).unwrap_err();

        assert!(matches!(err, ToolError::Duplicate(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn declarations_follow_registration() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();

        let decls = registry.declarations();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "echo");
        assert_eq!(decls[0].parameters, json!({"type": "object"}));
    }

    #[tokio::test]
    async fn lookup_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();

        let tool = registry.get("echo").expect("registered");
        assert_eq!(tool.call(json!({"a": 1})).await.unwrap(), json!({"a": 1}));
        assert!(registry.get("missing").is_none());
    }
}
