use crate::error::ToolError;
use crate::sensor::SensorSource;
use log::debug;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Name under which the sensor is exposed to the engine
pub const READING_TOOL_NAME: &str = "get_current_reading";

/// A function the reasoning engine may call during a round
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments; no arguments by default
    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn call(&self, arguments: &Value) -> Result<Value, ToolError>;
}

/// Exposes a [`SensorSource`] as `get_current_reading() -> float`
pub struct ReadingTool {
    sensor: Arc<dyn SensorSource>,
}

impl ReadingTool {
    pub fn new(sensor: Arc<dyn SensorSource>) -> Self {
        Self { sensor }
    }
}

impl Tool for ReadingTool {
    fn name(&self) -> &str {
        READING_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Get the current system temperature reading."
    }

    fn call(&self, _arguments: &Value) -> Result<Value, ToolError> {
        let reading = self.sensor.read()?;
        Ok(json!(reading))
    }
}

/// Tool declaration in the OpenAI function-calling format
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Ordered, cheaply clonable set of tools offered to the engine
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, builder style
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Declarations for every tool in the set
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                kind: "function",
                function: FunctionSpec {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                },
            })
            .collect()
    }

    /// Execute a tool call as issued by the engine
    ///
    /// `arguments` is the raw JSON argument string; an empty string means no
    /// arguments. The result is returned JSON-encoded, ready to be sent back
    /// to the engine.
    pub fn call(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let arguments: Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| ToolError::InvalidArguments(format!("{}: {}", name, e)))?
        };

        let output = tool.call(&arguments)?;
        debug!("Tool {} returned {}", name, output);
        Ok(output.to_string())
    }
}
