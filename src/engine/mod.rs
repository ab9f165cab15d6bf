/// Reasoning engine abstraction and backend implementations
pub mod backends;
pub mod mock;
pub mod tools;

pub use backends::{OpenAIBackend, ThresholdEngine};
pub use mock::MockEngine;
pub use tools::{ReadingTool, Tool, ToolSet, READING_TOOL_NAME};

use crate::error::EngineError;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Pluggable provider that turns instructions plus tools into a final answer
///
/// The engine decides on its own whether and how often to call the tools in
/// the request. It returns the raw final answer; callers validate it against
/// the declared output schema.
pub trait ReasoningEngine: Send + Sync {
    fn invoke<'a>(
        &'a self,
        request: &'a EngineRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>>;
}

/// Everything sent to the engine for one round
#[derive(Clone)]
pub struct EngineRequest {
    /// Standing instructions (system prompt)
    pub instructions: String,
    /// The task for this round (user prompt)
    pub prompt: String,
    /// Tools the engine may call
    pub tools: ToolSet,
    /// Name of the declared output schema
    pub schema_name: String,
    /// JSON schema the final answer must satisfy
    pub output_schema: Value,
}

impl EngineRequest {
    /// System prompt with the output schema appended
    pub fn system_prompt(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.output_schema)
            .unwrap_or_else(|_| self.output_schema.to_string());
        format!(
            "{}\n\nRespond only with a JSON object matching the schema \"{}\":\n{}",
            self.instructions.trim_end(),
            self.schema_name,
            schema
        )
    }
}

impl std::fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRequest")
            .field("instructions", &self.instructions)
            .field("prompt", &self.prompt)
            .field("tools", &self.tools.names())
            .field("schema_name", &self.schema_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::FixedSensor;
    use crate::verdict::Verdict;
    use std::sync::Arc;

    #[test]
    fn test_system_prompt_embeds_schema() {
        let request = EngineRequest {
            instructions: "You are a temperature monitoring agent.\n".to_string(),
            prompt: "Check the temperature.".to_string(),
            tools: ToolSet::new().with(ReadingTool::new(Arc::new(FixedSensor(70.0)))),
            schema_name: Verdict::SCHEMA_NAME.to_string(),
            output_schema: Verdict::json_schema(),
        };

        let prompt = request.system_prompt();
        assert!(prompt.starts_with("You are a temperature monitoring agent."));
        assert!(prompt.contains(Verdict::SCHEMA_NAME));
        assert!(prompt.contains("\"temperature\""));
        assert!(prompt.contains("\"required\""));
    }
}
