use crate::engine::tools::{ToolSpec, READING_TOOL_NAME};
use crate::engine::{EngineRequest, ReasoningEngine};
use crate::error::{EngineError, ToolError};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default endpoint of the DeepSeek OpenAI-compatible API
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Default endpoint of the OpenAI API
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat-completions backend with function calling
///
/// Works against OpenAI itself and compatible providers such as DeepSeek.
/// Tool calls requested by the model are executed locally and their results
/// fed back until the model produces a final answer or the round budget runs
/// out.
pub struct OpenAIBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tool_rounds: u32,
}

/// Request format for the Chat Completions API
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolSpec],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

fn no_tools(tools: &&[ToolSpec]) -> bool {
    tools.is_empty()
}

/// Response format specification
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// Message exchanged with the API, in both directions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing)]
    refusal: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
            refusal: None,
        }
    }

    fn tool_result(tool_call_id: String, content: String) -> Self {
        Self {
            tool_call_id: Some(tool_call_id),
            ..Self::new("tool", content)
        }
    }
}

/// Tool call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Response format from the Chat Completions API
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

impl OpenAIBackend {
    /// Create a backend for the OpenAI API
    pub fn new(api_key: String, model: String) -> Result<Self, EngineError> {
        Self::with_base_url(api_key, model, OPENAI_BASE_URL.to_string())
    }

    /// Create a backend for DeepSeek's OpenAI-compatible API
    pub fn deepseek(api_key: String, model: String) -> Result<Self, EngineError> {
        Self::with_base_url(api_key, model, DEEPSEEK_BASE_URL.to_string())
    }

    /// Create a backend for any OpenAI-compatible endpoint
    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
    ) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                EngineError::BackendError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            max_tool_rounds: 4,
        })
    }

    /// Replace the HTTP request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, EngineError> {
        self.client = Client::builder().timeout(timeout).build().map_err(|e| {
            EngineError::BackendError(format!("Failed to create HTTP client: {}", e))
        })?;
        Ok(self)
    }

    /// Limit how many tool-calling round trips one invocation may take
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    /// Format the API endpoint URL
    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Send one chat-completions request and return the first choice
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatChoice, EngineError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            temperature: 0.1,
            max_tokens: 500,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EngineError::BackendError(format!(
                "API returned error {}: {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            EngineError::InvalidResponse(format!("Failed to parse chat response: {}", e))
        })?;

        Self::first_choice(chat_response)
    }

    /// Pull the first choice out of a response, surfacing API errors
    fn first_choice(response: ChatResponse) -> Result<ChatChoice, EngineError> {
        if let Some(error) = response.error {
            return Err(EngineError::BackendError(format!(
                "API error ({}): {}",
                error.error_type.unwrap_or_else(|| "unknown".to_string()),
                error.message
            )));
        }

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            EngineError::InvalidResponse("No choices in chat response".to_string())
        })?;

        if let Some(refusal) = choice.message.refusal.clone() {
            return Err(EngineError::Refusal(refusal));
        }
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(EngineError::Refusal(
                "response blocked by content filter".to_string(),
            ));
        }

        Ok(choice)
    }
}

impl ReasoningEngine for OpenAIBackend {
    fn invoke<'a>(
        &'a self,
        request: &'a EngineRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let tools = request.tools.specs();
            let mut messages = vec![
                ChatMessage::new("system", request.system_prompt()),
                ChatMessage::new("user", request.prompt.clone()),
            ];

            for round in 1..=self.max_tool_rounds {
                let choice = self.complete(&messages, &tools).await?;
                let message = choice.message;

                let calls = message.tool_calls.clone().unwrap_or_default();
                if calls.is_empty() {
                    return message
                        .content
                        .filter(|content| !content.trim().is_empty())
                        .ok_or_else(|| {
                            EngineError::InvalidResponse("Empty final answer".to_string())
                        });
                }

                debug!("Round {}: model requested {} tool call(s)", round, calls.len());
                messages.push(message);
                for call in calls {
                    let output = request
                        .tools
                        .call(&call.function.name, &call.function.arguments)?;
                    messages.push(ChatMessage::tool_result(call.id, output));
                }
            }

            Err(EngineError::ToolLoopExceeded(self.max_tool_rounds))
        })
    }
}

/// Offline engine that applies the threshold guidance deterministically
///
/// It calls the reading tool once and alerts when the reading is strictly
/// above the threshold. Useful without network access and as a stable
/// stand-in for a language model in end-to-end runs.
#[derive(Debug, Clone)]
pub struct ThresholdEngine {
    threshold: f64,
}

impl ThresholdEngine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn assess(&self, reading: f64) -> String {
        let alert = reading > self.threshold;
        let message = if alert {
            format!(
                "Temperature is {:.1}°C, above the {:.1}°C threshold. Immediate attention recommended.",
                reading, self.threshold
            )
        } else {
            format!(
                "Temperature is {:.1}°C, within the normal range (threshold {:.1}°C).",
                reading, self.threshold
            )
        };

        json!({
            "temperature": reading,
            "alert": alert,
            "message": message,
        })
        .to_string()
    }
}

impl ReasoningEngine for ThresholdEngine {
    fn invoke<'a>(
        &'a self,
        request: &'a EngineRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let output = request.tools.call(READING_TOOL_NAME, "{}")?;
            let reading: f64 = serde_json::from_str(&output).map_err(|_| {
                ToolError::SensorFailed(format!("reading is not a number: {}", output))
            })?;
            Ok(self.assess(reading))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ReadingTool, ToolSet};
    use crate::sensor::FixedSensor;
    use crate::verdict::Verdict;
    use std::sync::Arc;

    fn request_with_reading(value: f64) -> EngineRequest {
        EngineRequest {
            instructions: "Alert above 75".to_string(),
            prompt: "Check the temperature".to_string(),
            tools: ToolSet::new().with(ReadingTool::new(Arc::new(FixedSensor(value)))),
            schema_name: Verdict::SCHEMA_NAME.to_string(),
            output_schema: Verdict::json_schema(),
        }
    }

    #[test]
    fn test_openai_backend_creation() {
        let backend = OpenAIBackend::new("sk-test-key".to_string(), "gpt-4o".to_string()).unwrap();

        assert_eq!(backend.api_key, "sk-test-key");
        assert_eq!(backend.model, "gpt-4o");
        assert_eq!(backend.api_url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(backend.max_tool_rounds, 4);
    }

    #[test]
    fn test_deepseek_backend_url() {
        let backend =
            OpenAIBackend::deepseek("sk-test".to_string(), "deepseek-chat".to_string()).unwrap();
        assert_eq!(backend.api_url(), "https://api.deepseek.com/chat/completions");
    }

    #[test]
    fn test_custom_base_url_trailing_slash() {
        let backend = OpenAIBackend::with_base_url(
            "sk-test".to_string(),
            "local".to_string(),
            "http://localhost:8080/v1/".to_string(),
        )
        .unwrap()
        .with_max_tool_rounds(0);

        assert_eq!(backend.api_url(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(backend.max_tool_rounds, 1);
    }

    #[test]
    fn test_request_serialization_includes_tools() {
        let request = request_with_reading(70.0);
        let specs = request.tools.specs();
        let messages = vec![
            ChatMessage::new("system", request.system_prompt()),
            ChatMessage::new("user", request.prompt.clone()),
        ];
        let body = ChatRequest {
            model: "deepseek-chat",
            messages: &messages,
            tools: &specs,
            temperature: 0.1,
            max_tokens: 500,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["tools"][0]["function"]["name"], READING_TOOL_NAME);
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json["messages"][1].get("tool_calls").is_none());
    }

    #[test]
    fn test_request_serialization_without_tools() {
        let messages = vec![ChatMessage::new("user", "hi".to_string())];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            tools: &[],
            temperature: 0.1,
            max_tokens: 500,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_tool_call_response_deserialization() {
        let json = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_current_reading", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;

        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let choice = OpenAIBackend::first_choice(response).unwrap();
        let calls = choice.message.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, READING_TOOL_NAME);
        assert!(choice.message.content.is_none());
    }

    #[test]
    fn test_tool_result_message_serialization() {
        let message = ChatMessage::tool_result("call_1".to_string(), "80.0".to_string());
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["content"], "80.0");
        assert!(json.get("refusal").is_none());
    }

    #[test]
    fn test_final_answer_deserialization() {
        let json = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "{\"temperature\": 80.0, \"alert\": true, \"message\": \"Hot\"}",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }]
        }"#;

        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let choice = OpenAIBackend::first_choice(response).unwrap();
        let verdict = Verdict::parse(&choice.message.content.unwrap()).unwrap();
        assert!(verdict.alert());
    }

    #[test]
    fn test_api_error_response() {
        let json = r#"{
            "error": {"message": "Authentication Fails", "type": "authentication_error"},
            "choices": []
        }"#;

        let response: ChatResponse = serde_json::from_str(json).unwrap();
        match OpenAIBackend::first_choice(response) {
            Err(EngineError::BackendError(msg)) => {
                assert!(msg.contains("authentication_error"));
                assert!(msg.contains("Authentication Fails"));
            }
            other => panic!("Expected BackendError, got {:?}", other),
        }
    }

    #[test]
    fn test_refusal_and_content_filter() {
        let refusal = r#"{"choices": [{"message": {"role": "assistant", "content": null, "refusal": "I can't help"}}]}"#;
        let response: ChatResponse = serde_json::from_str(refusal).unwrap();
        assert!(matches!(
            OpenAIBackend::first_choice(response),
            Err(EngineError::Refusal(_))
        ));

        let filtered = r#"{"choices": [{"message": {"role": "assistant", "content": ""}, "finish_reason": "content_filter"}]}"#;
        let response: ChatResponse = serde_json::from_str(filtered).unwrap();
        assert!(matches!(
            OpenAIBackend::first_choice(response),
            Err(EngineError::Refusal(_))
        ));
    }

    #[test]
    fn test_empty_choices() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            OpenAIBackend::first_choice(response),
            Err(EngineError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_threshold_engine_alerts_above_threshold() {
        let engine = ThresholdEngine::new(75.0);
        let answer = engine.invoke(&request_with_reading(80.0)).await.unwrap();
        let verdict = Verdict::parse(&answer).unwrap();

        assert!(verdict.alert());
        assert_eq!(verdict.temperature(), 80.0);
        assert!(verdict.message().contains("above"));
    }

    #[tokio::test]
    async fn test_threshold_engine_quiet_below_threshold() {
        let engine = ThresholdEngine::new(75.0);
        let answer = engine.invoke(&request_with_reading(65.0)).await.unwrap();
        let verdict = Verdict::parse(&answer).unwrap();

        assert!(!verdict.alert());
        assert!(verdict.message().contains("normal range"));
    }

    #[tokio::test]
    async fn test_threshold_engine_at_threshold_does_not_alert() {
        let engine = ThresholdEngine::new(75.0);
        let answer = engine.invoke(&request_with_reading(75.0)).await.unwrap();
        assert!(!Verdict::parse(&answer).unwrap().alert());
    }

    #[tokio::test]
    async fn test_threshold_engine_without_reading_tool() {
        let mut request = request_with_reading(80.0);
        request.tools = ToolSet::new();

        let err = ThresholdEngine::new(75.0).invoke(&request).await.unwrap_err();
        assert!(matches!(err, EngineError::Tool(ToolError::UnknownTool(_))));
    }

    #[tokio::test]
    #[ignore = "Requires a valid DEEPSEEK_API_KEY and network access"]
    async fn test_deepseek_backend_integration() {
        let api_key =
            std::env::var("DEEPSEEK_API_KEY").expect("DEEPSEEK_API_KEY environment variable not set");
        let backend = OpenAIBackend::deepseek(api_key, "deepseek-chat".to_string()).unwrap();

        match backend.invoke(&request_with_reading(80.0)).await {
            Ok(answer) => println!("Engine answer: {}", answer),
            Err(e) => println!("Expected error (no API key or network): {:?}", e),
        }
    }
}
