use crate::engine::{EngineRequest, ReasoningEngine};
use crate::error::EngineError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted engine for testing and development
///
/// Returns the configured answers in order, cycling back to the first after
/// the last. Before answering it can call every offered tool a fixed number
/// of times, mimicking a model that looks up the reading first. Tool
/// failures abort the invocation the same way they would for a real backend.
pub struct MockEngine {
    responses: Vec<Result<String, EngineError>>,
    current_index: AtomicUsize,
    tool_calls_per_invoke: usize,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    last_request: Mutex<Option<EngineRequest>>,
    tool_outputs: Mutex<Vec<String>>,
}

impl MockEngine {
    /// Create a mock engine with a single answer
    ///
    /// # Example
    /// ```
    /// use tempwatch::engine::MockEngine;
    ///
    /// let engine = MockEngine::with_response(Ok(
    ///     r#"{"temperature": 70.0, "alert": false, "message": "Normal"}"#.to_string(),
    /// ));
    /// assert_eq!(engine.call_count(), 0);
    /// ```
    pub fn with_response(response: Result<String, EngineError>) -> Self {
        Self::with_responses(vec![response])
    }

    /// Create a mock engine with multiple answers, returned in order
    pub fn with_responses(responses: Vec<Result<String, EngineError>>) -> Self {
        Self {
            responses,
            current_index: AtomicUsize::new(0),
            tool_calls_per_invoke: 0,
            delay: None,
            call_count: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            tool_outputs: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock engine that always answers with the given verdict fields
    pub fn verdict(temperature: f64, alert: bool, message: &str) -> Self {
        let answer = serde_json::json!({
            "temperature": temperature,
            "alert": alert,
            "message": message,
        });
        Self::with_response(Ok(answer.to_string()))
    }

    /// Create a mock engine that always fails with a backend error
    pub fn error(error_message: String) -> Self {
        Self::with_response(Err(EngineError::BackendError(error_message)))
    }

    /// Create a mock engine that simulates timeouts
    pub fn timeout() -> Self {
        Self::with_response(Err(EngineError::Timeout))
    }

    /// Call every offered tool `count` times before answering
    pub fn calling_tools(mut self, count: usize) -> Self {
        self.tool_calls_per_invoke = count;
        self
    }

    /// Add a delay to all answers
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times invoke() has been called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The last request passed to invoke()
    pub fn last_request(&self) -> Option<EngineRequest> {
        self.last_request.lock().unwrap().clone()
    }

    /// Every tool output observed so far, in call order
    pub fn tool_outputs(&self) -> Vec<String> {
        self.tool_outputs.lock().unwrap().clone()
    }

    /// Reset call tracking and the answer cursor
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.current_index.store(0, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = None;
        self.tool_outputs.lock().unwrap().clear();
    }
}

impl ReasoningEngine for MockEngine {
    fn invoke<'a>(
        &'a self,
        request: &'a EngineRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            for _ in 0..self.tool_calls_per_invoke {
                for name in request.tools.names() {
                    let output = request.tools.call(name, "{}")?;
                    self.tool_outputs.lock().unwrap().push(output);
                }
            }

            if self.responses.is_empty() {
                return Err(EngineError::InvalidResponse(
                    "Mock engine has no scripted answers".to_string(),
                ));
            }
            let index = self.current_index.fetch_add(1, Ordering::SeqCst) % self.responses.len();
            self.responses[index].clone()
        })
    }
}
