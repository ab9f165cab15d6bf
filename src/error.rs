use thiserror::Error;

/// Errors raised while executing a tool on behalf of the reasoning engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Sensor read failed: {0}")]
    SensorFailed(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Errors that can occur while invoking the reasoning engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Backend communication failed: {0}")]
    BackendError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Engine refused to answer: {0}")]
    Refusal(String),

    #[error("Engine kept calling tools after {0} rounds")]
    ToolLoopExceeded(u32),

    #[error("Tool execution failed: {0}")]
    Tool(#[from] ToolError),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::HttpError(e.to_string())
        }
    }
}

/// Errors raised when the engine's final answer does not satisfy the verdict schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Response is not a valid verdict: {0}")]
    Malformed(String),

    #[error("Temperature must be a finite number, got {0}")]
    NonFiniteTemperature(f64),

    #[error("Verdict message must not be empty")]
    EmptyMessage,
}

/// Why a monitoring cycle failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    #[error("Engine invocation failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Schema validation failed: {0}")]
    Schema(#[from] SchemaError),
}

/// Errors that can occur when sending alerts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl From<reqwest::Error> for AlertError {
    fn from(e: reqwest::Error) -> Self {
        AlertError::HttpError(e.to_string())
    }
}

/// Errors that prevent the scheduler from starting
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Scheduler interval must be positive, got {0}")]
    InvalidInterval(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
