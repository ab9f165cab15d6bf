use crate::cycle::DEFAULT_THRESHOLD;
use crate::engine::backends::{DEEPSEEK_BASE_URL, OPENAI_BASE_URL};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub engine: EngineConfig,
    pub monitor: MonitorConfig,
    pub sensor: SensorConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_seconds: f64,
    pub allow_overlap: bool,
    /// Upper bound on one engine call; unbounded when absent
    pub cycle_timeout_seconds: Option<f64>,
}

impl SchedulerConfig {
    /// The engine time limit as a `Duration`, if one is configured
    pub fn cycle_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        self.cycle_timeout_seconds
            .map(|seconds| {
                if !seconds.is_finite() || seconds <= 0.0 {
                    return Err(ConfigError::ValidationError(format!(
                        "scheduler.cycle_timeout_seconds must be positive, got {}",
                        seconds
                    )));
                }
                Duration::try_from_secs_f64(seconds).map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "scheduler.cycle_timeout_seconds is out of range: {} ({})",
                        seconds, e
                    ))
                })
            })
            .transpose()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5.0,
            allow_overlap: true,
            cycle_timeout_seconds: None,
        }
    }
}

/// Which reasoning engine answers each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Deepseek,
    Openai,
    /// Offline, deterministic; needs no credential
    Threshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub max_tool_rounds: u32,
    pub request_timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Deepseek,
            model: "deepseek-chat".to_string(),
            base_url: None,
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            max_tool_rounds: 4,
            request_timeout_seconds: 60,
        }
    }
}

impl EngineConfig {
    /// The configured base URL, or the backend's public endpoint
    pub fn resolved_base_url(&self) -> &str {
        match (&self.base_url, self.backend) {
            (Some(url), _) => url,
            (None, BackendKind::Openai) => OPENAI_BASE_URL,
            (None, _) => DEEPSEEK_BASE_URL,
        }
    }

    /// Read the credential from the configured environment variable
    pub fn api_key(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingCredential(self.api_key_env.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SensorConfig {
    Simulated { min: f64, max: f64 },
    Fixed { value: f64 },
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Simulated {
            min: 60.0,
            max: 90.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sink", rename_all = "lowercase")]
pub enum AlertsConfig {
    #[default]
    Console,
    Webhook { url: String },
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// A file that cannot be read yields `ConfigError::ReadError`, which the
    /// binary treats as "use defaults". Anything else is a hard error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if !s.interval_seconds.is_finite() || s.interval_seconds <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.interval_seconds must be positive, got {}",
                s.interval_seconds
            )));
        }
        s.cycle_timeout()?;

        let e = &self.engine;
        if e.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "engine.model must not be empty".to_string(),
            ));
        }
        if e.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if e.request_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "engine.request_timeout_seconds must be positive".to_string(),
            ));
        }
        if e.api_key_env.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "engine.api_key_env must not be empty".to_string(),
            ));
        }

        if !self.monitor.threshold.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "monitor.threshold must be finite, got {}",
                self.monitor.threshold
            )));
        }

        match self.sensor {
            SensorConfig::Simulated { min, max } => {
                if !min.is_finite() || !max.is_finite() || min >= max {
                    return Err(ConfigError::ValidationError(format!(
                        "sensor range must satisfy min < max, got [{}, {})",
                        min, max
                    )));
                }
            }
            SensorConfig::Fixed { value } => {
                if !value.is_finite() {
                    return Err(ConfigError::ValidationError(format!(
                        "sensor.value must be finite, got {}",
                        value
                    )));
                }
            }
        }

        if let AlertsConfig::Webhook { url } = &self.alerts {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "alerts.url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        Ok(())
    }
}
