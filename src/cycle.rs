//! One collect-reason-decide round
//!
//! The cycle hands the engine a fixed task plus the reading tool, enforces
//! the verdict schema on the answer, and forwards the verdict's message to
//! the alert sink when the engine flagged the reading. It applies no numeric
//! threshold of its own: `Verdict::alert` is trusted as returned.

use crate::alerts::AlertSink;
use crate::engine::{EngineRequest, ReadingTool, ReasoningEngine, ToolSet};
use crate::error::{AlertError, CycleError, EngineError};
use crate::sensor::SensorSource;
use crate::stats::CycleStats;
use crate::verdict::{Timestamp, Verdict};
use chrono::Utc;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;

/// Task given to the engine every round
pub const CHECK_PROMPT: &str =
    "Check the current system temperature and determine if an alert is needed.";

/// Reading above which the instructions call a temperature concerning
pub const DEFAULT_THRESHOLD: f64 = 75.0;

/// Standing instructions carrying the threshold guidance
pub fn monitor_instructions(threshold: f64) -> String {
    format!(
        "You are a temperature monitoring agent. Analyze the current temperature and determine:\n\
         1. Whether an alert is needed (temperatures above {}°C are concerning)\n\
         2. Provide an appropriate message about the temperature status\n\
         \n\
         Use the {} tool to obtain the reading. Be concise and clear in your assessment.",
        threshold,
        crate::engine::READING_TOOL_NAME
    )
}

/// Result of one round
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(Verdict),
    Failed(CycleError),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            CycleOutcome::Completed(verdict) => Some(verdict),
            CycleOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&CycleError> {
        match self {
            CycleOutcome::Completed(_) => None,
            CycleOutcome::Failed(error) => Some(error),
        }
    }
}

/// What happened during one round; discarded after logging
#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub started_at: Timestamp,
    pub outcome: CycleOutcome,
    pub alert_dispatched: bool,
    pub alert_error: Option<AlertError>,
}

/// Orchestrates a single monitoring round
pub struct MonitoringCycle {
    engine: Arc<dyn ReasoningEngine>,
    sink: Arc<dyn AlertSink>,
    request: EngineRequest,
    timeout: Option<Duration>,
    stats: Option<Arc<CycleStats>>,
}

impl MonitoringCycle {
    /// Create a cycle whose engine may read `sensor` through the reading tool
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        sensor: Arc<dyn SensorSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let request = EngineRequest {
            instructions: monitor_instructions(DEFAULT_THRESHOLD),
            prompt: CHECK_PROMPT.to_string(),
            tools: ToolSet::new().with(ReadingTool::new(sensor)),
            schema_name: Verdict::SCHEMA_NAME.to_string(),
            output_schema: Verdict::json_schema(),
        };

        Self {
            engine,
            sink,
            request,
            timeout: None,
            stats: None,
        }
    }

    /// Change the threshold stated in the engine instructions
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.request.instructions = monitor_instructions(threshold);
        self
    }

    /// Bound the engine call; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the counters updated by every round
    pub fn set_stats(&mut self, stats: Arc<CycleStats>) {
        self.stats = Some(stats);
    }

    /// The request sent to the engine each round
    pub fn request(&self) -> &EngineRequest {
        &self.request
    }

    /// Run one round and return its outcome
    pub async fn run_once(&self) -> CycleOutcome {
        self.execute().await.outcome
    }

    /// Run one round and return the full record
    ///
    /// Never fails: engine and schema errors become `CycleOutcome::Failed`,
    /// alert dispatch errors are recorded next to a completed outcome.
    pub async fn execute(&self) -> CycleRecord {
        let started_at = Utc::now();
        let stamp = started_at.format("%H:%M:%S");

        let verdict = match self.consult_engine().await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("[{}] Error in monitoring cycle: {}", stamp, e);
                if let Some(stats) = &self.stats {
                    stats.record_failed();
                }
                return CycleRecord {
                    started_at,
                    outcome: CycleOutcome::Failed(e),
                    alert_dispatched: false,
                    alert_error: None,
                };
            }
        };

        info!("[{}] {}", stamp, verdict.message());
        if let Some(stats) = &self.stats {
            stats.record_completed();
        }

        let mut alert_dispatched = false;
        let mut alert_error = None;
        if verdict.alert() {
            match self.sink.notify(verdict.message()).await {
                Ok(()) => {
                    debug!("Alert dispatched for reading {:.2}", verdict.temperature());
                    alert_dispatched = true;
                }
                Err(e) => {
                    error!("[{}] Failed to dispatch alert: {}", stamp, e);
                    alert_error = Some(e);
                }
            }
            if let Some(stats) = &self.stats {
                stats.record_alert(alert_dispatched);
            }
        }

        CycleRecord {
            started_at,
            outcome: CycleOutcome::Completed(verdict),
            alert_dispatched,
            alert_error,
        }
    }

    /// Invoke the engine and validate its answer
    async fn consult_engine(&self) -> Result<Verdict, CycleError> {
        let answer = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.engine.invoke(&self.request))
                .await
                .map_err(|_| EngineError::Timeout)??,
            None => self.engine.invoke(&self.request).await?,
        };
        debug!("Engine answer: {}", answer);

        Ok(Verdict::parse(&answer)?)
    }
}
