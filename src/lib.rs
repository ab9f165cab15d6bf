/// Error types for the temperature agent
pub mod error;

/// Verdict data model and schema enforcement
pub mod verdict;

/// Temperature sources
pub mod sensor;

/// Reasoning engine abstraction, tools and backends
pub mod engine;

/// Alert sinks
pub mod alerts;

/// One monitoring round
pub mod cycle;

/// Fixed-rate timer driving the cycles
pub mod scheduler;

/// Configuration management
pub mod config;

/// Self-monitoring counters
pub mod stats;

// Re-export commonly used types
pub use cycle::{CycleOutcome, CycleRecord, MonitoringCycle};
pub use error::{
    AlertError, ConfigError, CycleError, EngineError, SchedulerError, SchemaError, ToolError,
};
pub use scheduler::{Scheduler, SchedulerOptions};
pub use verdict::Verdict;
