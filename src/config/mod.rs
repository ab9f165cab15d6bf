/// TOML configuration loading and validation
mod conf;

pub use conf::{
    AlertsConfig, BackendKind, Config, EngineConfig, MonitorConfig, SchedulerConfig, SensorConfig,
};
