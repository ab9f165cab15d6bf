use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempwatch::alerts::{AlertSink, ConsoleSink, WebhookSink};
use tempwatch::config::{AlertsConfig, BackendKind, Config, EngineConfig, SensorConfig};
use tempwatch::cycle::MonitoringCycle;
use tempwatch::engine::{OpenAIBackend, ReasoningEngine, ThresholdEngine};
use tempwatch::error::ConfigError;
use tempwatch::scheduler::{interval_from_secs, Scheduler, SchedulerOptions};
use tempwatch::sensor::{FixedSensor, SensorSource, SimulatedSensor};
use tempwatch::stats::CycleStats;
use tokio::sync::oneshot;

/// Command-line arguments for the temperature agent
#[derive(Parser)]
#[command(
    name = "tempwatch",
    about = "Temperature monitoring agent - periodic, LLM-assessed temperature alerts",
    long_about = "Periodically asks a reasoning engine to read the current temperature through a \
                  tool, validates its structured verdict, and dispatches an alert when the engine \
                  judges the reading concerning."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging output (debug level)")]
    verbose: bool,

    /// Run a single cycle and exit
    #[arg(long, help = "Run one monitoring cycle and exit (exit code 1 if it failed)")]
    once: bool,

    /// Override the scheduler interval
    #[arg(
        short,
        long,
        value_name = "SECONDS",
        help = "Seconds between cycles (overrides the configuration file)"
    )]
    interval: Option<f64>,
}

impl Cli {
    /// Validate the CLI arguments
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in load_config
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if let Some(interval) = self.interval {
            interval_from_secs(interval).map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}

/// Wires configuration into a running cycle, scheduler and signal handling
struct TemperatureAgent {
    config: Config,
    cycle: Arc<MonitoringCycle>,
    stats: Arc<CycleStats>,
    scheduler: Option<Scheduler>,
}

impl TemperatureAgent {
    /// Build every component from the configuration
    ///
    /// Fails when the engine needs a credential that is not set, when the
    /// cycle time limit cannot be represented, or when a client cannot be
    /// constructed.
    fn new(config: Config) -> anyhow::Result<Self> {
        info!("Initializing temperature agent");

        let engine = build_engine(&config.engine, config.monitor.threshold)?;
        let sensor = build_sensor(&config.sensor);
        let sink = build_sink(&config.alerts)?;
        let stats = Arc::new(CycleStats::new());

        let timeout = config.scheduler.cycle_timeout()?;
        let mut cycle = MonitoringCycle::new(engine, sensor, sink)
            .with_threshold(config.monitor.threshold)
            .with_timeout(timeout);
        cycle.set_stats(stats.clone());

        Ok(Self {
            config,
            cycle: Arc::new(cycle),
            stats,
            scheduler: None,
        })
    }

    /// Load configuration from file or use defaults
    ///
    /// A missing or unreadable file falls back to defaults with a warning;
    /// a file that exists but is invalid is an error.
    fn load_config(config_path: Option<&PathBuf>) -> Result<Config, ConfigError> {
        match config_path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Config::from_file(path) {
                    Ok(config) => Ok(config),
                    Err(ConfigError::ReadError(e)) => {
                        warn!("Configuration file not found or unreadable ({}), using defaults", e);
                        Ok(Config::default())
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                info!("Using default configuration");
                Ok(Config::default())
            }
        }
    }

    /// Start firing cycles on the configured interval
    fn start(&mut self) -> anyhow::Result<()> {
        let interval = interval_from_secs(self.config.scheduler.interval_seconds)?;
        let options = SchedulerOptions {
            allow_overlap: self.config.scheduler.allow_overlap,
        };

        let cycle = self.cycle.clone();
        let stats = self.stats.clone();
        let scheduler = Scheduler::start_with(interval, options, move || {
            let cycle = cycle.clone();
            stats.record_fired();
            async move {
                cycle.execute().await;
            }
        })?;

        self.scheduler = Some(scheduler);
        Ok(())
    }

    /// Run exactly one cycle in the foreground
    async fn run_once(&self) -> bool {
        self.stats.record_fired();
        self.cycle.run_once().await.is_completed()
    }

    /// Stop the scheduler; cycles already in flight are not cancelled
    async fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.stats.log_summary();
    }
}

fn build_engine(
    engine: &EngineConfig,
    threshold: f64,
) -> anyhow::Result<Arc<dyn ReasoningEngine>> {
    match engine.backend {
        BackendKind::Threshold => {
            info!("Using offline threshold engine (threshold {})", threshold);
            Ok(Arc::new(ThresholdEngine::new(threshold)))
        }
        BackendKind::Deepseek | BackendKind::Openai => {
            let api_key = engine.api_key()?;
            let base_url = engine.resolved_base_url().to_string();
            info!("Using model '{}' at {}", engine.model, base_url);

            let backend = OpenAIBackend::with_base_url(api_key, engine.model.clone(), base_url)?
                .with_request_timeout(Duration::from_secs(engine.request_timeout_seconds))?
                .with_max_tool_rounds(engine.max_tool_rounds);
            Ok(Arc::new(backend))
        }
    }
}

fn build_sensor(sensor: &SensorConfig) -> Arc<dyn SensorSource> {
    match *sensor {
        SensorConfig::Simulated { min, max } => Arc::new(SimulatedSensor::new(min, max)),
        SensorConfig::Fixed { value } => Arc::new(FixedSensor(value)),
    }
}

fn build_sink(alerts: &AlertsConfig) -> anyhow::Result<Arc<dyn AlertSink>> {
    match alerts {
        AlertsConfig::Console => Ok(Arc::new(ConsoleSink)),
        AlertsConfig::Webhook { url } => {
            let sink = WebhookSink::new(url.clone())
                .with_context(|| format!("Failed to create webhook sink for {}", url))?;
            Ok(Arc::new(sink))
        }
    }
}

/// Resolve a one-shot channel on the first SIGINT
fn install_shutdown_handler() -> anyhow::Result<oneshot::Receiver<()>> {
    let (sender, receiver) = oneshot::channel();
    let sender = Mutex::new(Some(sender));

    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Some(sender) = sender.lock().unwrap().take() {
            let _ = sender.send(());
        }
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    Ok(receiver)
}

/// Returns whether the agent finished successfully
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let _ = dotenvy::dotenv();

    let mut config = TemperatureAgent::load_config(cli.config.as_ref())
        .context("Failed to load configuration")?;
    if let Some(interval) = cli.interval {
        config.scheduler.interval_seconds = interval;
    }
    config.validate().context("Invalid configuration")?;

    let mut agent = TemperatureAgent::new(config).context("Failed to initialize agent")?;

    if cli.once {
        let completed = agent.run_once().await;
        agent.stats.log_summary();
        return Ok(completed);
    }

    let shutdown = install_shutdown_handler()?;
    agent.start().context("Failed to start scheduler")?;
    info!("Temperature agent is running. Press Ctrl+C to stop.");

    if shutdown.await.is_err() {
        error!("Shutdown signal channel closed unexpectedly");
    }

    agent.stop().await;
    info!("Temperature agent shutdown complete");
    Ok(true)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    info!("Starting temperature agent");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
