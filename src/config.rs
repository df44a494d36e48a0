//! Global configuration parsing and validation.
//!
//! The TOML document is parsed once at startup into [`GlobalConfig`];
//! every downstream component consumes typed fields from it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// How to reach, detect, start, and stop the dependency service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServiceConfig {
    /// Host the service listens on.
    #[serde(default = "default_host")]
    pub host: String,
    /// Primary ingestion port probed for readiness.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Fallback port probed when the primary one refuses.
    #[serde(default)]
    pub secondary_port: Option<u16>,
    /// HTTP query port used by the status read path.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Pattern matched against running command lines to find the service.
    /// A matching process that is not yet accepting connections is waited
    /// for rather than launched a second time.
    #[serde(default = "default_service_pattern")]
    pub process_pattern: String,
    /// Commands checking whether the service is installed; any success wins.
    #[serde(default)]
    pub install_checks: Vec<Vec<String>>,
    /// External service-manager start command, tried before a direct launch.
    #[serde(default)]
    pub start_command: Option<Vec<String>>,
    /// Command spawned directly when the service manager is unavailable.
    pub launch_command: Vec<String>,
    /// External stop command for a service this supervisor did not spawn.
    #[serde(default)]
    pub stop_command: Option<Vec<String>>,
    /// Seconds to wait for the service to accept connections.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_seconds: u64,
    /// Seconds a self-spawned service gets to exit before it is killed.
    #[serde(default = "default_service_stop_timeout")]
    pub stop_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Readiness wait bound.
    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_seconds)
    }

    /// Graceful stop bound for a self-spawned service.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }
}

/// Locations of the built binaries and their output.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    /// Directory holding the built executables.
    pub build_dir: PathBuf,
    /// Pipeline executable, relative to `build_dir`.
    pub pipeline_executable: String,
    /// Visualization client executable, relative to `build_dir`.
    pub gui_executable: String,
    /// Standalone ingestion executable, relative to `build_dir`.
    #[serde(default = "default_ingest_executable")]
    pub ingest_executable: String,
    /// File receiving pipeline stdout and stderr.
    pub log_file: PathBuf,
    /// Tick file used by the replay data mode.
    #[serde(default = "default_replay_file")]
    pub replay_file: PathBuf,
}

/// Build step run before any stage starts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BuildConfig {
    /// Whether the build step runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Build command argv.
    #[serde(default = "default_build_command")]
    pub command: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_build_command(),
        }
    }
}

/// Pipeline tuning parameters, all forwarded as command-line arguments.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Market-data API key.
    pub api_key: String,
    /// Rows per write batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Seconds between upstream polls.
    #[serde(default = "default_polling_interval")]
    pub polling_interval_seconds: u64,
    /// Ticker symbols to ingest.
    pub symbols: Vec<String>,
}

impl PipelineConfig {
    /// API key shortened for log output.
    #[must_use]
    pub fn redacted_api_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(8).collect();
        format!("{prefix}...")
    }
}

/// Health-check cadence and stage timing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MonitoringConfig {
    /// Seconds between liveness scans.
    #[serde(default = "default_health_interval")]
    pub health_check_interval: u64,
    /// Seconds to let the pipeline initialize before the next stage.
    #[serde(default = "default_pipeline_grace")]
    pub pipeline_grace_seconds: u64,
    /// Seconds after launch at which the visualizer must still be alive.
    #[serde(default = "default_visualizer_settle")]
    pub visualizer_settle_seconds: u64,
    /// Seconds a stage gets to exit after a graceful terminate.
    #[serde(default = "default_stage_stop_timeout")]
    pub stage_stop_timeout_seconds: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_check_interval: default_health_interval(),
            pipeline_grace_seconds: default_pipeline_grace(),
            visualizer_settle_seconds: default_visualizer_settle(),
            stage_stop_timeout_seconds: default_stage_stop_timeout(),
        }
    }
}

impl MonitoringConfig {
    /// Interval between health scans.
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    /// Delay observed after spawning the pipeline.
    #[must_use]
    pub fn pipeline_grace(&self) -> Duration {
        Duration::from_secs(self.pipeline_grace_seconds)
    }

    /// Delay before the visualizer liveness check.
    #[must_use]
    pub fn visualizer_settle(&self) -> Duration {
        Duration::from_secs(self.visualizer_settle_seconds)
    }

    /// Graceful stop bound for pipeline and visualizer.
    #[must_use]
    pub fn stage_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_stop_timeout_seconds)
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    9009
}

fn default_http_port() -> u16 {
    9000
}

fn default_service_pattern() -> String {
    "questdb".into()
}

fn default_ready_timeout() -> u64 {
    60
}

fn default_service_stop_timeout() -> u64 {
    10
}

fn default_ingest_executable() -> String {
    "src/engine/ingest/ingest_app".into()
}

fn default_replay_file() -> PathBuf {
    PathBuf::from("test_data/sample_ticks.csv")
}

fn default_build_command() -> Vec<String> {
    ["cmake", "--build", "build", "--config", "Release"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_batch_size() -> u32 {
    10
}

fn default_polling_interval() -> u64 {
    120
}

fn default_health_interval() -> u64 {
    10
}

fn default_pipeline_grace() -> u64 {
    3
}

fn default_visualizer_settle() -> u64 {
    2
}

fn default_stage_stop_timeout() -> u64 {
    5
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Dependency service settings.
    pub service: ServiceConfig,
    /// Executable locations and log sink.
    pub app: AppConfig,
    /// Build step settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Pipeline tuning parameters.
    pub pipeline: PipelineConfig,
    /// Health monitoring cadence.
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Full path of the pipeline executable.
    #[must_use]
    pub fn pipeline_path(&self) -> PathBuf {
        self.app.build_dir.join(&self.app.pipeline_executable)
    }

    /// Full path of the visualization client executable.
    #[must_use]
    pub fn gui_path(&self) -> PathBuf {
        self.app.build_dir.join(&self.app.gui_executable)
    }

    /// Full path of the standalone ingestion executable.
    #[must_use]
    pub fn ingest_path(&self) -> PathBuf {
        self.app.build_dir.join(&self.app.ingest_executable)
    }

    /// Base URL of the service's HTTP query interface.
    #[must_use]
    pub fn service_http_url(&self) -> String {
        format!("http://{}:{}", self.service.host, self.service.http_port)
    }

    fn validate(&self) -> Result<()> {
        if self.service.launch_command.is_empty() {
            return Err(AppError::Config(
                "service.launch_command must not be empty".into(),
            ));
        }

        if self.service.port == 0 || self.service.secondary_port == Some(0) {
            return Err(AppError::Config("service ports must be non-zero".into()));
        }

        if self
            .service
            .install_checks
            .iter()
            .chain(self.service.start_command.iter())
            .chain(self.service.stop_command.iter())
            .any(Vec::is_empty)
        {
            return Err(AppError::Config(
                "service commands must not be empty argv lists".into(),
            ));
        }

        if self.build.enabled && self.build.command.is_empty() {
            return Err(AppError::Config("build.command must not be empty".into()));
        }

        if self.pipeline.api_key.trim().is_empty() {
            return Err(AppError::Config("pipeline.api_key must be set".into()));
        }

        if self.pipeline.symbols.is_empty() {
            return Err(AppError::Config(
                "pipeline.symbols must not be empty".into(),
            ));
        }

        if self.pipeline.batch_size == 0 {
            return Err(AppError::Config(
                "pipeline.batch_size must be greater than zero".into(),
            ));
        }

        if self.monitoring.health_check_interval == 0 {
            return Err(AppError::Config(
                "monitoring.health_check_interval must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
