//! Process supervision: ordered startup, monitoring, and teardown.
//!
//! The [`Supervisor`] starts the dependency service, the pipeline, and the
//! visualizer strictly in that order, waiting for each to be usable before
//! the next. Any startup failure tears down whatever already started. The
//! run flag is a [`CancellationToken`]: signal delivery only cancels it,
//! and the control flow notices at its next blocking point.

pub mod dependency;
pub mod launcher;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::builder;
use crate::config::GlobalConfig;
use crate::mode::DataMode;
use crate::models::process::{CapturedOutput, ManagedProcess, OutputSink, ProcessOrigin, Role};
use crate::status;
use crate::{AppError, Result};

use self::monitor::HealthMonitor;
use self::probe::ServiceEndpoint;
use self::registry::{ProcessLookup, ProcessRegistry};
use self::shutdown::{ShutdownCoordinator, TeardownReport};

/// How `ensure_dependency_ready` satisfied the dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Already accepting connections, or its process was found by pattern
    /// and became ready; nothing was started.
    AlreadyRunning,
    /// Started through the external service manager.
    StartedExternally,
    /// Spawned directly by this supervisor.
    Spawned,
}

/// Orchestrates the process fleet for one run.
#[derive(Debug)]
pub struct Supervisor {
    config: Arc<GlobalConfig>,
    registry: ProcessRegistry,
    shutdown: ShutdownCoordinator,
    monitor: HealthMonitor,
    cancel: CancellationToken,
    run_build: bool,
}

impl Supervisor {
    /// Create a supervisor over `config`, discovering external processes
    /// through `lookup` and stopping when `cancel` fires.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        lookup: Arc<dyn ProcessLookup>,
        cancel: CancellationToken,
    ) -> Self {
        let shutdown = ShutdownCoordinator::new(
            config.monitoring.stage_stop_timeout(),
            config.service.clone(),
        );
        let monitor = HealthMonitor::new(config.monitoring.health_interval());
        let run_build = config.build.enabled;
        Self {
            config,
            registry: ProcessRegistry::new(lookup),
            shutdown,
            monitor,
            cancel,
            run_build,
        }
    }

    /// Enable or disable the build step for this run.
    #[must_use]
    pub fn with_build(mut self, enabled: bool) -> Self {
        self.run_build = enabled && self.config.build.enabled;
        self
    }

    /// Managed processes.
    #[must_use]
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Whether the run flag is still set.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Whether teardown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_in_progress()
    }

    /// Make sure the dependency service accepts connections, starting it
    /// when it is absent.
    ///
    /// A service process that is found by `service.process_pattern` but is
    /// not yet accepting connections is waited for instead of launched
    /// again.
    ///
    /// # Errors
    ///
    /// - [`AppError::DependencyMissing`] if the service is neither running
    ///   nor installed.
    /// - [`AppError::StartupTimeout`] if it does not become ready in time.
    /// - [`AppError::Cancelled`] if the run flag is cleared before the
    ///   service is started or while waiting for it.
    /// - [`AppError::Spawn`] if the direct launch fails.
    pub async fn ensure_dependency_ready(&mut self) -> Result<DependencyStatus> {
        let endpoint = ServiceEndpoint::from_config(&self.config.service);

        if probe::is_ready(&endpoint).await {
            info!("dependency service already running");
            if self.registry.get(Role::DependencyService).is_none() {
                self.registry
                    .insert(ManagedProcess::external(Role::DependencyService, None))?;
            }
            return Ok(DependencyStatus::AlreadyRunning);
        }

        let pattern = self.config.service.process_pattern.clone();
        let found = match self
            .registry
            .find_running(Role::DependencyService, &pattern)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(%err, "dependency service process lookup failed");
                None
            }
        };
        if let Some(pid) = found {
            info!(pid, "dependency service process found, waiting for it to accept connections");
            if !self.registry.is_live(Role::DependencyService) {
                self.registry
                    .insert(ManagedProcess::external(Role::DependencyService, Some(pid)))?;
            }
            return self
                .await_dependency(&endpoint, DependencyStatus::AlreadyRunning)
                .await;
        }

        if !dependency::is_installed(&self.config.service).await {
            return Err(AppError::DependencyMissing(format!(
                "dependency service is not installed; install it so one of {:?} succeeds",
                self.config.service.install_checks
            )));
        }

        self.ensure_running()?;
        info!("starting dependency service");
        let status = if dependency::external_start(&self.config.service).await {
            self.registry
                .insert(ManagedProcess::external(Role::DependencyService, None))?;
            DependencyStatus::StartedExternally
        } else {
            self.ensure_running()?;
            let argv = self.config.service.launch_command.clone();
            let child = launcher::spawn(&argv, &OutputSink::Null)?;
            self.registry.insert(ManagedProcess::spawned(
                Role::DependencyService,
                argv,
                OutputSink::Null,
                child,
            ))?;
            DependencyStatus::Spawned
        };

        self.await_dependency(&endpoint, status).await
    }

    /// Start `argv` for `role` unless a process already fulfils it.
    ///
    /// Existing processes are found through the registry and then through
    /// an OS lookup of `pattern`; their PID is returned and nothing new is
    /// spawned. A [`OutputSink::Captured`] stage has its output drained
    /// into the record's tail.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cancelled`] once the run flag is cleared,
    /// [`AppError::Spawn`] if the launch fails, or lookup errors.
    pub async fn start_stage(
        &mut self,
        role: Role,
        argv: Vec<String>,
        sink: OutputSink,
        pattern: &str,
    ) -> Result<Option<u32>> {
        self.ensure_running()?;

        if let Some(pid) = self.registry.find_running(role, pattern).await? {
            info!(%role, pid, "already running, not starting another");
            if !self.registry.is_live(role) {
                self.registry
                    .insert(ManagedProcess::external(role, Some(pid)))?;
            }
            return Ok(Some(pid));
        }

        self.ensure_running()?;
        let mut child = launcher::spawn(&argv, &sink)?;
        let output = launcher::drain_output(&mut child, role);
        let process = ManagedProcess::spawned(role, argv, sink, child).with_output(output);
        let pid = process.pid;
        self.registry.insert(process)?;
        info!(%role, pid, "stage started");
        Ok(pid)
    }

    /// Start the pipeline and observe its initialization grace delay.
    ///
    /// # Errors
    ///
    /// Propagates [`Supervisor::start_stage`] errors, or
    /// [`AppError::Cancelled`] if interrupted during the grace delay.
    pub async fn start_pipeline(&mut self) -> Result<Option<u32>> {
        let argv = launcher::pipeline_command(&self.config);
        let sink = OutputSink::File(self.config.app.log_file.clone());
        let pattern = self.config.app.pipeline_executable.clone();
        let pid = self.start_stage(Role::Pipeline, argv, sink, &pattern).await?;
        info!(log_file = %self.config.app.log_file.display(), "pipeline output redirected");
        if self.spawned_here(Role::Pipeline) {
            self.pause(self.config.monitoring.pipeline_grace()).await?;
        }
        Ok(pid)
    }

    /// Start the visualizer and confirm it survives its settle delay.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Process`] if the client exits during the settle
    /// delay, plus the errors of [`Supervisor::start_stage`].
    pub async fn start_visualizer(&mut self) -> Result<Option<u32>> {
        let argv = launcher::visualizer_command(&self.config);
        let pattern = self.config.app.gui_executable.clone();
        let pid = self
            .start_stage(Role::Visualizer, argv, OutputSink::Captured, &pattern)
            .await?;

        if self.spawned_here(Role::Visualizer) {
            self.pause(self.config.monitoring.visualizer_settle()).await?;
            let Some(visualizer) = self.registry.get_mut(Role::Visualizer) else {
                return Ok(pid);
            };
            if let Some(status) = visualizer.poll_exit() {
                let tail = visualizer
                    .output
                    .as_ref()
                    .map(CapturedOutput::tail)
                    .unwrap_or_default();
                for line in &tail {
                    error!(line = line.as_str(), "visualizer output");
                }
                return Err(AppError::Process(if tail.is_empty() {
                    format!("visualizer failed to start: {status}")
                } else {
                    format!(
                        "visualizer failed to start: {status}; last output: {}",
                        tail.join(" | ")
                    )
                }));
            }
        }
        Ok(pid)
    }

    /// Full demo: dependency service, build, pipeline, visualizer, then
    /// monitor until interrupted, then teardown.
    ///
    /// # Errors
    ///
    /// Returns the first startup error after tearing down earlier stages.
    pub async fn run_demo(&mut self) -> Result<()> {
        let started = self
            .start_demo_stages()
            .instrument(info_span!("startup", mode = "demo"))
            .await;
        self.finish(started).await
    }

    /// Data-only run in `mode`.
    ///
    /// # Errors
    ///
    /// Returns startup, build, or spawn errors after tearing down whatever
    /// was started.
    pub async fn run_data(&mut self, mode: DataMode) -> Result<()> {
        let started = self
            .start_data_stages(mode)
            .instrument(info_span!("startup", mode = ?mode))
            .await;

        match started {
            Ok(false) => {
                self.teardown_all().await;
                Ok(())
            }
            other => self.finish(other.map(|_| ())).await,
        }
    }

    /// Run the health monitor until the run flag clears. Returns the number
    /// of scans performed.
    pub async fn monitor(&mut self) -> u64 {
        info!(
            interval_secs = self.monitor.interval().as_secs(),
            "monitoring managed processes"
        );
        self.monitor.run_loop(&mut self.registry, &self.cancel).await
    }

    /// Clear the run flag and stop every managed process. Idempotent.
    pub async fn teardown_all(&mut self) -> TeardownReport {
        self.cancel.cancel();
        self.shutdown.teardown_all(&mut self.registry).await
    }

    async fn start_demo_stages(&mut self) -> Result<()> {
        self.ensure_dependency_ready().await?;
        self.build().await?;
        self.start_pipeline().await?;
        status::log_snapshot(&self.config).await;
        self.start_visualizer().await?;
        Ok(())
    }

    /// Returns whether long-running stages were started and need monitoring.
    async fn start_data_stages(&mut self, mode: DataMode) -> Result<bool> {
        self.build().await?;
        match mode {
            DataMode::Pipeline => {
                self.ensure_dependency_ready().await?;
                self.start_pipeline().await?;
                Ok(true)
            }
            DataMode::Ingest => {
                let argv = launcher::ingest_command(&self.config);
                info!(api_key = %self.config.pipeline.redacted_api_key(), "running ingestion");
                launcher::run_foreground(&argv, &self.cancel).await?;
                Ok(false)
            }
            DataMode::Replay => {
                let argv = launcher::replay_command(&self.config);
                info!(file = %self.config.app.replay_file.display(), "replaying recorded ticks");
                launcher::run_foreground(&argv, &self.cancel).await?;
                Ok(false)
            }
        }
    }

    async fn finish(&mut self, started: Result<()>) -> Result<()> {
        if let Err(err) = started {
            error!(%err, "startup failed, tearing down started stages");
            self.teardown_all().await;
            return Err(err);
        }
        self.monitor().await;
        self.teardown_all().await;
        Ok(())
    }

    async fn build(&self) -> Result<()> {
        if self.run_build {
            builder::run_build(&self.config.build).await
        } else {
            Ok(())
        }
    }

    fn spawned_here(&self, role: Role) -> bool {
        self.registry
            .get(role)
            .is_some_and(|p| p.origin == ProcessOrigin::Spawned)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled("interrupted during startup".into()));
        }
        Ok(())
    }

    async fn await_dependency(
        &self,
        endpoint: &ServiceEndpoint,
        status: DependencyStatus,
    ) -> Result<DependencyStatus> {
        let timeout = self.config.service.ready_timeout();
        if probe::wait_until_ready(endpoint, timeout, &self.cancel).await {
            return Ok(status);
        }
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled(
                "interrupted while waiting for dependency service".into(),
            ));
        }
        Err(AppError::StartupTimeout(format!(
            "dependency service not ready within {}s",
            timeout.as_secs()
        )))
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(AppError::Cancelled("interrupted during startup".into())),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
