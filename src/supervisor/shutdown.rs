//! Graceful-then-forced teardown of every managed process.
//!
//! Stages are stopped first, each with a SIGTERM followed by a bounded
//! wait and a SIGKILL on expiry. The dependency service goes last: a
//! process this supervisor spawned gets the same treatment with its own
//! bound, while an externally managed service only receives the
//! configured external stop request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, info_span, warn, Instrument};

use super::dependency;
use super::registry::ProcessRegistry;
use crate::config::ServiceConfig;
use crate::models::process::{describe_exit, ManagedProcess, ProcessOrigin, ProcessState, Role};

/// Final state of each role handled by a teardown.
pub type TeardownReport = Vec<(Role, ProcessState)>;

/// Drives teardown exactly once per supervisor instance.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    in_progress: AtomicBool,
    stage_timeout: Duration,
    service: ServiceConfig,
}

impl ShutdownCoordinator {
    /// Create a coordinator with the per-stage graceful bound and the
    /// dependency service's stop settings.
    #[must_use]
    pub fn new(stage_timeout: Duration, service: ServiceConfig) -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            stage_timeout,
            service,
        }
    }

    /// Whether a teardown has already begun.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Stop every managed process, dependency service last.
    ///
    /// Returns the terminal state reached by each role. Any call after the
    /// first is a no-op returning an empty report.
    pub async fn teardown_all(&self, registry: &mut ProcessRegistry) -> TeardownReport {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            info!("teardown already in progress, skipping");
            return Vec::new();
        }

        async {
            let mut report = TeardownReport::new();

            for role in registry.roles().into_iter().rev() {
                if role == Role::DependencyService {
                    continue;
                }
                if let Some(mut process) = registry.remove(role) {
                    let state = stop_process(&mut process, self.stage_timeout).await;
                    report.push((role, state));
                }
            }

            if let Some(mut service) = registry.remove(Role::DependencyService) {
                let state = self.stop_dependency(&mut service).await;
                report.push((Role::DependencyService, state));
            }

            info!(stopped = report.len(), "teardown complete");
            report
        }
        .instrument(info_span!("teardown_all"))
        .await
    }

    async fn stop_dependency(&self, service: &mut ManagedProcess) -> ProcessState {
        match service.origin {
            ProcessOrigin::Spawned => {
                info!("stopping dependency service");
                stop_process(service, self.service.stop_timeout()).await
            }
            ProcessOrigin::External => {
                // Never signal a service this supervisor did not spawn.
                dependency::external_stop(&self.service).await;
                service.state
            }
        }
    }
}

/// Stop one spawned process: SIGTERM, wait up to `grace`, then SIGKILL.
///
/// Processes that already exited, or that were never spawned here, are
/// left alone and their current terminal state is returned. Every state
/// change goes through [`ManagedProcess::transition`].
pub async fn stop_process(process: &mut ManagedProcess, grace: Duration) -> ProcessState {
    let role = process.role;
    let pid = process.pid;

    if let Some(status) = process.poll_exit() {
        info!(%role, status, "process already exited, skipping stop");
        return process.state;
    }
    if process.child.is_none() || !process.transition(ProcessState::GracefulStopRequested) {
        return process.state;
    }
    let Some(child) = process.child.as_mut() else {
        return process.state;
    };

    info!(%role, pid, "stopping process");
    #[cfg(unix)]
    send_sigterm(pid);
    #[cfg(not(unix))]
    if let Err(err) = child.start_kill() {
        warn!(%role, %err, "failed to request process termination");
    }

    let next = match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!(%role, status = describe_exit(status), "process exited");
            ProcessState::Exited
        }
        Ok(Err(err)) => {
            warn!(%role, %err, "error waiting for process exit");
            ProcessState::Exited
        }
        Err(_elapsed) => {
            warn!(%role, grace_secs = grace.as_secs(), "process ignored terminate, force killing");
            if let Err(err) = child.kill().await {
                warn!(%role, %err, "failed to force-kill process");
            }
            ProcessState::ForceKilled
        }
    };
    process.transition(next);
    process.state
}

#[cfg(unix)]
fn send_sigterm(pid: Option<u32>) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        // ESRCH: exited between the poll and the signal.
        warn!(pid = raw, %err, "failed to send SIGTERM");
    }
}
