//! Periodic liveness scan of managed stages.
//!
//! An unexpected exit is reported and the process is marked `Exited`;
//! nothing is restarted and siblings keep running. The dependency service
//! is left out of the scan.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::ProcessRegistry;
use crate::models::process::Role;

/// One unexpected exit observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Role whose process exited.
    pub role: Role,
    /// PID of the exited process.
    pub pid: Option<u32>,
    /// Exit description.
    pub status: String,
}

/// Periodic liveness scanner.
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitor {
    interval: Duration,
}

impl HealthMonitor {
    /// Create a monitor scanning every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Scan interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep-then-scan until `cancel` fires. Returns the number of scans run.
    pub async fn run_loop(&self, registry: &mut ProcessRegistry, cancel: &CancellationToken) -> u64 {
        let mut scans: u64 = 0;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(scans, "health monitor stopping");
                    break;
                }
                () = tokio::time::sleep(self.interval) => {}
            }

            scans += 1;
            let exits = Self::scan(registry);
            debug!(scan = scans, exits = exits.len(), "health check complete");
        }
        scans
    }

    /// Check every stage once, reporting processes that exited since the
    /// previous scan.
    pub fn scan(registry: &mut ProcessRegistry) -> Vec<ExitReport> {
        let mut exits = Vec::new();
        for process in registry.iter_mut() {
            if process.role == Role::DependencyService {
                continue;
            }
            if let Some(status) = process.poll_exit() {
                warn!(
                    role = %process.role,
                    pid = process.pid,
                    status = status.as_str(),
                    "managed process has stopped"
                );
                exits.push(ExitReport {
                    role: process.role,
                    pid: process.pid,
                    status,
                });
            }
        }
        exits
    }
}
