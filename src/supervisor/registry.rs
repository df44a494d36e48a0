//! Registry of managed processes keyed by role.
//!
//! OS-level discovery of processes started outside this supervisor goes
//! through the [`ProcessLookup`] capability so orchestration logic can be
//! exercised with a fake.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::process::Command;
use tracing::debug;

use crate::models::process::{ManagedProcess, Role};
use crate::{AppError, Result};

/// Finds already-running processes by command-line pattern.
pub trait ProcessLookup: Send + Sync {
    /// Return the PID of the first process whose command line matches
    /// `pattern`, or `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Process`] if the lookup itself could not run.
    fn find(&self, pattern: &str) -> Pin<Box<dyn Future<Output = Result<Option<u32>>> + Send + '_>>;
}

/// [`ProcessLookup`] backed by `pgrep -f`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgrepLookup;

impl ProcessLookup for PgrepLookup {
    fn find(&self, pattern: &str) -> Pin<Box<dyn Future<Output = Result<Option<u32>>> + Send + '_>> {
        let pattern = pattern.to_owned();
        Box::pin(async move {
            let output = Command::new("pgrep")
                .arg("-f")
                .arg(&pattern)
                .output()
                .await
                .map_err(|err| AppError::Process(format!("failed to run pgrep: {err}")))?;

            // pgrep exits 1 when nothing matches.
            if !output.status.success() {
                return Ok(None);
            }

            let own_pid = std::process::id();
            let pid = String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter_map(|line| line.trim().parse::<u32>().ok())
                .find(|pid| *pid != own_pid);
            debug!(pattern, ?pid, "pgrep lookup");
            Ok(pid)
        })
    }
}

/// The set of processes currently under supervision.
pub struct ProcessRegistry {
    processes: BTreeMap<Role, ManagedProcess>,
    lookup: Arc<dyn ProcessLookup>,
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("processes", &self.processes)
            .finish_non_exhaustive()
    }
}

impl ProcessRegistry {
    /// Create an empty registry using `lookup` for OS-level discovery.
    #[must_use]
    pub fn new(lookup: Arc<dyn ProcessLookup>) -> Self {
        Self {
            processes: BTreeMap::new(),
            lookup,
        }
    }

    /// Track `process` under its role.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Process`] if a live process already holds the role.
    pub fn insert(&mut self, process: ManagedProcess) -> Result<()> {
        if self.is_live(process.role) {
            return Err(AppError::Process(format!(
                "role {} already has a live process",
                process.role
            )));
        }
        self.processes.insert(process.role, process);
        Ok(())
    }

    /// Whether `role` is held by a process in a non-terminal state.
    #[must_use]
    pub fn is_live(&self, role: Role) -> bool {
        self.processes
            .get(&role)
            .is_some_and(|p| !p.state.is_terminal())
    }

    /// Borrow the process recorded for `role`.
    #[must_use]
    pub fn get(&self, role: Role) -> Option<&ManagedProcess> {
        self.processes.get(&role)
    }

    /// Mutably borrow the process recorded for `role`.
    pub fn get_mut(&mut self, role: Role) -> Option<&mut ManagedProcess> {
        self.processes.get_mut(&role)
    }

    /// Stop tracking `role`, returning its record.
    pub fn remove(&mut self, role: Role) -> Option<ManagedProcess> {
        self.processes.remove(&role)
    }

    /// Roles currently tracked, in startup order.
    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        self.processes.keys().copied().collect()
    }

    /// Iterate mutably over tracked processes.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ManagedProcess> {
        self.processes.values_mut()
    }

    /// Number of tracked processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// PID of a running process fulfilling `role`.
    ///
    /// Consults the registry first, then the OS via `pattern`, since a
    /// previous run may have left the role satisfied.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures.
    pub async fn find_running(&mut self, role: Role, pattern: &str) -> Result<Option<u32>> {
        if let Some(process) = self.processes.get_mut(&role) {
            if process.poll_exit().is_none() && !process.state.is_terminal() {
                return Ok(process.pid);
            }
        }
        self.lookup.find(pattern).await
    }
}
