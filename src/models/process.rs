//! Managed process model and lifecycle states.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Child;

/// Logical role a managed process fulfils in the startup sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Persistent storage service the other stages write to and read from.
    DependencyService,
    /// Market-data ingestion pipeline.
    Pipeline,
    /// Visualization client.
    Visualizer,
}

impl Role {
    /// Stable lowercase name used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DependencyService => "dependency_service",
            Self::Pipeline => "pipeline",
            Self::Visualizer => "visualizer",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the supervisor came to know about a process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOrigin {
    /// Launched by this supervisor; it owns the child handle.
    Spawned,
    /// Found already running; managed by someone else.
    External,
}

/// Lifecycle state of a managed process.
///
/// `Exited`, `ForceKilled` and `NeverStarted` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Child handle obtained, not yet confirmed running.
    Spawned,
    /// Running under supervision.
    Running,
    /// Graceful terminate sent, waiting for exit.
    GracefulStopRequested,
    /// Exited on its own or after the graceful request.
    Exited,
    /// Killed after the graceful window elapsed.
    ForceKilled,
    /// Role already satisfied by an external process.
    NeverStarted,
}

impl ProcessState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::ForceKilled | Self::NeverStarted)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Spawned, Self::Running | Self::Exited)
                | (
                    Self::Running,
                    Self::GracefulStopRequested | Self::Exited | Self::ForceKilled
                )
                | (
                    Self::GracefulStopRequested,
                    Self::Exited | Self::ForceKilled
                )
        )
    }
}

/// Where a process writes its stdout and stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Both streams written to a log file, truncated at launch.
    File(PathBuf),
    /// Streams read through pipes, keeping the most recent lines.
    Captured,
    /// Streams discarded.
    Null,
    /// Streams shared with the supervisor's terminal.
    Inherit,
}

/// Rolling tail of a captured process's output lines.
///
/// Shared between the tasks draining the pipes and the supervisor, which
/// reads it when the process fails.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl CapturedOutput {
    /// Number of lines retained.
    pub const TAIL_LINES: usize = 20;

    /// Append one line, dropping the oldest beyond [`Self::TAIL_LINES`].
    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == Self::TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Retained lines, oldest first.
    #[must_use]
    pub fn tail(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// One OS process under supervision.
#[derive(Debug)]
pub struct ManagedProcess {
    /// Role this process fulfils.
    pub role: Role,
    /// OS process identifier, when known.
    pub pid: Option<u32>,
    /// Launch argv; empty for externally discovered processes.
    pub command: Vec<String>,
    /// Output destination.
    pub sink: OutputSink,
    /// Launch or discovery time.
    pub started_at: DateTime<Utc>,
    /// Whether the supervisor spawned it.
    pub origin: ProcessOrigin,
    /// Current lifecycle state.
    pub state: ProcessState,
    /// Owned child handle for spawned processes.
    pub child: Option<Child>,
    /// Output tail for [`OutputSink::Captured`] processes.
    pub output: Option<CapturedOutput>,
}

impl ManagedProcess {
    /// Record a process this supervisor just launched.
    ///
    /// The record enters `Spawned` and moves to `Running` once the OS has
    /// assigned the child a PID.
    #[must_use]
    pub fn spawned(role: Role, command: Vec<String>, sink: OutputSink, child: Child) -> Self {
        let mut process = Self {
            role,
            pid: child.id(),
            command,
            sink,
            started_at: Utc::now(),
            origin: ProcessOrigin::Spawned,
            state: ProcessState::Spawned,
            child: Some(child),
            output: None,
        };
        if process.pid.is_some() {
            process.transition(ProcessState::Running);
        }
        process
    }

    /// Attach the output tail of a captured process.
    #[must_use]
    pub fn with_output(mut self, output: Option<CapturedOutput>) -> Self {
        self.output = output;
        self
    }

    /// Record a process that was already running when the role was requested.
    #[must_use]
    pub fn external(role: Role, pid: Option<u32>) -> Self {
        Self {
            role,
            pid,
            command: Vec::new(),
            sink: OutputSink::Null,
            started_at: Utc::now(),
            origin: ProcessOrigin::External,
            state: ProcessState::NeverStarted,
            child: None,
            output: None,
        }
    }

    /// Move to `next` if the lifecycle allows it; returns whether it moved.
    pub fn transition(&mut self, next: ProcessState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Poll the child without blocking.
    ///
    /// Returns `Some(description)` once the process has exited, marking it
    /// `Exited`. External processes are never reported here.
    pub fn poll_exit(&mut self) -> Option<String> {
        if self.state.is_terminal() {
            return None;
        }
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.transition(ProcessState::Exited);
                Some(describe_exit(status))
            }
            Ok(None) => None,
            Err(err) => {
                self.transition(ProcessState::Exited);
                Some(format!("status unknown ({err})"))
            }
        }
    }
}

/// Human-readable summary of an exit status.
#[must_use]
pub fn describe_exit(status: std::process::ExitStatus) -> String {
    if status.success() {
        "exited normally (code 0)".to_owned()
    } else {
        status.code().map_or_else(
            || "terminated by signal".to_owned(),
            |c| format!("exited with code {c}"),
        )
    }
}
