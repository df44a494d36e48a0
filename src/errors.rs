//! Error types shared across the supervisor.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all supervision failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration file missing, unreadable, or invalid.
    Config(String),
    /// Dependency service is neither running nor installed.
    DependencyMissing(String),
    /// A stage did not become ready within its timeout.
    StartupTimeout(String),
    /// A subordinate process could not be launched.
    Spawn(String),
    /// Build command failed or could not be run.
    Build(String),
    /// A managed process failed while being started or stopped.
    Process(String),
    /// Read-only status query against the dependency service failed.
    Status(String),
    /// The run was interrupted by an operator signal.
    Cancelled(String),
    /// Invalid operator input.
    Usage(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Process exit status to report for this error.
    ///
    /// An operator interrupt is a clean exit once teardown has run; every
    /// other failure exits with status 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Cancelled(_) => 0,
            _ => 1,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::DependencyMissing(msg) => write!(f, "dependency missing: {msg}"),
            Self::StartupTimeout(msg) => write!(f, "startup timeout: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Build(msg) => write!(f, "build: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Status(msg) => write!(f, "status: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Usage(msg) => write!(f, "usage: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Status(err.to_string())
    }
}
