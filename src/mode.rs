//! Data-only run modes.
//!
//! `DataMode` is the `--mode` value of the `data` command; the interactive
//! menu front-end maps its numbered choices onto the same enum.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// What the `data` command runs.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    /// Dependency service plus the ingestion pipeline, monitored.
    #[default]
    Pipeline,
    /// Standalone ingestion binary against the live API, in the foreground.
    Ingest,
    /// Standalone ingestion binary replaying a recorded tick file.
    Replay,
}

/// Outcome of one interactive menu answer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MenuChoice {
    /// Run the selected mode.
    Run(DataMode),
    /// Leave without running anything.
    Quit,
}

/// Menu text offered by the interactive front-end.
pub const MENU: &str = "Available data modes:\n\
    1. Market data -> storage service (pipeline)\n\
    2. Market data fetch only (ingest)\n\
    3. Recorded tick replay (replay)";

impl MenuChoice {
    /// Map a menu answer (`1`, `2`, `3`, or `q`) to a choice.
    #[must_use]
    pub fn parse(answer: &str) -> Option<Self> {
        match answer.trim() {
            "1" => Some(Self::Run(DataMode::Pipeline)),
            "2" => Some(Self::Run(DataMode::Ingest)),
            "3" => Some(Self::Run(DataMode::Replay)),
            q if q.eq_ignore_ascii_case("q") => Some(Self::Quit),
            _ => None,
        }
    }
}
