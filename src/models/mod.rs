//! Domain models for supervised processes.

pub mod process;
