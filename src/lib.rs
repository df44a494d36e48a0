#![forbid(unsafe_code)]

//! Launches and supervises the market-data demo process fleet.

pub mod builder;
pub mod config;
pub mod errors;
pub mod mode;
pub mod models;
pub mod status;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
