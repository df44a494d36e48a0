//! Build step run before any stage is launched.

use tokio::process::Command;
use tracing::info;

use crate::config::BuildConfig;
use crate::{AppError, Result};

/// Run the configured build command with inherited stdio.
///
/// A disabled build is a no-op.
///
/// # Errors
///
/// Returns [`AppError::Build`] if the command cannot start or exits
/// unsuccessfully.
pub async fn run_build(build: &BuildConfig) -> Result<()> {
    if !build.enabled {
        info!("build step disabled");
        return Ok(());
    }

    let (program, args) = build
        .command
        .split_first()
        .ok_or_else(|| AppError::Build("empty build command".into()))?;

    info!(command = build.command.join(" "), "building project");
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|err| AppError::Build(format!("failed to run {program}: {err}")))?;

    if !status.success() {
        return Err(AppError::Build(format!("build command failed: {status}")));
    }

    info!("build completed");
    Ok(())
}
