//! Dependency-service control commands.
//!
//! Installation checks and the external start/stop commands run to
//! completion with captured output; only their exit status matters.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::{AppError, Result};

/// Run `argv` to completion, returning whether it exited successfully.
///
/// # Errors
///
/// Returns [`AppError::Process`] for an empty argv or if the command could
/// not be started at all.
pub async fn run_command(argv: &[String]) -> Result<bool> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| AppError::Process("empty command".into()))?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| AppError::Process(format!("failed to run {program}: {err}")))?;

    if !output.status.success() {
        debug!(
            program,
            status = ?output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "command failed"
        );
    }
    Ok(output.status.success())
}

/// Whether the service is installed: any configured check succeeding counts.
///
/// A check that cannot even be started counts as a failed check. With no
/// checks configured installation is not verified.
pub async fn is_installed(service: &ServiceConfig) -> bool {
    if service.install_checks.is_empty() {
        return true;
    }
    for check in &service.install_checks {
        match run_command(check).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => debug!(%err, "install check unavailable"),
        }
    }
    false
}

/// Ask the external service manager to start the service.
///
/// Returns `false` when no start command is configured or it failed.
pub async fn external_start(service: &ServiceConfig) -> bool {
    let Some(ref command) = service.start_command else {
        return false;
    };
    match run_command(command).await {
        Ok(true) => {
            info!("service started via service manager");
            true
        }
        Ok(false) => {
            info!("service manager start failed, falling back to direct launch");
            false
        }
        Err(err) => {
            info!(%err, "service manager unavailable, falling back to direct launch");
            false
        }
    }
}

/// Best-effort external stop request. Failures are logged and swallowed.
pub async fn external_stop(service: &ServiceConfig) {
    let Some(ref command) = service.stop_command else {
        debug!("no external stop command configured");
        return;
    };
    match run_command(command).await {
        Ok(true) => info!("external stop requested for service"),
        Ok(false) => warn!("external stop command reported failure"),
        Err(err) => warn!(%err, "external stop command could not run"),
    }
}
