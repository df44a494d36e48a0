//! Launch command assembly and child spawning.
//!
//! Every tunable value reaches the spawned binaries as a command-line
//! argument built here from [`GlobalConfig`]; nothing is hardcoded on the
//! other side.

use std::fs::File;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::models::process::{describe_exit, CapturedOutput, OutputSink, Role};
use crate::{AppError, Result};

/// Pipeline argv: executable, API key, host, port, batch size, polling
/// interval, then one argument per symbol.
#[must_use]
pub fn pipeline_command(config: &GlobalConfig) -> Vec<String> {
    let mut argv = vec![
        config.pipeline_path().to_string_lossy().into_owned(),
        config.pipeline.api_key.clone(),
        config.service.host.clone(),
        config.service.port.to_string(),
        config.pipeline.batch_size.to_string(),
        config.pipeline.polling_interval_seconds.to_string(),
    ];
    argv.extend(config.pipeline.symbols.iter().cloned());
    argv
}

/// Visualizer argv: executable, host, query port, API key.
///
/// The client connects over the secondary (wire-protocol) port, falling
/// back to the primary one when no secondary port is configured.
#[must_use]
pub fn visualizer_command(config: &GlobalConfig) -> Vec<String> {
    let port = config
        .service
        .secondary_port
        .unwrap_or(config.service.port);
    vec![
        config.gui_path().to_string_lossy().into_owned(),
        config.service.host.clone(),
        port.to_string(),
        config.pipeline.api_key.clone(),
    ]
}

/// Standalone ingestion argv.
#[must_use]
pub fn ingest_command(config: &GlobalConfig) -> Vec<String> {
    vec![
        config.ingest_path().to_string_lossy().into_owned(),
        config.pipeline.api_key.clone(),
    ]
}

/// Ingestion argv replaying a recorded tick file.
#[must_use]
pub fn replay_command(config: &GlobalConfig) -> Vec<String> {
    vec![
        config.ingest_path().to_string_lossy().into_owned(),
        config.app.replay_file.to_string_lossy().into_owned(),
        "replay".to_owned(),
    ]
}

/// Spawn `argv` with stdout and stderr routed to `sink`.
///
/// The child is killed if its handle is dropped without being reaped.
///
/// # Errors
///
/// Returns [`AppError::Spawn`] for an empty argv, an unopenable log file,
/// or an OS spawn failure.
pub fn spawn(argv: &[String], sink: &OutputSink) -> Result<Child> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| AppError::Spawn("empty launch command".into()))?;

    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

    match sink {
        OutputSink::File(path) => {
            let stdout = File::create(path).map_err(|err| {
                AppError::Spawn(format!("cannot open log {}: {err}", path.display()))
            })?;
            let stderr = stdout
                .try_clone()
                .map_err(|err| AppError::Spawn(format!("cannot share log handle: {err}")))?;
            cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
        }
        OutputSink::Captured => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        OutputSink::Null => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        OutputSink::Inherit => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
    }

    let child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn {program}: {err}")))?;

    info!(program, pid = child.id().unwrap_or(0), "process spawned");
    Ok(child)
}

/// Take the piped stdout and stderr of `child` and drain them on
/// background tasks into a shared tail.
///
/// Returns `None` when the child was not spawned with captured pipes.
/// Draining continues until the child closes its end, so a chatty process
/// never blocks on a full pipe.
pub fn drain_output(child: &mut Child, role: Role) -> Option<CapturedOutput> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    if stdout.is_none() && stderr.is_none() {
        return None;
    }

    let output = CapturedOutput::default();
    if let Some(stdout) = stdout {
        tokio::spawn(drain_lines(stdout, role, "stdout", output.clone()));
    }
    if let Some(stderr) = stderr {
        tokio::spawn(drain_lines(stderr, role, "stderr", output.clone()));
    }
    Some(output)
}

async fn drain_lines<R>(reader: R, role: Role, stream: &'static str, output: CapturedOutput)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(%role, stream, line = line.as_str(), "process output");
                output.push(line);
            }
            Ok(None) => break,
            Err(err) => {
                debug!(%role, stream, %err, "stopped reading process output");
                break;
            }
        }
    }
}

/// Run `argv` in the foreground with inherited stdio until it exits or
/// `cancel` fires, in which case the child is killed.
///
/// Returns the exit status, or `None` when cancelled.
///
/// # Errors
///
/// Returns [`AppError::Spawn`] if the launch fails, or [`AppError::Process`]
/// if waiting on the child fails.
pub async fn run_foreground(
    argv: &[String],
    cancel: &CancellationToken,
) -> Result<Option<ExitStatus>> {
    let mut child = spawn(argv, &OutputSink::Inherit)?;

    tokio::select! {
        result = child.wait() => {
            let status = result
                .map_err(|err| AppError::Process(format!("failed to wait for child: {err}")))?;
            info!(status = describe_exit(status), "foreground process finished");
            Ok(Some(status))
        }
        () = cancel.cancelled() => {
            info!("interrupted, stopping foreground process");
            if let Err(err) = child.kill().await {
                warn!(%err, "failed to kill foreground process");
            }
            Ok(None)
        }
    }
}
