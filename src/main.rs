#![forbid(unsafe_code)]

//! `tickfleet`: market-data demo launcher.
//!
//! Loads configuration, wires interrupt and terminate signals to the run
//! flag, and hands control to the supervisor for the selected command.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use tickfleet::config::GlobalConfig;
use tickfleet::mode::{DataMode, MenuChoice, MENU};
use tickfleet::supervisor::registry::PgrepLookup;
use tickfleet::supervisor::Supervisor;
use tickfleet::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tickfleet", about = "Market-data demo launcher", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Skip the build step.
    #[arg(long)]
    skip_build: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the storage service, pipeline, and visualizer, then monitor.
    Demo,

    /// Run data fetching only.
    Data {
        /// Data mode; prompts interactively when omitted.
        #[arg(long, value_enum)]
        mode: Option<DataMode>,
    },
}

fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::from(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "tickfleet stopped with an error");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = Arc::new(GlobalConfig::load_from_path(&args.config)?);
    info!(config = %args.config.display(), "configuration loaded");

    let mode = match args.command {
        Command::Demo => None,
        Command::Data { mode: Some(mode) } => Some(mode),
        Command::Data { mode: None } => match prompt_data_mode().await? {
            MenuChoice::Run(mode) => Some(mode),
            MenuChoice::Quit => return Ok(()),
        },
    };

    // ── Wire signals to the run flag ────────────────────
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    let mut supervisor =
        Supervisor::new(Arc::clone(&config), Arc::new(PgrepLookup), ct).with_build(!args.skip_build);

    let result = match mode {
        None => {
            info!("starting complete demo");
            supervisor.run_demo().await
        }
        Some(mode) => {
            info!(?mode, api_key = %config.pipeline.redacted_api_key(), "starting data run");
            supervisor.run_data(mode).await
        }
    };

    signal_handle.abort();
    info!("tickfleet shut down");
    result
}

/// Ask the operator which data mode to run.
async fn prompt_data_mode() -> Result<MenuChoice> {
    let answer = tokio::task::spawn_blocking(|| -> std::io::Result<String> {
        let mut stdout = std::io::stdout();
        writeln!(stdout, "{MENU}")?;
        write!(stdout, "Enter choice [1/2/3/q]: ")?;
        stdout.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .map_err(|err| AppError::Io(format!("menu task panicked: {err}")))??;

    MenuChoice::parse(&answer)
        .ok_or_else(|| AppError::Usage(format!("invalid choice: {}", answer.trim())))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
