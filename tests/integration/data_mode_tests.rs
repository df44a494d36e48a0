//! Data-only runs and the build step.
#![cfg(unix)]

use std::time::Duration;

use tokio::net::TcpListener;

use tickfleet::builder::run_build;
use tickfleet::config::BuildConfig;
use tickfleet::mode::DataMode;
use tickfleet::models::process::Role;
use tickfleet::AppError;

use super::test_helpers::{closed_port, test_config, test_supervisor, write_script};

#[tokio::test]
async fn disabled_build_is_skipped() {
    let build = BuildConfig {
        enabled: false,
        command: vec!["/nonexistent/cmake".into()],
    };

    run_build(&build).await.expect("disabled build is a no-op");
}

#[tokio::test]
async fn failing_build_is_a_build_error() {
    let failing = BuildConfig {
        enabled: true,
        command: vec!["false".into()],
    };
    let missing = BuildConfig {
        enabled: true,
        command: vec!["/nonexistent/cmake".into()],
    };

    let err = run_build(&failing).await.expect_err("build fails");
    assert!(matches!(err, AppError::Build(_)), "got {err:?}");
    let err = run_build(&missing).await.expect_err("build tool missing");
    assert!(matches!(err, AppError::Build(_)), "got {err:?}");
}

#[tokio::test]
async fn build_failure_aborts_before_any_stage_starts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(temp.path(), closed_port());
    config.build = BuildConfig {
        enabled: true,
        command: vec!["false".into()],
    };
    let (supervisor, _ct) = test_supervisor(config, None);
    let mut supervisor = supervisor.with_build(true);

    let err = supervisor
        .run_data(DataMode::Pipeline)
        .await
        .expect_err("build failed");

    assert!(matches!(err, AppError::Build(_)), "got {err:?}");
    assert!(supervisor.registry().is_empty());
}

#[tokio::test]
async fn replay_runs_ingest_binary_with_tick_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let args_file = temp.path().join("args.txt");
    write_script(
        temp.path(),
        "ingest.sh",
        &format!("echo \"$@\" > '{}'", args_file.display()),
    );
    let (mut supervisor, _ct) = test_supervisor(test_config(temp.path(), closed_port()), None);

    supervisor.run_data(DataMode::Replay).await.expect("replay");

    let args = std::fs::read_to_string(&args_file).expect("ingest ran");
    assert_eq!(args.trim(), "ticks.csv replay");
    assert!(supervisor.is_shutting_down());
}

#[tokio::test]
async fn ingest_runs_in_foreground_with_api_key() {
    let temp = tempfile::tempdir().expect("tempdir");
    let args_file = temp.path().join("args.txt");
    write_script(
        temp.path(),
        "ingest.sh",
        &format!("echo \"$@\" > '{}'", args_file.display()),
    );
    let (mut supervisor, _ct) = test_supervisor(test_config(temp.path(), closed_port()), None);

    supervisor.run_data(DataMode::Ingest).await.expect("ingest");

    let args = std::fs::read_to_string(&args_file).expect("ingest ran");
    assert_eq!(args.trim(), "TESTKEY123456");
}

#[tokio::test]
async fn interrupt_stops_a_foreground_ingest() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_script(temp.path(), "ingest.sh", "exec sleep 30");
    let (mut supervisor, ct) = test_supervisor(test_config(temp.path(), closed_port()), None);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        ct.cancel();
    });

    let started = std::time::Instant::now();
    supervisor.run_data(DataMode::Ingest).await.expect("clean stop");

    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn pipeline_mode_monitors_until_interrupted_without_visualizer() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_script(temp.path(), "pipeline.sh", "exec sleep 30");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (mut supervisor, ct) = test_supervisor(test_config(temp.path(), port), None);
    let interrupt = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        ct.cancel();
    });

    supervisor
        .run_data(DataMode::Pipeline)
        .await
        .expect("pipeline mode");
    interrupt.await.expect("interrupt task");

    assert!(supervisor.registry().get(Role::Visualizer).is_none());
    assert!(supervisor.registry().is_empty());
}
