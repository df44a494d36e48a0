use std::path::PathBuf;
use std::time::Duration;

use tickfleet::{config::GlobalConfig, AppError};

fn sample_toml() -> String {
    r#"
[service]
host = "127.0.0.1"
port = 9009
secondary_port = 8812
http_port = 9000
process_pattern = "questdb"
install_checks = [["which", "questdb"], ["test", "-d", "/opt/questdb"]]
start_command = ["systemctl", "start", "questdb"]
launch_command = ["questdb", "start"]
stop_command = ["systemctl", "stop", "questdb"]
ready_timeout_seconds = 45

[app]
build_dir = "build"
pipeline_executable = "src/engine/pipeline_app"
gui_executable = "src/gui/gui_app"
log_file = "logs/pipeline.log"

[build]
command = ["make", "-j4"]

[pipeline]
api_key = "ABCDEFGHIJKL"
batch_size = 25
polling_interval_seconds = 60
symbols = ["RELIANCE.BSE", "TCS.BSE", "INFY.BSE"]

[monitoring]
health_check_interval = 15
"#
    .to_owned()
}

fn minimal_toml() -> String {
    r#"
[service]
launch_command = ["questdb", "start"]

[app]
build_dir = "build"
pipeline_executable = "pipeline_app"
gui_executable = "gui_app"
log_file = "pipeline.log"

[pipeline]
api_key = "KEY"
symbols = ["RELIANCE.BSE"]
"#
    .to_owned()
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("valid config");

    assert_eq!(config.service.secondary_port, Some(8812));
    assert_eq!(config.service.install_checks.len(), 2);
    assert_eq!(config.service.ready_timeout(), Duration::from_secs(45));
    assert_eq!(config.build.command, vec!["make", "-j4"]);
    assert!(config.build.enabled);
    assert_eq!(config.pipeline.batch_size, 25);
    assert_eq!(config.pipeline.symbols.len(), 3);
    assert_eq!(config.monitoring.health_interval(), Duration::from_secs(15));
    assert_eq!(
        config.pipeline_path(),
        PathBuf::from("build/src/engine/pipeline_app")
    );
    assert_eq!(config.gui_path(), PathBuf::from("build/src/gui/gui_app"));
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str(&minimal_toml()).expect("valid config");

    assert_eq!(config.service.host, "127.0.0.1");
    assert_eq!(config.service.port, 9009);
    assert_eq!(config.service.secondary_port, None);
    assert_eq!(config.service.http_port, 9000);
    assert_eq!(config.service.ready_timeout(), Duration::from_secs(60));
    assert_eq!(config.service.stop_timeout(), Duration::from_secs(10));
    assert!(config.service.install_checks.is_empty());
    assert!(config.service.start_command.is_none());
    assert_eq!(config.pipeline.batch_size, 10);
    assert_eq!(config.pipeline.polling_interval_seconds, 120);
    assert_eq!(
        config.build.command,
        vec!["cmake", "--build", "build", "--config", "Release"]
    );
    assert_eq!(config.monitoring.health_interval(), Duration::from_secs(10));
    assert_eq!(config.monitoring.pipeline_grace(), Duration::from_secs(3));
    assert_eq!(config.monitoring.visualizer_settle(), Duration::from_secs(2));
    assert_eq!(config.monitoring.stage_stop_timeout(), Duration::from_secs(5));
    assert_eq!(
        config.ingest_path(),
        PathBuf::from("build/src/engine/ingest/ingest_app")
    );
    assert_eq!(
        config.app.replay_file,
        PathBuf::from("test_data/sample_ticks.csv")
    );
    assert_eq!(config.service_http_url(), "http://127.0.0.1:9000");
}

#[test]
fn missing_launch_command_is_rejected() {
    let raw = minimal_toml().replace("launch_command = [\"questdb\", \"start\"]\n", "");

    let err = GlobalConfig::from_toml_str(&raw).expect_err("launch_command required");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn empty_launch_command_is_rejected() {
    let raw = minimal_toml().replace("[\"questdb\", \"start\"]", "[]");

    let err = GlobalConfig::from_toml_str(&raw).expect_err("empty launch");

    assert!(err.to_string().contains("launch_command"), "got {err}");
}

#[test]
fn empty_api_key_is_rejected() {
    let raw = minimal_toml().replace("api_key = \"KEY\"", "api_key = \"  \"");

    let err = GlobalConfig::from_toml_str(&raw).expect_err("blank key");

    assert!(err.to_string().contains("api_key"), "got {err}");
}

#[test]
fn empty_symbol_list_is_rejected() {
    let raw = minimal_toml().replace("[\"RELIANCE.BSE\"]", "[]");

    let err = GlobalConfig::from_toml_str(&raw).expect_err("no symbols");

    assert!(err.to_string().contains("symbols"), "got {err}");
}

#[test]
fn zero_port_is_rejected() {
    let raw = minimal_toml().replace(
        "[service]\n",
        "[service]\nport = 0\n",
    );

    let err = GlobalConfig::from_toml_str(&raw).expect_err("zero port");

    assert!(err.to_string().contains("ports"), "got {err}");
}

#[test]
fn empty_install_check_is_rejected() {
    let raw = minimal_toml().replace("[service]\n", "[service]\ninstall_checks = [[]]\n");

    let err = GlobalConfig::from_toml_str(&raw).expect_err("empty check argv");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn empty_build_command_only_matters_when_enabled() {
    let enabled = format!("{}\n[build]\ncommand = []\n", minimal_toml());
    let disabled = format!("{}\n[build]\nenabled = false\ncommand = []\n", minimal_toml());

    assert!(GlobalConfig::from_toml_str(&enabled).is_err());
    assert!(GlobalConfig::from_toml_str(&disabled).is_ok());
}

#[test]
fn zero_health_interval_is_rejected() {
    let raw = format!("{}\n[monitoring]\nhealth_check_interval = 0\n", minimal_toml());

    let err = GlobalConfig::from_toml_str(&raw).expect_err("zero interval");

    assert!(err.to_string().contains("health_check_interval"), "got {err}");
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("[service\nport = ").expect_err("bad toml");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, minimal_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("loads");

    assert_eq!(config.pipeline.api_key, "KEY");
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");

    let err = GlobalConfig::load_from_path(temp.path().join("absent.toml")).expect_err("missing");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn api_key_is_redacted_for_logs() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("valid config");

    assert_eq!(config.pipeline.redacted_api_key(), "ABCDEFGH...");
}

#[test]
fn shipped_example_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.toml");

    let config = GlobalConfig::load_from_path(path).expect("example config loads");

    assert_eq!(config.service.secondary_port, Some(8812));
    assert!(config.service.stop_command.is_some());
}
