use pathmon::{PathMonitor, Settings};
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_env_overrides_file_and_flows_into_monitor() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("pathmon.toml");

    let toml_content = r#"
[monitor]
quiescence_ms = 80
include_nested = false

[logging]
default = "info"
"#;
    fs::write(&config_path, toml_content).unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("PATHMON_MONITOR__QUIESCENCE_MS", "250");
        env::set_var("PATHMON_MONITOR__STRICT_START", "true");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("PATHMON_MONITOR__QUIESCENCE_MS");
        env::remove_var("PATHMON_MONITOR__STRICT_START");
    }

    // Environment variable should override config file
    assert_eq!(settings.monitor.quiescence_ms, 250);
    // Env var adds value not in config
    assert!(settings.monitor.strict_start);
    // Config file values remain
    assert!(!settings.monitor.include_nested);
    assert_eq!(settings.logging.default, "info");

    let monitor = PathMonitor::builder()
        .root("/tmp/watched")
        .config(settings.monitor.clone())
        .build()
        .unwrap();
    assert_eq!(
        monitor.config().quiescence_window(),
        Duration::from_millis(250)
    );
    assert!(monitor.config().strict_start);
}
