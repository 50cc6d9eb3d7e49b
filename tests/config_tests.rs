// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use scan_session::Config;
use scan_session::backends::camera::Facing;
use scan_session::constants::{DEFAULT_RENDER_TARGET, timing};
use scan_session::errors::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("scan-session-config-{}", uuid::Uuid::new_v4()))
        .join(name)
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.last_device_id, None);
    assert_eq!(config.render_target, DEFAULT_RENDER_TARGET);
    assert_eq!(config.facing, Facing::User);
    assert!(config.scan.remember_last_device);
    assert!(config.scan.stop_after_first_result);
    assert_eq!(config.scan.restart_delay(), timing::RESTART_SETTLE_DELAY);
}

#[test]
fn test_save_and_load_roundtrip() {
    let path = temp_path("config.json");
    let mut config = Config::default();
    config.last_device_id = Some("/dev/video2".into());
    config.facing = Facing::Environment;
    config.scan.decode_fps = 15;

    config.save_to(&path).unwrap();
    let loaded = Config::load_from(&path).unwrap();

    assert_eq!(loaded, config);
    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[test]
fn test_partial_file_uses_defaults() {
    let path = temp_path("config.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{"facing": "environment", "scan": {"decode_fps": 5}}"#).unwrap();

    let loaded = Config::load_from(&path).unwrap();

    assert_eq!(loaded.facing, Facing::Environment);
    assert_eq!(loaded.scan.decode_fps, 5);
    assert_eq!(loaded.render_target, DEFAULT_RENDER_TARGET);
    assert!(loaded.scan.stop_after_first_result);
    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[test]
fn test_invalid_file_is_parse_error() {
    let path = temp_path("config.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let path = temp_path("missing.json");
    assert!(matches!(Config::load_from(&path), Err(ConfigError::Io(_))));
}

#[test]
fn test_remember_device_respects_setting() {
    let mut config = Config::default();
    assert!(config.remember_device(Some("2".into())));
    assert!(!config.remember_device(Some("2".into())));
    assert!(!config.remember_device(None));
    assert_eq!(config.last_device_id.as_deref(), Some("2"));

    config.scan.remember_last_device = false;
    assert!(!config.remember_device(Some("1".into())));
    assert_eq!(config.controller_options().last_device, None);
}

#[test]
fn test_scan_config_clamps() {
    let mut config = Config::default();
    config.scan.decode_fps = 0;
    config.scan.restart_delay_ms = 60_000;

    assert_eq!(config.scan.effective_fps(), 1);
    assert_eq!(config.scan.decode_interval(), Duration::from_secs(1));
    assert_eq!(config.scan.restart_delay(), timing::MAX_RESTART_DELAY);
}
