// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use shadercam::constants::render;
use shadercam::{Config, FilterEffect, PipelineError};

#[test]
fn test_config_default() {
    let config = Config::default();

    assert!(config.mirror, "Mirror should be enabled by default");
    assert!(!config.circle_mask);
    assert_eq!(config.initial_filter, FilterEffect::None);
    assert_eq!(config.target_ring_depth, render::DEFAULT_TARGET_RING_DEPTH);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_save_and_load() {
    let dir = std::env::temp_dir().join(format!("shadercam-config-{}", std::process::id()));
    let path = dir.join("config.json");

    let config = Config {
        initial_filter: FilterEffect::Emboss,
        circle_mask: true,
        refresh_hz: 30,
        ..Config::default()
    };
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_config_malformed_file_is_config_error() {
    let dir = std::env::temp_dir().join(format!("shadercam-bad-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(Config::load(&path), Err(PipelineError::Config(_))));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_config_filter_by_name() {
    let config: Config = serde_json::from_str(r#"{ "initial_filter": "EdgeDetect" }"#).unwrap();
    assert_eq!(config.initial_filter, FilterEffect::EdgeDetect);
}
