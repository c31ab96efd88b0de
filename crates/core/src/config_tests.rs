// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_match_documented_values() {
    let config = DaemonConfig::default();
    assert_eq!(config.working_directory, "_AiDevLog");
    assert_eq!(config.agent_pool_size, 5);
    assert_eq!(config.state_update_interval_ms, 5000);
    assert_eq!(config.stuck_process_threshold_ms, 600_000);
    assert_eq!(config.rest_duration_ms, 0);
    assert_eq!(config.coordinator.debounce_ms, 1000);
    assert_eq!(config.coordinator.cooldown_ms, 1000);
    config.validate().expect("defaults are valid");
}

#[test]
fn load_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = DaemonConfig::load(dir.path()).unwrap();
    assert_eq!(config.agent_pool_size, 5);
}

#[test]
fn load_partial_file_overrides_only_named_keys() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("gaffer.toml"),
        "agent_pool_size = 2\nrest_duration_ms = 100\n",
    )
    .unwrap();
    let config = DaemonConfig::load(dir.path()).unwrap();
    assert_eq!(config.agent_pool_size, 2);
    assert_eq!(config.rest_duration_ms, 100);
    assert_eq!(config.working_directory, "_AiDevLog");
}

#[test]
fn pool_size_bounds_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("gaffer.toml"), "agent_pool_size = 0\n").unwrap();
    let err = DaemonConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::OutOfBounds { field: "agent_pool_size", .. }));

    std::fs::write(dir.path().join("gaffer.toml"), "agent_pool_size = 64\n").unwrap();
    assert!(DaemonConfig::load(dir.path()).is_err());
}

#[test]
fn state_interval_bounds_are_enforced() {
    let mut config = DaemonConfig::default();
    config.state_update_interval_ms = 100;
    assert!(config.validate().is_err());
    config.state_update_interval_ms = 60_000;
    assert!(config.validate().is_ok());
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("gaffer.toml"), "agent_pool_size = \"lots\"\n").unwrap();
    let err = DaemonConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn backend_kind_parses_from_toml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("gaffer.toml"), "default_agent_backend = \"mock\"\n").unwrap();
    let config = DaemonConfig::load(dir.path()).unwrap();
    assert_eq!(config.default_agent_backend, AgentBackendKind::Mock);
}
