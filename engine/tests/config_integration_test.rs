//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! validated, and processed with path expansion.

use kestrel_engine::config::Config;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_config_toml_parsing() {
    let toml_content = r#"
[core]
agent_name = "scout"
log_level = "debug"
data_dir = "/var/lib/kestrel"

[safety]
safe_mining = false
reach = 5.0
fallback_radius = 3.0

[tasks]
mine_radius = 24.0
wood_wander_interval_ms = 6000
defend_radius = 12.5

[reflex]
low_health = 8.0
threats = ["creeper", "warden"]
panic_ms = 1500

[movement]
follow_max_attempts = 5

[items.aliases]
"glow rock" = "glowstone"
"#;

    let config = Config::from_toml_str(toml_content).unwrap();

    assert_eq!(config.core.agent_name, "scout");
    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.core.data_dir, PathBuf::from("/var/lib/kestrel"));
    assert!(!config.safety.safe_mining);
    assert_eq!(config.safety.fallback_radius, 3.0);
    assert_eq!(config.tasks.mine_radius, 24.0);
    assert_eq!(config.tasks.wood_wander_interval_ms, 6000);
    // Unset fields keep their defaults
    assert_eq!(config.tasks.farm_wander_interval_ms, 15_000);
    assert_eq!(config.reflex.threats, vec!["creeper", "warden"]);
    assert_eq!(config.reflex.eat_cooldown_ms, 5_000);
    assert_eq!(config.movement.follow_max_attempts, 5);
    assert_eq!(
        config.items.aliases.get("glow rock").map(String::as_str),
        Some("glowstone")
    );
    assert_eq!(
        config.database_path(),
        PathBuf::from("/var/lib/kestrel/kestrel.db")
    );
}

#[test]
fn test_tilde_expansion() {
    let config = Config::from_toml_str(
        r#"
[core]
data_dir = "~/.kestrel"
"#,
    )
    .unwrap();

    if let Some(home) = dirs::home_dir() {
        assert_eq!(config.core.data_dir, home.join(".kestrel"));
    }
    assert!(!config.core.data_dir.to_string_lossy().starts_with('~'));
}

#[test]
fn test_load_from_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[core]
log_level = "warn"

[reflex]
threat_radius = 6.0
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.log_level, "warn");
    assert_eq!(config.reflex.threat_radius, 6.0);
}

#[test]
fn test_missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    assert!(Config::load_from_path(&temp_dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_invalid_values_rejected() {
    let cases = [
        "[core]\nlog_level = \"chatty\"\n",
        "[core]\nagent_name = \"  \"\n",
        "[core]\n[safety]\nreach = 0.0\n",
        "[core]\n[tasks]\ndefend_radius = -1.0\n",
        "[core]\n[reflex]\nthreat_radius = nan\n",
        "[core]\n[movement]\nfollow_max_attempts = 0\n",
        "[safety]\nreach = 4.0\n",
    ];
    for case in cases {
        assert!(Config::from_toml_str(case).is_err(), "accepted: {}", case);
    }
}

#[test]
fn test_serialized_config_reloads() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::from_toml_str("[core]\n").unwrap();
    config.core.data_dir = temp_dir.path().to_path_buf();
    config.tasks.farm_radius = 20.0;

    let path = temp_dir.path().join("config.toml");
    fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

    let reloaded = Config::load_from_path(&path).unwrap();
    assert_eq!(reloaded.tasks.farm_radius, 20.0);
    assert_eq!(reloaded.core.data_dir, temp_dir.path());
}
