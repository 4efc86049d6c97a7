//! Config persistence tests

use gcodeplan_settings::{Config, ConfigError, FilamentSettings, Flavor, SettingsError};
use tempfile::tempdir;

#[test]
fn test_toml_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.machine.flavor = Flavor::Klipper;
    config.machine.limits.normal.max_jerk.x = 8.0;
    config.toolchange.filament_load_time = 8.0;
    config.toolchange.filament_unload_time = 5.0;
    config.filaments.push(FilamentSettings {
        nozzle_temperature: 250,
        ..FilamentSettings::default()
    });
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_json_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.estimator.enable_stealth = true;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert!(loaded.estimator.enable_stealth);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[toolchange]\nfilament_load_time = 8.0\nfilament_unload_time = 5.0\nextruder_change_time = 0.0\n",
    )
    .unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.toolchange.filament_load_time, 8.0);
    assert_eq!(loaded.filaments.len(), 1);
    assert_eq!(loaded.machine.flavor, Flavor::Marlin2);
}

#[test]
fn test_unsupported_extension() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "machine: {}").unwrap();

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::Config(ConfigError::UnsupportedFormat(_)))
    ));
    assert!(Config::default().save_to_file(&path).is_err());
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::LoadError(_))
    ));
}
