//! Estimator configuration
//!
//! Provides configuration file handling and validation for everything the
//! estimator takes from outside the G-code file itself. Supports JSON and
//! TOML file formats stored in the platform configuration directory.
//!
//! Configuration is organized into logical sections:
//! - Machine (firmware flavor, kinematic limits per mode)
//! - Filaments (physical properties, temperatures, extruder mapping)
//! - Extruders (hotend heating and cooling rates)
//! - Tool changes (load, unload and switch durations)
//! - Estimator switches (stealth mode, pre-heating)

use crate::error::{ConfigError, SettingsError, SettingsResult};
use crate::limits::MachineLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Firmware family the G-code targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    MarlinLegacy,
    Marlin2,
    Klipper,
    RepRapFirmware,
    Smoothie,
    Sprinter,
    Sailfish,
    MakerWare,
    Repetier,
}

impl Default for Flavor {
    fn default() -> Self {
        Self::Marlin2
    }
}

impl Flavor {
    /// Whether M203 feed rates are given in mm/min
    ///
    /// Marlin (legacy and 2.x), Smoothie and Klipper take mm/s.
    pub fn m203_in_mm_per_min(self) -> bool {
        !matches!(
            self,
            Self::MarlinLegacy | Self::Marlin2 | Self::Smoothie | Self::Klipper
        )
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MarlinLegacy => "Marlin (legacy)",
            Self::Marlin2 => "Marlin 2",
            Self::Klipper => "Klipper",
            Self::RepRapFirmware => "RepRapFirmware",
            Self::Smoothie => "Smoothie",
            Self::Sprinter => "Sprinter",
            Self::Sailfish => "Sailfish",
            Self::MakerWare => "MakerWare",
            Self::Repetier => "Repetier",
        };
        f.write_str(name)
    }
}

/// Machine section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineSettings {
    #[serde(default)]
    pub flavor: Flavor,
    #[serde(default)]
    pub limits: MachineLimits,
}

/// One loaded filament
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentSettings {
    /// Filament diameter in mm
    pub diameter: f32,
    /// Density in g/cm³
    pub density: f32,
    /// Printing temperature in °C
    pub nozzle_temperature: i32,
    /// Temperature drop applied before the filament is used again; 0 disables
    #[serde(default)]
    pub pre_cooling_temperature: i32,
    /// Physical extruder the filament is loaded into
    #[serde(default)]
    pub extruder: usize,
}

impl Default for FilamentSettings {
    fn default() -> Self {
        Self {
            diameter: 1.75,
            density: 1.245,
            nozzle_temperature: 220,
            pre_cooling_temperature: 0,
            extruder: 0,
        }
    }
}

impl FilamentSettings {
    /// Cross-section area in mm²
    pub fn area(&self) -> f32 {
        std::f32::consts::PI * (0.5 * self.diameter).powi(2)
    }
}

/// One physical extruder (hotend)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtruderSettings {
    /// Passive cooling rate in °C/s
    pub cooling_rate: f32,
    /// Heating rate in °C/s
    pub heating_rate: f32,
}

impl Default for ExtruderSettings {
    fn default() -> Self {
        Self {
            cooling_rate: 2.0,
            heating_rate: 2.0,
        }
    }
}

/// Fixed durations of a tool change, in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolChangeSettings {
    pub filament_load_time: f32,
    pub filament_unload_time: f32,
    pub extruder_change_time: f32,
}

/// Estimator switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSettings {
    /// Simulate the stealth profile alongside the normal one
    pub enable_stealth: bool,
    /// Schedule pre-cooling and pre-heating commands when rewriting
    pub enable_pre_heating: bool,
    /// Idle windows shorter than this (seconds) get no thermal commands
    pub inject_time_threshold: f32,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            enable_stealth: false,
            enable_pre_heating: false,
            inject_time_threshold: 30.0,
        }
    }
}

/// Complete estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub machine: MachineSettings,
    #[serde(default = "default_filaments")]
    pub filaments: Vec<FilamentSettings>,
    #[serde(default = "default_extruders")]
    pub extruders: Vec<ExtruderSettings>,
    #[serde(default)]
    pub toolchange: ToolChangeSettings,
    #[serde(default)]
    pub estimator: EstimatorSettings,
}

fn default_filaments() -> Vec<FilamentSettings> {
    vec![FilamentSettings::default()]
}

fn default_extruders() -> Vec<ExtruderSettings> {
    vec![ExtruderSettings::default()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            machine: MachineSettings::default(),
            filaments: default_filaments(),
            extruders: default_extruders(),
            toolchange: ToolChangeSettings::default(),
            estimator: EstimatorSettings::default(),
        }
    }
}

impl Config {
    /// Create default config
    pub fn new() -> Self {
        Self::default()
    }

    /// `<config dir>/gcodeplan/config.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gcodeplan").join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match extension(path) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(other.unwrap_or("").to_string()).into())
            }
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(other.unwrap_or("").to_string()).into())
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.filaments.is_empty() {
            return Err(ConfigError::MissingKey("filaments".to_string()).into());
        }
        if self.extruders.is_empty() {
            return Err(ConfigError::MissingKey("extruders".to_string()).into());
        }

        for (i, filament) in self.filaments.iter().enumerate() {
            if filament.diameter <= 0.0 {
                return Err(invalid(format!("filaments[{}].diameter", i), "must be > 0"));
            }
            if filament.density <= 0.0 {
                return Err(invalid(format!("filaments[{}].density", i), "must be > 0"));
            }
            if filament.extruder >= self.extruders.len() {
                return Err(invalid(
                    format!("filaments[{}].extruder", i),
                    "refers to an undefined extruder",
                ));
            }
        }

        for (i, extruder) in self.extruders.iter().enumerate() {
            if extruder.cooling_rate <= 0.0 || extruder.heating_rate <= 0.0 {
                return Err(invalid(
                    format!("extruders[{}]", i),
                    "heating and cooling rates must be > 0",
                ));
            }
        }

        let tc = &self.toolchange;
        if tc.filament_load_time < 0.0 || tc.filament_unload_time < 0.0 || tc.extruder_change_time < 0.0 {
            return Err(invalid("toolchange", "durations must be >= 0"));
        }

        for (name, limits) in [
            ("normal", &self.machine.limits.normal),
            ("stealth", &self.machine.limits.stealth),
        ] {
            let values = [
                ("max_feedrate", limits.max_feedrate),
                ("max_acceleration", limits.max_acceleration),
                ("max_jerk", limits.max_jerk),
            ];
            for (field, axes) in values {
                for (axis, value) in [("x", axes.x), ("y", axes.y), ("z", axes.z), ("e", axes.e)] {
                    if value < 0.0 || value.is_nan() {
                        return Err(ConfigError::ValueOutOfRange {
                            key: format!("machine.limits.{}.{}.{}", name, field, axis),
                            value: value.to_string(),
                        }
                        .into());
                    }
                }
            }
            if limits.print_acceleration <= 0.0
                || limits.retract_acceleration <= 0.0
                || limits.travel_acceleration <= 0.0
            {
                return Err(invalid(
                    format!("machine.limits.{}", name),
                    "accelerations must be > 0",
                ));
            }
        }

        if self.estimator.inject_time_threshold < 0.0 {
            return Err(invalid("estimator.inject_time_threshold", "must be >= 0"));
        }

        Ok(())
    }

    /// Filament `id`, or the last configured one when `id` is out of range
    pub fn filament(&self, id: usize) -> FilamentSettings {
        self.filaments
            .get(id)
            .or_else(|| self.filaments.last())
            .cloned()
            .unwrap_or_default()
    }

    /// Physical extruder a filament is loaded into
    pub fn physical_extruder(&self, filament_id: usize) -> usize {
        self.filament(filament_id).extruder
    }

    /// Extruder `id`, or the defaults when it isn't configured
    pub fn extruder(&self, id: usize) -> ExtruderSettings {
        self.extruders.get(id).cloned().unwrap_or_default()
    }

    /// Filament to physical extruder table
    pub fn filament_map(&self) -> Vec<usize> {
        self.filaments.iter().map(|f| f.extruder).collect()
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

fn invalid(key: impl Into<String>, reason: &str) -> SettingsError {
    SettingsError::InvalidSetting {
        key: key.into(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filaments.len(), 1);
        assert_eq!(config.estimator.inject_time_threshold, 30.0);
    }

    #[test]
    fn test_filament_fallback() {
        let mut config = Config::default();
        config.filaments.push(FilamentSettings {
            diameter: 2.85,
            ..FilamentSettings::default()
        });
        assert_eq!(config.filament(1).diameter, 2.85);
        assert_eq!(config.filament(9).diameter, 2.85);
        assert_eq!(config.filament(0).diameter, 1.75);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.filaments[0].diameter = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));

        let mut config = Config::default();
        config.filaments[0].extruder = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.machine.limits.stealth.max_jerk.e = -1.0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Config(ConfigError::ValueOutOfRange { .. }))
        ));

        let mut config = Config::default();
        config.extruders.clear();
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Config(ConfigError::MissingKey(_)))
        ));
    }

    #[test]
    fn test_flavor_m203_units() {
        for flavor in [
            Flavor::MarlinLegacy,
            Flavor::Marlin2,
            Flavor::Smoothie,
            Flavor::Klipper,
        ] {
            assert!(!flavor.m203_in_mm_per_min(), "{}", flavor);
        }
        for flavor in [
            Flavor::RepRapFirmware,
            Flavor::Sprinter,
            Flavor::Sailfish,
            Flavor::MakerWare,
            Flavor::Repetier,
        ] {
            assert!(flavor.m203_in_mm_per_min(), "{}", flavor);
        }
    }

    #[test]
    fn test_area() {
        let filament = FilamentSettings::default();
        let expected = std::f32::consts::PI * 0.875 * 0.875;
        assert!((filament.area() - expected).abs() < 1e-6);
    }
}
