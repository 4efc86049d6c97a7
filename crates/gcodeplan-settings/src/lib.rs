//! gcodeplan Settings Crate
//!
//! Machine limits, filament and extruder tables, tool-change timings and
//! estimator switches, with JSON/TOML persistence.

pub mod config;
pub mod error;
pub mod limits;

pub use config::{
    Config, EstimatorSettings, ExtruderSettings, FilamentSettings, Flavor, MachineSettings,
    ToolChangeSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
pub use limits::{AxisLimits, ExtruderLimits, MachineLimits, ModeLimits};
