//! Unit and positioning modes
//!
//! G20/G21 switch the length unit, G90/G91 and M82/M83 switch between
//! absolute and relative positioning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimeters per inch.
pub const INCHES_TO_MM: f32 = 25.4;

/// Seconds per minute as a feed rate scale (mm/min to mm/s).
pub const MMMIN_TO_MMSEC: f32 = 1.0 / 60.0;

/// Length unit selected by G20/G21
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Millimeters (G21)
    Millimeters,
    /// Inches (G20)
    Inches,
}

impl Default for Units {
    fn default() -> Self {
        Self::Millimeters
    }
}

impl Units {
    /// Factor converting a value in these units to millimeters
    pub fn scale_to_mm(self) -> f32 {
        match self {
            Self::Millimeters => 1.0,
            Self::Inches => INCHES_TO_MM,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millimeters => write!(f, "mm"),
            Self::Inches => write!(f, "in"),
        }
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mm" | "millimeters" | "metric" => Ok(Self::Millimeters),
            "in" | "inch" | "inches" | "imperial" => Ok(Self::Inches),
            _ => Err(format!("Unknown units: {}", s)),
        }
    }
}

/// Absolute or relative positioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositioningMode {
    /// Coordinates are machine positions (G90 / M82)
    Absolute,
    /// Coordinates are offsets from the last position (G91 / M83)
    Relative,
}

impl Default for PositioningMode {
    fn default() -> Self {
        Self::Absolute
    }
}

impl fmt::Display for PositioningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Relative => write!(f, "relative"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_scale() {
        assert_eq!(Units::Millimeters.scale_to_mm(), 1.0);
        assert_eq!(Units::Inches.scale_to_mm(), 25.4);
    }

    #[test]
    fn test_units_from_str() {
        assert_eq!("MM".parse::<Units>(), Ok(Units::Millimeters));
        assert_eq!("inch".parse::<Units>(), Ok(Units::Inches));
        assert!("furlong".parse::<Units>().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Units::default(), Units::Millimeters);
        assert_eq!(PositioningMode::default(), PositioningMode::Absolute);
    }
}
