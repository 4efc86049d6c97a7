//! Simulation modes and custom G-code event kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Machine profile a time machine simulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    Normal,
    /// Silent / stealth motor current profile
    Stealth,
}

impl Default for TimeMode {
    fn default() -> Self {
        Self::Normal
    }
}

impl TimeMode {
    pub const COUNT: usize = 2;
    pub const ALL: [TimeMode; Self::COUNT] = [Self::Normal, Self::Stealth];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Progress annotation prefix, e.g. `M73 P<percent> R<minutes>`
    pub fn progress_mask(self) -> (&'static str, &'static str) {
        match self {
            Self::Normal => ("P", "R"),
            Self::Stealth => ("Q", "S"),
        }
    }

    /// Letter of the "minutes to next stop" annotation
    pub fn stop_mask(self) -> &'static str {
        match self {
            Self::Normal => "C",
            Self::Stealth => "D",
        }
    }
}

impl fmt::Display for TimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Stealth => write!(f, "stealth"),
        }
    }
}

impl FromStr for TimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "stealth" | "silent" => Ok(Self::Stealth),
            _ => Err(format!("Unknown time mode: {}", s)),
        }
    }
}

/// Out-of-band event that interrupts the print
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomGcodeType {
    ColorChange,
    PausePrint,
    Custom,
    ToolChange,
}

impl fmt::Display for CustomGcodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColorChange => write!(f, "Color change"),
            Self::PausePrint => write!(f, "Pause"),
            Self::Custom => write!(f, "Custom"),
            Self::ToolChange => write!(f, "Tool change"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks() {
        assert_eq!(TimeMode::Normal.progress_mask(), ("P", "R"));
        assert_eq!(TimeMode::Stealth.progress_mask(), ("Q", "S"));
        assert_eq!(TimeMode::Stealth.stop_mask(), "D");
    }

    #[test]
    fn test_time_mode_from_str() {
        assert_eq!("Silent".parse::<TimeMode>(), Ok(TimeMode::Stealth));
        assert!("turbo".parse::<TimeMode>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TimeMode::Stealth).unwrap();
        assert_eq!(json, "\"stealth\"");
        let kind: CustomGcodeType = serde_json::from_str("\"pause_print\"").unwrap();
        assert_eq!(kind, CustomGcodeType::PausePrint);
    }
}
