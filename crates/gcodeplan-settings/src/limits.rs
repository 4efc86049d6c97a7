//! Machine kinematic limits
//!
//! Limits are kept per [`TimeMode`]. Feed rates are in mm/s, accelerations
//! in mm/s². A maximum feed rate or acceleration of zero means the axis is
//! not limited; jerk values are always used as given.

use gcodeplan_core::{Axis, TimeMode};
use serde::{Deserialize, Serialize};

/// Print acceleration used until the file sets one (mm/s²)
pub const DEFAULT_ACCELERATION: f32 = 1500.0;
/// Retract acceleration used until the file sets one (mm/s²)
pub const DEFAULT_RETRACT_ACCELERATION: f32 = 1500.0;
/// Travel acceleration used until the file sets one (mm/s²)
pub const DEFAULT_TRAVEL_ACCELERATION: f32 = 1250.0;

/// One value per planned axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub e: f32,
}

impl AxisLimits {
    pub const fn new(x: f32, y: f32, z: f32, e: f32) -> Self {
        Self { x, y, z, e }
    }

    pub fn get(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::E => self.e,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f32) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
            Axis::E => self.e = value,
        }
    }
}

/// Overrides for one physical extruder
///
/// Machines with several toolheads may limit each head differently. Axes
/// left at zero fall back to the mode-wide value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtruderLimits {
    pub max_feedrate: AxisLimits,
    pub max_acceleration: AxisLimits,
}

impl Default for ExtruderLimits {
    fn default() -> Self {
        Self {
            max_feedrate: AxisLimits::new(0.0, 0.0, 0.0, 0.0),
            max_acceleration: AxisLimits::new(0.0, 0.0, 0.0, 0.0),
        }
    }
}

/// Limits the planner applies in one simulation mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeLimits {
    /// Maximum axis speed (mm/s)
    pub max_feedrate: AxisLimits,
    /// Maximum axis acceleration (mm/s²)
    pub max_acceleration: AxisLimits,
    /// Instantaneous speed change allowed without ramping (mm/s)
    pub max_jerk: AxisLimits,
    /// Floor for moves that extrude (mm/s)
    pub min_extruding_feedrate: f32,
    /// Floor for moves that don't extrude (mm/s)
    pub min_travel_feedrate: f32,
    /// Initial acceleration for printing moves
    pub print_acceleration: f32,
    /// Initial acceleration for extruder-only moves
    pub retract_acceleration: f32,
    /// Initial acceleration for travel moves
    pub travel_acceleration: f32,
    /// Cap for M204 printing acceleration; zero disables the cap
    pub max_print_acceleration: f32,
    /// Cap for M204 retract acceleration; zero disables the cap
    pub max_retract_acceleration: f32,
    /// Cap for M204 travel acceleration; zero disables the cap
    pub max_travel_acceleration: f32,
    /// Per physical extruder overrides, indexed by extruder id
    #[serde(default)]
    pub per_extruder: Vec<ExtruderLimits>,
}

impl Default for ModeLimits {
    fn default() -> Self {
        Self {
            max_feedrate: AxisLimits::new(500.0, 500.0, 12.0, 120.0),
            max_acceleration: AxisLimits::new(1000.0, 1000.0, 500.0, 5000.0),
            max_jerk: AxisLimits::new(10.0, 10.0, 0.2, 2.5),
            min_extruding_feedrate: 0.0,
            min_travel_feedrate: 0.0,
            print_acceleration: DEFAULT_ACCELERATION,
            retract_acceleration: DEFAULT_RETRACT_ACCELERATION,
            travel_acceleration: DEFAULT_TRAVEL_ACCELERATION,
            max_print_acceleration: DEFAULT_ACCELERATION,
            max_retract_acceleration: DEFAULT_RETRACT_ACCELERATION,
            max_travel_acceleration: DEFAULT_TRAVEL_ACCELERATION,
            per_extruder: Vec::new(),
        }
    }
}

impl ModeLimits {
    /// Maximum speed of `axis` while `extruder` is active
    pub fn axis_max_feedrate(&self, axis: Axis, extruder: usize) -> f32 {
        match self.per_extruder.get(extruder) {
            Some(over) if over.max_feedrate.get(axis) > 0.0 => over.max_feedrate.get(axis),
            _ => self.max_feedrate.get(axis),
        }
    }

    /// Maximum acceleration of `axis` while `extruder` is active
    pub fn axis_max_acceleration(&self, axis: Axis, extruder: usize) -> f32 {
        match self.per_extruder.get(extruder) {
            Some(over) if over.max_acceleration.get(axis) > 0.0 => {
                over.max_acceleration.get(axis)
            }
            _ => self.max_acceleration.get(axis),
        }
    }

    pub fn axis_max_jerk(&self, axis: Axis) -> f32 {
        self.max_jerk.get(axis)
    }

    /// Set the max feed rate for an axis, on every extruder that overrides it
    pub fn set_max_feedrate(&mut self, axis: Axis, value: f32) {
        self.max_feedrate.set(axis, value);
        for over in &mut self.per_extruder {
            if over.max_feedrate.get(axis) > 0.0 {
                over.max_feedrate.set(axis, value);
            }
        }
    }

    /// Set the max acceleration for an axis, on every extruder that overrides it
    pub fn set_max_acceleration(&mut self, axis: Axis, value: f32) {
        self.max_acceleration.set(axis, value);
        for over in &mut self.per_extruder {
            if over.max_acceleration.get(axis) > 0.0 {
                over.max_acceleration.set(axis, value);
            }
        }
    }
}

/// Limits for both simulation modes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineLimits {
    pub normal: ModeLimits,
    pub stealth: ModeLimits,
}

impl MachineLimits {
    pub fn mode(&self, mode: TimeMode) -> &ModeLimits {
        match mode {
            TimeMode::Normal => &self.normal,
            TimeMode::Stealth => &self.stealth,
        }
    }

    pub fn mode_mut(&mut self, mode: TimeMode) -> &mut ModeLimits {
        match mode {
            TimeMode::Normal => &mut self.normal,
            TimeMode::Stealth => &mut self.stealth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = ModeLimits::default();
        assert_eq!(limits.axis_max_feedrate(Axis::Z, 0), 12.0);
        assert_eq!(limits.axis_max_acceleration(Axis::E, 0), 5000.0);
        assert_eq!(limits.axis_max_jerk(Axis::Z), 0.2);
        assert_eq!(limits.travel_acceleration, 1250.0);
    }

    #[test]
    fn test_per_extruder_override() {
        let mut limits = ModeLimits::default();
        let mut head = ExtruderLimits::default();
        head.max_feedrate.e = 40.0;
        limits.per_extruder = vec![ExtruderLimits::default(), head];

        assert_eq!(limits.axis_max_feedrate(Axis::E, 0), 120.0);
        assert_eq!(limits.axis_max_feedrate(Axis::E, 1), 40.0);
        assert_eq!(limits.axis_max_feedrate(Axis::X, 1), 500.0);
        assert_eq!(limits.axis_max_feedrate(Axis::E, 7), 120.0);

        limits.set_max_feedrate(Axis::E, 25.0);
        assert_eq!(limits.axis_max_feedrate(Axis::E, 0), 25.0);
        assert_eq!(limits.axis_max_feedrate(Axis::E, 1), 25.0);
    }

    #[test]
    fn test_mode_access() {
        let mut limits = MachineLimits::default();
        limits.mode_mut(TimeMode::Stealth).max_jerk.x = 4.0;
        assert_eq!(limits.mode(TimeMode::Stealth).max_jerk.x, 4.0);
        assert_eq!(limits.mode(TimeMode::Normal).max_jerk.x, 10.0);
    }
}
